//! RGBA colour lookup trie.
//!
//! Sixteen-way trie over the 32 bits of an RGBA colour: each of the eight
//! levels consumes one bit of every channel (most significant first), so a
//! lookup is always eight steps. Nodes live in a flat arena and are dropped
//! together with the tree.

const NO_CHILD: u32 = 0;

#[derive(Clone)]
struct Node {
    children: [u32; 16],
    index: Option<u16>,
}

impl Node {
    const EMPTY: Node = Node {
        children: [NO_CHILD; 16],
        index: None,
    };
}

/// Maps distinct RGBA colours to palette indices.
pub struct ColorTree {
    nodes: Vec<Node>,
}

impl Default for ColorTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ColorTree {
    /// Empty tree holding only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::EMPTY],
        }
    }

    #[inline]
    fn slot(rgba: [u8; 4], level: u32) -> usize {
        let shift = 7 - level;
        let [r, g, b, a] = rgba;
        (8 * ((r >> shift) & 1) + 4 * ((g >> shift) & 1) + 2 * ((b >> shift) & 1) + ((a >> shift) & 1))
            as usize
    }

    /// Index stored for `rgba`, if present.
    pub fn get(&self, rgba: [u8; 4]) -> Option<u16> {
        let mut node = 0usize;
        for level in 0..8 {
            let child = self.nodes[node].children[Self::slot(rgba, level)];
            if child == NO_CHILD {
                return None;
            }
            node = child as usize;
        }
        self.nodes[node].index
    }

    /// Whether `rgba` has been inserted.
    #[inline]
    pub fn contains(&self, rgba: [u8; 4]) -> bool {
        self.get(rgba).is_some()
    }

    /// Insert `rgba` with palette index `index`.
    ///
    /// Callers check [`contains`](Self::contains) first; inserting a colour
    /// twice overwrites its index.
    pub fn insert(&mut self, rgba: [u8; 4], index: u16) {
        debug_assert!(!self.contains(rgba), "colour inserted twice");
        let mut node = 0usize;
        for level in 0..8 {
            let slot = Self::slot(rgba, level);
            let mut child = self.nodes[node].children[slot];
            if child == NO_CHILD {
                child = self.nodes.len() as u32;
                self.nodes.push(Node::EMPTY);
                self.nodes[node].children[slot] = child;
            }
            node = child as usize;
        }
        self.nodes[node].index = Some(index);
    }

    /// Number of allocated nodes, root included.
    #[cfg(test)]
    fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

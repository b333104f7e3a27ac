//! Colour statistics for mode selection.
//!
//! One pass over the pixels answers four questions: is any pixel coloured,
//! can transparency be expressed with a single colour key, how many bits do
//! grey samples need, and which distinct colours occur. The pass stops early
//! once every question is settled.

use log::trace;

use super::color_tree::ColorTree;
use super::convert::{pixel_rgba16, pixel_rgba8, raw_size};
use super::select::value_required_bits;
use crate::color::{ChannelLayout, ColorKey, ColorMode, MAX_PALETTE_LEN};
use crate::error::{Error, Result};

/// What a pixel scan learned about an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorProfile {
    /// Some pixel has `r != g` or `r != b`.
    pub is_colored: bool,
    /// Transparency cannot be expressed with a single colour key.
    pub needs_full_alpha: bool,
    /// The one fully transparent colour that could become a key, normalised
    /// to 16 bits per channel. Cleared once alpha is forced.
    pub candidate_key: Option<ColorKey>,
    /// Smallest bit depth (1, 2, 4, 8 or 16) holding every sample.
    pub min_bits: u8,
    /// Distinct RGBA colours in first-seen order, at most 256.
    pub palette: Vec<[u8; 4]>,
    /// Number of distinct colours counted; may exceed 256.
    pub color_count: usize,
}

/// Running state of the profiling pass.
struct Accumulator {
    is_colored: bool,
    needs_full_alpha: bool,
    key: Option<[u16; 3]>,
    min_bits: u8,
    palette: Vec<[u8; 4]>,
    color_count: usize,
    tree: ColorTree,

    /// Grey depth at which no sample can need more bits.
    bits_limit: u8,
    max_colors: usize,
    colored_done: bool,
    alpha_done: bool,
    colors_done: bool,
    bits_done: bool,
}

impl Accumulator {
    fn new(mode: &ColorMode, bpp: u32) -> Self {
        let max_colors = match bpp {
            1 => 2,
            2 => 4,
            4 => 16,
            8 => 256,
            _ => MAX_PALETTE_LEN + 1,
        };
        // Palette indices say nothing about the grey values they point at.
        let bits_limit = match mode.layout {
            ChannelLayout::Grey => mode.bit_depth.min(8),
            _ => 8,
        };
        Self {
            is_colored: false,
            needs_full_alpha: false,
            key: None,
            min_bits: 1,
            palette: Vec::new(),
            color_count: 0,
            tree: ColorTree::new(),
            bits_limit,
            max_colors,
            colored_done: mode.is_greyscale_type(),
            alpha_done: !mode.can_have_alpha(),
            colors_done: false,
            bits_done: bits_limit == 1,
        }
    }

    #[inline]
    fn settled(&self) -> bool {
        self.alpha_done && self.colors_done && self.colored_done && self.bits_done
    }

    #[inline]
    fn observe_colored(&mut self, colored: bool, lift_bits: bool) {
        if !self.colored_done && colored {
            self.is_colored = true;
            self.colored_done = true;
            if lift_bits {
                self.min_bits = self.min_bits.max(8);
            }
        }
    }

    /// Colour key state machine. `opaque` is the maximum alpha value.
    fn observe_alpha(&mut self, rgb: [u16; 3], a: u16, opaque: u16) {
        if self.alpha_done {
            return;
        }
        let matches_key = self.key == Some(rgb);
        if a != opaque && (a != 0 || (self.key.is_some() && !matches_key)) {
            self.force_alpha();
        } else if a == 0 && self.key.is_none() {
            self.key = Some(rgb);
        } else if a == opaque && matches_key {
            // An opaque pixel shares the key colour.
            self.force_alpha();
        }
    }

    fn force_alpha(&mut self) {
        self.needs_full_alpha = true;
        self.alpha_done = true;
        self.key = None;
        // No PNG alpha layout goes below 8 bits per channel.
        self.min_bits = self.min_bits.max(8);
    }

    fn observe_rgba8(&mut self, rgba: [u8; 4]) {
        let [r, g, b, a] = rgba;

        if !self.bits_done && self.min_bits < 8 {
            // Only grey matters below 8 bits, so red stands in for the sample.
            self.min_bits = self.min_bits.max(value_required_bits(r));
        }
        self.bits_done = self.min_bits >= self.bits_limit;

        self.observe_colored(r != g || r != b, true);
        self.observe_alpha([r as u16, g as u16, b as u16], a as u16, 255);

        if !self.colors_done && !self.tree.contains(rgba) {
            self.tree.insert(rgba, self.color_count as u16);
            if self.color_count < MAX_PALETTE_LEN {
                self.palette.push(rgba);
            }
            self.color_count += 1;
            self.colors_done = self.color_count >= self.max_colors;
        }
    }

    fn observe_rgba16(&mut self, rgba: [u16; 4]) {
        let [r, g, b, a] = rgba;
        self.observe_colored(r != g || r != b, false);
        self.observe_alpha([r, g, b], a, u16::MAX);
    }

    fn finish(self, normalize_key: bool) -> ColorProfile {
        let candidate_key = self.key.map(|[r, g, b]| {
            if normalize_key {
                ColorKey {
                    r: r | (r << 8),
                    g: g | (g << 8),
                    b: b | (b << 8),
                }
            } else {
                ColorKey { r, g, b }
            }
        });
        ColorProfile {
            is_colored: self.is_colored,
            needs_full_alpha: self.needs_full_alpha,
            candidate_key,
            min_bits: self.min_bits,
            palette: self.palette,
            color_count: self.color_count,
        }
    }
}

/// Whether a 16-bit image uses precision an 8-bit image could not hold.
fn is_truly_sixteen_bit(pixels: &[u8], count: usize, mode: &ColorMode) -> bool {
    (0..count).any(|i| {
        pixel_rgba16(pixels, i, mode)
            .iter()
            .any(|&c| (c & 0xFF) != (c >> 8))
    })
}

/// Scan `pixels` (raw, `width` x `height`, laid out in `mode`) and report
/// colour usage.
pub fn build_profile(pixels: &[u8], width: u32, height: u32, mode: &ColorMode) -> Result<ColorProfile> {
    let bpp = mode.bits_per_pixel()?;
    if bpp == 0 {
        return Err(Error::InvalidColorMode {
            layout: mode.layout.png_color_type(),
            bit_depth: mode.bit_depth,
        });
    }
    let expected = raw_size(width, height, mode)?;
    if pixels.len() < expected {
        return Err(Error::InvalidDataLength {
            expected,
            actual: pixels.len(),
        });
    }

    let count = width as usize * height as usize;
    let mut acc = Accumulator::new(mode, bpp);

    if mode.bit_depth == 16 && is_truly_sixteen_bit(pixels, count, mode) {
        acc.min_bits = 16;
        // No 16-bit palettes exist, so counting colours is pointless.
        acc.bits_done = true;
        acc.colors_done = true;

        for i in 0..count {
            acc.observe_rgba16(pixel_rgba16(pixels, i, mode));
            if acc.settled() {
                trace!("profile settled after {} of {} pixels", i + 1, count);
                break;
            }
        }
        if let (Some([kr, kg, kb]), false) = (acc.key, acc.needs_full_alpha) {
            let shared = (0..count).any(|i| {
                let [r, g, b, a] = pixel_rgba16(pixels, i, mode);
                a != 0 && r == kr && g == kg && b == kb
            });
            if shared {
                acc.force_alpha();
            }
        }
        return Ok(acc.finish(false));
    }

    for i in 0..count {
        acc.observe_rgba8(pixel_rgba8(pixels, i, mode));
        if acc.settled() {
            trace!("profile settled after {} of {} pixels", i + 1, count);
            break;
        }
    }
    if let (Some([kr, kg, kb]), false) = (acc.key, acc.needs_full_alpha) {
        let shared = (0..count).any(|i| {
            let [r, g, b, a] = pixel_rgba8(pixels, i, mode);
            a != 0 && r as u16 == kr && g as u16 == kg && b as u16 == kb
        });
        if shared {
            acc.force_alpha();
        }
    }
    Ok(acc.finish(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_and_white() {
        let pixels = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 255];
        let p = build_profile(&pixels, 2, 2, &ColorMode::rgba8()).unwrap();
        assert!(!p.is_colored);
        assert!(!p.needs_full_alpha);
        assert_eq!(p.candidate_key, None);
        assert_eq!(p.min_bits, 1);
        assert_eq!(p.color_count, 2);
        assert_eq!(p.palette, vec![[0, 0, 0, 255], [255, 255, 255, 255]]);
    }

    #[test]
    fn test_colored_lifts_bits() {
        let pixels = [0, 0, 0, 255, 255, 0, 0, 255];
        let p = build_profile(&pixels, 2, 1, &ColorMode::rgba8()).unwrap();
        assert!(p.is_colored);
        assert_eq!(p.min_bits, 8);
    }

    #[test]
    fn test_grey_levels() {
        let rgb = |v: u8| [v, v, v];
        let two_bit: Vec<u8> = [0, 85, 170, 255].iter().flat_map(|&v| rgb(v)).collect();
        let p = build_profile(&two_bit, 4, 1, &ColorMode::rgb8()).unwrap();
        assert_eq!(p.min_bits, 2);

        let four_bit: Vec<u8> = [0, 17, 255].iter().flat_map(|&v| rgb(v)).collect();
        let p = build_profile(&four_bit, 3, 1, &ColorMode::rgb8()).unwrap();
        assert_eq!(p.min_bits, 4);

        let eight_bit: Vec<u8> = [0, 100].iter().flat_map(|&v| rgb(v)).collect();
        let p = build_profile(&eight_bit, 2, 1, &ColorMode::rgb8()).unwrap();
        assert_eq!(p.min_bits, 8);
    }

    #[test]
    fn test_low_depth_palette_still_measures_grey() {
        let mode = ColorMode::palette(1, vec![[0, 0, 0, 255], [100, 100, 100, 255]]);
        let p = build_profile(&[0b0101_0101], 8, 1, &mode).unwrap();
        assert!(!p.is_colored);
        assert_eq!(p.min_bits, 8);
        assert_eq!(p.color_count, 2);
    }

    #[test]
    fn test_single_transparent_color_is_key() {
        let pixels = [10, 20, 30, 0, 1, 2, 3, 255, 10, 20, 30, 0];
        let p = build_profile(&pixels, 3, 1, &ColorMode::rgba8()).unwrap();
        assert!(!p.needs_full_alpha);
        assert_eq!(
            p.candidate_key,
            Some(ColorKey {
                r: 0x0A0A,
                g: 0x1414,
                b: 0x1E1E
            })
        );
    }

    #[test]
    fn test_opaque_pixel_matching_key_forces_alpha() {
        let pixels = [10, 20, 30, 0, 10, 20, 30, 255];
        let p = build_profile(&pixels, 2, 1, &ColorMode::rgba8()).unwrap();
        assert!(p.needs_full_alpha);
        assert!(p.min_bits >= 8);
    }

    #[test]
    fn test_opaque_match_before_key_caught_by_second_pass() {
        let pixels = [10, 20, 30, 255, 10, 20, 30, 0];
        let p = build_profile(&pixels, 2, 1, &ColorMode::rgba8()).unwrap();
        assert!(p.needs_full_alpha);
        assert_eq!(p.candidate_key, None);
        assert_eq!(p.min_bits, 8);
    }

    #[test]
    fn test_translucent_pixel_forces_alpha() {
        let pixels = [0, 0, 0, 128];
        let p = build_profile(&pixels, 1, 1, &ColorMode::rgba8()).unwrap();
        assert!(p.needs_full_alpha);
        assert_eq!(p.min_bits, 8);
    }

    #[test]
    fn test_second_transparent_color_forces_alpha() {
        let pixels = [0, 0, 0, 0, 5, 5, 5, 0];
        let p = build_profile(&pixels, 2, 1, &ColorMode::rgba8()).unwrap();
        assert!(p.needs_full_alpha);
    }

    #[test]
    fn test_counting_stops_at_source_capacity() {
        // 2-bit palette source: at most 4 colours are worth counting.
        let palette = (0..4).map(|i| [i * 50, 0, 0, 255]).collect();
        let mode = ColorMode::palette(2, palette);
        let p = build_profile(&[0b0001_1011, 0b0001_1011], 8, 1, &mode).unwrap();
        assert_eq!(p.color_count, 4);
        assert!(p.is_colored);
    }

    #[test]
    fn test_color_count_past_palette_limit() {
        let pixels: Vec<u8> = (0..300u32)
            .flat_map(|i| [(i % 256) as u8, (i / 256) as u8, 7])
            .collect();
        let p = build_profile(&pixels, 300, 1, &ColorMode::rgb8()).unwrap();
        assert_eq!(p.color_count, 257);
        assert_eq!(p.palette.len(), 256);
    }

    #[test]
    fn test_sixteen_bit_detection() {
        let mode = ColorMode::new(ChannelLayout::Grey, 16);
        let replicated = [0x12, 0x12, 0xFF, 0xFF];
        let p = build_profile(&replicated, 2, 1, &mode).unwrap();
        assert_eq!(p.min_bits, 8);
        assert_eq!(p.color_count, 2);

        let precise = [0x12, 0x34, 0xFF, 0xFF];
        let p = build_profile(&precise, 2, 1, &mode).unwrap();
        assert_eq!(p.min_bits, 16);
        assert_eq!(p.color_count, 0);
        assert!(p.palette.is_empty());
    }

    #[test]
    fn test_sixteen_bit_key_stays_full_precision() {
        let mode = ColorMode::new(ChannelLayout::Rgb, 16).with_key(0x0102, 0x0304, 0x0506);
        let pixels = [1, 2, 3, 4, 5, 6, 0, 0, 0, 0, 0, 0];
        let p = build_profile(&pixels, 2, 1, &mode).unwrap();
        assert!(!p.needs_full_alpha);
        assert_eq!(
            p.candidate_key,
            Some(ColorKey {
                r: 0x0102,
                g: 0x0304,
                b: 0x0506
            })
        );
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = build_profile(&[0; 7], 2, 1, &ColorMode::rgba8()).unwrap_err();
        assert_eq!(err, Error::InvalidDataLength { expected: 8, actual: 7 });
    }

    #[test]
    fn test_absurd_dimensions_rejected() {
        let mode = ColorMode::new(ChannelLayout::Rgba, 16);
        let err = build_profile(&[], u32::MAX, u32::MAX, &mode).unwrap_err();
        assert_eq!(
            err,
            Error::InvalidDimensions {
                width: u32::MAX,
                height: u32::MAX
            }
        );
    }

    #[test]
    fn test_rejects_illegal_mode() {
        let mode = ColorMode::new(ChannelLayout::Rgb, 4);
        assert!(matches!(
            build_profile(&[0; 8], 1, 1, &mode),
            Err(Error::InvalidColorMode { .. })
        ));
    }
}

//! Colour mode descriptors.
//!
//! A [`ColorMode`] is everything needed to interpret a raw pixel buffer:
//! channel layout, bits per channel, the palette (for indexed images) and an
//! optional transparent colour key (for grey and RGB images).

use crate::error::{Error, Result};

/// Maximum number of palette entries PNG allows.
pub const MAX_PALETTE_LEN: usize = 256;

/// Channel layout of a pixel, numbered as the PNG colour type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelLayout {
    /// Greyscale, one channel.
    Grey = 0,
    /// Red, green, blue.
    Rgb = 2,
    /// Palette index.
    Palette = 3,
    /// Greyscale with alpha.
    GreyAlpha = 4,
    /// Red, green, blue, alpha.
    Rgba = 6,
}

impl ChannelLayout {
    /// Number of channels stored per pixel.
    #[inline]
    pub const fn channels(self) -> u8 {
        match self {
            ChannelLayout::Grey => 1,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Palette => 1,
            ChannelLayout::GreyAlpha => 2,
            ChannelLayout::Rgba => 4,
        }
    }

    /// Returns the PNG colour type value.
    #[inline]
    pub const fn png_color_type(self) -> u8 {
        self as u8
    }

    /// Whether `bit_depth` is legal for this layout.
    pub const fn allows_bit_depth(self, bit_depth: u8) -> bool {
        match self {
            ChannelLayout::Grey => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
            ChannelLayout::Palette => matches!(bit_depth, 1 | 2 | 4 | 8),
            ChannelLayout::Rgb | ChannelLayout::GreyAlpha | ChannelLayout::Rgba => {
                matches!(bit_depth, 8 | 16)
            }
        }
    }
}

impl TryFrom<u8> for ChannelLayout {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(ChannelLayout::Grey),
            2 => Ok(ChannelLayout::Rgb),
            3 => Ok(ChannelLayout::Palette),
            4 => Ok(ChannelLayout::GreyAlpha),
            6 => Ok(ChannelLayout::Rgba),
            other => Err(other),
        }
    }
}

impl From<ChannelLayout> for u8 {
    fn from(layout: ChannelLayout) -> Self {
        layout as u8
    }
}

/// Transparent colour key, stored at the mode's own bit depth.
///
/// Greyscale modes keep the grey value in all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorKey {
    /// Red (or grey) component.
    pub r: u16,
    /// Green component.
    pub g: u16,
    /// Blue component.
    pub b: u16,
}

/// Pixel encoding description.
#[derive(Debug, Clone)]
pub struct ColorMode {
    /// Channel layout.
    pub layout: ChannelLayout,
    /// Bits per channel.
    pub bit_depth: u8,
    /// RGBA palette entries, in index order.
    pub palette: Vec<[u8; 4]>,
    /// Colour rendered fully transparent (grey and RGB only).
    pub key: Option<ColorKey>,
}

impl Default for ColorMode {
    fn default() -> Self {
        Self::new(ChannelLayout::Rgba, 8)
    }
}

impl ColorMode {
    /// Mode without palette or colour key.
    pub const fn new(layout: ChannelLayout, bit_depth: u8) -> Self {
        Self {
            layout,
            bit_depth,
            palette: Vec::new(),
            key: None,
        }
    }

    /// 8-bit RGBA.
    pub const fn rgba8() -> Self {
        Self::new(ChannelLayout::Rgba, 8)
    }

    /// 8-bit RGB.
    pub const fn rgb8() -> Self {
        Self::new(ChannelLayout::Rgb, 8)
    }

    /// Indexed mode with the given palette.
    pub fn palette(bit_depth: u8, palette: Vec<[u8; 4]>) -> Self {
        Self {
            layout: ChannelLayout::Palette,
            bit_depth,
            palette,
            key: None,
        }
    }

    /// Return `self` with a transparent colour key.
    pub fn with_key(mut self, r: u16, g: u16, b: u16) -> Self {
        self.key = Some(ColorKey { r, g, b });
        self
    }

    /// Fail with [`Error::InvalidColorMode`] unless layout and depth are a legal pair.
    pub fn validate(&self) -> Result<()> {
        if self.layout.allows_bit_depth(self.bit_depth) {
            Ok(())
        } else {
            Err(Error::InvalidColorMode {
                layout: self.layout.png_color_type(),
                bit_depth: self.bit_depth,
            })
        }
    }

    /// Bits per pixel: channels times bit depth.
    pub fn bits_per_pixel(&self) -> Result<u32> {
        self.validate()?;
        Ok(self.layout.channels() as u32 * self.bit_depth as u32)
    }

    /// Structural equality where an empty palette matches any palette.
    ///
    /// The relation is not transitive: an empty palette is equal to two
    /// palettes that differ from each other.
    pub fn equals(&self, other: &ColorMode) -> bool {
        if self.layout != other.layout || self.bit_depth != other.bit_depth {
            return false;
        }
        if self.key != other.key {
            return false;
        }
        if self.palette.is_empty() || other.palette.is_empty() {
            return true;
        }
        self.palette == other.palette
    }

    /// Deep copy that reports allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<ColorMode> {
        let mut palette = Vec::new();
        palette
            .try_reserve_exact(self.palette.len())
            .map_err(|_| Error::AllocationError {
                bytes: self.palette.len() * 4,
            })?;
        palette.extend_from_slice(&self.palette);
        Ok(ColorMode {
            layout: self.layout,
            bit_depth: self.bit_depth,
            palette,
            key: self.key,
        })
    }

    /// Grey or grey+alpha.
    #[inline]
    pub fn is_greyscale_type(&self) -> bool {
        matches!(self.layout, ChannelLayout::Grey | ChannelLayout::GreyAlpha)
    }

    /// Layout carries an alpha channel.
    #[inline]
    pub fn is_alpha_type(&self) -> bool {
        matches!(self.layout, ChannelLayout::GreyAlpha | ChannelLayout::Rgba)
    }

    /// Indexed layout.
    #[inline]
    pub fn is_palette_type(&self) -> bool {
        self.layout == ChannelLayout::Palette
    }

    /// Any palette entry is not fully opaque.
    pub fn has_palette_alpha(&self) -> bool {
        self.palette.iter().any(|entry| entry[3] < 255)
    }

    /// Whether any pixel in this mode can be less than fully opaque.
    pub fn can_have_alpha(&self) -> bool {
        self.key.is_some() || self.is_alpha_type() || self.has_palette_alpha()
    }
}

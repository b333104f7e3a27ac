//! Target colour mode selection.
//!
//! Picks the smallest PNG colour mode that holds every pixel of a profiled
//! image losslessly: greyscale at 1/2/4/8/16 bits, an indexed palette, or
//! 8/16-bit RGB(A), optionally with a transparent colour key.

use super::profile::ColorProfile;
use crate::color::{ChannelLayout, ColorKey, ColorMode};
use crate::error::Result;

/// Images with at most this many pixels never get a colour key; the tRNS
/// chunk would cost more than the alpha channel.
pub const KEY_MIN_PIXELS: u64 = 16;

/// Smallest indexed bit depth able to address `colors` palette entries.
pub fn palette_bit_depth(colors: usize) -> u8 {
    if colors <= 2 {
        1
    } else if colors <= 4 {
        2
    } else if colors <= 16 {
        4
    } else {
        8
    }
}

/// Bits needed to store an 8-bit grey sample without loss.
///
/// Low-depth grey samples scale up by multiples of 85 (2-bit) and 17 (4-bit),
/// so only those values survive a round trip at the smaller depth.
pub fn value_required_bits(value: u8) -> u8 {
    if value == 0 || value == 255 {
        1
    } else if value % 17 == 0 {
        if value % 85 == 0 {
            2
        } else {
            4
        }
    } else {
        8
    }
}

/// Choose the target mode for an image described by `profile`.
///
/// `original` is the mode the pixels are currently in; an indexed original
/// whose palette already fits is kept verbatim so its entry order survives.
pub fn choose_mode(
    profile: &ColorProfile,
    width: u32,
    height: u32,
    original: &ColorMode,
) -> Result<ColorMode> {
    let pixel_count = width as u64 * height as u64;
    let mut needs_full_alpha = profile.needs_full_alpha;
    let mut min_bits = profile.min_bits;

    if profile.candidate_key.is_some() && pixel_count <= KEY_MIN_PIXELS {
        needs_full_alpha = true;
        min_bits = min_bits.max(8);
    }

    let grey_eligible = !profile.is_colored && !needs_full_alpha;
    let colors = profile.color_count;
    let palette_depth = palette_bit_depth(colors);
    let mut palette_eligible =
        colors <= 256 && (colors as u64 * 2) < pixel_count && min_bits <= 8;
    if pixel_count < colors as u64 * 2 {
        palette_eligible = false;
    }
    if grey_eligible && min_bits <= palette_depth {
        palette_eligible = false;
    }

    if palette_eligible {
        let keeps_original = original.is_palette_type()
            && original.palette.len() >= colors
            && original.bit_depth == palette_depth;
        if keeps_original {
            let mut mode = original.try_clone()?;
            mode.key = None;
            return Ok(mode);
        }
        let palette = profile.palette[..colors.min(profile.palette.len())].to_vec();
        return Ok(ColorMode::palette(palette_depth, palette));
    }

    let layout = match (needs_full_alpha, profile.is_colored) {
        (true, true) => ChannelLayout::Rgba,
        (true, false) => ChannelLayout::GreyAlpha,
        (false, true) => ChannelLayout::Rgb,
        (false, false) => ChannelLayout::Grey,
    };
    let mut mode = ColorMode::new(layout, min_bits);

    if let (Some(key), false) = (profile.candidate_key, needs_full_alpha) {
        let mask = ((1u32 << min_bits) - 1) as u16;
        mode.key = Some(ColorKey {
            r: key.r & mask,
            g: key.g & mask,
            b: key.b & mask,
        });
    }

    mode.validate()?;
    Ok(mode)
}

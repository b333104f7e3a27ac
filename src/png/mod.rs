//! Lossless PNG colour reduction.
//!
//! The pipeline profiles an image's colours, picks the smallest colour mode
//! that holds them, converts the pixels and filters the scanlines ready for
//! compression:
//!
//! ```text
//! pixels + mode -> build_profile -> choose_mode -> convert_pixels -> filter_scanlines
//! ```

pub mod chunk;
pub mod color_tree;
pub mod convert;
pub mod decode;
pub mod encode;
pub mod filter;
pub mod profile;
pub mod select;

use log::debug;

use crate::color::ColorMode;
use crate::error::{Error, Result};

pub use convert::{convert_pixels, raw_size};
pub use decode::{decode_png, DecodedImage};
pub use encode::encode_png;
pub use filter::{filter_scanlines, filter_scanlines_with, FilterStrategy, FilterType, FilteredImage};
pub use profile::{build_profile, ColorProfile};
pub use select::choose_mode;

/// Maximum supported image dimension.
pub const MAX_DIMENSION: u32 = 1 << 24;

/// Reduction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceOptions {
    /// zlib compression level (0-9, default 9).
    pub compression_level: u8,
    /// Filter selection for the reduced image.
    pub filter_strategy: FilterStrategy,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            compression_level: 9,
            filter_strategy: FilterStrategy::Zero,
        }
    }
}

impl ReduceOptions {
    /// Fastest preset: low compression, fixed filter policy.
    pub fn fast() -> Self {
        Self {
            compression_level: 2,
            filter_strategy: FilterStrategy::Zero,
        }
    }

    /// Filter 8 and 16-bit output too, choosing filters by minimum sum.
    pub fn balanced() -> Self {
        Self {
            compression_level: 6,
            filter_strategy: FilterStrategy::MinSum,
        }
    }

    /// Smallest output; compresses every candidate scanline.
    pub fn max_compression() -> Self {
        Self {
            compression_level: 9,
            filter_strategy: FilterStrategy::BruteForce,
        }
    }
}

/// An image converted to its reduced mode and filtered.
#[derive(Debug, Clone)]
pub struct Reduced {
    /// Chosen colour mode.
    pub mode: ColorMode,
    /// Filtered scanlines in `mode`.
    pub filtered: FilteredImage,
}

fn validate_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(Error::ImageTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Profile `pixels` (laid out in `mode`) and pick the smallest mode that
/// holds them exactly.
pub fn choose_target(pixels: &[u8], width: u32, height: u32, mode: &ColorMode) -> Result<ColorMode> {
    validate_dimensions(width, height)?;

    let profile = build_profile(pixels, width, height, mode)?;
    let target = choose_mode(&profile, width, height, mode)?;
    debug!(
        "{}x{}: {:?}/{} -> {:?}/{} ({} colours{}{})",
        width,
        height,
        mode.layout,
        mode.bit_depth,
        target.layout,
        target.bit_depth,
        profile.color_count,
        if profile.is_colored { ", coloured" } else { "" },
        if target.key.is_some() { ", keyed" } else { "" },
    );
    Ok(target)
}

/// Convert `pixels` from `mode` to `target` and filter the result.
pub fn convert_and_filter(
    pixels: &[u8],
    width: u32,
    height: u32,
    mode: &ColorMode,
    target: &ColorMode,
    options: &ReduceOptions,
) -> Result<FilteredImage> {
    validate_dimensions(width, height)?;
    let converted = convert_pixels(pixels, mode, target, width, height)?;
    filter_scanlines_with(&converted, width, height, target, &options.filter_strategy)
}

/// Run the whole reduction on raw `pixels` laid out in `mode`.
pub fn reduce(
    pixels: &[u8],
    width: u32,
    height: u32,
    mode: &ColorMode,
    options: &ReduceOptions,
) -> Result<Reduced> {
    let target = choose_target(pixels, width, height, mode)?;
    let filtered = convert_and_filter(pixels, width, height, mode, &target, options)?;
    Ok(Reduced {
        mode: target,
        filtered,
    })
}

/// Reduce a PNG file held in memory and return the rewritten file together
/// with the source and chosen modes.
pub fn reduce_png(data: &[u8], options: &ReduceOptions) -> Result<(Vec<u8>, ColorMode, ColorMode)> {
    let image = decode_png(data)?;
    let reduced = reduce(&image.pixels, image.width, image.height, &image.mode, options)?;
    let png = encode_png(
        image.width,
        image.height,
        &reduced.mode,
        &reduced.filtered,
        options.compression_level,
    )?;
    Ok((png, image.mode, reduced.mode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ChannelLayout;

    #[test]
    fn test_reduce_black_and_white() {
        let pixels = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 255];
        let reduced = reduce(&pixels, 2, 2, &ColorMode::rgba8(), &ReduceOptions::default()).unwrap();
        assert_eq!(reduced.mode.layout, ChannelLayout::Grey);
        assert_eq!(reduced.mode.bit_depth, 1);
        assert_eq!(reduced.filtered.data, vec![0b0000_0000, 0b0100_0000]);
    }

    #[test]
    fn test_default_policy_rejects_truecolor_output() {
        // 20 distinct colours in 20 pixels: no palette, RGB output.
        let pixels: Vec<u8> = (0..20u8).flat_map(|i| [i, i.wrapping_mul(3), 200]).collect();
        let err = reduce(&pixels, 20, 1, &ColorMode::rgb8(), &ReduceOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFilterMode { layout: 2, bit_depth: 8 }));

        let reduced = reduce(&pixels, 20, 1, &ColorMode::rgb8(), &ReduceOptions::balanced()).unwrap();
        assert_eq!(reduced.mode.layout, ChannelLayout::Rgb);
        assert_eq!(reduced.filtered.data.len(), 60);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = reduce(&[], 0, 5, &ColorMode::rgba8(), &ReduceOptions::default()).unwrap_err();
        assert_eq!(err, Error::InvalidDimensions { width: 0, height: 5 });
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let err = reduce(&[], MAX_DIMENSION + 1, 1, &ColorMode::rgba8(), &ReduceOptions::default()).unwrap_err();
        assert_eq!(
            err,
            Error::ImageTooLarge {
                width: MAX_DIMENSION + 1,
                height: 1,
                max: MAX_DIMENSION
            }
        );
    }

    #[test]
    fn test_target_chosen_without_filtering() {
        // Truecolor output has no fixed filter, but choosing the mode still works.
        let pixels: Vec<u8> = (0..20u8).flat_map(|i| [i, i.wrapping_mul(3), 200]).collect();
        let target = choose_target(&pixels, 20, 1, &ColorMode::rgb8()).unwrap();
        assert!(target.equals(&ColorMode::rgb8()));
    }

    #[test]
    fn test_presets() {
        assert_eq!(ReduceOptions::default().filter_strategy, FilterStrategy::Zero);
        assert_eq!(ReduceOptions::fast().compression_level, 2);
        assert_eq!(ReduceOptions::max_compression().filter_strategy, FilterStrategy::BruteForce);
    }
}

//! PNG scanline filtering.
//!
//! Rows are padded to whole bytes and then run through one of the five PNG
//! difference filters. Palette and sub-8-bit images always use filter None;
//! the heuristics only choose filters for 8 and 16-bit grey and RGB(A)
//! images.

use std::borrow::Cow;
use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::convert::raw_size;
use crate::bits::add_padding_bits;
use crate::color::ColorMode;
use crate::error::{try_zeroed, Error, Result};

/// PNG filter type, numbered as the per-scanline tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
    /// Bytes pass through unchanged.
    None = 0,
    /// Difference from the byte one pixel to the left.
    Sub = 1,
    /// Difference from the byte above.
    Up = 2,
    /// Difference from the mean of left and above.
    Average = 3,
    /// Difference from the Paeth predictor.
    Paeth = 4,
}

impl FilterType {
    /// All filter types in tag order.
    pub const ALL: [FilterType; 5] = [
        FilterType::None,
        FilterType::Sub,
        FilterType::Up,
        FilterType::Average,
        FilterType::Paeth,
    ];
}

impl TryFrom<u8> for FilterType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        FilterType::ALL
            .get(value as usize)
            .copied()
            .ok_or(Error::InvalidFilterType(value))
    }
}

/// How filter types are chosen per scanline.
///
/// Every strategy filters palette and sub-8-bit images with None.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FilterStrategy {
    /// Filter None for palette and sub-8-bit images. Other modes are rejected
    /// with [`Error::UnsupportedFilterMode`].
    #[default]
    Zero,
    /// The same filter on every scanline.
    Fixed(FilterType),
    /// Smallest sum of absolute differences per scanline.
    MinSum,
    /// Smallest Shannon entropy per scanline.
    Entropy,
    /// Smallest zlib output per scanline.
    BruteForce,
    /// One caller-supplied filter per scanline.
    Predefined(Vec<FilterType>),
}

/// Filtered scanlines plus the filter used on each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredImage {
    /// Bytes per scanline, excluding the tag byte.
    pub line_bytes: usize,
    /// Filter applied to each scanline, top to bottom.
    pub filters: Vec<FilterType>,
    /// Filtered bytes, `line_bytes` per scanline, without tag bytes.
    pub data: Vec<u8>,
}

impl FilteredImage {
    /// Scanlines paired with their filter type.
    pub fn rows(&self) -> impl Iterator<Item = (FilterType, &[u8])> + '_ {
        let lb = self.line_bytes;
        self.filters
            .iter()
            .enumerate()
            .map(move |(y, &f)| (f, &self.data[y * lb..(y + 1) * lb]))
    }

    /// The IDAT payload before compression: each scanline prefixed with its
    /// tag byte.
    pub fn to_tagged_scanlines(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() + self.filters.len());
        for (filter, row) in self.rows() {
            out.push(filter as u8);
            out.extend_from_slice(row);
        }
        out
    }
}

/// Paeth predictor over left (`a`), above (`b`) and upper-left (`c`).
///
/// Ties prefer `a`, then `b`.
#[inline]
pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let (a_i, b_i, c_i) = (a as i16, b as i16, c as i16);
    let pa = (b_i - c_i).abs();
    let pb = (a_i - c_i).abs();
    let pc = (a_i + b_i - c_i - c_i).abs();

    if pc < pa && pc < pb {
        c
    } else if pb < pa {
        b
    } else {
        a
    }
}

/// Append `line` filtered with `filter` to `out`.
///
/// `byte_width` is the distance to the corresponding byte of the left pixel
/// (1 below 8 bits per pixel). A missing `prev` line reads as zeros.
pub fn filter_scanline(
    out: &mut Vec<u8>,
    line: &[u8],
    prev: Option<&[u8]>,
    byte_width: usize,
    filter: FilterType,
) {
    let left = |i: usize| if i >= byte_width { line[i - byte_width] } else { 0 };
    let above = |i: usize| prev.map_or(0, |p| p[i]);
    let upper_left = |i: usize| match prev {
        Some(p) if i >= byte_width => p[i - byte_width],
        _ => 0,
    };

    match filter {
        FilterType::None => out.extend_from_slice(line),
        FilterType::Sub => {
            out.extend(line.iter().enumerate().map(|(i, &x)| x.wrapping_sub(left(i))));
        }
        FilterType::Up => {
            out.extend(line.iter().enumerate().map(|(i, &x)| x.wrapping_sub(above(i))));
        }
        FilterType::Average => {
            out.extend(line.iter().enumerate().map(|(i, &x)| {
                let avg = (left(i) as u16 + above(i) as u16) >> 1;
                x.wrapping_sub(avg as u8)
            }));
        }
        FilterType::Paeth => {
            out.extend(line.iter().enumerate().map(|(i, &x)| {
                x.wrapping_sub(paeth_predictor(left(i), above(i), upper_left(i)))
            }));
        }
    }
}

/// Palette and sub-8-bit images are never difference-filtered.
#[inline]
fn forces_filter_none(mode: &ColorMode) -> bool {
    mode.is_palette_type() || mode.bit_depth < 8
}

/// Pad every row of a packed buffer to a whole number of bytes.
fn padded_scanlines(pixels: &[u8], width: usize, height: usize, bpp: usize) -> Result<Cow<'_, [u8]>> {
    let line_bits = width * bpp;
    let line_bytes = line_bits.div_ceil(8);
    if bpp < 8 && line_bits % 8 != 0 {
        let mut padded = try_zeroed(line_bytes * height)?;
        add_padding_bits(&mut padded, pixels, line_bytes * 8, line_bits, height);
        Ok(Cow::Owned(padded))
    } else {
        Ok(Cow::Borrowed(&pixels[..line_bytes * height]))
    }
}

/// One filtered attempt per filter type, reused across scanlines.
struct Attempts {
    rows: [Vec<u8>; 5],
}

impl Attempts {
    fn new(line_bytes: usize) -> Self {
        Self {
            rows: std::array::from_fn(|_| Vec::with_capacity(line_bytes)),
        }
    }

    fn fill(&mut self, line: &[u8], prev: Option<&[u8]>, byte_width: usize) {
        for (filter, row) in FilterType::ALL.into_iter().zip(self.rows.iter_mut()) {
            row.clear();
            filter_scanline(row, line, prev, byte_width, filter);
        }
    }

    fn get(&self, filter: FilterType) -> &[u8] {
        &self.rows[filter as usize]
    }
}

/// Sum of absolute values, reading difference bytes as signed. Filter None
/// output is not a difference and is summed unsigned.
fn sum_score(filter: FilterType, bytes: &[u8]) -> u64 {
    if filter == FilterType::None {
        bytes.iter().map(|&b| b as u64).sum()
    } else {
        bytes
            .iter()
            .map(|&b| if b < 128 { b as u64 } else { 255 - b as u64 })
            .sum()
    }
}

/// Shannon entropy in bits per byte; the tag byte counts as part of the line.
fn entropy_score(filter: FilterType, bytes: &[u8]) -> f64 {
    let mut counts = [0u32; 256];
    for &b in bytes {
        counts[b as usize] += 1;
    }
    counts[filter as usize] += 1;
    let total = (bytes.len() + 1) as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

fn deflated_len(bytes: &[u8]) -> Result<usize> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| Error::CompressionError(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::CompressionError(e.to_string()))?;
    Ok(compressed.len())
}

/// Pick the lowest-scoring attempt; the earlier filter wins ties.
fn pick_filter(strategy: &FilterStrategy, attempts: &Attempts) -> Result<FilterType> {
    let mut best = FilterType::None;
    let mut best_score = f64::INFINITY;
    for filter in FilterType::ALL {
        let bytes = attempts.get(filter);
        let score = match strategy {
            FilterStrategy::MinSum => sum_score(filter, bytes) as f64,
            FilterStrategy::Entropy => entropy_score(filter, bytes),
            FilterStrategy::BruteForce => deflated_len(bytes)? as f64,
            _ => 0.0,
        };
        if score < best_score {
            best = filter;
            best_score = score;
        }
    }
    Ok(best)
}

#[cfg(not(feature = "parallel"))]
fn filter_adaptive(
    input: &[u8],
    line_bytes: usize,
    height: usize,
    byte_width: usize,
    strategy: &FilterStrategy,
    data: &mut Vec<u8>,
) -> Result<Vec<FilterType>> {
    let mut attempts = Attempts::new(line_bytes);
    let mut filters = Vec::with_capacity(height);
    for y in 0..height {
        let line = &input[y * line_bytes..(y + 1) * line_bytes];
        let prev = (y > 0).then(|| &input[(y - 1) * line_bytes..y * line_bytes]);
        attempts.fill(line, prev, byte_width);
        let filter = pick_filter(strategy, &attempts)?;
        data.extend_from_slice(attempts.get(filter));
        filters.push(filter);
    }
    Ok(filters)
}

#[cfg(feature = "parallel")]
fn filter_adaptive(
    input: &[u8],
    line_bytes: usize,
    height: usize,
    byte_width: usize,
    strategy: &FilterStrategy,
    data: &mut Vec<u8>,
) -> Result<Vec<FilterType>> {
    let rows = (0..height)
        .into_par_iter()
        .map(|y| {
            let line = &input[y * line_bytes..(y + 1) * line_bytes];
            let prev = (y > 0).then(|| &input[(y - 1) * line_bytes..y * line_bytes]);
            let mut attempts = Attempts::new(line_bytes);
            attempts.fill(line, prev, byte_width);
            let filter = pick_filter(strategy, &attempts)?;
            Ok((filter, std::mem::take(&mut attempts.rows[filter as usize])))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut filters = Vec::with_capacity(height);
    for (filter, row) in rows {
        data.extend_from_slice(&row);
        filters.push(filter);
    }
    Ok(filters)
}

/// Filter a raw `width` x `height` buffer in `mode` using `strategy`.
pub fn filter_scanlines_with(
    pixels: &[u8],
    width: u32,
    height: u32,
    mode: &ColorMode,
    strategy: &FilterStrategy,
) -> Result<FilteredImage> {
    let bpp = mode.bits_per_pixel()? as usize;
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

    let (w, h) = (width as usize, height as usize);
    let line_bytes = (w * bpp).div_ceil(8);
    let byte_width = bpp.div_ceil(8);
    let input = padded_scanlines(pixels, w, h, bpp)?;

    if forces_filter_none(mode) {
        return Ok(FilteredImage {
            line_bytes,
            filters: vec![FilterType::None; h],
            data: input.into_owned(),
        });
    }

    let mut data = Vec::new();
    data.try_reserve_exact(line_bytes * h)
        .map_err(|_| Error::AllocationError {
            bytes: line_bytes * h,
        })?;

    let filters = match strategy {
        FilterStrategy::Zero => {
            return Err(Error::UnsupportedFilterMode {
                layout: mode.layout.png_color_type(),
                bit_depth: mode.bit_depth,
            });
        }
        FilterStrategy::Fixed(filter) => vec![*filter; h],
        FilterStrategy::Predefined(filters) => {
            if filters.len() != h {
                return Err(Error::InvalidPredefinedFilters {
                    expected: h,
                    actual: filters.len(),
                });
            }
            filters.clone()
        }
        FilterStrategy::MinSum | FilterStrategy::Entropy | FilterStrategy::BruteForce => {
            let filters = filter_adaptive(&input, line_bytes, h, byte_width, strategy, &mut data)?;
            return Ok(FilteredImage {
                line_bytes,
                filters,
                data,
            });
        }
    };

    for (y, &filter) in filters.iter().enumerate() {
        let line = &input[y * line_bytes..(y + 1) * line_bytes];
        let prev = (y > 0).then(|| &input[(y - 1) * line_bytes..y * line_bytes]);
        filter_scanline(&mut data, line, prev, byte_width, filter);
    }

    Ok(FilteredImage {
        line_bytes,
        filters,
        data,
    })
}

/// Pad and filter a raw buffer with the fixed policy: filter None for
/// palette and sub-8-bit modes.
///
/// Returns `height` rows of `ceil(width * bpp / 8)` bytes without tag bytes.
/// Any other mode fails with [`Error::UnsupportedFilterMode`].
pub fn filter_scanlines(pixels: &[u8], width: u32, height: u32, mode: &ColorMode) -> Result<Vec<u8>> {
    filter_scanlines_with(pixels, width, height, mode, &FilterStrategy::Zero).map(|f| f.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ChannelLayout;

    /// Reverse the filters to get the padded scanlines back.
    fn unfilter(image: &FilteredImage, byte_width: usize) -> Vec<u8> {
        let lb = image.line_bytes;
        let mut out: Vec<u8> = Vec::with_capacity(image.data.len());
        for (y, (filter, row)) in image.rows().enumerate() {
            let start = y * lb;
            for i in 0..lb {
                let a = if i >= byte_width { out[start + i - byte_width] } else { 0 };
                let b = if y > 0 { out[start - lb + i] } else { 0 };
                let c = if y > 0 && i >= byte_width {
                    out[start - lb + i - byte_width]
                } else {
                    0
                };
                let pred = match filter {
                    FilterType::None => 0,
                    FilterType::Sub => a,
                    FilterType::Up => b,
                    FilterType::Average => ((a as u16 + b as u16) >> 1) as u8,
                    FilterType::Paeth => paeth_predictor(a, b, c),
                };
                out.push(row[i].wrapping_add(pred));
            }
        }
        out
    }

    #[test]
    fn test_paeth_predictor() {
        assert_eq!(paeth_predictor(100, 100, 100), 100);
        assert_eq!(paeth_predictor(0, 0, 0), 0);
        // p = 15: c is exact
        assert_eq!(paeth_predictor(10, 20, 15), 15);
        // pa == pc: a wins
        assert_eq!(paeth_predictor(3, 0, 1), 3);
        // pb == pc: b wins
        assert_eq!(paeth_predictor(0, 3, 1), 3);
        assert_eq!(paeth_predictor(20, 30, 20), 30);
        assert_eq!(paeth_predictor(7, 0, 0), 7);
    }

    #[test]
    fn test_filter_type_try_from() {
        assert_eq!(FilterType::try_from(4), Ok(FilterType::Paeth));
        assert_eq!(FilterType::try_from(5), Err(Error::InvalidFilterType(5)));
    }

    #[test]
    fn test_filter_sub() {
        let row = [10, 20, 30, 40, 50, 60];
        let mut out = Vec::new();
        filter_scanline(&mut out, &row, None, 3, FilterType::Sub);
        assert_eq!(out, vec![10, 20, 30, 30, 30, 30]);
    }

    #[test]
    fn test_filter_up() {
        let row = [50, 60, 5];
        let prev = [10, 20, 30];
        let mut out = Vec::new();
        filter_scanline(&mut out, &row, Some(&prev), 1, FilterType::Up);
        assert_eq!(out, vec![40, 40, 231]);

        out.clear();
        filter_scanline(&mut out, &row, None, 1, FilterType::Up);
        assert_eq!(out, row.to_vec());
    }

    #[test]
    fn test_filter_average() {
        let row = [10, 20, 30, 40];
        let mut out = Vec::new();
        filter_scanline(&mut out, &row, None, 2, FilterType::Average);
        assert_eq!(out, vec![10, 20, 25, 30]);

        let prev = [4, 4, 4, 4];
        out.clear();
        filter_scanline(&mut out, &row, Some(&prev), 2, FilterType::Average);
        assert_eq!(out, vec![8, 18, 23, 28]);
    }

    #[test]
    fn test_filter_paeth_without_prev_is_sub() {
        let row = [9, 1, 200, 3, 17];
        let mut sub = Vec::new();
        let mut paeth = Vec::new();
        filter_scanline(&mut sub, &row, None, 1, FilterType::Sub);
        filter_scanline(&mut paeth, &row, None, 1, FilterType::Paeth);
        assert_eq!(sub, paeth);
    }

    #[test]
    fn test_grey1_rows_are_padded() {
        // 2x2 pixels 0,0 / 0,1 packed continuously as 0001
        let mode = ColorMode::new(ChannelLayout::Grey, 1);
        let out = filter_scanlines(&[0b0001_0000], 2, 2, &mode).unwrap();
        assert_eq!(out, vec![0b0000_0000, 0b0100_0000]);
    }

    #[test]
    fn test_palette_passthrough() {
        let mode = ColorMode::palette(8, vec![[0, 0, 0, 255]; 4]);
        let pixels = [0, 1, 2, 3, 3, 2, 1, 0];
        let out = filter_scanlines(&pixels, 4, 2, &mode).unwrap();
        assert_eq!(out, pixels.to_vec());
    }

    #[test]
    fn test_whole_byte_rows_not_copied_twice() {
        // 8 one-bit pixels per row need no padding.
        let mode = ColorMode::new(ChannelLayout::Grey, 1);
        let out = filter_scanlines(&[0xA5, 0x5A], 8, 2, &mode).unwrap();
        assert_eq!(out, vec![0xA5, 0x5A]);
    }

    #[test]
    fn test_fixed_policy_rejects_rgb() {
        let err = filter_scanlines(&[0; 6], 2, 1, &ColorMode::rgb8()).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedFilterMode {
                layout: 2,
                bit_depth: 8
            }
        );
    }

    #[test]
    fn test_heuristics_keep_palette_unfiltered() {
        let mode = ColorMode::new(ChannelLayout::Grey, 4);
        let image =
            filter_scanlines_with(&[0x12, 0x34, 0x56], 3, 2, &mode, &FilterStrategy::MinSum).unwrap();
        assert_eq!(image.filters, vec![FilterType::None; 2]);
        // 3 four-bit pixels per row: 12 3 / 4 56
        assert_eq!(image.data, vec![0x12, 0x30, 0x45, 0x60]);
    }

    #[test]
    fn test_minsum_prefers_sub_on_gradient() {
        let pixels = [10, 20, 30, 40, 50, 60];
        let image =
            filter_scanlines_with(&pixels, 2, 1, &ColorMode::rgb8(), &FilterStrategy::MinSum).unwrap();
        assert_eq!(image.filters, vec![FilterType::Sub]);
        assert_eq!(image.data, vec![10, 20, 30, 30, 30, 30]);
    }

    #[test]
    fn test_entropy_prefers_none_on_flat_row() {
        let pixels = [7u8; 12];
        let image =
            filter_scanlines_with(&pixels, 4, 1, &ColorMode::rgb8(), &FilterStrategy::Entropy).unwrap();
        assert_eq!(image.filters, vec![FilterType::None]);
    }

    #[test]
    fn test_predefined_filters() {
        let pixels: Vec<u8> = (0..18).collect();
        let strategy = FilterStrategy::Predefined(vec![FilterType::Up, FilterType::Paeth, FilterType::Sub]);
        let image = filter_scanlines_with(&pixels, 2, 3, &ColorMode::rgb8(), &strategy).unwrap();
        assert_eq!(image.filters, vec![FilterType::Up, FilterType::Paeth, FilterType::Sub]);
        assert_eq!(unfilter(&image, 3), pixels);

        let short = FilterStrategy::Predefined(vec![FilterType::Up]);
        let err = filter_scanlines_with(&pixels, 2, 3, &ColorMode::rgb8(), &short).unwrap_err();
        assert_eq!(err, Error::InvalidPredefinedFilters { expected: 3, actual: 1 });
    }

    #[test]
    fn test_heuristics_are_reversible() {
        let mode = ColorMode::new(ChannelLayout::Rgba, 16);
        let pixels: Vec<u8> = (0..5 * 4 * 8).map(|i| ((i * 37) ^ (i >> 3)) as u8).collect();
        for strategy in [
            FilterStrategy::MinSum,
            FilterStrategy::Entropy,
            FilterStrategy::BruteForce,
            FilterStrategy::Fixed(FilterType::Average),
        ] {
            let image = filter_scanlines_with(&pixels, 5, 4, &mode, &strategy).unwrap();
            assert_eq!(image.filters.len(), 4);
            assert_eq!(image.data.len(), pixels.len());
            assert_eq!(unfilter(&image, 8), pixels, "{:?}", strategy);
        }
    }

    #[test]
    fn test_tagged_scanlines() {
        let image = FilteredImage {
            line_bytes: 2,
            filters: vec![FilterType::None, FilterType::Paeth],
            data: vec![1, 2, 3, 4],
        };
        assert_eq!(image.to_tagged_scanlines(), vec![0, 1, 2, 4, 3, 4]);
    }
}

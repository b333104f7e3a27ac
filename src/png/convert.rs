//! Pixel format conversion between arbitrary colour modes.
//!
//! Every conversion decodes source pixels to RGBA and re-encodes them in the
//! target mode. Two dedicated loops cover the common 8-bit RGBA and RGB
//! targets; 16-bit to 16-bit conversions keep full precision.

use super::color_tree::ColorTree;
use crate::bits::{add_color_bits, read_bits};
use crate::color::{ChannelLayout, ColorMode};
use crate::error::{try_zeroed, Error, Result};

/// Size in bytes of a raw `width` x `height` buffer in `mode`, without row padding.
pub fn raw_size(width: u32, height: u32, mode: &ColorMode) -> Result<usize> {
    let bpp = mode.bits_per_pixel()? as usize;
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| (n / 8).checked_mul(bpp)?.checked_add(((n & 7) * bpp).div_ceil(8)))
        .ok_or(Error::InvalidDimensions { width, height })
}

#[inline]
fn be16(input: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([input[at], input[at + 1]])
}

/// Decode pixel `i` as 8-bit RGBA.
///
/// 16-bit channels keep their high byte. A palette index past the end of the
/// palette decodes to opaque black.
pub(crate) fn pixel_rgba8(input: &[u8], i: usize, mode: &ColorMode) -> [u8; 4] {
    match mode.layout {
        ChannelLayout::Grey => match mode.bit_depth {
            8 => {
                let v = input[i];
                let a = match mode.key {
                    Some(key) if v as u16 == key.r => 0,
                    _ => 255,
                };
                [v, v, v, a]
            }
            16 => {
                let v = input[i * 2];
                let a = match mode.key {
                    Some(key) if be16(input, i * 2) == key.r => 0,
                    _ => 255,
                };
                [v, v, v, a]
            }
            depth => {
                let highest = (1u32 << depth) - 1;
                let mut pos = i * depth as usize;
                let value = read_bits(input, &mut pos, depth);
                let v = (value * 255 / highest) as u8;
                let a = match mode.key {
                    Some(key) if value == key.r as u32 => 0,
                    _ => 255,
                };
                [v, v, v, a]
            }
        },
        ChannelLayout::Rgb => {
            if mode.bit_depth == 8 {
                let (r, g, b) = (input[i * 3], input[i * 3 + 1], input[i * 3 + 2]);
                let a = match mode.key {
                    Some(key) if r as u16 == key.r && g as u16 == key.g && b as u16 == key.b => 0,
                    _ => 255,
                };
                [r, g, b, a]
            } else {
                let base = i * 6;
                let a = match mode.key {
                    Some(key)
                        if be16(input, base) == key.r
                            && be16(input, base + 2) == key.g
                            && be16(input, base + 4) == key.b =>
                    {
                        0
                    }
                    _ => 255,
                };
                [input[base], input[base + 2], input[base + 4], a]
            }
        }
        ChannelLayout::Palette => {
            let index = if mode.bit_depth == 8 {
                input[i] as usize
            } else {
                let mut pos = i * mode.bit_depth as usize;
                read_bits(input, &mut pos, mode.bit_depth) as usize
            };
            mode.palette.get(index).copied().unwrap_or([0, 0, 0, 255])
        }
        ChannelLayout::GreyAlpha => {
            if mode.bit_depth == 8 {
                let v = input[i * 2];
                [v, v, v, input[i * 2 + 1]]
            } else {
                let v = input[i * 4];
                [v, v, v, input[i * 4 + 2]]
            }
        }
        ChannelLayout::Rgba => {
            if mode.bit_depth == 8 {
                let base = i * 4;
                [input[base], input[base + 1], input[base + 2], input[base + 3]]
            } else {
                let base = i * 8;
                [input[base], input[base + 2], input[base + 4], input[base + 6]]
            }
        }
    }
}

/// Decode pixel `i` of a 16-bit mode as 16-bit RGBA.
pub(crate) fn pixel_rgba16(input: &[u8], i: usize, mode: &ColorMode) -> [u16; 4] {
    match mode.layout {
        ChannelLayout::Grey => {
            let v = be16(input, i * 2);
            let a = match mode.key {
                Some(key) if v == key.r => 0,
                _ => u16::MAX,
            };
            [v, v, v, a]
        }
        ChannelLayout::Rgb => {
            let base = i * 6;
            let (r, g, b) = (be16(input, base), be16(input, base + 2), be16(input, base + 4));
            let a = match mode.key {
                Some(key) if r == key.r && g == key.g && b == key.b => 0,
                _ => u16::MAX,
            };
            [r, g, b, a]
        }
        ChannelLayout::GreyAlpha => {
            let v = be16(input, i * 4);
            [v, v, v, be16(input, i * 4 + 2)]
        }
        ChannelLayout::Rgba => {
            let base = i * 8;
            [
                be16(input, base),
                be16(input, base + 2),
                be16(input, base + 4),
                be16(input, base + 6),
            ]
        }
        // Indexed images are never 16-bit.
        ChannelLayout::Palette => {
            let [r, g, b, a] = pixel_rgba8(input, i, mode);
            [
                u16::from_be_bytes([r, r]),
                u16::from_be_bytes([g, g]),
                u16::from_be_bytes([b, b]),
                u16::from_be_bytes([a, a]),
            ]
        }
    }
}

/// Store 16-bit RGBA as pixel `i` of a 16-bit mode. Grey takes the red channel.
fn put_rgba16(out: &mut [u8], i: usize, mode: &ColorMode, rgba: [u16; 4]) {
    let [r, g, b, a] = rgba;
    match mode.layout {
        ChannelLayout::Grey => out[i * 2..i * 2 + 2].copy_from_slice(&r.to_be_bytes()),
        ChannelLayout::Rgb => {
            let base = i * 6;
            out[base..base + 2].copy_from_slice(&r.to_be_bytes());
            out[base + 2..base + 4].copy_from_slice(&g.to_be_bytes());
            out[base + 4..base + 6].copy_from_slice(&b.to_be_bytes());
        }
        ChannelLayout::GreyAlpha => {
            let base = i * 4;
            out[base..base + 2].copy_from_slice(&r.to_be_bytes());
            out[base + 2..base + 4].copy_from_slice(&a.to_be_bytes());
        }
        ChannelLayout::Rgba => {
            let base = i * 8;
            out[base..base + 2].copy_from_slice(&r.to_be_bytes());
            out[base + 2..base + 4].copy_from_slice(&g.to_be_bytes());
            out[base + 4..base + 6].copy_from_slice(&b.to_be_bytes());
            out[base + 6..base + 8].copy_from_slice(&a.to_be_bytes());
        }
        ChannelLayout::Palette => {}
    }
}

/// Store 8-bit RGBA as pixel `i` of `mode`.
///
/// Grey takes the red channel; sub-8-bit grey keeps its most significant
/// bits. 16-bit targets repeat each byte.
fn put_rgba8(
    out: &mut [u8],
    i: usize,
    mode: &ColorMode,
    tree: Option<&ColorTree>,
    rgba: [u8; 4],
) -> Result<()> {
    let [r, g, b, a] = rgba;
    match mode.layout {
        ChannelLayout::Grey => match mode.bit_depth {
            8 => out[i] = r,
            16 => {
                out[i * 2] = r;
                out[i * 2 + 1] = r;
            }
            depth => {
                let grey = (r >> (8 - depth)) & ((1u8 << depth) - 1);
                add_color_bits(out, i, depth, grey as u32);
            }
        },
        ChannelLayout::Rgb => {
            if mode.bit_depth == 8 {
                out[i * 3..i * 3 + 3].copy_from_slice(&[r, g, b]);
            } else {
                out[i * 6..i * 6 + 6].copy_from_slice(&[r, r, g, g, b, b]);
            }
        }
        ChannelLayout::Palette => {
            let index = tree
                .and_then(|t| t.get(rgba))
                .ok_or(Error::PaletteColorNotFound { rgba })?;
            if mode.bit_depth == 8 {
                out[i] = index as u8;
            } else {
                add_color_bits(out, i, mode.bit_depth, index as u32);
            }
        }
        ChannelLayout::GreyAlpha => {
            if mode.bit_depth == 8 {
                out[i * 2] = r;
                out[i * 2 + 1] = a;
            } else {
                out[i * 4..i * 4 + 4].copy_from_slice(&[r, r, a, a]);
            }
        }
        ChannelLayout::Rgba => {
            if mode.bit_depth == 8 {
                out[i * 4..i * 4 + 4].copy_from_slice(&rgba);
            } else {
                out[i * 8..i * 8 + 8].copy_from_slice(&[r, r, g, g, b, b, a, a]);
            }
        }
    }
    Ok(())
}

/// Decode `num_pixels` pixels of `mode` straight into 8-bit RGBA (`has_alpha`)
/// or RGB output, one loop per source layout.
fn decode_rgba8_into(out: &mut [u8], num_pixels: usize, has_alpha: bool, input: &[u8], mode: &ColorMode) {
    let channels = if has_alpha { 4 } else { 3 };
    let pixels = out.chunks_exact_mut(channels).take(num_pixels);
    match (mode.layout, mode.bit_depth) {
        (ChannelLayout::Grey, 8) => {
            for (px, &v) in pixels.zip(input) {
                px[..3].fill(v);
                if has_alpha {
                    px[3] = match mode.key {
                        Some(key) if v as u16 == key.r => 0,
                        _ => 255,
                    };
                }
            }
        }
        (ChannelLayout::Grey, 16) => {
            for (px, sample) in pixels.zip(input.chunks_exact(2)) {
                px[..3].fill(sample[0]);
                if has_alpha {
                    px[3] = match mode.key {
                        Some(key) if u16::from_be_bytes([sample[0], sample[1]]) == key.r => 0,
                        _ => 255,
                    };
                }
            }
        }
        (ChannelLayout::Grey, depth) => {
            let highest = (1u32 << depth) - 1;
            let mut pos = 0usize;
            for px in pixels {
                let value = read_bits(input, &mut pos, depth);
                px[..3].fill((value * 255 / highest) as u8);
                if has_alpha {
                    px[3] = match mode.key {
                        Some(key) if value == key.r as u32 => 0,
                        _ => 255,
                    };
                }
            }
        }
        (ChannelLayout::Rgb, 8) => {
            for (px, rgb) in pixels.zip(input.chunks_exact(3)) {
                px[..3].copy_from_slice(rgb);
                if has_alpha {
                    px[3] = match mode.key {
                        Some(key)
                            if rgb[0] as u16 == key.r
                                && rgb[1] as u16 == key.g
                                && rgb[2] as u16 == key.b =>
                        {
                            0
                        }
                        _ => 255,
                    };
                }
            }
        }
        (ChannelLayout::Rgb, _) => {
            for (px, rgb) in pixels.zip(input.chunks_exact(6)) {
                px[0] = rgb[0];
                px[1] = rgb[2];
                px[2] = rgb[4];
                if has_alpha {
                    px[3] = match mode.key {
                        Some(key)
                            if be16(rgb, 0) == key.r && be16(rgb, 2) == key.g && be16(rgb, 4) == key.b =>
                        {
                            0
                        }
                        _ => 255,
                    };
                }
            }
        }
        (ChannelLayout::Palette, depth) => {
            let mut pos = 0usize;
            for (i, px) in pixels.enumerate() {
                let index = if depth == 8 {
                    input[i] as usize
                } else {
                    read_bits(input, &mut pos, depth) as usize
                };
                let rgba = mode.palette.get(index).copied().unwrap_or([0, 0, 0, 255]);
                px.copy_from_slice(&rgba[..channels]);
            }
        }
        (ChannelLayout::GreyAlpha, 8) => {
            for (px, ga) in pixels.zip(input.chunks_exact(2)) {
                px[..3].fill(ga[0]);
                if has_alpha {
                    px[3] = ga[1];
                }
            }
        }
        (ChannelLayout::GreyAlpha, _) => {
            for (px, ga) in pixels.zip(input.chunks_exact(4)) {
                px[..3].fill(ga[0]);
                if has_alpha {
                    px[3] = ga[2];
                }
            }
        }
        (ChannelLayout::Rgba, 8) => {
            for (px, rgba) in pixels.zip(input.chunks_exact(4)) {
                px.copy_from_slice(&rgba[..channels]);
            }
        }
        (ChannelLayout::Rgba, _) => {
            for (px, rgba) in pixels.zip(input.chunks_exact(8)) {
                px[0] = rgba[0];
                px[1] = rgba[2];
                px[2] = rgba[4];
                if has_alpha {
                    px[3] = rgba[6];
                }
            }
        }
    }
}

/// Build the palette lookup for an indexed target. An empty target palette
/// borrows the source palette.
fn palette_tree(src: &ColorMode, dst: &ColorMode) -> ColorTree {
    let palette = if dst.palette.is_empty() {
        &src.palette
    } else {
        &dst.palette
    };
    let usable = palette.len().min(1usize << dst.bit_depth);
    let mut tree = ColorTree::new();
    for (i, &entry) in palette[..usable].iter().enumerate() {
        // Duplicate entries keep their first index.
        if !tree.contains(entry) {
            tree.insert(entry, i as u16);
        }
    }
    tree
}

/// Convert a raw `width` x `height` buffer from `src` to `dst`.
///
/// Equal modes (see [`ColorMode::equals`]) are copied byte for byte. A pixel
/// whose colour is missing from an indexed target's palette fails with
/// [`Error::PaletteColorNotFound`].
pub fn convert_pixels(
    pixels: &[u8],
    src: &ColorMode,
    dst: &ColorMode,
    width: u32,
    height: u32,
) -> Result<Vec<u8>> {
    let in_size = raw_size(width, height, src)?;
    let out_size = raw_size(width, height, dst)?;
    if pixels.len() < in_size {
        return Err(Error::InvalidDataLength {
            expected: in_size,
            actual: pixels.len(),
        });
    }

    let mut out = try_zeroed(out_size)?;

    if src.equals(dst) {
        let n = in_size.min(out_size);
        out[..n].copy_from_slice(&pixels[..n]);
        return Ok(out);
    }

    let num_pixels = width as usize * height as usize;
    let tree = dst.is_palette_type().then(|| palette_tree(src, dst));

    if src.bit_depth == 16 && dst.bit_depth == 16 {
        for i in 0..num_pixels {
            put_rgba16(&mut out, i, dst, pixel_rgba16(pixels, i, src));
        }
    } else if dst.bit_depth == 8 && dst.layout == ChannelLayout::Rgba {
        decode_rgba8_into(&mut out, num_pixels, true, pixels, src);
    } else if dst.bit_depth == 8 && dst.layout == ChannelLayout::Rgb {
        decode_rgba8_into(&mut out, num_pixels, false, pixels, src);
    } else {
        for i in 0..num_pixels {
            put_rgba8(&mut out, i, dst, tree.as_ref(), pixel_rgba8(pixels, i, src))?;
        }
    }

    Ok(out)
}

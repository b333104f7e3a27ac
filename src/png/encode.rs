//! PNG container writer for reduced images.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::chunk::{write_chunk, PNG_SIGNATURE};
use super::filter::FilteredImage;
use crate::color::{ChannelLayout, ColorMode, MAX_PALETTE_LEN};
use crate::error::{Error, Result};

/// Largest IDAT payload written per chunk.
const IDAT_CHUNK_SIZE: usize = 256 * 1024;

/// Write IHDR (image header) chunk.
fn write_ihdr(output: &mut Vec<u8>, width: u32, height: u32, mode: &ColorMode) {
    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(mode.bit_depth);
    ihdr.push(mode.layout.png_color_type());
    ihdr.push(0); // compression: deflate
    ihdr.push(0); // filter method 0
    ihdr.push(0); // no interlace
    write_chunk(output, b"IHDR", &ihdr);
}

/// Palette alphas with trailing opaque entries dropped; `None` when every
/// entry is opaque.
fn trimmed_palette_alpha(palette: &[[u8; 4]]) -> Option<Vec<u8>> {
    let last = palette.iter().rposition(|entry| entry[3] != 255)?;
    Some(palette[..=last].iter().map(|entry| entry[3]).collect())
}

/// Write PLTE plus, if any entry is translucent, tRNS.
fn write_palette(output: &mut Vec<u8>, palette: &[[u8; 4]]) {
    let rgb: Vec<u8> = palette.iter().flat_map(|entry| [entry[0], entry[1], entry[2]]).collect();
    write_chunk(output, b"PLTE", &rgb);
    if let Some(alpha) = trimmed_palette_alpha(palette) {
        write_chunk(output, b"tRNS", &alpha);
    }
}

/// Write a tRNS colour key for grey or RGB images.
fn write_key(output: &mut Vec<u8>, mode: &ColorMode) {
    let Some(key) = mode.key else {
        return;
    };
    match mode.layout {
        ChannelLayout::Grey => write_chunk(output, b"tRNS", &key.r.to_be_bytes()),
        ChannelLayout::Rgb => {
            let mut data = [0u8; 6];
            data[0..2].copy_from_slice(&key.r.to_be_bytes());
            data[2..4].copy_from_slice(&key.g.to_be_bytes());
            data[4..6].copy_from_slice(&key.b.to_be_bytes());
            write_chunk(output, b"tRNS", &data);
        }
        _ => {}
    }
}

/// zlib-compress the tagged scanlines.
fn compress(data: &[u8], level: u8) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9) as u32));
    encoder
        .write_all(data)
        .map_err(|e| Error::CompressionError(e.to_string()))?;
    encoder.finish().map_err(|e| Error::CompressionError(e.to_string()))
}

/// Frame filtered scanlines as a complete PNG file.
///
/// `filtered` must come from filtering a `width` x `height` image in `mode`.
/// `compression_level` is the zlib level (0-9, higher is smaller).
pub fn encode_png(
    width: u32,
    height: u32,
    mode: &ColorMode,
    filtered: &FilteredImage,
    compression_level: u8,
) -> Result<Vec<u8>> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    let bpp = mode.bits_per_pixel()? as usize;
    let line_bytes = (width as usize * bpp).div_ceil(8);
    let expected = line_bytes * height as usize;
    if filtered.line_bytes != line_bytes || filtered.filters.len() != height as usize {
        return Err(Error::InvalidDataLength {
            expected,
            actual: filtered.filters.len() * filtered.line_bytes,
        });
    }
    if filtered.data.len() != expected {
        return Err(Error::InvalidDataLength {
            expected,
            actual: filtered.data.len(),
        });
    }
    if mode.layout == ChannelLayout::Palette
        && (mode.palette.is_empty() || mode.palette.len() > MAX_PALETTE_LEN)
    {
        return Err(Error::InvalidColorMode {
            layout: mode.layout.png_color_type(),
            bit_depth: mode.bit_depth,
        });
    }

    let compressed = compress(&filtered.to_tagged_scanlines(), compression_level)?;

    let mut output = Vec::with_capacity(compressed.len() + 1024);
    output.extend_from_slice(&PNG_SIGNATURE);
    write_ihdr(&mut output, width, height, mode);
    if mode.layout == ChannelLayout::Palette {
        write_palette(&mut output, &mode.palette);
    } else {
        write_key(&mut output, mode);
    }
    for chunk in compressed.chunks(IDAT_CHUNK_SIZE) {
        write_chunk(&mut output, b"IDAT", chunk);
    }
    write_chunk(&mut output, b"IEND", &[]);
    Ok(output)
}

//! PNG reader producing raw pixels in the file's own colour mode.
//!
//! Pixels are returned exactly as stored: indices for palette images,
//! packed sub-byte samples, big-endian 16-bit channels. Scanline padding
//! is removed so samples form one continuous bit stream.

use crate::bits::remove_padding_bits;
use crate::color::{ChannelLayout, ColorKey, ColorMode};
use crate::error::{try_zeroed, Error, Result};

use super::convert::raw_size;

/// A decoded image in its source colour mode.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Colour mode from IHDR, PLTE and tRNS.
    pub mode: ColorMode,
    /// Raw unpadded pixels in `mode`.
    pub pixels: Vec<u8>,
}

/// Build the source colour mode from the reader's header chunks.
fn source_mode(info: &png::Info<'_>) -> Result<ColorMode> {
    let layout = ChannelLayout::try_from(info.color_type as u8)
        .map_err(|t| Error::Decode(format!("unknown color type {}", t)))?;
    let mut mode = ColorMode::new(layout, info.bit_depth as u8);
    mode.validate()?;

    let trns = info.trns.as_deref();
    match layout {
        ChannelLayout::Palette => {
            let plte = info
                .palette
                .as_deref()
                .ok_or_else(|| Error::Decode("indexed image without PLTE".into()))?;
            mode.palette = plte
                .chunks_exact(3)
                .enumerate()
                .map(|(i, rgb)| {
                    let alpha = trns.and_then(|t| t.get(i)).copied().unwrap_or(255);
                    [rgb[0], rgb[1], rgb[2], alpha]
                })
                .collect();
        }
        ChannelLayout::Grey => {
            if let Some(&[hi, lo, ..]) = trns {
                let v = u16::from_be_bytes([hi, lo]);
                mode.key = Some(ColorKey { r: v, g: v, b: v });
            }
        }
        ChannelLayout::Rgb => {
            if let Some(&[r0, r1, g0, g1, b0, b1, ..]) = trns {
                mode.key = Some(ColorKey {
                    r: u16::from_be_bytes([r0, r1]),
                    g: u16::from_be_bytes([g0, g1]),
                    b: u16::from_be_bytes([b0, b1]),
                });
            }
        }
        ChannelLayout::GreyAlpha | ChannelLayout::Rgba => {}
    }
    Ok(mode)
}

/// Decode a PNG file held in memory.
pub fn decode_png(data: &[u8]) -> Result<DecodedImage> {
    let mut decoder = png::Decoder::new(data);
    decoder.set_transformations(png::Transformations::IDENTITY);
    let mut reader = decoder.read_info()?;

    let mut buf = try_zeroed(reader.output_buffer_size())?;
    let frame = reader.next_frame(&mut buf)?;
    let mode = source_mode(reader.info())?;

    let (width, height) = (frame.width, frame.height);
    let bpp = mode.bits_per_pixel()? as usize;
    let line_bits = width as usize * bpp;
    let size = raw_size(width, height, &mode)?;

    let pixels = if line_bits % 8 != 0 {
        let mut packed = try_zeroed(size)?;
        remove_padding_bits(&mut packed, &buf, line_bits, frame.line_size * 8, height as usize);
        packed
    } else {
        buf.truncate(size);
        buf
    };

    Ok(DecodedImage {
        width,
        height,
        mode,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::png::encode::encode_png;
    use crate::png::filter::{filter_scanlines_with, FilterStrategy, FilterType};

    fn write(width: u32, height: u32, mode: &ColorMode, pixels: &[u8]) -> Vec<u8> {
        let strategy = FilterStrategy::Fixed(FilterType::Paeth);
        let filtered = filter_scanlines_with(pixels, width, height, mode, &strategy).unwrap();
        encode_png(width, height, mode, &filtered, 6).unwrap()
    }

    #[test]
    fn test_grey2_padding_removed() {
        // 3x2 two-bit pixels: 0 1 2 / 3 0 1, packed continuously
        let mode = ColorMode::new(ChannelLayout::Grey, 2);
        let pixels = [0b0001_1011, 0b0001_0000];
        let decoded = decode_png(&write(3, 2, &mode, &pixels)).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert!(decoded.mode.equals(&mode));
        assert_eq!(decoded.pixels, pixels.to_vec());
    }

    #[test]
    fn test_palette_alpha_read_back() {
        let mode = ColorMode::palette(8, vec![[9, 8, 7, 0], [1, 2, 3, 255], [4, 5, 6, 128]]);
        let decoded = decode_png(&write(3, 1, &mode, &[2, 1, 0])).unwrap();
        assert_eq!(decoded.mode.palette, mode.palette);
        assert_eq!(decoded.pixels, vec![2, 1, 0]);
    }

    #[test]
    fn test_rgb16_key_read_back() {
        let mode = ColorMode::new(ChannelLayout::Rgb, 16).with_key(0x0102, 0x0304, 0x0506);
        let pixels: Vec<u8> = (0..12).collect();
        let decoded = decode_png(&write(2, 1, &mode, &pixels)).unwrap();
        assert_eq!(decoded.mode.key, mode.key);
        assert_eq!(decoded.pixels, pixels);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        assert!(matches!(decode_png(b"definitely not a png"), Err(Error::Decode(_))));
    }
}

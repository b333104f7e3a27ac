//! Property tests for the reduction pipeline.

use proptest::prelude::*;

use pngshrink::bits::{add_color_bits, read_bits};
use pngshrink::png::{
    build_profile, choose_mode, convert_pixels, decode_png, encode_png, filter_scanlines_with, FilterStrategy,
    FilterType,
};
use pngshrink::{ChannelLayout, ColorMode};

fn color() -> impl Strategy<Value = [u8; 4]> {
    let alpha = prop_oneof![Just(0u8), Just(255u8), any::<u8>()];
    (any::<[u8; 3]>(), any::<bool>(), alpha).prop_map(|([r, g, b], grey, a)| {
        if grey {
            [r, r, r, a]
        } else {
            [r, g, b, a]
        }
    })
}

/// Small RGBA images drawn from a handful of colours.
fn image() -> impl Strategy<Value = (u32, u32, Vec<u8>)> {
    (1u32..12, 1u32..12, prop::collection::vec(color(), 1..8)).prop_flat_map(|(w, h, colors)| {
        let n = (w * h) as usize;
        prop::collection::vec(0..colors.len(), n).prop_map(move |idx| {
            let pixels = idx.iter().flat_map(|&i| colors[i]).collect();
            (w, h, pixels)
        })
    })
}

fn filter_type() -> impl Strategy<Value = FilterType> {
    prop::sample::select(FilterType::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_packed_values_read_back(
        bits in prop::sample::select(vec![1u8, 2, 4]),
        values in prop::collection::vec(any::<u8>(), 1..64),
    ) {
        let mask = (1u32 << bits) - 1;
        let mut buf = vec![0u8; (values.len() * bits as usize).div_ceil(8)];
        for (i, &v) in values.iter().enumerate() {
            add_color_bits(&mut buf, i, bits, v as u32 & mask);
        }
        let mut pos = 0;
        for &v in &values {
            prop_assert_eq!(read_bits(&buf, &mut pos, bits), v as u32 & mask);
        }
    }

    #[test]
    fn test_reduction_is_lossless((w, h, pixels) in image()) {
        let source = ColorMode::rgba8();
        let profile = build_profile(&pixels, w, h, &source).unwrap();
        let target = choose_mode(&profile, w, h, &source).unwrap();
        prop_assert!(target.bits_per_pixel().unwrap() <= 32);

        let converted = convert_pixels(&pixels, &source, &target, w, h).unwrap();
        let back = convert_pixels(&converted, &target, &source, w, h).unwrap();
        prop_assert_eq!(back, pixels);
    }

    #[test]
    fn test_key_only_without_alpha((w, h, pixels) in image()) {
        let source = ColorMode::rgba8();
        let profile = build_profile(&pixels, w, h, &source).unwrap();
        let target = choose_mode(&profile, w, h, &source).unwrap();
        if target.key.is_some() {
            prop_assert!(matches!(target.layout, ChannelLayout::Grey | ChannelLayout::Rgb));
            prop_assert!(w * h > 16);
        }
        if profile.needs_full_alpha {
            prop_assert_eq!(target.key, None);
        }
    }

    #[test]
    fn test_any_filter_decodes_to_input(
        width in 1u32..20,
        height in 1u32..8,
        filter in filter_type(),
        seed in any::<u64>(),
    ) {
        let mode = ColorMode::rgb8();
        let len = (width * height * 3) as usize;
        let pixels: Vec<u8> = (0..len as u64)
            .map(|i| (seed.rotate_left((i % 64) as u32) ^ i.wrapping_mul(0x9E37_79B9)) as u8)
            .collect();

        let filtered = filter_scanlines_with(&pixels, width, height, &mode, &FilterStrategy::Fixed(filter)).unwrap();
        prop_assert!(filtered.filters.iter().all(|&f| f == filter));
        let file = encode_png(width, height, &mode, &filtered, 1).unwrap();
        prop_assert_eq!(decode_png(&file).unwrap().pixels, pixels);
    }
}

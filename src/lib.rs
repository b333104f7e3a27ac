//! # pngshrink
//!
//! Lossless PNG size reduction by colour mode selection.
//!
//! Many PNG files are stored in a wider pixel format than their contents
//! need: RGBA images with no transparency, truecolor images with a handful
//! of colours, greyscale images saved as RGB. This library finds the
//! smallest PNG colour mode that represents every pixel exactly and
//! rewrites the image in it.
//!
//! ## Features
//!
//! - **Colour profiling**: greyscale detection, minimum grey bit depth,
//!   distinct colour counting and colour-key transparency detection
//! - **Mode selection** across grey 1-16 bit, palette 1-8 bit, RGB(A) 8/16 bit
//! - **Pixel conversion** between any two PNG colour modes
//! - **Scanline filtering** with the five PNG filters and optional heuristics
//! - Optional parallel directory processing via the `parallel` feature
//!
//! ## Example
//!
//! ```rust
//! use pngshrink::png::{self, ReduceOptions};
//! use pngshrink::{ChannelLayout, ColorMode};
//!
//! // 2x2 RGBA: three black pixels and one white one.
//! let pixels = [0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 255, 255];
//! let reduced = png::reduce(&pixels, 2, 2, &ColorMode::rgba8(), &ReduceOptions::default()).unwrap();
//! assert_eq!(reduced.mode.layout, ChannelLayout::Grey);
//! assert_eq!(reduced.mode.bit_depth, 1);
//!
//! let file = png::encode_png(2, 2, &reduced.mode, &reduced.filtered, 9).unwrap();
//! assert!(file.starts_with(b"\x89PNG"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bits;
pub mod color;
pub mod driver;
pub mod error;
pub mod png;

pub use color::{ChannelLayout, ColorKey, ColorMode};
pub use error::{Error, Result};

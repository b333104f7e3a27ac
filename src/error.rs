//! Error types for the pngshrink library.

use std::fmt;

/// Result type alias for pngshrink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while profiling, converting or filtering an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Channel layout and bit depth do not form a legal PNG colour mode.
    InvalidColorMode {
        /// PNG colour type byte (0, 2, 3, 4 or 6).
        layout: u8,
        /// Bits per channel.
        bit_depth: u8,
    },
    /// A buffer or palette could not be allocated.
    AllocationError {
        /// Number of bytes requested.
        bytes: usize,
    },
    /// A source pixel has no entry in the destination palette.
    PaletteColorNotFound {
        /// The unmatched colour as 8-bit RGBA.
        rgba: [u8; 4],
    },
    /// The fixed filter policy only covers palette and sub-8-bit modes.
    UnsupportedFilterMode {
        /// PNG colour type byte.
        layout: u8,
        /// Bits per channel.
        bit_depth: u8,
    },
    /// Invalid image dimensions (zero width or height).
    InvalidDimensions {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
    },
    /// Image dimensions exceed maximum supported size.
    ImageTooLarge {
        /// Image width.
        width: u32,
        /// Image height.
        height: u32,
        /// Maximum supported dimension.
        max: u32,
    },
    /// Pixel data length doesn't match expected size.
    InvalidDataLength {
        /// Expected number of bytes.
        expected: usize,
        /// Actual number of bytes provided.
        actual: usize,
    },
    /// Predefined filter list does not have one entry per scanline.
    InvalidPredefinedFilters {
        /// Number of scanlines.
        expected: usize,
        /// Number of filter types supplied.
        actual: usize,
    },
    /// Filter type byte outside 0..=4.
    InvalidFilterType(u8),
    /// The PNG reader rejected the input.
    Decode(String),
    /// zlib compression of the filtered stream failed.
    CompressionError(String),
    /// Reading or writing a file failed.
    Io(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidColorMode { layout, bit_depth } => {
                write!(
                    f,
                    "Invalid color mode: color type {} with bit depth {}",
                    layout, bit_depth
                )
            }
            Error::AllocationError { bytes } => {
                write!(f, "Failed to allocate {} bytes", bytes)
            }
            Error::PaletteColorNotFound { rgba } => {
                write!(
                    f,
                    "Color ({}, {}, {}, {}) not found in palette",
                    rgba[0], rgba[1], rgba[2], rgba[3]
                )
            }
            Error::UnsupportedFilterMode { layout, bit_depth } => {
                write!(
                    f,
                    "No fixed filter policy for color type {} with bit depth {}",
                    layout, bit_depth
                )
            }
            Error::InvalidDimensions { width, height } => {
                write!(f, "Invalid image dimensions: {}x{}", width, height)
            }
            Error::ImageTooLarge { width, height, max } => {
                write!(
                    f,
                    "Image {}x{} exceeds maximum dimension {}",
                    width, height, max
                )
            }
            Error::InvalidDataLength { expected, actual } => {
                write!(
                    f,
                    "Invalid pixel data length: expected {} bytes, got {}",
                    expected, actual
                )
            }
            Error::InvalidPredefinedFilters { expected, actual } => {
                write!(
                    f,
                    "Predefined filters: expected {} entries, got {}",
                    expected, actual
                )
            }
            Error::InvalidFilterType(t) => write!(f, "Invalid filter type {}", t),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::CompressionError(msg) => write!(f, "Compression error: {}", msg),
            Error::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<png::DecodingError> for Error {
    fn from(err: png::DecodingError) -> Self {
        Error::Decode(err.to_string())
    }
}

/// Allocate a zeroed buffer, reporting failure instead of aborting.
pub(crate) fn try_zeroed(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::AllocationError { bytes: len })?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::InvalidColorMode {
            layout: 2,
            bit_depth: 4,
        };
        assert_eq!(
            err.to_string(),
            "Invalid color mode: color type 2 with bit depth 4"
        );

        let err = Error::PaletteColorNotFound {
            rgba: [1, 2, 3, 255],
        };
        assert_eq!(err.to_string(), "Color (1, 2, 3, 255) not found in palette");

        let err = Error::ImageTooLarge {
            width: 1 << 25,
            height: 4,
            max: 1 << 24,
        };
        assert_eq!(err.to_string(), "Image 33554432x4 exceeds maximum dimension 16777216");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(Error::from(io), Error::Io(msg) if msg.contains("gone")));
    }

    #[test]
    fn test_try_zeroed() {
        let buf = try_zeroed(16).unwrap();
        assert_eq!(buf, vec![0u8; 16]);
        assert!(try_zeroed(0).unwrap().is_empty());
    }
}

//! MSB-first bit access for packed PNG sample buffers.
//!
//! PNG stores sub-byte samples most-significant-bit first: bit offset `n`
//! lives in byte `n / 8` at bit position `7 - n % 8`. The plain functions
//! here index without bounds checks beyond the slice's own; the `checked_*`
//! variants return `None` instead of panicking when the access runs past
//! the buffer.

/// Read one bit and advance `bit_offset` by 1.
#[inline]
pub fn read_bit(buffer: &[u8], bit_offset: &mut usize) -> u8 {
    let bit = (buffer[*bit_offset >> 3] >> (7 - (*bit_offset & 7))) & 1;
    *bit_offset += 1;
    bit
}

/// Read `num_bits` (1, 2, 4, 8 or 16) MSB-first and advance the offset.
#[inline]
pub fn read_bits(buffer: &[u8], bit_offset: &mut usize, num_bits: u8) -> u32 {
    debug_assert!(matches!(num_bits, 1 | 2 | 4 | 8 | 16));
    let mut value = 0u32;
    for _ in 0..num_bits {
        value = (value << 1) | read_bit(buffer, bit_offset) as u32;
    }
    value
}

/// Set or clear one bit in place and advance `bit_offset` by 1.
#[inline]
pub fn write_bit(buffer: &mut [u8], bit_offset: &mut usize, bit: u8) {
    let mask = 1u8 << (7 - (*bit_offset & 7));
    if bit == 0 {
        buffer[*bit_offset >> 3] &= !mask;
    } else {
        buffer[*bit_offset >> 3] |= mask;
    }
    *bit_offset += 1;
}

/// Like [`read_bits`], but `None` when the read would pass the end of `buffer`.
/// The offset is left untouched on failure.
pub fn checked_read_bits(buffer: &[u8], bit_offset: &mut usize, num_bits: u8) -> Option<u32> {
    let end = bit_offset.checked_add(num_bits as usize)?;
    if end > buffer.len() * 8 {
        return None;
    }
    Some(read_bits(buffer, bit_offset, num_bits))
}

/// Like [`write_bit`], but `None` when the offset is past the end of `buffer`.
pub fn checked_write_bit(buffer: &mut [u8], bit_offset: &mut usize, bit: u8) -> Option<()> {
    if *bit_offset >= buffer.len() * 8 {
        return None;
    }
    write_bit(buffer, bit_offset, bit);
    Some(())
}

/// Store sample number `index` of a 1, 2 or 4-bit packed stream.
///
/// The first sample of each byte overwrites the byte, later samples are OR-ed
/// in, so a freshly allocated buffer never needs clearing.
#[inline]
pub fn add_color_bits(out: &mut [u8], index: usize, bits: u8, value: u32) {
    debug_assert!(matches!(bits, 1 | 2 | 4));
    let per_byte_mask = match bits {
        1 => 7,
        2 => 3,
        _ => 1,
    };
    let p = index & per_byte_mask;
    let value = (value & ((1u32 << bits) - 1)) as u8;
    let shifted = value << (bits as usize * (per_byte_mask - p));
    let byte = index * bits as usize / 8;
    if p == 0 {
        out[byte] = shifted;
    } else {
        out[byte] |= shifted;
    }
}

/// Copy `height` rows of `in_line_bits` bits into rows of `out_line_bits`
/// bits, zero-filling the tail of every output row.
///
/// `out` must hold `height * out_line_bits / 8` bytes and `out_line_bits`
/// must be a multiple of 8 that is at least `in_line_bits`.
pub fn add_padding_bits(
    out: &mut [u8],
    input: &[u8],
    out_line_bits: usize,
    in_line_bits: usize,
    height: usize,
) {
    debug_assert!(out_line_bits >= in_line_bits);
    let diff = out_line_bits - in_line_bits;
    let mut obp = 0usize;
    let mut ibp = 0usize;
    for _ in 0..height {
        for _ in 0..in_line_bits {
            let bit = read_bit(input, &mut ibp);
            write_bit(out, &mut obp, bit);
        }
        for _ in 0..diff {
            write_bit(out, &mut obp, 0);
        }
    }
}

/// Inverse of [`add_padding_bits`]: drop the per-row padding of a decoded
/// image so samples form one continuous bit stream.
pub fn remove_padding_bits(
    out: &mut [u8],
    input: &[u8],
    out_line_bits: usize,
    in_line_bits: usize,
    height: usize,
) {
    debug_assert!(in_line_bits >= out_line_bits);
    let diff = in_line_bits - out_line_bits;
    let mut obp = 0usize;
    let mut ibp = 0usize;
    for _ in 0..height {
        for _ in 0..out_line_bits {
            let bit = read_bit(input, &mut ibp);
            write_bit(out, &mut obp, bit);
        }
        ibp += diff;
    }
}

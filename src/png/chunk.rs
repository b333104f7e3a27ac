//! PNG chunk framing.

use flate2::Crc;

/// PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Append one chunk (length, type, data, CRC over type and data).
pub fn write_chunk(output: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    output.reserve(12 + data.len());

    let mut crc = Crc::new();
    crc.update(chunk_type);
    crc.update(data);

    output.extend_from_slice(&(data.len() as u32).to_be_bytes());
    output.extend_from_slice(chunk_type);
    output.extend_from_slice(data);
    output.extend_from_slice(&crc.sum().to_be_bytes());
}

/// Iterate over `(type, data)` pairs of a PNG byte stream, stopping at the
/// first truncated chunk.
pub fn chunks<'a>(png: &'a [u8]) -> impl Iterator<Item = ([u8; 4], &'a [u8])> + 'a {
    let mut pos = if png.starts_with(&PNG_SIGNATURE) {
        PNG_SIGNATURE.len()
    } else {
        png.len()
    };
    std::iter::from_fn(move || {
        let header = png.get(pos..pos + 8)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let kind = [header[4], header[5], header[6], header[7]];
        let data = png.get(pos + 8..pos + 8 + len)?;
        png.get(pos + 8 + len..pos + 12 + len)?;
        pos += 12 + len;
        Some((kind, data))
    })
}

//! Decoder for MIO0 compressed content blocks.
//!
//! Layout: `"MIO0"`, big-endian decompressed length, offset of the back-reference stream,
//! offset of the literal stream, followed by the layout bit stream at 0x10. Each layout bit
//! (most significant first, in 32-bit words) selects a literal byte (1) or a two-byte
//! back-reference (0) encoding `length - 3` in the top nibble and `distance - 1` in the rest.

use super::MemoryError;

const HEADER_LEN: usize = 0x10;
const MAGIC: &[u8; 4] = b"MIO0";

fn read_be_u32(bytes: &[u8], at: usize) -> Result<u32, MemoryError> {
    bytes
        .get(at..at + 4)
        .map(|raw| u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        .ok_or_else(|| MemoryError::Corrupt(format!("header truncated at 0x{at:X}")))
}

/// Decodes `input`, refusing blocks whose declared length exceeds `limit` bytes.
pub fn decompress(input: &[u8], limit: usize) -> Result<Vec<u8>, MemoryError> {
    if input.len() < HEADER_LEN || &input[..4] != MAGIC {
        return Err(MemoryError::Corrupt("missing MIO0 header".into()));
    }
    let length = read_be_u32(input, 4)? as usize;
    if length > limit {
        return Err(MemoryError::CapacityExceeded {
            requested: length,
            available: limit,
        });
    }
    let mut backref_at = read_be_u32(input, 8)? as usize;
    let mut literal_at = read_be_u32(input, 12)? as usize;
    let mut layout_at = HEADER_LEN;

    let mut out = Vec::with_capacity(length);
    let mut bits = 0u32;
    let mut remaining_bits = 0;
    while out.len() < length {
        if remaining_bits == 0 {
            bits = read_be_u32(input, layout_at)?;
            layout_at += 4;
            remaining_bits = 32;
        }
        let literal = bits & 0x8000_0000 != 0;
        bits <<= 1;
        remaining_bits -= 1;

        if literal {
            let byte = *input
                .get(literal_at)
                .ok_or_else(|| MemoryError::Corrupt("literal stream truncated".into()))?;
            out.push(byte);
            literal_at += 1;
        } else {
            let raw = input
                .get(backref_at..backref_at + 2)
                .ok_or_else(|| MemoryError::Corrupt("back-reference stream truncated".into()))?;
            backref_at += 2;
            let pair = u16::from_be_bytes([raw[0], raw[1]]);
            let count = (pair >> 12) as usize + 3;
            let distance = (pair & 0x0FFF) as usize + 1;
            if distance > out.len() {
                return Err(MemoryError::Corrupt(format!(
                    "back-reference distance {distance} exceeds {} decoded bytes",
                    out.len()
                )));
            }
            for _ in 0..count {
                if out.len() == length {
                    break;
                }
                let byte = out[out.len() - distance];
                out.push(byte);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
pub(crate) fn encode_literals(data: &[u8]) -> Vec<u8> {
    let words = data.len().div_ceil(32);
    let layout_len = words * 4;
    let literal_at = HEADER_LEN + layout_len;
    let mut out = Vec::with_capacity(literal_at + data.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&(literal_at as u32).to_be_bytes());
    out.extend_from_slice(&(literal_at as u32).to_be_bytes());
    for word in 0..words {
        let bits_in_word = (data.len() - word * 32).min(32);
        let mut bits = 0u32;
        for bit in 0..bits_in_word {
            bits |= 0x8000_0000 >> bit;
        }
        out.extend_from_slice(&bits.to_be_bytes());
    }
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_literals_and_back_references() {
        // "ABC" as literals, then one back-reference copying 6 bytes from distance 3.
        let mut block = Vec::new();
        block.extend_from_slice(MAGIC);
        block.extend_from_slice(&9u32.to_be_bytes());
        block.extend_from_slice(&0x14u32.to_be_bytes());
        block.extend_from_slice(&0x16u32.to_be_bytes());
        block.extend_from_slice(&0xE000_0000u32.to_be_bytes());
        block.extend_from_slice(&0x3002u16.to_be_bytes());
        block.extend_from_slice(b"ABC");
        assert_eq!(decompress(&block, 64).unwrap(), b"ABCABCABC");
    }

    #[test]
    fn literal_only_encoding_round_trips() {
        let data: Vec<u8> = (0..70u8).collect();
        assert_eq!(decompress(&encode_literals(&data), data.len()).unwrap(), data);
    }

    #[test]
    fn rejects_bad_distance() {
        let mut block = Vec::new();
        block.extend_from_slice(MAGIC);
        block.extend_from_slice(&4u32.to_be_bytes());
        block.extend_from_slice(&0x14u32.to_be_bytes());
        block.extend_from_slice(&0x16u32.to_be_bytes());
        block.extend_from_slice(&0u32.to_be_bytes());
        block.extend_from_slice(&0x0005u16.to_be_bytes());
        assert!(matches!(decompress(&block, 64), Err(MemoryError::Corrupt(_))));
    }

    #[test]
    fn rejects_missing_header() {
        assert!(decompress(b"NOPE", 64).is_err());
    }

    #[test]
    fn rejects_declared_lengths_over_the_limit() {
        let mut block = b"MIO0".to_vec();
        block.extend_from_slice(&u32::MAX.to_be_bytes());
        block.extend_from_slice(&0x10u32.to_be_bytes());
        block.extend_from_slice(&0x10u32.to_be_bytes());
        assert_eq!(
            decompress(&block, 1024),
            Err(MemoryError::CapacityExceeded {
                requested: u32::MAX as usize,
                available: 1024,
            })
        );
    }
}

//! Integer codecs shared by the postings, norms and stored-field formats

use crate::error::{Result, SegdexError};

/// Variable-byte encoding: seven bits per byte, high bit marks the last byte
pub fn encode_vbyte(value: u32, output: &mut Vec<u8>) {
    encode_vbyte64(value as u64, output)
}

pub fn encode_vbyte64(value: u64, output: &mut Vec<u8>) {
    let mut v = value;
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            output.push(byte | 0x80);
            break;
        } else {
            output.push(byte);
        }
    }
}

/// Decode a variable-byte encoded u32
pub fn decode_vbyte(input: &[u8], pos: &mut usize) -> Result<u32> {
    let value = decode_vbyte64(input, pos)?;
    u32::try_from(value).map_err(|_| SegdexError::corrupt("vbyte value exceeds u32"))
}

pub fn decode_vbyte64(input: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;

    loop {
        let byte = *input
            .get(*pos)
            .ok_or_else(|| SegdexError::corrupt("unexpected end of vbyte"))?;
        *pos += 1;

        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 != 0 {
            return Ok(result);
        }

        shift += 7;
        if shift > 63 {
            return Err(SegdexError::corrupt("vbyte value too large"));
        }
    }
}

/// Bitpack a block of integers using the bit width of the largest value
pub fn bitpack_encode(values: &[u32], output: &mut Vec<u8>) {
    let max_val = values.iter().copied().max().unwrap_or(0);
    let bits_needed = if max_val == 0 {
        0
    } else {
        32 - max_val.leading_zeros()
    } as u8;

    output.push(bits_needed);
    if bits_needed == 0 {
        return;
    }

    let mut current: u64 = 0;
    let mut bits_in_current = 0u32;

    for &value in values {
        current |= (value as u64) << bits_in_current;
        bits_in_current += bits_needed as u32;

        while bits_in_current >= 8 {
            output.push(current as u8);
            current >>= 8;
            bits_in_current -= 8;
        }
    }

    if bits_in_current > 0 {
        output.push(current as u8);
    }
}

/// Decode `count` bitpacked integers
pub fn bitpack_decode(input: &[u8], pos: &mut usize, count: usize) -> Result<Vec<u32>> {
    let bits_needed = *input
        .get(*pos)
        .ok_or_else(|| SegdexError::corrupt("unexpected end of bitpack"))? as u32;
    *pos += 1;

    if bits_needed == 0 {
        return Ok(vec![0; count]);
    }
    if bits_needed > 32 {
        return Err(SegdexError::corrupt("bitpack width exceeds 32 bits"));
    }

    let total_bits = count as u64 * bits_needed as u64;
    let bytes_needed = total_bits.div_ceil(8) as usize;
    if *pos + bytes_needed > input.len() {
        return Err(SegdexError::corrupt("not enough bytes for bitpack"));
    }

    let mut values = Vec::with_capacity(count);
    let mut current: u64 = 0;
    let mut bits_available = 0u32;
    let mask = (1u64 << bits_needed) - 1;

    for _ in 0..count {
        while bits_available < bits_needed {
            current |= (input[*pos] as u64) << bits_available;
            *pos += 1;
            bits_available += 8;
        }

        values.push((current & mask) as u32);
        current >>= bits_needed;
        bits_available -= bits_needed;
    }

    Ok(values)
}

/// Serialize a record with bincode
pub fn encode_record<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

/// Deserialize a persisted record; malformed bytes are corruption
pub fn decode_record<T: serde::de::DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| SegdexError::corrupt(format!("{}: {}", what, e)))
}

/// Offsets table: `count` little-endian u64 values
pub fn encode_offsets(offsets: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * 8);
    for off in offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    out
}

pub fn decode_offset(table: &[u8], index: usize) -> Result<u64> {
    let start = index * 8;
    let bytes = table
        .get(start..start + 8)
        .ok_or_else(|| SegdexError::corrupt("offset table too short"))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(u64::from_le_bytes(buf))
}

//! SQLite variable-length integers.
//!
//! Big-endian, 7 bits per byte with the high bit as a continuation flag. A
//! ninth byte, when reached, contributes all 8 of its bits, so any 64-bit
//! value fits in at most 9 bytes.

use crate::sqlite::error::{DecodeError, Result};

/// Longest possible encoding in bytes
pub const MAX_VARINT_LEN: usize = 9;

/// Extension for reading varints straight out of a byte slice
pub trait Varint {
    /// Reads a varint starting at `offset`, returning the value and the number
    /// of bytes it occupied
    fn read_varint(&self, offset: usize) -> Result<(i64, usize)>;
}

impl Varint for [u8] {
    fn read_varint(&self, offset: usize) -> Result<(i64, usize)> {
        read_varint(self, offset)
    }
}

/// Decodes the varint at `bytes[offset..]`.
///
/// Fails with [`DecodeError::MalformedVarint`] when the buffer ends before a
/// terminating byte is found.
pub fn read_varint(bytes: &[u8], offset: usize) -> Result<(i64, usize)> {
    let mut value: u64 = 0;

    for i in 0..MAX_VARINT_LEN - 1 {
        let byte = *bytes
            .get(offset + i)
            .ok_or(DecodeError::MalformedVarint { offset })?;
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value as i64, i + 1));
        }
    }

    let last = *bytes
        .get(offset + MAX_VARINT_LEN - 1)
        .ok_or(DecodeError::MalformedVarint { offset })?;
    value = (value << 8) | u64::from(last);
    Ok((value as i64, MAX_VARINT_LEN))
}

/// Encodes `value` in the shortest form [`read_varint`] accepts.
pub fn encode_varint(value: i64) -> Vec<u8> {
    let mut v = value as u64;

    if v > 0x00ff_ffff_ffff_ffff {
        let mut buf = vec![0u8; MAX_VARINT_LEN];
        buf[8] = v as u8;
        v >>= 8;
        for byte in buf[..8].iter_mut().rev() {
            *byte = ((v & 0x7f) as u8) | 0x80;
            v >>= 7;
        }
        return buf;
    }

    let mut groups = Vec::with_capacity(8);
    loop {
        groups.push((v & 0x7f) as u8);
        v >>= 7;
        if v == 0 {
            break;
        }
    }
    groups.reverse();
    let last = groups.len() - 1;
    for byte in &mut groups[..last] {
        *byte |= 0x80;
    }
    groups
}

/// Number of bytes `encode_varint(value)` produces
pub fn varint_len(value: i64) -> usize {
    let v = value as u64;
    if v > 0x00ff_ffff_ffff_ffff {
        return MAX_VARINT_LEN;
    }
    let bits = 64 - v.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

//! Self-terminating variable-length integers.
//!
//! A value `v` occupying `n + 1` bytes is stored as the low `n + 1` bytes of
//! `((v << 1) | 1) << n`, little-endian. The number of trailing zero bits of
//! the first byte therefore tells the reader how many bytes follow, and every
//! byte carries seven payload bits. Eight bytes hold 56 bits, which is the
//! codec's limit.
//!
//! Signed values go through [`zigzag`] first so that small magnitudes of
//! either sign stay short.

use crate::error::{Error, Result};

/// Largest value [`write`] accepts.
pub const MAX: u64 = (1 << 56) - 1;

/// Widest encoding [`write`] produces.
pub const MAX_LEN: usize = 8;

/// Number of bytes [`write`] uses for `v`.
pub fn encoded_len(v: u64) -> usize {
    if v == 0 {
        1
    } else {
        (63 - v.leading_zeros() as usize) / 7 + 1
    }
}

/// Append `v` to `buf`.
///
/// # Panics
///
/// Panics if `v` exceeds [`MAX`].
pub fn write(buf: &mut Vec<u8>, v: u64) {
    assert!(v <= MAX, "varint out of range: {v}");
    let len = encoded_len(v);
    let word = ((v << 1) | 1) << (len - 1);
    buf.extend_from_slice(&word.to_le_bytes()[..len]);
}

pub fn zigzag(i: i64) -> u64 {
    ((i << 1) ^ (i >> 63)) as u64
}

pub fn unzigzag(u: u64) -> i64 {
    ((u >> 1) as i64) ^ -((u & 1) as i64)
}

/// Cursor over an encoded byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }

    /// Decode the next value.
    ///
    /// Fails without consuming anything if the buffer is exhausted, the first
    /// byte carries no terminator bit, or the group runs past the end.
    pub fn read(&mut self) -> Result<u64> {
        let first = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| Error::format(format!("varint expected at offset {}", self.pos)))?;
        if first == 0 {
            return Err(Error::format(format!(
                "varint at offset {} has no terminator bit",
                self.pos
            )));
        }
        let len = first.trailing_zeros() as usize + 1;
        let end = self.pos + len;
        let group = self.bytes.get(self.pos..end).ok_or_else(|| {
            Error::format(format!(
                "varint at offset {} needs {len} bytes, {} left",
                self.pos,
                self.bytes.len() - self.pos
            ))
        })?;
        let mut word = [0u8; 8];
        word[..len].copy_from_slice(group);
        let word = u64::from_le_bytes(word);
        self.pos = end;
        Ok((word >> len) & ((1u64 << (7 * len)) - 1))
    }

    pub fn read_signed(&mut self) -> Result<i64> {
        self.read().map(unzigzag)
    }

    /// Read a varint and narrow it to `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        let v = self.read()?;
        u32::try_from(v).map_err(|_| Error::format(format!("{v} does not fit in 32 bits")))
    }

    /// Take the next `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                Error::format(format!(
                    "{len} bytes expected at offset {}, {} left",
                    self.pos,
                    self.bytes.len().saturating_sub(self.pos)
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }
}

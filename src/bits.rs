//! Bit-level views over message data.
//!
//! A [`BitBuffer`] is an immutable, cheaply clonable view on shared byte storage
//! ([`bytes::Bytes`]). Slicing only adjusts the bit window, so forking a parsing
//! path never copies message data.
//!
//! Bits are indexed from 0. With [`BitOrder::Msb0`] (the default) bit 0 is the
//! most significant bit of the first byte; with [`BitOrder::Lsb0`] it is the least
//! significant one.

use crate::types::CodecError;
use bytes::Bytes;
use std::fmt;
use std::ops::Range;

/// Order of bits inside each byte of the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    #[default]
    Msb0,
    Lsb0,
}

/// Immutable view on a sequence of bits.
#[derive(Clone)]
pub struct BitBuffer {
    storage: Bytes,
    start: usize,
    len: usize,
    order: BitOrder,
}

impl BitBuffer {
    pub fn empty() -> Self {
        BitBuffer { storage: Bytes::new(), start: 0, len: 0, order: BitOrder::Msb0 }
    }

    /// Wrap bytes (MSB-first bit order).
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_bytes_with_order(bytes, BitOrder::Msb0)
    }

    pub fn from_bytes_with_order(bytes: impl Into<Bytes>, order: BitOrder) -> Self {
        let storage: Bytes = bytes.into();
        let len = storage.len() * 8;
        BitBuffer { storage, start: 0, len, order }
    }

    pub fn from_bits(bits: &[bool]) -> Self {
        let mut builder = BitBufferBuilder::with_capacity(bits.len());
        for &b in bits {
            builder.push_bit(b);
        }
        builder.finish()
    }

    /// Parse a string of `0`/`1` characters; other characters (spaces, `_`) are skipped.
    pub fn from_bit_str(s: &str) -> Self {
        let bits: Vec<bool> = s
            .chars()
            .filter_map(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect();
        Self::from_bits(&bits)
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn order(&self) -> BitOrder {
        self.order
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.bit_unchecked(index))
    }

    fn bit_unchecked(&self, index: usize) -> bool {
        let abs = self.start + index;
        let byte = self.storage[abs / 8];
        let shift = match self.order {
            BitOrder::Msb0 => 7 - (abs % 8),
            BitOrder::Lsb0 => abs % 8,
        };
        (byte >> shift) & 1 == 1
    }

    /// Sub-view on `range`. Panics if the range is out of bounds, like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> BitBuffer {
        match self.checked_slice(range.clone()) {
            Some(b) => b,
            None => panic!("bit range {:?} out of bounds for buffer of {} bits", range, self.len),
        }
    }

    pub fn checked_slice(&self, range: Range<usize>) -> Option<BitBuffer> {
        if range.start > range.end || range.end > self.len {
            return None;
        }
        Some(BitBuffer {
            storage: self.storage.clone(),
            start: self.start + range.start,
            len: range.end - range.start,
            order: self.order,
        })
    }

    /// First `n` bits (or all of them when shorter).
    pub fn prefix(&self, n: usize) -> BitBuffer {
        self.slice(0..n.min(self.len))
    }

    /// Everything after the first `n` bits (empty when `n >= len`).
    pub fn skip(&self, n: usize) -> BitBuffer {
        self.slice(n.min(self.len)..self.len)
    }

    pub fn starts_with(&self, other: &BitBuffer) -> bool {
        other.len <= self.len && self.prefix(other.len) == *other
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bit_unchecked(i))
    }

    pub fn concat(parts: &[BitBuffer]) -> BitBuffer {
        let total = parts.iter().map(BitBuffer::len).sum();
        let mut builder = BitBufferBuilder::with_capacity(total);
        for p in parts {
            builder.push_buffer(p);
        }
        builder.finish()
    }

    /// Render as bytes (MSB-first). Fails when the length is not a multiple of 8.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        if !self.is_byte_aligned() {
            return Err(CodecError::Alignment { bits: self.len });
        }
        if self.order == BitOrder::Msb0 && self.start % 8 == 0 {
            let from = self.start / 8;
            return Ok(self.storage[from..from + self.len / 8].to_vec());
        }
        Ok(self.pack())
    }

    /// Pack into bytes, zero-filling the last partial byte on the right.
    pub fn to_bytes_padded(&self) -> Vec<u8> {
        self.pack()
    }

    fn pack(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.len.div_ceil(8)];
        for (i, bit) in self.iter().enumerate() {
            if bit {
                out[i / 8] |= 0x80 >> (i % 8);
            }
        }
        out
    }

    /// Interpret the bits as an unsigned big-endian number (at most 64 bits).
    pub fn to_u64(&self) -> Option<u64> {
        if self.len > 64 {
            return None;
        }
        Some(self.iter().fold(0u64, |acc, b| (acc << 1) | b as u64))
    }

    pub fn to_bit_string(&self) -> String {
        self.iter().map(|b| if b { '1' } else { '0' }).collect()
    }

    /// Hex rendering when byte aligned, bit string otherwise.
    pub fn to_hex_or_bits(&self) -> String {
        match self.to_bytes() {
            Ok(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            Err(_) => format!("b{}", self.to_bit_string()),
        }
    }
}

impl Default for BitBuffer {
    fn default() -> Self {
        BitBuffer::empty()
    }
}

impl PartialEq for BitBuffer {
    fn eq(&self, other: &Self) -> bool {
        if self.len != other.len {
            return false;
        }
        let fast = self.order == BitOrder::Msb0
            && other.order == BitOrder::Msb0
            && self.start % 8 == 0
            && other.start % 8 == 0
            && self.len % 8 == 0;
        if fast {
            let a = &self.storage[self.start / 8..(self.start + self.len) / 8];
            let b = &other.storage[other.start / 8..(other.start + other.len) / 8];
            return a == b;
        }
        self.iter().eq(other.iter())
    }
}

impl Eq for BitBuffer {}

impl fmt::Debug for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitBuffer({})", self.to_hex_or_bits())
    }
}

impl fmt::Display for BitBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_or_bits())
    }
}

impl From<&[u8]> for BitBuffer {
    fn from(bytes: &[u8]) -> Self {
        BitBuffer::from_bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for BitBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        BitBuffer::from_bytes(bytes)
    }
}

impl From<&str> for BitBuffer {
    fn from(s: &str) -> Self {
        BitBuffer::from_bytes(s.as_bytes().to_vec())
    }
}

/// Growable bit sequence used to assemble new buffers (MSB-first).
#[derive(Debug, Clone, Default)]
pub struct BitBufferBuilder {
    bytes: Vec<u8>,
    len: usize,
}

impl BitBufferBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bits: usize) -> Self {
        BitBufferBuilder { bytes: Vec::with_capacity(bits.div_ceil(8)), len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_bit(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    pub fn push_buffer(&mut self, buffer: &BitBuffer) {
        if self.len % 8 == 0 && buffer.order == BitOrder::Msb0 && buffer.start % 8 == 0 && buffer.len % 8 == 0 {
            let from = buffer.start / 8;
            self.bytes.extend_from_slice(&buffer.storage[from..from + buffer.len / 8]);
            self.len += buffer.len;
            return;
        }
        for bit in buffer.iter() {
            self.push_bit(bit);
        }
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) {
        if self.len % 8 == 0 {
            self.bytes.extend_from_slice(bytes);
            self.len += bytes.len() * 8;
            return;
        }
        for &byte in bytes {
            for i in 0..8 {
                self.push_bit((byte >> (7 - i)) & 1 == 1);
            }
        }
    }

    /// Append `n` zero bits.
    pub fn push_zeros(&mut self, n: usize) {
        for _ in 0..n {
            self.push_bit(false);
        }
    }

    /// Overwrite bits starting at `offset`. Returns false when the write would overflow.
    pub fn overwrite(&mut self, offset: usize, bits: &BitBuffer) -> bool {
        if offset + bits.len() > self.len {
            return false;
        }
        for (i, bit) in bits.iter().enumerate() {
            let pos = offset + i;
            let mask = 0x80 >> (pos % 8);
            if bit {
                self.bytes[pos / 8] |= mask;
            } else {
                self.bytes[pos / 8] &= !mask;
            }
        }
        true
    }

    /// Copy of the bits written so far.
    pub fn snapshot(&self) -> BitBuffer {
        self.clone().finish()
    }

    pub fn finish(self) -> BitBuffer {
        let len = self.len;
        BitBuffer { storage: Bytes::from(self.bytes), start: 0, len, order: BitOrder::Msb0 }
    }
}

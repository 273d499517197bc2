//! Typed views of field bits: encode/decode between [`BitBuffer`]s and [`Value`]s.
//!
//! Handles fixed-width integers (configurable endianness), raw byte blocks,
//! printable ASCII strings, IPv4 addresses and free-form bit fields. Each type also
//! declares its size bounds, which drive how many candidate lengths a learning
//! leaf may try while parsing.

use crate::bits::{BitBuffer, BitBufferBuilder};
use crate::value::Value;
use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Alignment: {bits} bits do not form whole bytes")]
    Alignment { bits: usize },
}

/// Fixed-width integer layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegerType {
    /// Width in bits: 8, 16, 32 or 64.
    pub width: u8,
    pub signed: bool,
    pub endianness: Endianness,
}

impl IntegerType {
    pub fn new(width: u8, signed: bool, endianness: Endianness) -> Result<Self, CodecError> {
        if !matches!(width, 8 | 16 | 32 | 64) {
            return Err(CodecError::TypeMismatch(format!("unsupported integer width {}", width)));
        }
        Ok(IntegerType { width, signed, endianness })
    }

    pub fn bits(&self) -> usize {
        self.width as usize
    }

    /// Largest unsigned value this layout can carry.
    pub fn max_unsigned(&self) -> u64 {
        if self.width == 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    pub fn decode_u64(&self, bits: &BitBuffer) -> Result<u64, CodecError> {
        if bits.len() != self.bits() {
            return Err(CodecError::TypeMismatch(format!(
                "integer of {} bits cannot decode {} bits",
                self.width,
                bits.len()
            )));
        }
        let bytes = bits.to_bytes()?;
        let mut r = Cursor::new(bytes.as_slice());
        let v = match (self.width, self.endianness) {
            (8, _) => r.read_u8()? as u64,
            (16, Endianness::Big) => r.read_u16::<BigEndian>()? as u64,
            (16, Endianness::Little) => r.read_u16::<LittleEndian>()? as u64,
            (32, Endianness::Big) => r.read_u32::<BigEndian>()? as u64,
            (32, Endianness::Little) => r.read_u32::<LittleEndian>()? as u64,
            (64, Endianness::Big) => r.read_u64::<BigEndian>()?,
            (64, Endianness::Little) => r.read_u64::<LittleEndian>()?,
            _ => return Err(CodecError::TypeMismatch(format!("unsupported integer width {}", self.width))),
        };
        Ok(v)
    }

    pub fn decode(&self, bits: &BitBuffer) -> Result<Value, CodecError> {
        let raw = self.decode_u64(bits)?;
        Ok(match (self.width, self.signed) {
            (8, false) => Value::U8(raw as u8),
            (16, false) => Value::U16(raw as u16),
            (32, false) => Value::U32(raw as u32),
            (64, false) => Value::U64(raw),
            (8, true) => Value::I8(raw as u8 as i8),
            (16, true) => Value::I16(raw as u16 as i16),
            (32, true) => Value::I32(raw as u32 as i32),
            _ => Value::I64(raw as i64),
        })
    }

    /// Encode an unsigned number; fails when it does not fit the width.
    pub fn encode_u64(&self, v: u64) -> Result<BitBuffer, CodecError> {
        if v > self.max_unsigned() {
            return Err(CodecError::TypeMismatch(format!("{} does not fit in {} bits", v, self.width)));
        }
        let mut w = Vec::with_capacity(self.bits() / 8);
        match (self.width, self.endianness) {
            (8, _) => w.write_u8(v as u8)?,
            (16, Endianness::Big) => w.write_u16::<BigEndian>(v as u16)?,
            (16, Endianness::Little) => w.write_u16::<LittleEndian>(v as u16)?,
            (32, Endianness::Big) => w.write_u32::<BigEndian>(v as u32)?,
            (32, Endianness::Little) => w.write_u32::<LittleEndian>(v as u32)?,
            (64, Endianness::Big) => w.write_u64::<BigEndian>(v)?,
            (64, Endianness::Little) => w.write_u64::<LittleEndian>(v)?,
            _ => return Err(CodecError::TypeMismatch(format!("unsupported integer width {}", self.width))),
        }
        Ok(BitBuffer::from_bytes(w))
    }

    pub fn encode_i64(&self, v: i64) -> Result<BitBuffer, CodecError> {
        if !self.signed {
            let u: u64 = v
                .try_into()
                .map_err(|_| CodecError::TypeMismatch(format!("{} is negative for an unsigned integer", v)))?;
            return self.encode_u64(u);
        }
        let half = 1i128 << (self.width - 1);
        if (v as i128) < -half || (v as i128) >= half {
            return Err(CodecError::TypeMismatch(format!("{} does not fit in signed {} bits", v, self.width)));
        }
        self.encode_u64((v as u64) & self.max_unsigned())
    }

    pub fn encode(&self, value: &Value) -> Result<BitBuffer, CodecError> {
        if let Some(u) = value.as_u64() {
            return self.encode_u64(u);
        }
        if let Some(i) = value.as_i64() {
            return self.encode_i64(i);
        }
        Err(CodecError::TypeMismatch(format!("{:?} is not an integer", value)))
    }
}

macro_rules! integer_ctor {
    ($($name:ident => ($width:expr, $signed:expr, $endian:expr)),* $(,)?) => {
        impl IntegerType {
            $(
                pub fn $name() -> Self {
                    IntegerType { width: $width, signed: $signed, endianness: $endian }
                }
            )*
        }
    };
}

integer_ctor! {
    uint8 => (8, false, Endianness::Big),
    int8 => (8, true, Endianness::Big),
    uint16be => (16, false, Endianness::Big),
    uint16le => (16, false, Endianness::Little),
    int16be => (16, true, Endianness::Big),
    int16le => (16, true, Endianness::Little),
    uint32be => (32, false, Endianness::Big),
    uint32le => (32, false, Endianness::Little),
    int32be => (32, true, Endianness::Big),
    int32le => (32, true, Endianness::Little),
    uint64be => (64, false, Endianness::Big),
    uint64le => (64, false, Endianness::Little),
    int64be => (64, true, Endianness::Big),
    int64le => (64, true, Endianness::Little),
}

/// Type constraint of a leaf variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataType {
    Integer(IntegerType),
    /// Raw bytes; `max_bytes: None` means unbounded.
    Raw { min_bytes: usize, max_bytes: Option<usize> },
    /// Printable ASCII text, one byte per character.
    Ascii { min_chars: usize, max_chars: Option<usize> },
    Ipv4 { endianness: Endianness },
    BitField { min_bits: usize, max_bits: Option<usize> },
}

impl DataType {
    pub fn integer(t: IntegerType) -> Self {
        DataType::Integer(t)
    }

    pub fn uint8() -> Self {
        DataType::Integer(IntegerType::uint8())
    }

    pub fn raw(n: usize) -> Self {
        DataType::Raw { min_bytes: n, max_bytes: Some(n) }
    }

    pub fn raw_range(min: usize, max: usize) -> Self {
        DataType::Raw { min_bytes: min, max_bytes: Some(max) }
    }

    pub fn raw_unbounded(min: usize) -> Self {
        DataType::Raw { min_bytes: min, max_bytes: None }
    }

    pub fn ascii(n: usize) -> Self {
        DataType::Ascii { min_chars: n, max_chars: Some(n) }
    }

    pub fn ascii_range(min: usize, max: usize) -> Self {
        DataType::Ascii { min_chars: min, max_chars: Some(max) }
    }

    pub fn ascii_unbounded(min: usize) -> Self {
        DataType::Ascii { min_chars: min, max_chars: None }
    }

    pub fn ipv4() -> Self {
        DataType::Ipv4 { endianness: Endianness::Big }
    }

    pub fn bits(n: usize) -> Self {
        DataType::BitField { min_bits: n, max_bits: Some(n) }
    }

    pub fn bits_range(min: usize, max: usize) -> Self {
        DataType::BitField { min_bits: min, max_bits: Some(max) }
    }

    /// `(min, max)` size in bits; `max` is `None` when unbounded.
    pub fn size_bits(&self) -> (usize, Option<usize>) {
        match self {
            DataType::Integer(t) => (t.bits(), Some(t.bits())),
            DataType::Raw { min_bytes, max_bytes } => (min_bytes * 8, max_bytes.map(|m| m * 8)),
            DataType::Ascii { min_chars, max_chars } => (min_chars * 8, max_chars.map(|m| m * 8)),
            DataType::Ipv4 { .. } => (32, Some(32)),
            DataType::BitField { min_bits, max_bits } => (*min_bits, *max_bits),
        }
    }

    pub fn fixed_bit_size(&self) -> Option<usize> {
        match self.size_bits() {
            (min, Some(max)) if min == max => Some(min),
            _ => None,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.size_bits().1.is_some()
    }

    /// Granularity of valid lengths, in bits.
    pub fn unit_bits(&self) -> usize {
        match self {
            DataType::Integer(t) => t.bits(),
            DataType::Ipv4 { .. } => 32,
            DataType::Raw { .. } | DataType::Ascii { .. } => 8,
            DataType::BitField { .. } => 1,
        }
    }

    /// Lengths (in bits) this type could take from `available` bits, longest first.
    pub fn candidate_lengths(&self, available: usize) -> Vec<usize> {
        let (min, max) = self.size_bits();
        let max = max.unwrap_or(available).min(available);
        if max < min {
            return Vec::new();
        }
        let unit = self.unit_bits();
        (min..=max).rev().filter(|len| len % unit == 0).collect()
    }

    /// Structural and content check of `bits` against this type.
    pub fn can_parse(&self, bits: &BitBuffer) -> bool {
        let (min, max) = self.size_bits();
        if bits.len() < min || max.is_some_and(|m| bits.len() > m) || bits.len() % self.unit_bits() != 0 {
            return false;
        }
        match self {
            DataType::Ascii { .. } => self.decode(bits).is_ok(),
            _ => true,
        }
    }

    pub fn decode(&self, bits: &BitBuffer) -> Result<Value, CodecError> {
        let (min, max) = self.size_bits();
        if bits.len() < min || max.is_some_and(|m| bits.len() > m) {
            return Err(CodecError::TypeMismatch(format!(
                "{} bits outside of the {:?} size bounds ({}..{:?})",
                bits.len(),
                self,
                min,
                max
            )));
        }
        match self {
            DataType::Integer(t) => t.decode(bits),
            DataType::Raw { .. } => Ok(Value::Bytes(bits.to_bytes()?)),
            DataType::Ascii { .. } => {
                let bytes = bits.to_bytes()?;
                let text = String::from_utf8(bytes)
                    .map_err(|e| CodecError::TypeMismatch(format!("not UTF-8 text: {}", e)))?;
                if let Some(c) = text.chars().find(|c| !is_printable(*c)) {
                    return Err(CodecError::TypeMismatch(format!("non printable character {:?}", c)));
                }
                Ok(Value::Text(text))
            }
            DataType::Ipv4 { endianness } => {
                let bytes = bits.to_bytes()?;
                let raw = match endianness {
                    Endianness::Big => BigEndian::read_u32(&bytes),
                    Endianness::Little => LittleEndian::read_u32(&bytes),
                };
                Ok(Value::Ipv4(Ipv4Addr::from(raw)))
            }
            DataType::BitField { .. } => match bits.to_bytes() {
                Ok(bytes) => Ok(Value::Bytes(bytes)),
                Err(_) => Ok(Value::Bits(bits.clone())),
            },
        }
    }

    pub fn encode(&self, value: &Value) -> Result<BitBuffer, CodecError> {
        let bits = match (self, value) {
            (DataType::Integer(t), v) => t.encode(v)?,
            (DataType::Ipv4 { endianness }, Value::Ipv4(addr)) => {
                let mut buf = [0u8; 4];
                match endianness {
                    Endianness::Big => BigEndian::write_u32(&mut buf, u32::from(*addr)),
                    Endianness::Little => LittleEndian::write_u32(&mut buf, u32::from(*addr)),
                }
                BitBuffer::from_bytes(buf.to_vec())
            }
            (DataType::Ascii { .. }, Value::Text(s)) => {
                if let Some(c) = s.chars().find(|c| !is_printable(*c)) {
                    return Err(CodecError::TypeMismatch(format!("non printable character {:?}", c)));
                }
                BitBuffer::from_bytes(s.as_bytes().to_vec())
            }
            (DataType::Raw { .. } | DataType::BitField { .. }, Value::Bytes(b)) => BitBuffer::from_bytes(b.clone()),
            (DataType::Raw { .. } | DataType::BitField { .. }, Value::Text(s)) => {
                BitBuffer::from_bytes(s.as_bytes().to_vec())
            }
            (DataType::BitField { .. }, Value::Bits(b)) => b.clone(),
            (t, v) => return Err(CodecError::TypeMismatch(format!("cannot encode {:?} as {:?}", v, t))),
        };
        let (min, max) = self.size_bits();
        if bits.len() < min || max.is_some_and(|m| bits.len() > m) {
            return Err(CodecError::TypeMismatch(format!(
                "encoded value has {} bits, outside of {}..{:?}",
                bits.len(),
                min,
                max
            )));
        }
        Ok(bits)
    }

    /// Zero bits of the minimal size, used as a placeholder while specializing.
    pub fn zeros(&self) -> BitBuffer {
        let mut b = BitBufferBuilder::with_capacity(self.size_bits().0);
        b.push_zeros(self.size_bits().0);
        b.finish()
    }
}

fn is_printable(c: char) -> bool {
    c.is_ascii_graphic() || matches!(c, ' ' | '\t' | '\r' | '\n')
}

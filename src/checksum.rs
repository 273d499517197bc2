//! Checksum algorithms used by checksum relations.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Crc16Arc,
    Crc16CcittFalse,
    Crc16Modbus,
    Crc16Kermit,
    Crc16Xmodem,
    Crc32,
    /// RFC 1071 one's complement sum over 16-bit big-endian words.
    Internet,
}

impl ChecksumAlgorithm {
    /// Width of the checksum in bits.
    pub fn width_bits(&self) -> usize {
        match self {
            ChecksumAlgorithm::Crc32 => 32,
            _ => 16,
        }
    }

    pub fn calculate(&self, data: &[u8]) -> u64 {
        match self {
            ChecksumAlgorithm::Crc16Arc => crc16_reflected(data, 0xA001, 0x0000) as u64,
            ChecksumAlgorithm::Crc16Modbus => crc16_reflected(data, 0xA001, 0xFFFF) as u64,
            ChecksumAlgorithm::Crc16Kermit => crc16_reflected(data, 0x8408, 0x0000) as u64,
            ChecksumAlgorithm::Crc16CcittFalse => crc16_msb(data, 0x1021, 0xFFFF) as u64,
            ChecksumAlgorithm::Crc16Xmodem => crc16_msb(data, 0x1021, 0x0000) as u64,
            ChecksumAlgorithm::Crc32 => crc32(data) as u64,
            ChecksumAlgorithm::Internet => internet_checksum(data) as u64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Crc16Arc => "crc16",
            ChecksumAlgorithm::Crc16CcittFalse => "crc16_ccitt",
            ChecksumAlgorithm::Crc16Modbus => "crc16_modbus",
            ChecksumAlgorithm::Crc16Kermit => "crc16_kermit",
            ChecksumAlgorithm::Crc16Xmodem => "crc16_xmodem",
            ChecksumAlgorithm::Crc32 => "crc32",
            ChecksumAlgorithm::Internet => "internet_checksum",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "crc16" | "crc16_arc" => ChecksumAlgorithm::Crc16Arc,
            "crc16_ccitt" => ChecksumAlgorithm::Crc16CcittFalse,
            "crc16_modbus" => ChecksumAlgorithm::Crc16Modbus,
            "crc16_kermit" => ChecksumAlgorithm::Crc16Kermit,
            "crc16_xmodem" => ChecksumAlgorithm::Crc16Xmodem,
            "crc32" => ChecksumAlgorithm::Crc32,
            "checksum" | "internet_checksum" | "inet_checksum" => ChecksumAlgorithm::Internet,
            _ => return None,
        })
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn crc16_reflected(data: &[u8], poly: u16, init: u16) -> u16 {
    let mut crc = init;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ poly } else { crc >> 1 };
        }
    }
    crc
}

fn crc16_msb(data: &[u8], poly: u16, init: u16) -> u16 {
    let mut crc = init;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ poly } else { crc << 1 };
        }
    }
    crc
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
        }
    }
    !crc
}

/// Odd-length input is padded with a trailing zero byte.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    for chunk in data.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += word as u32;
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

//! Table-driven CRC engines.
//!
//! Three independent algorithms live here because they serve different
//! consumers with different conventions:
//!
//! - [`crc16_modbus`] validates Modbus RTU frames. Reflected form of the
//!   0x8005 polynomial (0xA001), initial value 0xFFFF, transmitted LSB first
//!   on the wire.
//! - [`crc16`] is the generic MSB-first 0x8005 checksum used by host tooling
//!   over arbitrary byte ranges. Initial value zero.
//! - [`crc32`] is the MSB-first 0x04C11DB7 checksum for firmware images.
//!   Initial value zero, no reflection, no final XOR.
//!
//! All lookup tables are generated at compile time from their polynomial, so
//! the table contents cannot drift from the update functions.

/// Reflected form of the CRC16 polynomial 0x8005, as used by Modbus RTU.
const CRC16_REFLECTED_POLY: u16 = 0xA001;
/// CRC16 polynomial in MSB-first form.
const CRC16_POLY: u16 = 0x8005;
/// CRC32 polynomial in MSB-first form.
const CRC32_POLY: u32 = 0x04C1_1DB7;

const fn build_crc16_modbus_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut index = 0;
    while index < 256 {
        let mut entry = index as u16;
        let mut bit = 0;
        while bit < 8 {
            entry = if entry & 0x0001 != 0 {
                (entry >> 1) ^ CRC16_REFLECTED_POLY
            } else {
                entry >> 1
            };
            bit += 1;
        }
        table[index] = entry;
        index += 1;
    }
    table
}

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut index = 0;
    while index < 256 {
        let mut entry = (index as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            entry = if entry & 0x8000 != 0 {
                (entry << 1) ^ CRC16_POLY
            } else {
                entry << 1
            };
            bit += 1;
        }
        table[index] = entry;
        index += 1;
    }
    table
}

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut index = 0;
    while index < 256 {
        let mut entry = (index as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            entry = if entry & 0x8000_0000 != 0 {
                (entry << 1) ^ CRC32_POLY
            } else {
                entry << 1
            };
            bit += 1;
        }
        table[index] = entry;
        index += 1;
    }
    table
}

static CRC16_MODBUS_TABLE: [u16; 256] = build_crc16_modbus_table();
static CRC16_TABLE: [u16; 256] = build_crc16_table();
static CRC32_TABLE: [u32; 256] = build_crc32_table();

/// Compute the Modbus RTU checksum of `data`.
///
/// The result covers every frame byte up to, but not including, the two
/// checksum bytes. On the wire the low byte travels first; receivers must
/// therefore reassemble the reference value as `lo | (hi << 8)` before
/// comparing it with this function's output.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for &byte in data {
        let index = ((crc ^ byte as u16) & 0x00FF) as usize;
        crc = (crc >> 8) ^ CRC16_MODBUS_TABLE[index];
    }
    crc
}

/// Compute the generic MSB-first CRC16 of `data`, starting from zero.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0u16;
    for &byte in data {
        let index = (byte ^ (crc >> 8) as u8) as usize;
        crc = (crc << 8) ^ CRC16_TABLE[index];
    }
    crc
}

/// Compute the MSB-first CRC32 of `data`, starting from zero.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &byte in data {
        let index = (byte ^ (crc >> 24) as u8) as usize;
        crc = (crc << 8) ^ CRC32_TABLE[index];
    }
    crc
}

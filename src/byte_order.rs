use byteorder::{BigEndian, ByteOrder as ByteOrderExt, LittleEndian};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-record wire byte order. Mini-SEED allows records of either order to be
/// mixed in a single stream, so every multi-byte read or write is
/// parameterised by one of these instead of assuming the host order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Interpret the Blockette 1000 byte-order field, 0 = little, 1 = big.
    pub fn from_flag(flag: u8) -> ByteOrder {
        if flag == 0 {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    /// The Blockette 1000 byte-order field value.
    pub fn flag(self) -> u8 {
        match self {
            ByteOrder::Little => 0,
            ByteOrder::Big => 1,
        }
    }

    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => LittleEndian::read_u16(buf),
            ByteOrder::Big => BigEndian::read_u16(buf),
        }
    }

    pub fn read_i16(self, buf: &[u8]) -> i16 {
        self.read_u16(buf) as i16
    }

    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => LittleEndian::read_u32(buf),
            ByteOrder::Big => BigEndian::read_u32(buf),
        }
    }

    pub fn read_i32(self, buf: &[u8]) -> i32 {
        self.read_u32(buf) as i32
    }

    pub fn read_f32(self, buf: &[u8]) -> f32 {
        f32::from_bits(self.read_u32(buf))
    }

    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            ByteOrder::Little => LittleEndian::read_u64(buf),
            ByteOrder::Big => BigEndian::read_u64(buf),
        }
    }

    pub fn read_f64(self, buf: &[u8]) -> f64 {
        f64::from_bits(self.read_u64(buf))
    }

    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            ByteOrder::Little => LittleEndian::write_u16(buf, v),
            ByteOrder::Big => BigEndian::write_u16(buf, v),
        }
    }

    pub fn write_i16(self, buf: &mut [u8], v: i16) {
        self.write_u16(buf, v as u16)
    }

    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            ByteOrder::Little => LittleEndian::write_u32(buf, v),
            ByteOrder::Big => BigEndian::write_u32(buf, v),
        }
    }

    pub fn write_i32(self, buf: &mut [u8], v: i32) {
        self.write_u32(buf, v as u32)
    }

    pub fn write_f32(self, buf: &mut [u8], v: f32) {
        self.write_u32(buf, v.to_bits())
    }

    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            ByteOrder::Little => LittleEndian::write_u64(buf, v),
            ByteOrder::Big => BigEndian::write_u64(buf, v),
        }
    }

    pub fn write_f64(self, buf: &mut [u8], v: f64) {
        self.write_u64(buf, v.to_bits())
    }

    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        let mut b = [0u8; 2];
        self.write_u16(&mut b, v);
        b
    }

    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        let mut b = [0u8; 4];
        self.write_u32(&mut b, v);
        b
    }

    pub fn i32_bytes(self, v: i32) -> [u8; 4] {
        self.u32_bytes(v as u32)
    }

    /// Byte order of the machine this is running on.
    pub fn host() -> ByteOrder {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ByteOrder::Little => write!(f, "little endian"),
            ByteOrder::Big => write!(f, "big endian"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_u32() {
        let mut buf = [0u8; 4];
        ByteOrder::Big.write_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(ByteOrder::Big.read_u32(&buf), 0x0102_0304);
        assert_eq!(ByteOrder::Little.read_u32(&buf), 0x0403_0201);
    }

    #[test]
    fn flag_round_trip() {
        assert_eq!(ByteOrder::from_flag(0), ByteOrder::Little);
        assert_eq!(ByteOrder::from_flag(1), ByteOrder::Big);
        assert_eq!(ByteOrder::Big.flag(), 1);
        assert_eq!(ByteOrder::Little.flag(), 0);
    }

    #[test]
    fn negative_i16() {
        let mut buf = [0u8; 2];
        ByteOrder::Big.write_i16(&mut buf, -100);
        assert_eq!(ByteOrder::Big.read_i16(&buf), -100);
    }
}

use crate::byte_order::ByteOrder;
use crate::hptime::BTime;
use crate::mseed_error::MSeedError;

/// Size in bytes of the fixed section of data header.
pub const FSDH_LEN: usize = 48;

/// The fixed section of data header, the 48-byte prologue of every record.
/// Fields are kept in wire form; `Record` carries the cleaned-up values.
#[derive(Debug, Clone, Default)]
pub struct Fsdh {
    pub sequence_number: [u8; 6],
    pub dataquality: u8,
    pub reserved: u8,
    pub station: [u8; 5],
    pub location: [u8; 2],
    pub channel: [u8; 3],
    pub network: [u8; 2],
    pub start_time: BTime,
    pub numsamples: u16,
    pub samprate_fact: i16,
    pub samprate_mult: i16,
    pub act_flags: u8,
    pub io_flags: u8,
    pub dq_flags: u8,
    pub numblockettes: u8,
    /// Time correction in units of 1/10000 second.
    pub time_correct: i32,
    pub data_offset: u16,
    pub blockette_offset: u16,
}

/// Valid data record / quality indicator characters.
pub fn is_data_indicator(c: u8) -> bool {
    matches!(c, b'D' | b'R' | b'Q' | b'M')
}

/// Simple verification of a data record:
/// 1) first 6 characters are digits (sequence number)
/// 2) 7th character is a valid data record indicator
/// 3) 8th character is an ASCII space or NUL [not valid SEED]
pub fn is_valid_header(buf: &[u8]) -> bool {
    buf.len() >= 8
        && buf[0..6].iter().all(|b| b.is_ascii_digit())
        && is_data_indicator(buf[6])
        && (buf[7] == b' ' || buf[7] == 0)
}

/// Detect the header byte order by testing the start time year at offset 20:
/// a big endian read outside [1920, 2020] means the record is little endian.
pub fn detect_byte_order(buf: &[u8]) -> ByteOrder {
    let year = ByteOrder::Big.read_u16(&buf[20..22]);
    if (1920..=2020).contains(&year) {
        ByteOrder::Big
    } else {
        ByteOrder::Little
    }
}

impl Fsdh {
    /// Parse the fixed header at the start of `buf` in the given byte order.
    pub fn parse(buf: &[u8], order: ByteOrder) -> Result<Fsdh, MSeedError> {
        if buf.len() < FSDH_LEN {
            return Err(MSeedError::Truncated(FSDH_LEN, buf.len()));
        }
        let mut fsdh = Fsdh::default();
        fsdh.sequence_number.copy_from_slice(&buf[0..6]);
        fsdh.dataquality = buf[6];
        fsdh.reserved = buf[7];
        fsdh.station.copy_from_slice(&buf[8..13]);
        fsdh.location.copy_from_slice(&buf[13..15]);
        fsdh.channel.copy_from_slice(&buf[15..18]);
        fsdh.network.copy_from_slice(&buf[18..20]);
        fsdh.start_time = BTime::parse(&buf[20..30], order);
        fsdh.numsamples = order.read_u16(&buf[30..32]);
        fsdh.samprate_fact = order.read_i16(&buf[32..34]);
        fsdh.samprate_mult = order.read_i16(&buf[34..36]);
        fsdh.act_flags = buf[36];
        fsdh.io_flags = buf[37];
        fsdh.dq_flags = buf[38];
        fsdh.numblockettes = buf[39];
        fsdh.time_correct = order.read_i32(&buf[40..44]);
        fsdh.data_offset = order.read_u16(&buf[44..46]);
        fsdh.blockette_offset = order.read_u16(&buf[46..48]);
        Ok(fsdh)
    }

    /// Serialise the fixed header into the first 48 bytes of `buf`.
    pub fn write(&self, buf: &mut [u8], order: ByteOrder) -> Result<(), MSeedError> {
        if buf.len() < FSDH_LEN {
            return Err(MSeedError::Truncated(FSDH_LEN, buf.len()));
        }
        buf[0..6].copy_from_slice(&self.sequence_number);
        buf[6] = self.dataquality;
        buf[7] = self.reserved;
        buf[8..13].copy_from_slice(&self.station);
        buf[13..15].copy_from_slice(&self.location);
        buf[15..18].copy_from_slice(&self.channel);
        buf[18..20].copy_from_slice(&self.network);
        self.start_time.write(&mut buf[20..30], order);
        order.write_u16(&mut buf[30..32], self.numsamples);
        order.write_i16(&mut buf[32..34], self.samprate_fact);
        order.write_i16(&mut buf[34..36], self.samprate_mult);
        buf[36] = self.act_flags;
        buf[37] = self.io_flags;
        buf[38] = self.dq_flags;
        buf[39] = self.numblockettes;
        order.write_i32(&mut buf[40..44], self.time_correct);
        order.write_u16(&mut buf[44..46], self.data_offset);
        order.write_u16(&mut buf[46..48], self.blockette_offset);
        Ok(())
    }
}

/// Copy a fixed width header field to a String, removing all spaces and
/// stopping at the first NUL.
pub fn clean_field(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|&&b| b != b' ')
        .map(|&b| b as char)
        .collect()
}

/// Copy a string into a fixed width header field, space padded on the right
/// and never NUL terminated.
pub fn open_field(dest: &mut [u8], source: &str) {
    let bytes = source.as_bytes();
    for (i, slot) in dest.iter_mut().enumerate() {
        *slot = if i < bytes.len() { bytes[i] } else { b' ' };
    }
}

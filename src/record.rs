use log::{debug, warn};
use std::fmt;

use crate::blockette::{self, Blockette, BlocketteBody};
use crate::byte_order::ByteOrder;
use crate::data_encoding::DataEncoding;
use crate::header::{
    clean_field, detect_byte_order, is_data_indicator, is_valid_header, Fsdh, FSDH_LEN,
};
use crate::hptime::{nominal_sample_rate, HpTime, HPTMODULUS};
use crate::mseed_error::MSeedError;
use crate::samples::{decode_float32, decode_float64, decode_int16, decode_int32, Samples};
use crate::{steim1, steim2};

/// Smallest legal record length in bytes.
pub const MINRECLEN: usize = 128;

/// Largest legal record length in bytes.
pub const MAXRECLEN: usize = 1_048_576;

/// Decode-time and pack-time overrides, the explicit replacement for the
/// UNPACK_*/PACK_* environment variables of older tooling. Built once by the
/// front end and treated as immutable for the session.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Force interpretation of record headers as little or big endian.
    pub unpack_header_byteorder: Option<ByteOrder>,
    /// Force interpretation of data samples as little or big endian.
    pub unpack_data_byteorder: Option<ByteOrder>,
    /// Override the sample encoding regardless of Blockette 1000.
    pub unpack_data_format: Option<DataEncoding>,
    /// Encoding assumed when a record has no Blockette 1000. None makes such
    /// records an error.
    pub unpack_data_format_fallback: Option<DataEncoding>,
    /// Force the byte order of packed record headers.
    pub pack_header_byteorder: Option<ByteOrder>,
    /// Force the byte order of packed data samples.
    pub pack_data_byteorder: Option<ByteOrder>,
}

impl Default for CodecConfig {
    fn default() -> CodecConfig {
        CodecConfig {
            unpack_header_byteorder: None,
            unpack_data_byteorder: None,
            unpack_data_format: None,
            unpack_data_format_fallback: Some(DataEncoding::STEIM1),
            pack_header_byteorder: None,
            pack_data_byteorder: None,
        }
    }
}

impl CodecConfig {
    /// Build a config from the raw option values 0-33 / 0-1, failing early
    /// on anything out of range.
    pub fn from_values(
        unpack_header_byteorder: Option<u8>,
        unpack_data_byteorder: Option<u8>,
        unpack_data_format: Option<u8>,
        unpack_data_format_fallback: Option<u8>,
        pack_header_byteorder: Option<u8>,
        pack_data_byteorder: Option<u8>,
    ) -> Result<CodecConfig, MSeedError> {
        fn order(name: &str, v: Option<u8>) -> Result<Option<ByteOrder>, MSeedError> {
            match v {
                None => Ok(None),
                Some(b @ (0 | 1)) => Ok(Some(ByteOrder::from_flag(b))),
                Some(b) => Err(MSeedError::Config(format!(
                    "{} must be 0 or 1, not {}",
                    name, b
                ))),
            }
        }
        fn encoding(name: &str, v: Option<u8>) -> Result<Option<DataEncoding>, MSeedError> {
            match v {
                None => Ok(None),
                Some(e) if e <= 33 => Ok(Some(DataEncoding::from_int(e))),
                Some(e) => Err(MSeedError::Config(format!(
                    "{} set to invalid value {}",
                    name, e
                ))),
            }
        }
        Ok(CodecConfig {
            unpack_header_byteorder: order("unpack_header_byteorder", unpack_header_byteorder)?,
            unpack_data_byteorder: order("unpack_data_byteorder", unpack_data_byteorder)?,
            unpack_data_format: encoding("unpack_data_format", unpack_data_format)?,
            unpack_data_format_fallback: encoding(
                "unpack_data_format_fallback",
                unpack_data_format_fallback,
            )?
            .or(Some(DataEncoding::STEIM1)),
            pack_header_byteorder: order("pack_header_byteorder", pack_header_byteorder)?,
            pack_data_byteorder: order("pack_data_byteorder", pack_data_byteorder)?,
        })
    }
}

/// One decoded Mini-SEED record: the fixed header, the blockette chain and,
/// when requested, the decoded data samples.
#[derive(Debug, Clone)]
pub struct Record {
    pub sequence_number: u32,
    pub data_quality: char,
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    /// The fixed section of data header as read from, or written to, the wire.
    pub fsdh: Fsdh,
    pub blockettes: Vec<Blockette>,
    /// Record length in bytes, a power of two in [128, 1048576].
    pub reclen: usize,
    /// Byte order of the record header.
    pub header_byte_order: ByteOrder,
    /// Byte order of the data samples.
    pub byte_order: ByteOrder,
    pub encoding: DataEncoding,
    /// Derived start time of the first sample, time corrections applied.
    pub start_time: HpTime,
    /// Derived sample rate in Hz, Blockette 100 override applied.
    pub sample_rate: f64,
    /// Number of samples declared in the header.
    pub sample_count: u32,
    /// Decoded samples, present when decoding was requested.
    pub samples: Option<Samples>,
}

impl Record {
    /// Source name in `NET_STA_LOC_CHAN` form, optionally with the quality
    /// code appended.
    pub fn srcname(&self, with_quality: bool) -> String {
        if with_quality {
            format!(
                "{}_{}_{}_{}_{}",
                self.network, self.station, self.location, self.channel, self.data_quality
            )
        } else {
            format!(
                "{}_{}_{}_{}",
                self.network, self.station, self.location, self.channel
            )
        }
    }

    /// Time of the last sample in the record. This is the actual last sample
    /// time, not the end of the period it covers.
    pub fn end_time(&self) -> HpTime {
        if self.sample_rate > 0.0 && self.sample_count > 0 {
            let span = ((self.sample_count as f64 - 1.0) / self.sample_rate * HPTMODULUS as f64
                + 0.5) as i64;
            self.start_time + span
        } else {
            self.start_time
        }
    }

    /// Nominal sample rate from the header factor and multiplier, ignoring
    /// any Blockette 100.
    pub fn nominal_sample_rate(&self) -> f64 {
        nominal_sample_rate(self.fsdh.samprate_fact, self.fsdh.samprate_mult)
    }

    /// First blockette of the given type, if present.
    pub fn blockette(&self, blkt_type: u16) -> Option<&Blockette> {
        self.blockettes.iter().find(|b| b.blkt_type == blkt_type)
    }

    pub fn blockette_mut(&mut self, blkt_type: u16) -> Option<&mut Blockette> {
        self.blockettes.iter_mut().find(|b| b.blkt_type == blkt_type)
    }

    /// Number of samples actually decoded.
    pub fn decoded_sample_count(&self) -> usize {
        self.samples.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    /// A header template for packing new records: quality 'D', 4096-byte
    /// records, Steim-2 encoding, big endian, no blockettes beyond the
    /// Blockette 1000 the packer adds itself.
    pub fn template(
        network: &str,
        station: &str,
        location: &str,
        channel: &str,
        start_time: HpTime,
        sample_rate: f64,
    ) -> Record {
        Record {
            sequence_number: 1,
            data_quality: 'D',
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
            fsdh: Fsdh::default(),
            blockettes: Vec::new(),
            reclen: 4096,
            header_byte_order: ByteOrder::Big,
            byte_order: ByteOrder::Big,
            encoding: DataEncoding::STEIM2,
            start_time,
            sample_rate,
            sample_count: 0,
            samples: None,
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}, {:06}, {}, {}, {} samples, {:.10} Hz, {}",
            self.srcname(false),
            self.sequence_number,
            self.data_quality,
            self.reclen,
            self.sample_count,
            self.sample_rate,
            self.start_time
                .seed_string()
                .unwrap_or_else(|_| String::from("invalid time"))
        )
    }
}

/// Decode one record from `bytes`, which must hold at least `reclen` bytes.
/// When `want_samples` is false the data area is left undecoded and
/// `samples` is None.
pub fn decode_record(
    bytes: &[u8],
    reclen: usize,
    want_samples: bool,
    config: &CodecConfig,
) -> Result<Record, MSeedError> {
    if !(MINRECLEN..=MAXRECLEN).contains(&reclen) {
        return Err(MSeedError::OutOfRange(format!(
            "record length value {}",
            reclen
        )));
    }
    if bytes.len() < reclen {
        return Err(MSeedError::Truncated(reclen, bytes.len()));
    }
    let bytes = &bytes[..reclen];
    if !is_valid_header(bytes) {
        return Err(MSeedError::NotSeed(format!(
            "header indicator `{}`",
            bytes[6] as char
        )));
    }

    let header_order = config
        .unpack_header_byteorder
        .unwrap_or_else(|| detect_byte_order(bytes));
    let fsdh = Fsdh::parse(bytes, header_order)?;

    let sequence_number: u32 = clean_field(&fsdh.sequence_number).parse().unwrap_or(0);
    let network = clean_field(&fsdh.network);
    let station = clean_field(&fsdh.station);
    let location = clean_field(&fsdh.location);
    let channel = clean_field(&fsdh.channel);

    // Traverse the blockette chain
    let mut blockettes = Vec::new();
    let mut blkt_1000: Option<blockette::Blkt1000> = None;
    let mut blkt_offset = fsdh.blockette_offset as usize;
    while blkt_offset != 0 && blkt_offset + 4 <= reclen {
        let blkt_type = header_order.read_u16(&bytes[blkt_offset..blkt_offset + 2]);
        let next_offset = header_order.read_u16(&bytes[blkt_offset + 2..blkt_offset + 4]);

        let total_len = match blockette::wire_len(blkt_type) {
            Some(len) => len,
            None if blkt_type == 2000 => {
                if blkt_offset + 6 > reclen {
                    warn!("Blockette 2000 extends beyond record size, truncated?");
                    break;
                }
                header_order.read_u16(&bytes[blkt_offset + 4..blkt_offset + 6]) as usize
            }
            None if next_offset as usize > blkt_offset + 4 => {
                // keep unknown blockettes opaque, sized by the chain offsets
                next_offset as usize - blkt_offset
            }
            None => {
                warn!("Unknown blockette length for type {}", blkt_type);
                break;
            }
        };
        if total_len < 4 || blkt_offset + total_len > reclen {
            warn!("Blockette {} extends beyond record size, truncated?", blkt_type);
            break;
        }

        let body = &bytes[blkt_offset + 4..blkt_offset + total_len];
        let blkt = Blockette::parse_body(blkt_type, next_offset, body, header_order);
        if let BlocketteBody::B1000(ref b) = blkt.body {
            blkt_1000 = Some(b.clone());
        }
        blockettes.push(blkt);

        // The chain must move strictly forward and stay inside the record
        if next_offset != 0 && next_offset as usize <= blkt_offset {
            warn!(
                "Offset to next blockette ({}) from type {} did not increase",
                next_offset, blkt_type
            );
            break;
        } else if next_offset as usize > reclen {
            warn!(
                "Offset to next blockette ({}) from type {} is beyond record length",
                next_offset, blkt_type
            );
            break;
        }
        blkt_offset = next_offset as usize;
    }

    // Record length, encoding and sample byte order from Blockette 1000,
    // else from the configured fallback
    let mut byte_order = header_order;
    let mut encoding = None;
    match &blkt_1000 {
        Some(b) => {
            if b.reclen >= 32 {
                return Err(MSeedError::OutOfRange(format!(
                    "record length exponent value {}",
                    b.reclen
                )));
            }
            let blkt_reclen = 1usize << b.reclen;
            if blkt_reclen != reclen {
                return Err(MSeedError::WrongLength(blkt_reclen, reclen));
            }
            byte_order = ByteOrder::from_flag(b.byteorder);
            encoding = Some(DataEncoding::from_int(b.encoding));
        }
        None => {
            debug!(
                "No Blockette 1000 found: {}_{}_{}_{}",
                network, station, location, channel
            );
        }
    }

    if let Some(forced) = config.unpack_data_byteorder {
        byte_order = forced;
    }
    if let Some(forced) = config.unpack_data_format {
        encoding = Some(forced);
    }
    let encoding = match encoding {
        Some(e) => e,
        None => match config.unpack_data_format_fallback {
            Some(fallback) => {
                // the fallback implies big endian data unless forced otherwise
                if config.unpack_data_byteorder.is_none() {
                    byte_order = ByteOrder::Big;
                }
                fallback
            }
            None => {
                return Err(MSeedError::NoBlkt1000(format!(
                    "{}_{}_{}_{}",
                    network, station, location, channel
                )))
            }
        },
    };

    // Derived start time: BTime plus unapplied time correction plus the
    // Blockette 1001 microsecond offset
    let mut start_time = fsdh.start_time.to_hptime()?;
    if fsdh.time_correct != 0 && (fsdh.act_flags & 0x02) == 0 {
        start_time = start_time + fsdh.time_correct as i64 * (HPTMODULUS / 10_000);
    }
    if let Some(b1001) = blockettes.iter().find_map(|b| match &b.body {
        BlocketteBody::B1001(b) => Some(b),
        _ => None,
    }) {
        start_time = start_time + b1001.usec as i64 * (HPTMODULUS / 1_000_000);
    }

    // Derived rate: Blockette 100 actual rate wins over the nominal one
    let sample_rate = match blockettes.iter().find_map(|b| match &b.body {
        BlocketteBody::B100(b) => Some(b),
        _ => None,
    }) {
        Some(b100) => b100.samprate as f64,
        None => nominal_sample_rate(fsdh.samprate_fact, fsdh.samprate_mult),
    };

    let mut record = Record {
        sequence_number,
        data_quality: fsdh.dataquality as char,
        network,
        station,
        location,
        channel,
        reclen,
        header_byte_order: header_order,
        byte_order,
        encoding,
        start_time,
        sample_rate,
        sample_count: fsdh.numsamples as u32,
        samples: None,
        blockettes,
        fsdh,
    };

    if want_samples && record.sample_count > 0 {
        record.samples = Some(decode_data(&record, bytes)?);
        if record.decoded_sample_count() != record.sample_count as usize {
            warn!(
                "{}: decoded {} of {} samples",
                record.srcname(false),
                record.decoded_sample_count(),
                record.sample_count
            );
        }
    }

    Ok(record)
}

/// Decode the sample data area of a record per its encoding.
fn decode_data(record: &Record, bytes: &[u8]) -> Result<Samples, MSeedError> {
    let data_offset = record.fsdh.data_offset as usize;
    if data_offset < FSDH_LEN || data_offset >= record.reclen {
        return Err(MSeedError::OutOfRange(format!(
            "data offset value {}",
            data_offset
        )));
    }
    let dbuf = &bytes[data_offset..record.reclen];
    let count = record.sample_count as usize;
    let order = record.byte_order;

    debug!("unpacking {} samples as {}", count, record.encoding);

    match record.encoding {
        DataEncoding::ASCII => {
            let n = count.min(dbuf.len());
            Ok(Samples::Ascii(dbuf[..n].to_vec()))
        }
        DataEncoding::INT16 => Ok(Samples::Int32(decode_int16(dbuf, count, order))),
        DataEncoding::INT32 => Ok(Samples::Int32(decode_int32(dbuf, count, order))),
        DataEncoding::FLOAT32 => Ok(Samples::Float32(decode_float32(dbuf, count, order))),
        DataEncoding::FLOAT64 => Ok(Samples::Float64(decode_float64(dbuf, count, order))),
        DataEncoding::STEIM1 => Ok(Samples::Int32(steim1::decode(dbuf, count, order)?)),
        DataEncoding::STEIM2 => Ok(Samples::Int32(steim2::decode(dbuf, count, order)?)),
        DataEncoding::UNKNOWN(v) => Err(MSeedError::UnknownFormat(v)),
    }
}

/// True when byte 7 of a record buffer marks a data record.
pub fn record_is_data(bytes: &[u8]) -> bool {
    bytes.len() > 6 && is_data_indicator(bytes[6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(CodecConfig::from_values(Some(2), None, None, None, None, None).is_err());
        assert!(CodecConfig::from_values(None, None, Some(34), None, None, None).is_err());
        let config = CodecConfig::from_values(Some(1), None, None, None, None, None).unwrap();
        assert_eq!(config.unpack_header_byteorder, Some(ByteOrder::Big));
        assert_eq!(
            config.unpack_data_format_fallback,
            Some(DataEncoding::STEIM1)
        );
    }

    #[test]
    fn reject_not_seed() {
        let config = CodecConfig::default();
        let buf = vec![b'x'; 512];
        assert!(matches!(
            decode_record(&buf, 512, false, &config),
            Err(MSeedError::NotSeed(_))
        ));
    }

    #[test]
    fn reject_bad_reclen() {
        let config = CodecConfig::default();
        let buf = vec![0u8; 64];
        assert!(matches!(
            decode_record(&buf, 64, false, &config),
            Err(MSeedError::OutOfRange(_))
        ));
    }
}

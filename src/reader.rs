use log::{debug, warn};
use std::io::Read;

use crate::header::{detect_byte_order, is_valid_header, FSDH_LEN};
use crate::mseed_error::MSeedError;
use crate::record::{decode_record, record_is_data, CodecConfig, Record, MAXRECLEN, MINRECLEN};

/// How far into a stream the record length search will look.
const MAX_DETECT_LEN: usize = 8192;

/// First probe size for record length detection.
const MIN_DETECT_LEN: usize = 256;

/// The legacy pack-file container identifiers. Each data block inside the
/// container is preceded by an info block of type-dependent length whose
/// final 8 ASCII digits give the block size, then an 8-byte checksum which
/// is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackIdentifier {
    Ped,
    Psd,
    Plc,
    Pqi,
}

impl PackIdentifier {
    pub fn from_bytes(bytes: &[u8]) -> Option<PackIdentifier> {
        match bytes.get(0..3)? {
            b"PED" => Some(PackIdentifier::Ped),
            b"PSD" => Some(PackIdentifier::Psd),
            b"PLC" => Some(PackIdentifier::Plc),
            b"PQI" => Some(PackIdentifier::Pqi),
            _ => None,
        }
    }

    /// Length in bytes of the info block before each data block.
    pub fn info_len(self) -> usize {
        match self {
            PackIdentifier::Ped => 8,
            PackIdentifier::Psd => 11,
            PackIdentifier::Plc => 13,
            PackIdentifier::Pqi => 15,
        }
    }
}

struct Envelope {
    kind: PackIdentifier,
    /// Bytes left in the current data block.
    remaining: u64,
}

/// Options for a [`Reader`].
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Fixed record length in bytes; None autodetects from the first record.
    pub reclen: Option<usize>,
    /// Skip chunks without a valid data record indicator instead of failing.
    pub skip_not_data: bool,
    /// Decode data samples along with the headers.
    pub want_samples: bool,
    pub codec: CodecConfig,
}

impl Default for ReaderConfig {
    fn default() -> ReaderConfig {
        ReaderConfig {
            reclen: None,
            skip_not_data: false,
            want_samples: true,
            codec: CodecConfig::default(),
        }
    }
}

/// A streaming Mini-SEED record reader. Owns its input and one read buffer;
/// it never seeks, so the input may be a pipe. One instance reads one
/// stream; concurrent streams need separate instances. Dropping the reader
/// releases the buffer and the input.
pub struct Reader<R: Read> {
    input: R,
    config: ReaderConfig,
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
    started: bool,
    reclen: usize,
    offset: u64,
    record_count: u64,
    envelope: Option<Envelope>,
}

impl<R: Read> Reader<R> {
    pub fn new(input: R, config: ReaderConfig) -> Reader<R> {
        Reader {
            input,
            config,
            buf: Vec::new(),
            pos: 0,
            eof: false,
            started: false,
            reclen: 0,
            offset: 0,
            record_count: 0,
            envelope: None,
        }
    }

    /// Byte offset of the next unread byte in the stream.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Number of records returned so far.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// The detected or configured record length, 0 while still detecting.
    pub fn reclen(&self) -> usize {
        self.reclen
    }

    /// Recover the underlying input.
    pub fn into_inner(self) -> R {
        self.input
    }

    /// Read the next record. `Ok(None)` signals a clean end of stream at a
    /// record boundary; a partial trailing record is a `Truncated` error.
    pub fn next_record(&mut self) -> Result<Option<Record>, MSeedError> {
        loop {
            if !self.started {
                self.started = true;
                if self.fill(10)? >= 10 {
                    if let Some(kind) = PackIdentifier::from_bytes(self.peek(3)) {
                        debug!("detected {:?} pack envelope", kind);
                        self.consume(10);
                        self.envelope = Some(Envelope { kind, remaining: 0 });
                    }
                }
            }

            // At a pack envelope block boundary read the next info block
            if let Some(kind) = self.envelope.as_ref().map(|e| e.kind) {
                if self.envelope.as_ref().unwrap().remaining == 0 {
                    let need = kind.info_len() + 8;
                    let avail = self.fill(need)?;
                    if avail == 0 {
                        return Ok(None);
                    }
                    if avail < need {
                        return Err(MSeedError::Truncated(need, avail));
                    }
                    let info = self.peek(kind.info_len());
                    let size = parse_block_size(&info[kind.info_len() - 8..])?;
                    self.consume(need); // info block plus checksum
                    if size == 0 {
                        // a zero length data block ends the stream
                        return Ok(None);
                    }
                    self.envelope.as_mut().unwrap().remaining = size;
                }
            }

            if self.reclen == 0 {
                match self.config.reclen {
                    Some(len) => {
                        if !(MINRECLEN..=MAXRECLEN).contains(&len) || !len.is_power_of_two() {
                            return Err(MSeedError::OutOfRange(format!(
                                "record length value {}",
                                len
                            )));
                        }
                        self.reclen = len;
                    }
                    None => match self.detect_reclen()? {
                        Some(len) => {
                            debug!("detected record length of {} bytes", len);
                            self.reclen = len;
                        }
                        None => return Ok(None),
                    },
                }
            }

            let avail = self.fill(self.reclen)?;
            if avail == 0 {
                return Ok(None);
            }
            if avail < self.reclen {
                return Err(MSeedError::Truncated(self.reclen, avail));
            }

            if self.config.skip_not_data && !record_is_data(self.peek(self.reclen)) {
                debug!("skipped non-data record at byte offset {}", self.offset);
                self.consume_record();
                continue;
            }

            let result = decode_record(
                self.peek(self.reclen),
                self.reclen,
                self.config.want_samples,
                &self.config.codec,
            );
            self.consume_record();
            self.record_count += 1;
            return result.map(Some);
        }
    }

    /// Locate the record length of the stream's first record: grow a probe
    /// buffer from 256 to 8192 bytes, looking for a Blockette 1000 and
    /// falling back to testing whether the bytes following the probe form
    /// another fixed header.
    fn detect_reclen(&mut self) -> Result<Option<usize>, MSeedError> {
        let mut probe = MIN_DETECT_LEN;
        loop {
            let mut want = probe + FSDH_LEN;
            if let Some(env) = &self.envelope {
                want = want.min(env.remaining as usize);
            }
            let avail = self.fill(want)?;
            if avail == 0 {
                return Ok(None);
            }
            if avail < FSDH_LEN {
                return Err(MSeedError::Truncated(FSDH_LEN, avail));
            }
            let buf = &self.buf[self.pos..];

            if !is_valid_header(buf) {
                if self.config.skip_not_data {
                    debug!("skipped non-data chunk at byte offset {}", self.offset);
                    let skip = MIN_DETECT_LEN.min(avail);
                    self.consume(skip);
                    if let Some(env) = &mut self.envelope {
                        env.remaining = env.remaining.saturating_sub(skip as u64);
                    }
                    continue;
                }
                return Err(MSeedError::NotSeed(String::from(
                    "no data record at start of stream",
                )));
            }

            if let Some(reclen) = find_reclen_blkt1000(&buf[..avail.min(probe)]) {
                if !(MINRECLEN..=MAXRECLEN).contains(&reclen) {
                    return Err(MSeedError::OutOfRange(format!(
                        "detected record length value {}",
                        reclen
                    )));
                }
                return Ok(Some(reclen));
            }

            // No Blockette 1000 in reach: if another plausible fixed header
            // sits right after the probe, the probe length is the record
            // length
            if avail >= probe + FSDH_LEN && is_valid_header(&buf[probe..probe + FSDH_LEN]) {
                return Ok(Some(probe));
            }

            if probe >= MAX_DETECT_LEN {
                return Err(MSeedError::NotSeed(String::from(
                    "cannot detect record length",
                )));
            }
            probe *= 2;
        }
    }

    fn consume_record(&mut self) {
        let len = self.reclen;
        self.consume(len);
        if let Some(env) = &mut self.envelope {
            if (env.remaining as usize) < len {
                warn!("record crosses pack envelope block boundary");
            }
            env.remaining = env.remaining.saturating_sub(len as u64);
        }
    }

    fn fill(&mut self, want: usize) -> Result<usize, MSeedError> {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        let mut chunk = [0u8; 8192];
        while self.buf.len() - self.pos < want && !self.eof {
            let n = self.input.read(&mut chunk)?;
            if n == 0 {
                self.eof = true;
            } else {
                self.buf.extend_from_slice(&chunk[..n]);
            }
        }
        Ok(self.buf.len() - self.pos)
    }

    fn peek(&self, len: usize) -> &[u8] {
        &self.buf[self.pos..self.pos + len]
    }

    fn consume(&mut self, len: usize) {
        self.pos += len;
        self.offset += len as u64;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos >= 65536 {
            self.buf.drain(0..self.pos);
            self.pos = 0;
        }
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Record, MSeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Walk the blockette chain of the fixed header at the start of `buf`
/// looking for a Blockette 1000 and return the record length it declares.
fn find_reclen_blkt1000(buf: &[u8]) -> Option<usize> {
    let order = detect_byte_order(buf);
    let mut blkt_offset = order.read_u16(&buf[46..48]) as usize;
    while blkt_offset != 0 && blkt_offset + 8 <= buf.len() {
        let blkt_type = order.read_u16(&buf[blkt_offset..blkt_offset + 2]);
        let next = order.read_u16(&buf[blkt_offset + 2..blkt_offset + 4]) as usize;
        if blkt_type == 1000 {
            let exp = buf[blkt_offset + 6];
            if exp >= 32 {
                return None;
            }
            return Some(1usize << exp);
        }
        if next <= blkt_offset {
            break;
        }
        blkt_offset = next;
    }
    None
}

/// The trailing 8 ASCII digits of a pack envelope info block give the next
/// data block size in bytes.
fn parse_block_size(digits: &[u8]) -> Result<u64, MSeedError> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            MSeedError::OutOfRange(format!(
                "pack envelope block size `{}`",
                String::from_utf8_lossy(digits)
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_identifier_lookup() {
        assert_eq!(PackIdentifier::from_bytes(b"PED"), Some(PackIdentifier::Ped));
        assert_eq!(PackIdentifier::from_bytes(b"PQI"), Some(PackIdentifier::Pqi));
        assert_eq!(PackIdentifier::from_bytes(b"000"), None);
        assert_eq!(PackIdentifier::Psd.info_len(), 11);
        assert_eq!(PackIdentifier::Plc.info_len(), 13);
    }

    #[test]
    fn block_size_digits() {
        assert_eq!(parse_block_size(b"00004096").unwrap(), 4096);
        assert_eq!(parse_block_size(b"   512  ").unwrap(), 512);
        assert!(parse_block_size(b"xxxxxxxx").is_err());
    }

    #[test]
    fn empty_stream_is_clean_eof() {
        let mut reader = Reader::new(std::io::empty(), ReaderConfig::default());
        assert!(matches!(reader.next_record(), Ok(None)));
    }

    #[test]
    fn garbage_stream_is_not_seed() {
        let data = vec![0u8; 9000];
        let mut reader = Reader::new(&data[..], ReaderConfig::default());
        assert!(matches!(reader.next_record(), Err(MSeedError::NotSeed(_))));
    }
}

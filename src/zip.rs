//! Streaming ZIP archive writer. The output stream does not need to be
//! seekable: streaming entries carry the general purpose flag bit 3 and a
//! trailing data descriptor instead of sizes in the local header, and ZIP64
//! structures are added when offsets pass 32 bits. Entries compress with a
//! raw deflate stream or are stored verbatim.

use chrono::{DateTime, Datelike, Timelike, Utc};
use crc::{Crc, Digest, CRC_32_ISO_HDLC};
use flate2::{Compress, Compression, FlushCompress, Status};
use log::debug;
use std::io::Write;

use crate::mseed_error::MSeedError;

/// CRC-32 used for ZIP entry checksums.
pub static CRC32_ZIP: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Maximum single write to the underlying stream, 1 MiB. Larger buffers are
/// split.
pub const MAX_WRITE_SIZE: usize = 1_048_576;

const LOCAL_HEADER_SIG: u32 = 0x04034b50;
const DATA_DESCRIPTION_SIG: u32 = 0x08074b50;
const CENTRAL_HEADER_SIG: u32 = 0x02014b50;
const ZIP64_END_RECORD_SIG: u32 = 0x06064b50;
const ZIP64_END_LOCATOR_SIG: u32 = 0x07064b50;
const END_HEADER_SIG: u32 = 0x06054b50;

/// DOS time start date is January 1, 1980.
const DOSTIME_STARTDATE: u32 = 0x0021_0000;

/// Entry compression methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZipMethod {
    Store,
    Deflate,
}

impl ZipMethod {
    fn code(self) -> u16 {
        match self {
            ZipMethod::Store => 0,
            ZipMethod::Deflate => 8,
        }
    }
}

#[derive(Clone)]
struct EntryMeta {
    name: String,
    general_flag: u16,
    method: ZipMethod,
    dos_date: u16,
    dos_time: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

struct EntryState {
    meta: EntryMeta,
    digest: Digest<'static, u32>,
    compressor: Option<Compress>,
}

/// Little-endian field packer for the fixed parts of ZIP records.
#[derive(Default)]
struct RecordBuf {
    buf: Vec<u8>,
}

impl RecordBuf {
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }
}

/// A ZIP archive being written to `out`. One entry is open at a time; the
/// archive must be completed with [`ZipStream::finish`]. A second archive
/// requires a second instance.
pub struct ZipStream<W: Write> {
    out: W,
    offset: u64,
    entries: Vec<EntryMeta>,
    current: Option<EntryState>,
}

impl<W: Write> ZipStream<W> {
    pub fn new(out: W) -> ZipStream<W> {
        ZipStream {
            out,
            offset: 0,
            entries: Vec::new(),
            current: None,
        }
    }

    /// Bytes written to the output so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Write a whole in-memory buffer as one archive entry. Individual
    /// entries cannot exceed 4 GiB.
    pub fn write_entry(
        &mut self,
        name: &str,
        modtime: DateTime<Utc>,
        method: ZipMethod,
        data: &[u8],
    ) -> Result<(), MSeedError> {
        if self.current.is_some() {
            return Err(MSeedError::Config(String::from(
                "cannot write an entry while another entry is open",
            )));
        }
        if data.len() as u64 > u32::MAX as u64 {
            return Err(MSeedError::OutOfRange(format!(
                "entry {} exceeds the 4 GiB single entry limit",
                name
            )));
        }
        let mut meta = new_meta(name, modtime, method, self.offset);

        let mut digest = CRC32_ZIP.digest();
        digest.update(data);
        meta.crc32 = digest.finalize();
        meta.uncompressed_size = data.len() as u64;

        let body = match method {
            ZipMethod::Store => data.to_vec(),
            ZipMethod::Deflate => {
                let mut compressor = raw_deflate();
                let mut body = Vec::new();
                deflate_into(&mut compressor, data, true, &mut body)?;
                body
            }
        };
        meta.compressed_size = body.len() as u64;

        self.write_local_header(&meta)?;
        self.write_data(&body)?;
        self.entries.push(meta);
        Ok(())
    }

    /// Begin a streaming entry: the local header goes out with zeroed CRC
    /// and sizes and general purpose flag bit 3 set; a data descriptor
    /// completes the entry in [`ZipStream::end_entry`].
    pub fn begin_entry(
        &mut self,
        name: &str,
        modtime: DateTime<Utc>,
        method: ZipMethod,
    ) -> Result<(), MSeedError> {
        if self.current.is_some() {
            return Err(MSeedError::Config(String::from(
                "cannot begin an entry while another entry is open",
            )));
        }
        let mut meta = new_meta(name, modtime, method, self.offset);
        meta.general_flag |= 1 << 3; // streaming, sizes in the descriptor

        self.write_local_header(&meta)?;
        self.current = Some(EntryState {
            meta,
            digest: CRC32_ZIP.digest(),
            compressor: match method {
                ZipMethod::Store => None,
                ZipMethod::Deflate => Some(raw_deflate()),
            },
        });
        Ok(())
    }

    /// Feed a chunk of entry data. Set `final_chunk` on the last call so
    /// the compressor can flush.
    pub fn entry_data(&mut self, data: &[u8], final_chunk: bool) -> Result<(), MSeedError> {
        let mut state = self.current.take().ok_or_else(|| {
            MSeedError::Config(String::from("no entry is open for data"))
        })?;
        state.digest.update(data);
        state.meta.uncompressed_size += data.len() as u64;
        match &mut state.compressor {
            None => {
                state.meta.compressed_size += data.len() as u64;
                self.write_data(data)?;
            }
            Some(compressor) => {
                let mut body = Vec::new();
                deflate_into(compressor, data, final_chunk, &mut body)?;
                state.meta.compressed_size += body.len() as u64;
                self.write_data(&body)?;
            }
        }
        self.current = Some(state);
        Ok(())
    }

    /// Finish the open entry with its data descriptor.
    pub fn end_entry(&mut self) -> Result<(), MSeedError> {
        let state = self.current.take().ok_or_else(|| {
            MSeedError::Config(String::from("no entry is open to end"))
        })?;
        let mut meta = state.meta;
        meta.crc32 = state.digest.finalize();

        let mut rec = RecordBuf::default();
        rec.u32(DATA_DESCRIPTION_SIG);
        rec.u32(meta.crc32);
        rec.u32(meta.compressed_size as u32);
        rec.u32(meta.uncompressed_size as u32);
        self.write_data(&rec.buf)?;

        self.entries.push(meta);
        Ok(())
    }

    /// Write the central directory, ZIP64 records when offsets require them
    /// and the end of central directory record. Returns the underlying
    /// writer.
    pub fn finish(mut self) -> Result<W, MSeedError> {
        if self.current.is_some() {
            return Err(MSeedError::Config(String::from(
                "an entry is still open at finish",
            )));
        }
        let cd_offset = self.offset;

        let entries = std::mem::take(&mut self.entries);
        for meta in &entries {
            let zip64 = meta.local_header_offset > u32::MAX as u64;
            let mut rec = RecordBuf::default();
            rec.u32(CENTRAL_HEADER_SIG);
            rec.u16(0); // version made by
            rec.u16(20); // version needed to extract (2.0)
            rec.u16(meta.general_flag);
            rec.u16(meta.method.code());
            rec.u16(meta.dos_time);
            rec.u16(meta.dos_date);
            rec.u32(meta.crc32);
            rec.u32(meta.compressed_size as u32);
            rec.u32(meta.uncompressed_size as u32);
            rec.u16(meta.name.len() as u16);
            rec.u16(if zip64 { 12 } else { 0 }); // extra field length
            rec.u16(0); // comment length
            rec.u16(0); // disk number start
            rec.u16(0); // internal file attributes
            rec.u32(0); // external file attributes
            rec.u32(if zip64 {
                u32::MAX
            } else {
                meta.local_header_offset as u32
            });
            rec.bytes(meta.name.as_bytes());
            if zip64 {
                rec.u16(1); // ZIP64 extra field id
                rec.u16(8);
                rec.u64(meta.local_header_offset);
            }
            self.write_data(&rec.buf)?;
        }

        let cd_size = self.offset - cd_offset;

        if cd_offset > u32::MAX as u64 {
            let zip64_end_offset = self.offset;
            let mut rec = RecordBuf::default();
            rec.u32(ZIP64_END_RECORD_SIG);
            rec.u64(44); // size of this record after this field
            rec.u16(30); // version made by
            rec.u16(45); // version needed to extract
            rec.u32(0); // number of this disk
            rec.u32(0); // disk with the start of the central directory
            rec.u64(entries.len() as u64);
            rec.u64(entries.len() as u64);
            rec.u64(cd_size);
            rec.u64(cd_offset);
            self.write_data(&rec.buf)?;

            let mut rec = RecordBuf::default();
            rec.u32(ZIP64_END_LOCATOR_SIG);
            rec.u32(0);
            rec.u64(zip64_end_offset);
            rec.u32(1); // total number of disks
            self.write_data(&rec.buf)?;
        }

        let mut rec = RecordBuf::default();
        rec.u32(END_HEADER_SIG);
        rec.u16(0); // number of this disk
        rec.u16(0); // disk with the central directory
        rec.u16(entries.len() as u16);
        rec.u16(entries.len() as u16);
        rec.u32(cd_size as u32);
        rec.u32(if cd_offset > u32::MAX as u64 {
            u32::MAX
        } else {
            cd_offset as u32
        });
        rec.u16(0); // comment length
        self.write_data(&rec.buf)?;

        debug!(
            "finished ZIP archive, {} entries, {} bytes",
            entries.len(),
            self.offset
        );
        Ok(self.out)
    }

    fn write_local_header(&mut self, meta: &EntryMeta) -> Result<(), MSeedError> {
        let streaming = meta.general_flag & (1 << 3) != 0;
        let mut rec = RecordBuf::default();
        rec.u32(LOCAL_HEADER_SIG);
        rec.u16(20); // version needed to extract (2.0)
        rec.u16(meta.general_flag);
        rec.u16(meta.method.code());
        rec.u16(meta.dos_time);
        rec.u16(meta.dos_date);
        rec.u32(if streaming { 0 } else { meta.crc32 });
        rec.u32(if streaming { 0 } else { meta.compressed_size as u32 });
        rec.u32(if streaming { 0 } else { meta.uncompressed_size as u32 });
        rec.u16(meta.name.len() as u16);
        rec.u16(0); // extra field length
        rec.bytes(meta.name.as_bytes());
        self.write_data(&rec.buf)
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<(), MSeedError> {
        for chunk in buf.chunks(MAX_WRITE_SIZE) {
            self.out.write_all(chunk)?;
            self.offset += chunk.len() as u64;
        }
        Ok(())
    }
}

fn new_meta(name: &str, modtime: DateTime<Utc>, method: ZipMethod, offset: u64) -> EntryMeta {
    let dos = dos_datetime(modtime);
    EntryMeta {
        name: name.to_string(),
        general_flag: 0,
        method,
        dos_date: (dos >> 16) as u16,
        dos_time: (dos & 0xFFFF) as u16,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        local_header_offset: offset,
    }
}

fn raw_deflate() -> Compress {
    // negative window bits equivalent: raw deflate stream without a zlib
    // header, default compression parameters
    Compress::new(Compression::default(), false)
}

/// Run a chunk of input through the deflate stream, appending output to
/// `out`. With `finish` the stream is flushed to completion.
fn deflate_into(
    compressor: &mut Compress,
    input: &[u8],
    finish: bool,
    out: &mut Vec<u8>,
) -> Result<(), MSeedError> {
    let mut consumed = 0usize;
    loop {
        out.reserve(32 * 1024);
        let before_in = compressor.total_in();
        let before_out = compressor.total_out();
        let flush = if finish && consumed >= input.len() {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let status = compressor
            .compress_vec(&input[consumed..], out, flush)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        consumed += (compressor.total_in() - before_in) as usize;
        let produced = (compressor.total_out() - before_out) as usize;
        match status {
            Status::StreamEnd => return Ok(()),
            _ => {
                if consumed >= input.len() && !finish && produced == 0 {
                    return Ok(());
                }
            }
        }
    }
}

/// Convert a UTC time to the packed 4-byte DOS date and time, clamping
/// anything before 1980 to the DOS epoch.
fn dos_datetime(t: DateTime<Utc>) -> u32 {
    let year = t.year();
    if year < 1980 {
        return DOSTIME_STARTDATE;
    }
    ((year as u32 - 1980) << 25)
        | (t.month() << 21)
        | (t.day() << 16)
        | (t.hour() << 11)
        | (t.minute() << 5)
        | (t.second() >> 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn modtime() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 9, 28, 12, 30, 2).unwrap()
    }

    fn le32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
    }

    fn le16(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes(buf[at..at + 2].try_into().unwrap())
    }

    #[test]
    fn dos_time_fields() {
        let dos = dos_datetime(modtime());
        assert_eq!(dos >> 25, 2013 - 1980);
        assert_eq!((dos >> 21) & 0xF, 9);
        assert_eq!((dos >> 16) & 0x1F, 28);
        assert_eq!((dos >> 11) & 0x1F, 12);
        assert_eq!((dos >> 5) & 0x3F, 30);
        assert_eq!(dos & 0x1F, 1); // seconds halved
        assert_eq!(
            dos_datetime(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()),
            DOSTIME_STARTDATE
        );
    }

    #[test]
    fn stored_entry_layout() {
        let mut zs = ZipStream::new(Vec::new());
        zs.write_entry("a.txt", modtime(), ZipMethod::Store, b"hello world")
            .unwrap();
        let out = zs.finish().unwrap();

        assert_eq!(le32(&out, 0), LOCAL_HEADER_SIG);
        assert_eq!(le16(&out, 8), 0); // store method
        assert_eq!(le32(&out, 14), CRC32_ZIP.checksum(b"hello world"));
        assert_eq!(le32(&out, 18), 11); // compressed size
        assert_eq!(le32(&out, 22), 11); // uncompressed size
        assert_eq!(le16(&out, 26), 5); // name length
        assert_eq!(&out[30..35], b"a.txt");
        assert_eq!(&out[35..46], b"hello world");
        // central directory follows the body
        assert_eq!(le32(&out, 46), CENTRAL_HEADER_SIG);
        // end of central directory is the last 22 bytes
        let eocd = out.len() - 22;
        assert_eq!(le32(&out, eocd), END_HEADER_SIG);
        assert_eq!(le16(&out, eocd + 10), 1); // total entries
        assert_eq!(le32(&out, eocd + 16), 46); // central directory offset
    }

    #[test]
    fn deflated_entry_round_trip() {
        let payload: Vec<u8> = (0..10_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let mut zs = ZipStream::new(Vec::new());
        zs.write_entry("data.bin", modtime(), ZipMethod::Deflate, &payload)
            .unwrap();
        let out = zs.finish().unwrap();
        assert_eq!(le16(&out, 8), 8); // deflate method
        let csize = le32(&out, 18) as usize;
        assert!(csize < payload.len());
        let name_len = le16(&out, 26) as usize;
        let body = &out[30 + name_len..30 + name_len + csize];
        let mut decoder = DeflateDecoder::new(body);
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
        assert_eq!(le32(&out, 14), CRC32_ZIP.checksum(&payload));
    }

    #[test]
    fn streaming_entry_descriptor() {
        let mut zs = ZipStream::new(Vec::new());
        zs.begin_entry("s.bin", modtime(), ZipMethod::Store).unwrap();
        zs.entry_data(b"chunk one ", false).unwrap();
        zs.entry_data(b"chunk two", true).unwrap();
        zs.end_entry().unwrap();
        let out = zs.finish().unwrap();

        // streaming flag bit 3, zeroed sizes in the local header
        assert_eq!(le16(&out, 6) & (1 << 3), 1 << 3);
        assert_eq!(le32(&out, 14), 0);
        assert_eq!(le32(&out, 18), 0);
        let body_start = 30 + 5;
        assert_eq!(&out[body_start..body_start + 19], b"chunk one chunk two");
        // data descriptor right after the body
        let dd = body_start + 19;
        assert_eq!(le32(&out, dd), DATA_DESCRIPTION_SIG);
        assert_eq!(le32(&out, dd + 4), CRC32_ZIP.checksum(b"chunk one chunk two"));
        assert_eq!(le32(&out, dd + 8), 19);
        assert_eq!(le32(&out, dd + 12), 19);
        // central directory carries the real values
        let cd = dd + 16;
        assert_eq!(le32(&out, cd), CENTRAL_HEADER_SIG);
        assert_eq!(le32(&out, cd + 16), CRC32_ZIP.checksum(b"chunk one chunk two"));
    }

    #[test]
    fn streaming_deflate_round_trip() {
        let payload: Vec<u8> = (0..50_000u32).flat_map(|i| (i % 13).to_le_bytes()).collect();
        let mut zs = ZipStream::new(Vec::new());
        zs.begin_entry("d.bin", modtime(), ZipMethod::Deflate).unwrap();
        for (i, chunk) in payload.chunks(7000).enumerate() {
            let last = (i + 1) * 7000 >= payload.len();
            zs.entry_data(chunk, last).unwrap();
        }
        zs.end_entry().unwrap();
        let out = zs.finish().unwrap();

        let name_len = le16(&out, 26) as usize;
        let body_start = 30 + name_len;
        // compressed size from the data descriptor, found via the central
        // directory's compressed size field
        let mut csize = None;
        // scan for the descriptor signature after the body start
        for at in body_start..out.len() - 16 {
            if le32(&out, at) == DATA_DESCRIPTION_SIG
                && le32(&out, at + 12) == payload.len() as u32
            {
                csize = Some(at - body_start);
                break;
            }
        }
        let csize = csize.expect("data descriptor not found");
        let mut decoder = DeflateDecoder::new(&out[body_start..body_start + csize]);
        let mut back = Vec::new();
        decoder.read_to_end(&mut back).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn second_entry_offset_in_directory() {
        let mut zs = ZipStream::new(Vec::new());
        zs.write_entry("a", modtime(), ZipMethod::Store, b"xxxx").unwrap();
        let second_offset = zs.offset();
        zs.write_entry("b", modtime(), ZipMethod::Store, b"yyyy").unwrap();
        let cd_offset = zs.offset();
        let out = zs.finish().unwrap();

        // second central directory header points at the second local header
        let first_cd_len = 46 + 1;
        assert_eq!(le32(&out, cd_offset as usize + first_cd_len), CENTRAL_HEADER_SIG);
        assert_eq!(
            le32(&out, cd_offset as usize + first_cd_len + 42),
            second_offset as u32
        );
        let eocd = out.len() - 22;
        assert_eq!(le16(&out, eocd + 10), 2);
    }

    #[test]
    fn open_entry_blocks_finish() {
        let mut zs = ZipStream::new(Vec::new());
        zs.begin_entry("open", modtime(), ZipMethod::Store).unwrap();
        assert!(matches!(zs.finish(), Err(MSeedError::Config(_))));
    }
}

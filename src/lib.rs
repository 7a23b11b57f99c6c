//! A library for reading, repackaging and converting Mini-SEED time series.
//!
//! Records decode and re-encode bit exactly, including the Steim-1 and
//! Steim-2 compressed sample encodings; decoded records assemble into
//! contiguous trace segments which can be written out as SAC files,
//! optionally streamed into a ZIP archive.
//!
//! See the SEED manual at <https://www.fdsn.org/publications/> for the
//! record format and the IRIS SAC documentation for the output format.

pub mod blockette;
pub mod byte_order;
pub mod data_encoding;
pub mod header;
pub mod hptime;
mod mseed_error;
pub mod pack;
pub mod reader;
pub mod record;
pub mod sac;
pub mod samples;
pub mod steim1;
pub mod steim2;
pub mod steim_frame_block;
pub mod trace;
pub mod zip;

pub use crate::byte_order::ByteOrder;
pub use crate::data_encoding::DataEncoding;
pub use crate::hptime::{BTime, HpTime, HPTMODULUS};
pub use crate::mseed_error::MSeedError;
pub use crate::pack::{pack, PackResult, RecordSink, WriteSink};
pub use crate::reader::{PackIdentifier, Reader, ReaderConfig};
pub use crate::record::{decode_record, CodecConfig, Record, MAXRECLEN, MINRECLEN};
pub use crate::sac::{write_sac, SacConfig, SacEvent, SacFormat, SacHeader};
pub use crate::samples::Samples;
pub use crate::trace::{Gap, Segment, Tolerance, TraceList};
pub use crate::zip::{ZipMethod, ZipStream};

use std::io::Read;

/// Read every record from an input stream.
///
/// # Example
///
/// ```no_run
/// use mseed2sac::{MSeedError, ReaderConfig};
/// # fn main() -> Result<(), MSeedError> {
/// let file = std::fs::File::open("input.mseed")?;
/// let records = mseed2sac::read_records(file, ReaderConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub fn read_records<R: Read>(input: R, config: ReaderConfig) -> Result<Vec<Record>, MSeedError> {
    let mut reader = Reader::new(input, config);
    let mut records = Vec::new();
    while let Some(rec) = reader.next_record()? {
        records.push(rec);
    }
    Ok(records)
}

/// Read an input stream straight into a trace list, one reader pass plus
/// the usual sort and heal.
pub fn read_traces<R: Read>(
    input: R,
    config: ReaderConfig,
    quality: bool,
    time_tol: Tolerance,
    rate_tol: Tolerance,
) -> Result<TraceList, MSeedError> {
    let mut reader = Reader::new(input, config);
    let mut traces = TraceList::new();
    while let Some(rec) = reader.next_record()? {
        traces.insert(&rec, quality, time_tol, rate_tol)?;
    }
    traces.sort();
    traces.heal(time_tol, rate_tol)?;
    Ok(traces)
}

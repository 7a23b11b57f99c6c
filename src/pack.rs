use log::debug;
use std::io::Write;

use crate::blockette::{Blkt1000, Blockette, BlocketteBody};
use crate::byte_order::ByteOrder;
use crate::data_encoding::DataEncoding;
use crate::header::{is_data_indicator, open_field, FSDH_LEN};
use crate::hptime::{rate_to_factor_multiplier, HPTMODULUS};
use crate::mseed_error::MSeedError;
use crate::record::{CodecConfig, Record, MAXRECLEN, MINRECLEN};
use crate::samples::Samples;
use crate::steim_frame_block::{FRAME_LEN, STEIM1_FRAME_MAX_SAMPLES, STEIM2_FRAME_MAX_SAMPLES};
use crate::{steim1, steim2};

/// Receives finished records from the encoder. The slice is only valid for
/// the duration of the call; the encoder reuses the buffer for the next
/// record.
pub trait RecordSink {
    fn write_record(&mut self, record: &[u8]) -> std::io::Result<()>;
}

/// Adapter writing records to any `Write`.
pub struct WriteSink<W: Write>(pub W);

impl<W: Write> RecordSink for WriteSink<W> {
    fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.0.write_all(record)
    }
}

/// Collects records in memory, mostly for tests and repackaging.
impl RecordSink for Vec<Vec<u8>> {
    fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.push(record.to_vec());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PackResult {
    pub record_count: usize,
    pub sample_count: usize,
}

/// Pack samples into fixed length records using `template` for the header
/// values. Complete records go to `sink` as they fill; with `flush` a final
/// partial record is emitted as well. Between records the sequence number
/// and start time advance, and the template is left pointing past the last
/// packed sample so a caller can continue with the remainder later.
///
/// Template defaults: a NUL quality becomes 'D', a zero record length 4096.
/// A Blockette 1000 is added when the template carries none.
pub fn pack(
    template: &mut Record,
    samples: &Samples,
    sink: &mut dyn RecordSink,
    flush: bool,
    config: &CodecConfig,
) -> Result<PackResult, MSeedError> {
    if samples.is_empty() {
        return Err(MSeedError::OutOfRange(String::from("no samples to pack")));
    }

    // Apply defaults for sentinel template values
    if template.data_quality == '\0' {
        template.data_quality = 'D';
    }
    if template.reclen == 0 {
        template.reclen = 4096;
    }
    if template.sequence_number == 0 || template.sequence_number > 999_999 {
        template.sequence_number = 1;
    }
    if !is_data_indicator(template.data_quality as u8) {
        return Err(MSeedError::NotSeed(format!(
            "header and quality indicator `{}`",
            template.data_quality
        )));
    }

    let reclen = template.reclen;
    if !(MINRECLEN..=MAXRECLEN).contains(&reclen) || !reclen.is_power_of_two() {
        return Err(MSeedError::OutOfRange(format!(
            "record length value {}",
            reclen
        )));
    }
    check_sample_type(template.encoding, samples)?;

    let header_order = config
        .pack_header_byteorder
        .unwrap_or(template.header_byte_order);
    let data_order = config.pack_data_byteorder.unwrap_or(template.byte_order);

    // Add a blank Blockette 1000 if one is not present; its values are
    // filled in below before the header is serialised
    if template.blockette(1000).is_none() {
        debug!("adding Blockette 1000");
        template.blockettes.push(Blockette {
            blkt_type: 1000,
            next_offset: 0,
            body: BlocketteBody::B1000(Blkt1000::default()),
        });
    }

    let mut rawrec = vec![0u8; reclen];
    let layout = pack_header_raw(template, &mut rawrec, header_order, data_order)?;

    // Steim data must begin on a 64-byte boundary; anything between the
    // blockettes and the data stays zero
    let data_offset = match template.encoding {
        DataEncoding::STEIM1 | DataEncoding::STEIM2 => {
            let mut off = FRAME_LEN;
            while off < layout.header_len {
                off += FRAME_LEN;
            }
            off
        }
        _ => layout.header_len,
    };
    if data_offset >= reclen {
        return Err(MSeedError::OutOfRange(format!(
            "header length {} leaves no data space in record of {}",
            layout.header_len, reclen
        )));
    }
    header_order.write_u16(&mut rawrec[44..46], data_offset as u16);
    template.fsdh.data_offset = data_offset as u16;

    let max_data_bytes = reclen - data_offset;
    let max_samples = match template.encoding {
        DataEncoding::STEIM1 => (max_data_bytes / FRAME_LEN) * STEIM1_FRAME_MAX_SAMPLES,
        DataEncoding::STEIM2 => (max_data_bytes / FRAME_LEN) * STEIM2_FRAME_MAX_SAMPLES,
        other => max_data_bytes / other.sample_size().ok_or(MSeedError::UnknownFormat(other.value()))?,
    };
    if max_samples == 0 {
        return Err(MSeedError::OutOfRange(format!(
            "record length {} too small for any sample",
            reclen
        )));
    }

    let total = samples.len();
    let mut result = PackResult::default();

    while (total - result.sample_count) > max_samples || (flush && result.sample_count < total) {
        let (encoded, npacked) = pack_data(
            template.encoding,
            samples,
            result.sample_count,
            max_samples,
            max_data_bytes,
            data_order,
        )?;

        rawrec[data_offset..].fill(0);
        rawrec[data_offset..data_offset + encoded.len()].copy_from_slice(&encoded);
        header_order.write_u16(&mut rawrec[30..32], npacked as u16);

        sink.write_record(&rawrec).map_err(MSeedError::Sink)?;

        debug!(
            "packed {} samples for {}",
            npacked,
            template.srcname(false)
        );

        result.record_count += 1;
        result.sample_count += npacked;

        // Advance the header for the next record
        template.sequence_number = if template.sequence_number >= 999_999 {
            1
        } else {
            template.sequence_number + 1
        };
        if template.sample_rate > 0.0 {
            template.start_time = template.start_time
                + (npacked as f64 / template.sample_rate * HPTMODULUS as f64) as i64;
        }
        update_header(template, &mut rawrec, header_order, &layout)?;

        if result.sample_count >= total {
            break;
        }
    }

    debug!(
        "packed {} total samples for {}",
        result.sample_count,
        template.srcname(false)
    );

    Ok(result)
}

struct HeaderLayout {
    header_len: usize,
    /// Offset of the Blockette 1001 usec byte, rewritten between records.
    b1001_usec_offset: Option<usize>,
}

/// Serialise the fixed header and blockette chain from the template into
/// `rawrec`, recomputing the chain offsets. Returns the header layout.
fn pack_header_raw(
    template: &mut Record,
    rawrec: &mut [u8],
    header_order: ByteOrder,
    data_order: ByteOrder,
) -> Result<HeaderLayout, MSeedError> {
    let reclen = template.reclen;

    // Fill the self-describing and derived blockette values first
    let encoding = template.encoding.value();
    let sample_rate = template.sample_rate;
    let reclen_exp = reclen.trailing_zeros() as u8;
    let start_time = template.start_time;
    for blkt in template.blockettes.iter_mut() {
        match &mut blkt.body {
            BlocketteBody::B1000(b) => {
                b.encoding = encoding;
                b.byteorder = data_order.flag();
                b.reclen = reclen_exp;
            }
            BlocketteBody::B100(b) => {
                b.samprate = sample_rate as f32;
            }
            BlocketteBody::B1001(b) => {
                b.usec = b1001_usec(start_time.ticks());
            }
            _ => {}
        }
    }

    let mut fsdh = template.fsdh.clone();
    let seqnum = format!("{:06}", template.sequence_number);
    fsdh.sequence_number.copy_from_slice(seqnum.as_bytes());
    fsdh.dataquality = template.data_quality as u8;
    fsdh.reserved = b' ';
    open_field(&mut fsdh.network, &template.network);
    open_field(&mut fsdh.station, &template.station);
    open_field(&mut fsdh.location, &template.location);
    open_field(&mut fsdh.channel, &template.channel);
    fsdh.start_time = template.start_time.to_btime()?;
    let (fact, mult) = rate_to_factor_multiplier(template.sample_rate)?;
    fsdh.samprate_fact = fact;
    fsdh.samprate_mult = mult;
    fsdh.numsamples = 0;
    fsdh.numblockettes = template.blockettes.len() as u8;
    fsdh.blockette_offset = if template.blockettes.is_empty() {
        0
    } else {
        FSDH_LEN as u16
    };

    let mut offset = FSDH_LEN;
    let mut b1001_usec_offset = None;
    let blkt_count = template.blockettes.len();
    for (i, blkt) in template.blockettes.iter_mut().enumerate() {
        let body_len = blkt.body_len();
        if offset + 4 + body_len > reclen {
            return Err(MSeedError::OutOfRange(format!(
                "blockette {} extends header beyond record length {}",
                blkt.blkt_type, reclen
            )));
        }
        header_order.write_u16(&mut rawrec[offset..offset + 2], blkt.blkt_type);
        if blkt.blkt_type == 1001 {
            // usec is the second body byte
            b1001_usec_offset = Some(offset + 5);
        }
        blkt.write_body(&mut rawrec[offset + 4..offset + 4 + body_len], header_order)?;
        let next = offset + 4 + body_len;
        blkt.next_offset = if i + 1 < blkt_count { next as u16 } else { 0 };
        header_order.write_u16(&mut rawrec[offset + 2..offset + 4], blkt.next_offset);
        offset = next;
    }

    fsdh.write(rawrec, header_order)?;
    template.fsdh = fsdh;

    Ok(HeaderLayout {
        header_len: offset,
        b1001_usec_offset,
    })
}

/// Rewrite only the header fields that change between records: sequence
/// number, start time and the Blockette 1001 microsecond offset.
fn update_header(
    template: &Record,
    rawrec: &mut [u8],
    header_order: ByteOrder,
    layout: &HeaderLayout,
) -> Result<(), MSeedError> {
    let seqnum = format!("{:06}", template.sequence_number);
    rawrec[0..6].copy_from_slice(seqnum.as_bytes());
    let btime = template.start_time.to_btime()?;
    btime.write(&mut rawrec[20..30], header_order);
    if let Some(off) = layout.b1001_usec_offset {
        rawrec[off] = b1001_usec(template.start_time.ticks()) as u8;
    }
    Ok(())
}

/// Microsecond remainder of a start time below the header's 1/10000 second
/// resolution. Values outside the i8 range cannot be represented, a known
/// lossy corner of the format.
fn b1001_usec(ticks: i64) -> i8 {
    let tenk = ticks / (HPTMODULUS / 10_000);
    let usec = (ticks - tenk * (HPTMODULUS / 10_000)) / (HPTMODULUS / 1_000_000);
    usec as i8
}

fn check_sample_type(encoding: DataEncoding, samples: &Samples) -> Result<(), MSeedError> {
    let wanted = match encoding {
        DataEncoding::ASCII => "ascii",
        DataEncoding::INT16
        | DataEncoding::INT32
        | DataEncoding::STEIM1
        | DataEncoding::STEIM2 => "int32",
        DataEncoding::FLOAT32 => "float32",
        DataEncoding::FLOAT64 => "float64",
        DataEncoding::UNKNOWN(v) => return Err(MSeedError::UnknownFormat(v)),
    };
    if samples.type_name() != wanted {
        return Err(MSeedError::SampleTypeMismatch(samples.type_name(), wanted));
    }
    Ok(())
}

/// Encode one record's worth of samples starting at `from`, returning the
/// encoded bytes and the number of samples consumed.
fn pack_data(
    encoding: DataEncoding,
    samples: &Samples,
    from: usize,
    max_samples: usize,
    max_data_bytes: usize,
    order: ByteOrder,
) -> Result<(Vec<u8>, usize), MSeedError> {
    match (encoding, samples) {
        (DataEncoding::ASCII, Samples::Ascii(v)) => {
            let n = max_samples.min(v.len() - from);
            Ok((v[from..from + n].to_vec(), n))
        }
        (DataEncoding::INT16, Samples::Int32(v)) => {
            let n = max_samples.min(v.len() - from);
            let mut out = vec![0u8; 2 * n];
            for (i, &s) in v[from..from + n].iter().enumerate() {
                order.write_i16(&mut out[2 * i..2 * i + 2], s as i16);
            }
            Ok((out, n))
        }
        (DataEncoding::INT32, Samples::Int32(v)) => {
            let n = max_samples.min(v.len() - from);
            let mut out = vec![0u8; 4 * n];
            for (i, &s) in v[from..from + n].iter().enumerate() {
                order.write_i32(&mut out[4 * i..4 * i + 4], s);
            }
            Ok((out, n))
        }
        (DataEncoding::FLOAT32, Samples::Float32(v)) => {
            let n = max_samples.min(v.len() - from);
            let mut out = vec![0u8; 4 * n];
            for (i, &s) in v[from..from + n].iter().enumerate() {
                order.write_f32(&mut out[4 * i..4 * i + 4], s);
            }
            Ok((out, n))
        }
        (DataEncoding::FLOAT64, Samples::Float64(v)) => {
            let n = max_samples.min(v.len() - from);
            let mut out = vec![0u8; 8 * n];
            for (i, &s) in v[from..from + n].iter().enumerate() {
                order.write_f64(&mut out[8 * i..8 * i + 8], s);
            }
            Ok((out, n))
        }
        (DataEncoding::STEIM1, Samples::Int32(v)) => {
            let block = steim1::encode(&v[from..], max_data_bytes / FRAME_LEN, order)?;
            Ok((block.to_bytes(), block.num_samples))
        }
        (DataEncoding::STEIM2, Samples::Int32(v)) => {
            let block = steim2::encode(&v[from..], max_data_bytes / FRAME_LEN, order)?;
            Ok((block.to_bytes(), block.num_samples))
        }
        (DataEncoding::UNKNOWN(v), _) => Err(MSeedError::UnknownFormat(v)),
        (_, s) => Err(MSeedError::SampleTypeMismatch(s.type_name(), "record encoding")),
    }
}

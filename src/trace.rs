use log::warn;
use std::cmp::Ordering;
use std::fmt;

use crate::byte_order::ByteOrder;
use crate::data_encoding::DataEncoding;
use crate::hptime::{HpTime, HPTMODULUS};
use crate::mseed_error::MSeedError;
use crate::pack::{pack, PackResult, RecordSink};
use crate::record::{CodecConfig, Record};
use crate::samples::Samples;

/// Tolerance for the sample rate and time adjacency checks of the
/// assembler. `Default` is |1 - r1/r2| < 0.0001 for rates and half a sample
/// period for times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Default,
    Disabled,
    Value(f64),
}

/// Default sample rate tolerance check.
fn rate_tolerable(sr1: f64, sr2: f64) -> bool {
    (1.0 - sr1 / sr2).abs() < 0.0001
}

fn rate_matches(sr1: f64, sr2: f64, tol: Tolerance) -> bool {
    match tol {
        Tolerance::Disabled => true,
        Tolerance::Default => rate_tolerable(sr1, sr2),
        Tolerance::Value(t) => (sr1 - sr2).abs() <= t,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Whence {
    Append,
    Prepend,
}

/// A maximally contiguous span of samples from one source at one sample
/// rate.
#[derive(Debug, Clone)]
pub struct Segment {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub data_quality: char,
    pub sample_rate: f64,
    pub start_time: HpTime,
    pub end_time: HpTime,
    /// Samples declared by the contributing records, including records whose
    /// data was never decoded.
    pub sample_count: u64,
    /// The decoded samples owned by this segment.
    pub samples: Samples,
}

impl Segment {
    fn from_record(rec: &Record) -> Segment {
        Segment {
            network: rec.network.clone(),
            station: rec.station.clone(),
            location: rec.location.clone(),
            channel: rec.channel.clone(),
            data_quality: rec.data_quality,
            sample_rate: rec.sample_rate,
            start_time: rec.start_time,
            end_time: rec.end_time(),
            sample_count: 0,
            samples: rec
                .samples
                .as_ref()
                .map(|s| s.empty_like())
                .unwrap_or(Samples::Int32(Vec::new())),
        }
    }

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

    /// Number of decoded samples held by the segment.
    pub fn decoded_sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Add a record's coverage and samples at the chosen end. No identity
    /// checking happens here, the caller already matched the record.
    fn add_record(&mut self, rec: &Record, whence: Whence) -> Result<(), MSeedError> {
        if let Some(samples) = &rec.samples {
            if samples.len() != rec.sample_count as usize {
                warn!(
                    "{}: sample counts do not match, record not fully decompressed?",
                    rec.srcname(false)
                );
            }
            match whence {
                Whence::Append => self.samples.append_from(samples)?,
                Whence::Prepend => self.samples.prepend_from(samples)?,
            }
        }
        match whence {
            Whence::Append => self.end_time = rec.end_time(),
            Whence::Prepend => self.start_time = rec.start_time,
        }
        self.sample_count += rec.sample_count as u64;
        Ok(())
    }

    /// Pack the segment's samples into records, consuming from the front of
    /// the buffer. The segment start time advances past the packed samples;
    /// with `flush` false, a partial record's worth stays for later.
    #[allow(clippy::too_many_arguments)]
    pub fn pack(
        &mut self,
        sink: &mut dyn RecordSink,
        reclen: usize,
        encoding: DataEncoding,
        byte_order: ByteOrder,
        flush: bool,
        config: &CodecConfig,
    ) -> Result<PackResult, MSeedError> {
        if self.sample_count != self.samples.len() as u64 {
            warn!(
                "{}: declared and decoded sample counts differ ({} != {})",
                self.srcname(false),
                self.sample_count,
                self.samples.len()
            );
        }
        let mut template = Record::template(
            &self.network,
            &self.station,
            &self.location,
            &self.channel,
            self.start_time,
            self.sample_rate,
        );
        template.data_quality = self.data_quality;
        template.reclen = reclen;
        template.encoding = encoding;
        template.header_byte_order = byte_order;
        template.byte_order = byte_order;

        let result = pack(&mut template, &self.samples, sink, flush, config)?;
        if result.sample_count > 0 {
            self.start_time = template.start_time;
            self.samples.drain_front(result.sample_count);
            self.sample_count = self.sample_count.saturating_sub(result.sample_count as u64);
        }
        Ok(result)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} - {} {:.10} Hz, {} samples",
            self.srcname(true),
            self.start_time
                .seed_string()
                .unwrap_or_else(|_| String::from("invalid")),
            self.end_time
                .seed_string()
                .unwrap_or_else(|_| String::from("invalid")),
            self.sample_rate,
            self.sample_count
        )
    }
}

/// A gap or overlap between two adjacent segments of the same source, as
/// reported by [`TraceList::gaps`]. Overlaps have negative seconds.
#[derive(Debug, Clone)]
pub struct Gap {
    pub srcname: String,
    pub last_end: HpTime,
    pub next_start: HpTime,
    pub seconds: f64,
    /// Approximate missing (positive gap) or duplicated (overlap) samples.
    pub samples: f64,
}

/// An ordered collection of trace segments, keyed by source name, sample
/// rate and time adjacency.
#[derive(Debug, Clone, Default)]
pub struct TraceList {
    segments: Vec<Segment>,
}

impl TraceList {
    pub fn new() -> TraceList {
        TraceList {
            segments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    pub fn iter(&self) -> std::slice::Iter<Segment> {
        self.segments.iter()
    }

    /// Insert one record: find a segment of the same source (and quality,
    /// when `quality` is set) whose sample rate agrees within `rate_tol` and
    /// which the record abuts within `time_tol`, and extend it at the
    /// matching end. Without a match a new segment is started. Returns the
    /// index of the segment touched.
    ///
    /// Records with no samples or no sample rate only bump the matched
    /// segment's sample count.
    pub fn insert(
        &mut self,
        rec: &Record,
        quality: bool,
        time_tol: Tolerance,
        rate_tol: Tolerance,
    ) -> Result<usize, MSeedError> {
        let end_time = rec.end_time();

        let matched = self.find_adjacent(rec, quality, end_time, time_tol, rate_tol);

        match matched {
            Some((idx, whence)) => {
                let seg = &mut self.segments[idx];
                if rec.sample_count == 0 || rec.sample_rate <= 0.0 {
                    // no time coverage, only the metadata counts
                    seg.sample_count += rec.sample_count as u64;
                } else {
                    seg.add_record(rec, whence)?;
                }
                Ok(idx)
            }
            None => {
                let mut seg = Segment::from_record(rec);
                seg.add_record(rec, Whence::Append)?;
                self.segments.push(seg);
                Ok(self.segments.len() - 1)
            }
        }
    }

    /// Search for a segment the record's time span abuts. The pre and post
    /// gaps are negative for overlaps and positive for gaps; with the time
    /// check disabled the closer end wins.
    fn find_adjacent(
        &self,
        rec: &Record,
        quality: bool,
        end_time: HpTime,
        time_tol: Tolerance,
        rate_tol: Tolerance,
    ) -> Option<(usize, Whence)> {
        for (idx, seg) in self.segments.iter().enumerate() {
            if seg.network != rec.network
                || seg.station != rec.station
                || seg.location != rec.location
                || seg.channel != rec.channel
                || (quality && seg.data_quality != rec.data_quality)
            {
                continue;
            }
            if !rate_matches(rec.sample_rate, seg.sample_rate, rate_tol) {
                continue;
            }

            let period = 1.0 / rec.sample_rate;
            let postgap = (rec.start_time - seg.end_time) as f64 / HPTMODULUS as f64 - period;
            let pregap = (seg.start_time - end_time) as f64 / HPTMODULUS as f64 - period;

            match time_tol {
                Tolerance::Disabled => {
                    let whence = if postgap.abs() < pregap.abs() {
                        Whence::Append
                    } else {
                        Whence::Prepend
                    };
                    return Some((idx, whence));
                }
                _ => {
                    let ttol = match time_tol {
                        Tolerance::Default => 0.5 / rec.sample_rate,
                        Tolerance::Value(t) => t,
                        Tolerance::Disabled => unreachable!(),
                    };
                    if postgap.abs() <= ttol {
                        return Some((idx, Whence::Append));
                    } else if pregap.abs() <= ttol {
                        return Some((idx, Whence::Prepend));
                    }
                }
            }
        }
        None
    }

    /// Stable sort by source name, then sample rate ascending, then start
    /// time ascending, then end time descending (longest segment first).
    pub fn sort(&mut self) {
        self.segments.sort_by(|a, b| {
            a.srcname(false)
                .cmp(&b.srcname(false))
                .then_with(|| {
                    a.sample_rate
                        .partial_cmp(&b.sample_rate)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.start_time.cmp(&b.start_time))
                .then_with(|| b.end_time.cmp(&a.end_time))
        });
    }

    /// Merge contiguous segments that belong together, useful when the
    /// records arrived out of time order. Returns the number of mergings.
    pub fn heal(&mut self, time_tol: Tolerance, rate_tol: Tolerance) -> Result<usize, MSeedError> {
        let mut mergings = 0;
        'restart: loop {
            for cur in 0..self.segments.len() {
                for other in 0..self.segments.len() {
                    if cur == other {
                        continue;
                    }
                    {
                        let (a, b) = (&self.segments[cur], &self.segments[other]);
                        if a.network != b.network
                            || a.station != b.station
                            || a.location != b.location
                            || a.channel != b.channel
                        {
                            continue;
                        }
                        if !rate_matches(b.sample_rate, a.sample_rate, rate_tol) {
                            continue;
                        }
                        let period = 1.0 / a.sample_rate;
                        let postgap =
                            (b.start_time - a.end_time) as f64 / HPTMODULUS as f64 - period;
                        let pregap =
                            (a.start_time - b.end_time) as f64 / HPTMODULUS as f64 - period;
                        let ttol = match time_tol {
                            Tolerance::Default => 0.5 / b.sample_rate,
                            Tolerance::Value(t) => t,
                            Tolerance::Disabled => f64::INFINITY,
                        };
                        if postgap.abs() > ttol && pregap.abs() > ttol {
                            continue;
                        }
                    }
                    // merge `other` into `cur`
                    let done = self.merge(cur, other, time_tol)?;
                    if done {
                        mergings += 1;
                        continue 'restart;
                    }
                }
            }
            return Ok(mergings);
        }
    }

    fn merge(&mut self, cur: usize, other: usize, time_tol: Tolerance) -> Result<bool, MSeedError> {
        let victim = self.segments[other].clone();
        let seg = &mut self.segments[cur];
        let period = 1.0 / seg.sample_rate;
        let postgap = (victim.start_time - seg.end_time) as f64 / HPTMODULUS as f64 - period;
        let ttol = match time_tol {
            Tolerance::Default => 0.5 / victim.sample_rate,
            Tolerance::Value(t) => t,
            Tolerance::Disabled => f64::INFINITY,
        };
        if postgap.abs() <= ttol {
            seg.samples.append_from(&victim.samples)?;
            seg.end_time = victim.end_time;
        } else {
            seg.samples.prepend_from(&victim.samples)?;
            seg.start_time = victim.start_time;
        }
        seg.sample_count += victim.sample_count;
        self.segments.remove(other);
        Ok(true)
    }

    /// List gaps and overlaps between time-adjacent segments of the same
    /// source, the list order being meaningful after [`TraceList::sort`].
    /// Zero rate segments (state of health) are skipped, overlaps are
    /// clamped to the following segment's coverage.
    pub fn gaps(&self) -> Vec<Gap> {
        let mut out = Vec::new();
        for pair in self.segments.windows(2) {
            let (cur, next) = (&pair[0], &pair[1]);
            if cur.srcname(false) != next.srcname(false) {
                continue;
            }
            if cur.sample_rate == 0.0 {
                continue;
            }
            if !rate_tolerable(cur.sample_rate, next.sample_rate) {
                warn!(
                    "{} sample rate changed! {:.10} -> {:.10}",
                    cur.srcname(false),
                    cur.sample_rate,
                    next.sample_rate
                );
            }
            let mut gap = (next.start_time - cur.end_time) as f64 / HPTMODULUS as f64;
            if gap < 0.0 {
                let coverage = (next.end_time - next.start_time) as f64 / HPTMODULUS as f64
                    + 1.0 / next.sample_rate;
                if -gap > coverage {
                    gap = -coverage;
                }
            }
            let mut samples = gap.abs() * cur.sample_rate;
            if gap > 0.0 {
                samples -= 1.0;
            } else {
                samples += 1.0;
            }
            out.push(Gap {
                srcname: cur.srcname(false),
                last_end: cur.end_time,
                next_start: next.start_time,
                seconds: gap,
                samples,
            });
        }
        out
    }

    /// Pack every segment holding samples into records. Segment buffers
    /// shrink by the samples consumed.
    #[allow(clippy::too_many_arguments)]
    pub fn pack(
        &mut self,
        sink: &mut dyn RecordSink,
        reclen: usize,
        encoding: DataEncoding,
        byte_order: ByteOrder,
        flush: bool,
        config: &CodecConfig,
    ) -> Result<PackResult, MSeedError> {
        let mut total = PackResult::default();
        for seg in self.segments.iter_mut() {
            if seg.samples.is_empty() {
                continue;
            }
            let result = seg.pack(sink, reclen, encoding, byte_order, flush, config)?;
            total.record_count += result.record_count;
            total.sample_count += result.sample_count;
        }
        Ok(total)
    }
}

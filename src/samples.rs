use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Formatter;

use crate::byte_order::ByteOrder;
use crate::mseed_error::MSeedError;

/// Decoded sample data. The variant replaces the single character sample
/// type codes ('i', 'f', 'd', 'a') used in the wire-facing tooling this
/// follows, so a mismatched buffer cannot exist at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Samples {
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Ascii(Vec<u8>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Samples::Int32(v) => v.len(),
            Samples::Float32(v) => v.len(),
            Samples::Float64(v) => v.len(),
            Samples::Ascii(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes of one sample of this type.
    pub fn sample_size(&self) -> usize {
        match self {
            Samples::Int32(_) => 4,
            Samples::Float32(_) => 4,
            Samples::Float64(_) => 8,
            Samples::Ascii(_) => 1,
        }
    }

    /// Short name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Samples::Int32(_) => "int32",
            Samples::Float32(_) => "float32",
            Samples::Float64(_) => "float64",
            Samples::Ascii(_) => "ascii",
        }
    }

    /// An empty buffer of the same variant.
    pub fn empty_like(&self) -> Samples {
        match self {
            Samples::Int32(_) => Samples::Int32(Vec::new()),
            Samples::Float32(_) => Samples::Float32(Vec::new()),
            Samples::Float64(_) => Samples::Float64(Vec::new()),
            Samples::Ascii(_) => Samples::Ascii(Vec::new()),
        }
    }

    /// Append a copy of `other` to the end of this buffer. The variants must
    /// match.
    pub fn append_from(&mut self, other: &Samples) -> Result<(), MSeedError> {
        match (self, other) {
            (Samples::Int32(a), Samples::Int32(b)) => a.extend_from_slice(b),
            (Samples::Float32(a), Samples::Float32(b)) => a.extend_from_slice(b),
            (Samples::Float64(a), Samples::Float64(b)) => a.extend_from_slice(b),
            (Samples::Ascii(a), Samples::Ascii(b)) => a.extend_from_slice(b),
            (a, b) => return Err(MSeedError::SampleTypeMismatch(b.type_name(), a.type_name())),
        }
        Ok(())
    }

    /// Splice a copy of `other` in front of this buffer. The variants must
    /// match.
    pub fn prepend_from(&mut self, other: &Samples) -> Result<(), MSeedError> {
        fn splice<T: Copy>(dest: &mut Vec<T>, src: &[T]) {
            drop(dest.splice(0..0, src.iter().copied()));
        }
        match (self, other) {
            (Samples::Int32(a), Samples::Int32(b)) => splice(a, b),
            (Samples::Float32(a), Samples::Float32(b)) => splice(a, b),
            (Samples::Float64(a), Samples::Float64(b)) => splice(a, b),
            (Samples::Ascii(a), Samples::Ascii(b)) => splice(a, b),
            (a, b) => return Err(MSeedError::SampleTypeMismatch(b.type_name(), a.type_name())),
        }
        Ok(())
    }

    /// Drop the first `count` samples, e.g. after they have been packed into
    /// records.
    pub fn drain_front(&mut self, count: usize) {
        match self {
            Samples::Int32(v) => drop(v.drain(0..count.min(v.len()))),
            Samples::Float32(v) => drop(v.drain(0..count.min(v.len()))),
            Samples::Float64(v) => drop(v.drain(0..count.min(v.len()))),
            Samples::Ascii(v) => drop(v.drain(0..count.min(v.len()))),
        }
    }

    /// Convert to float32, as needed by the SAC writer. Integer and double
    /// samples are cast, ASCII has no float rendition.
    pub fn to_f32(&self) -> Result<Vec<f32>, MSeedError> {
        match self {
            Samples::Float32(v) => Ok(v.clone()),
            Samples::Int32(v) => Ok(v.iter().map(|&x| x as f32).collect()),
            Samples::Float64(v) => Ok(v.iter().map(|&x| x as f32).collect()),
            Samples::Ascii(_) => Err(MSeedError::SampleTypeMismatch("ascii", "float32")),
        }
    }
}

impl fmt::Display for Samples {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Samples::Int32(v) => write!(f, "Int32, {} samples", v.len()),
            Samples::Float32(v) => write!(f, "Float32, {} samples", v.len()),
            Samples::Float64(v) => write!(f, "Float64, {} samples", v.len()),
            Samples::Ascii(v) => write!(f, "Ascii, {} bytes", v.len()),
        }
    }
}

/// Decode fixed width INT16 samples, widening to i32.
pub fn decode_int16(buf: &[u8], count: usize, order: ByteOrder) -> Vec<i32> {
    let n = count.min(buf.len() / 2);
    (0..n)
        .map(|i| order.read_i16(&buf[2 * i..2 * i + 2]) as i32)
        .collect()
}

/// Decode fixed width INT32 samples.
pub fn decode_int32(buf: &[u8], count: usize, order: ByteOrder) -> Vec<i32> {
    let n = count.min(buf.len() / 4);
    (0..n)
        .map(|i| order.read_i32(&buf[4 * i..4 * i + 4]))
        .collect()
}

/// Decode fixed width FLOAT32 samples.
pub fn decode_float32(buf: &[u8], count: usize, order: ByteOrder) -> Vec<f32> {
    let n = count.min(buf.len() / 4);
    (0..n)
        .map(|i| order.read_f32(&buf[4 * i..4 * i + 4]))
        .collect()
}

/// Decode fixed width FLOAT64 samples.
pub fn decode_float64(buf: &[u8], count: usize, order: ByteOrder) -> Vec<f64> {
    let n = count.min(buf.len() / 8);
    (0..n)
        .map(|i| order.read_f64(&buf[8 * i..8 * i + 8]))
        .collect()
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Formatter;

/// Known SEED sample data encoding codes.
/// ```text
/// 0   ASCII text
/// 1   16-bit integer (two's complement)
/// 3   32-bit integer (two's complement)
/// 4   32-bit floats (IEEE float)
/// 5   64-bit floats (IEEE double)
/// 10  Steim-1 integer compression
/// 11  Steim-2 integer compression
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataEncoding {
    ASCII,
    INT16,
    INT32,
    FLOAT32,
    FLOAT64,
    STEIM1,
    STEIM2,
    UNKNOWN(u8),
}

impl DataEncoding {
    /// Creates a DataEncoding based on the input integer
    pub fn from_int(val: u8) -> DataEncoding {
        match val {
            0 => DataEncoding::ASCII,
            1 => DataEncoding::INT16,
            3 => DataEncoding::INT32,
            4 => DataEncoding::FLOAT32,
            5 => DataEncoding::FLOAT64,
            10 => DataEncoding::STEIM1,
            11 => DataEncoding::STEIM2,
            _ => DataEncoding::UNKNOWN(val),
        }
    }

    /// The integer value, as a u8, of the encoding
    pub fn value(&self) -> u8 {
        match &self {
            DataEncoding::ASCII => 0,
            DataEncoding::INT16 => 1,
            DataEncoding::INT32 => 3,
            DataEncoding::FLOAT32 => 4,
            DataEncoding::FLOAT64 => 5,
            DataEncoding::STEIM1 => 10,
            DataEncoding::STEIM2 => 11,
            DataEncoding::UNKNOWN(val) => *val,
        }
    }

    /// Size in bytes of one encoded sample for the fixed width encodings,
    /// None for the compressed ones.
    pub fn sample_size(&self) -> Option<usize> {
        match self {
            DataEncoding::ASCII => Some(1),
            DataEncoding::INT16 => Some(2),
            DataEncoding::INT32 => Some(4),
            DataEncoding::FLOAT32 => Some(4),
            DataEncoding::FLOAT64 => Some(8),
            _ => None,
        }
    }
}

impl fmt::Display for DataEncoding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataEncoding::ASCII => write!(f, "ASCII text"),
            DataEncoding::INT16 => write!(f, "16-bit integer (two's complement)"),
            DataEncoding::INT32 => write!(f, "32-bit integer (two's complement)"),
            DataEncoding::FLOAT32 => {
                write!(f, "32-bit floats (IEEE float)")
            }
            DataEncoding::FLOAT64 => {
                write!(f, "64-bit floats (IEEE double)")
            }
            DataEncoding::STEIM1 => write!(f, "Steim-1 integer compression"),
            DataEncoding::STEIM2 => write!(f, "Steim-2 integer compression"),
            DataEncoding::UNKNOWN(val) => write!(f, "Unknown encoding: {}", val),
        }
    }
}

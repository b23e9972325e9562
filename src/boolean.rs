//! Boolean encoding (EXI 7.1.2).
//!
//! Default: one n-bit field of width 1. When the schema type carries pattern
//! facets all four lexical forms survive as a 2-bit index
//! (0="false", 1="0", 2="true", 3="1").

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// The four lexical values of a patterned boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanValue {
    False = 0,
    Zero = 1,
    True = 2,
    One = 3,
}

impl BooleanValue {
    /// Parses a whitespace-collapsed lexical boolean.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            "false" => Some(Self::False),
            "0" => Some(Self::Zero),
            "true" => Some(Self::True),
            "1" => Some(Self::One),
            _ => None,
        }
    }

    pub fn as_bool(self) -> bool {
        matches!(self, Self::True | Self::One)
    }

    pub fn lexical(self) -> &'static str {
        match self {
            Self::False => "false",
            Self::Zero => "0",
            Self::True => "true",
            Self::One => "1",
        }
    }
}

/// Encodes a plain boolean.
pub fn encode(writer: &mut BitWriter, value: bool) {
    writer.write_flag(value);
}

pub fn decode(reader: &mut BitReader) -> Result<bool> {
    reader.read_flag()
}

/// Encodes a patterned boolean as 2-bit index.
pub fn encode_patterned(writer: &mut BitWriter, value: BooleanValue) {
    writer.write_n_bit(value as u64, 2);
}

pub fn decode_patterned(reader: &mut BitReader) -> Result<BooleanValue> {
    match reader.read_n_bit(2)? {
        0 => Ok(BooleanValue::False),
        1 => Ok(BooleanValue::Zero),
        2 => Ok(BooleanValue::True),
        3 => Ok(BooleanValue::One),
        other => Err(Error::malformed_value(format!("boolean pattern index {other}"))),
    }
}

/// Canonical lexical form of a plain boolean.
pub fn canonical(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

//! Decimal encoding.
//!
//! Layout: sign flag, integral part as unsigned digit run, number of fraction
//! digits as unsigned integer, fraction digits as unsigned digit run. Keeping
//! the digit count preserves the fraction exactly as written, trailing zeros
//! included. Negative zero is normalised to positive zero.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, boolean, unsigned_integer};

/// Obergrenze fuer Nachkommastellen, fuehrende Nullen eingeschlossen.
pub const MAX_FRACTION_DIGITS: usize = 4096;

/// A decimal value split into its digit runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decimal {
    pub negative: bool,
    /// Integral digits without leading zeros ("0" for zero).
    pub integral: String,
    /// Fraction digits exactly as written (may be empty).
    pub fraction: String,
}

impl Decimal {
    /// Parses the XSD lexical form `[+-]?(\d+(\.\d*)?|\.\d+)`.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        let (negative, body) = match t.as_bytes().first()? {
            b'-' => (true, &t[1..]),
            b'+' => (false, &t[1..]),
            _ => (false, t),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if frac_part.len() > MAX_FRACTION_DIGITS {
            return None;
        }
        let integral = int_part.trim_start_matches('0');
        let integral = if integral.is_empty() { "0" } else { integral };
        let is_zero = integral == "0" && frac_part.bytes().all(|b| b == b'0');
        Some(Self {
            negative: negative && !is_zero,
            integral: integral.to_string(),
            fraction: frac_part.to_string(),
        })
    }

    /// Lexical form: `-?int(.frac)?`.
    pub fn to_lexical(&self) -> String {
        let mut out = String::with_capacity(self.integral.len() + self.fraction.len() + 2);
        if self.negative {
            out.push('-');
        }
        out.push_str(&self.integral);
        if !self.fraction.is_empty() {
            out.push('.');
            out.push_str(&self.fraction);
        }
        out
    }
}

pub fn encode(writer: &mut BitWriter, value: &Decimal) -> Result<()> {
    boolean::encode(writer, value.negative);
    unsigned_integer::encode_digits(writer, &value.integral)?;
    if value.fraction.len() > MAX_FRACTION_DIGITS {
        return Err(Error::malformed_value(format!("{} fraction digits", value.fraction.len())));
    }
    unsigned_integer::encode(writer, value.fraction.len() as u64);
    if !value.fraction.is_empty() {
        unsigned_integer::encode_digits(writer, &value.fraction)?;
    }
    Ok(())
}

pub fn decode(reader: &mut BitReader) -> Result<Decimal> {
    let negative = boolean::decode(reader)?;
    let integral = unsigned_integer::decode_digits(reader)?;
    let frac_len = unsigned_integer::decode_usize(reader)?;
    if frac_len > MAX_FRACTION_DIGITS {
        return Err(Error::malformed_value(format!("fraction digit count {frac_len} out of range")));
    }
    let fraction = if frac_len == 0 {
        String::new()
    } else {
        let digits = unsigned_integer::decode_digits(reader)?;
        if digits.len() > frac_len {
            return Err(Error::malformed_value(format!(
                "fraction has {} digits, count says {frac_len}",
                digits.len()
            )));
        }
        format!("{digits:0>frac_len$}")
    };
    Ok(Decimal { negative, integral, fraction })
}

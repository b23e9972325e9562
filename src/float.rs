//! Float encoding (EXI 7.1.4), shared by xs:float and xs:double.
//!
//! Two signed integers: a base-10 mantissa and an exponent in
//! -(2^14-1)..=2^14-1. The exponent -(2^14) marks the special values:
//! mantissa 1 = INF, -1 = -INF, -2 = negative zero, anything else = NaN.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, integer};

const EXPONENT_MIN: i64 = -(1 << 14) + 1;
const EXPONENT_MAX: i64 = (1 << 14) - 1;

/// Exponent reserved for INF, -INF, NaN and -0.
pub const SPECIAL_EXPONENT: i64 = -(1 << 14);

const NEGATIVE_ZERO_MANTISSA: i64 = -2;

/// Signifikante Stellen, die sicher in `i64` passen.
const MAX_MANTISSA_DIGITS: usize = 18;

/// A decoded float value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Float {
    /// A finite value `mantissa × 10^exponent`, trailing mantissa zeros stripped.
    Value { mantissa: i64, exponent: i64 },
    NegativeZero,
    Infinity,
    NegativeInfinity,
    NaN,
}

impl Float {
    /// Parses the xs:double lexical space.
    ///
    /// Mantissas longer than 18 significant digits are rounded half-up to 18
    /// digits with the exponent adjusted. Returns `None` for malformed text and
    /// for values whose exponent leaves the EXI range.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        match t {
            "INF" | "+INF" => return Some(Self::Infinity),
            "-INF" => return Some(Self::NegativeInfinity),
            "NaN" => return Some(Self::NaN),
            _ => {}
        }
        let (negative, body) = match t.as_bytes().first()? {
            b'-' => (true, &t[1..]),
            b'+' => (false, &t[1..]),
            _ => (false, t),
        };
        let (num, exp) = match body.find(['e', 'E']) {
            Some(pos) => (&body[..pos], Some(&body[pos + 1..])),
            None => (body, None),
        };
        let exp: i64 = match exp {
            Some(e) => {
                let digits = e.strip_prefix(['+', '-']).unwrap_or(e);
                if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                e.parse().ok()?
            }
            None => 0,
        };
        let (int_part, frac_part) = num.split_once('.').unwrap_or((num, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }
        if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut digits: String = format!("{int_part}{frac_part}");
        let mut exponent = exp.checked_sub(frac_part.len() as i64)?;
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            return Some(if negative { Self::NegativeZero } else { Self::Value { mantissa: 0, exponent: 0 } });
        }
        digits = trimmed.to_string();
        let mut round_up = false;
        if digits.len() > MAX_MANTISSA_DIGITS {
            let dropped = digits.len() - MAX_MANTISSA_DIGITS;
            round_up = digits.as_bytes()[MAX_MANTISSA_DIGITS] >= b'5';
            digits.truncate(MAX_MANTISSA_DIGITS);
            exponent = exponent.checked_add(dropped as i64)?;
        }
        let mut magnitude: i64 = digits.parse().ok()?;
        if round_up {
            // 10^18 passt noch in i64
            magnitude += 1;
        }
        while magnitude != 0 && magnitude % 10 == 0 {
            magnitude /= 10;
            exponent += 1;
        }
        if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
            return None;
        }
        let mantissa = if negative { -magnitude } else { magnitude };
        Some(Self::Value { mantissa, exponent })
    }

    /// Canonical lexical form (`mantissaEexponent`, or the special literals).
    pub fn to_lexical(self) -> String {
        match self {
            Self::Value { mantissa, exponent } => format!("{mantissa}E{exponent}"),
            Self::NegativeZero => "-0E0".to_string(),
            Self::Infinity => "INF".to_string(),
            Self::NegativeInfinity => "-INF".to_string(),
            Self::NaN => "NaN".to_string(),
        }
    }
}

pub fn encode(writer: &mut BitWriter, value: Float) {
    let (mantissa, exponent) = match value {
        Float::Value { mantissa, exponent } => (mantissa, exponent),
        Float::NegativeZero => (NEGATIVE_ZERO_MANTISSA, SPECIAL_EXPONENT),
        Float::Infinity => (1, SPECIAL_EXPONENT),
        Float::NegativeInfinity => (-1, SPECIAL_EXPONENT),
        Float::NaN => (0, SPECIAL_EXPONENT),
    };
    integer::encode(writer, mantissa);
    integer::encode(writer, exponent);
}

pub fn decode(reader: &mut BitReader) -> Result<Float> {
    let mantissa = integer::decode(reader)?;
    let exponent = integer::decode(reader)?;
    if exponent == SPECIAL_EXPONENT {
        return Ok(match mantissa {
            1 => Float::Infinity,
            -1 => Float::NegativeInfinity,
            NEGATIVE_ZERO_MANTISSA => Float::NegativeZero,
            _ => Float::NaN,
        });
    }
    if !(EXPONENT_MIN..=EXPONENT_MAX).contains(&exponent) {
        return Err(Error::malformed_value(format!("float exponent {exponent} out of range")));
    }
    Ok(Float::Value { mantissa, exponent })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Float) -> Float {
        let mut w = BitWriter::new();
        encode(&mut w, value);
        let mut r = BitReader::new(w.into_vec());
        decode(&mut r).unwrap()
    }

    #[test]
    fn parse_strips_trailing_zeros() {
        assert_eq!(Float::parse("1.50"), Some(Float::Value { mantissa: 15, exponent: -1 }));
        assert_eq!(Float::parse("1200"), Some(Float::Value { mantissa: 12, exponent: 2 }));
        assert_eq!(Float::parse("-4.5E3"), Some(Float::Value { mantissa: -45, exponent: 2 }));
    }

    #[test]
    fn special_values_are_sentinels() {
        for v in [Float::Infinity, Float::NegativeInfinity, Float::NaN, Float::NegativeZero] {
            assert_eq!(round_trip(v), v);
        }
        assert_eq!(Float::parse("-0"), Some(Float::NegativeZero));
        assert_eq!(Float::parse("-0.0E5"), Some(Float::NegativeZero));
        assert_eq!(Float::parse("0.0"), Some(Float::Value { mantissa: 0, exponent: 0 }));
    }

    #[test]
    fn special_lexical_forms() {
        assert_eq!(Float::parse("INF").unwrap().to_lexical(), "INF");
        assert_eq!(Float::parse("-INF").unwrap().to_lexical(), "-INF");
        assert_eq!(Float::parse("NaN").unwrap().to_lexical(), "NaN");
    }

    #[test]
    fn rejects_out_of_range() {
        assert_eq!(Float::parse("1E99999"), None);
        assert_eq!(Float::parse("1.2.3"), None);
        assert_eq!(Float::parse("E5"), None);
    }

    #[test]
    fn lange_mantisse_wird_gerundet() {
        assert_eq!(
            Float::parse("3.14159265358979323846"),
            Some(Float::Value { mantissa: 314159265358979324, exponent: -17 })
        );
        assert_eq!(
            Float::parse("123456789012345678901234"),
            Some(Float::Value { mantissa: 123456789012345679, exponent: 6 })
        );
        // Uebertrag bis in die naechste Stelle
        assert_eq!(
            Float::parse("-9999999999999999999"),
            Some(Float::Value { mantissa: -1, exponent: 19 })
        );
        assert_eq!(
            Float::parse("0.1000000000000000000001"),
            Some(Float::Value { mantissa: 1, exponent: -1 })
        );
    }

    #[test]
    fn finite_round_trip() {
        let v = Float::parse("3.14159").unwrap();
        assert_eq!(round_trip(v), v);
        assert_eq!(v.to_lexical(), "314159E-5");
    }

    #[test]
    fn bad_exponent_is_malformed() {
        let mut w = BitWriter::new();
        integer::encode(&mut w, 1);
        integer::encode(&mut w, 20_000);
        let mut r = BitReader::new(w.into_vec());
        assert!(matches!(decode(&mut r), Err(Error::MalformedValue(_))));
    }
}

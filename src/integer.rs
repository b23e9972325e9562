//! Signed and bounded integers (EXI 7.1.5).
//!
//! Signed: a sign flag followed by the magnitude as unsigned integer, where a
//! negative `v` stores `-(v + 1)`. Bounded: a range of at most 4096 values is
//! written as n-bit offset from the lower bound.

use crate::bitstream::{BitReader, BitWriter};
use crate::unsigned_integer;
use crate::{Error, Result};

/// Groesster Wertebereich, der noch als n-bit Offset codiert wird.
pub const MAX_BOUNDED_RANGE: u64 = 4096;

/// Encodes a signed `i64`.
pub fn encode(writer: &mut BitWriter, value: i64) {
    if value < 0 {
        writer.write_flag(true);
        // -(v+1) ist fuer i64::MIN definiert
        unsigned_integer::encode(writer, (-(value + 1)) as u64);
    } else {
        writer.write_flag(false);
        unsigned_integer::encode(writer, value as u64);
    }
}

/// Decodes a signed integer that must fit `i64`.
pub fn decode(reader: &mut BitReader) -> Result<i64> {
    let negative = reader.read_flag()?;
    let magnitude = unsigned_integer::decode(reader)?;
    let m = i64::try_from(magnitude).map_err(|_| Error::IntegerOverflow)?;
    Ok(if negative { -m - 1 } else { m })
}

/// Encodes a signed integer of any size from its canonical lexical form
/// (`-?[0-9]+`, no leading `+`).
pub fn encode_digits(writer: &mut BitWriter, text: &str) -> Result<()> {
    if let Ok(v) = text.parse::<i64>() {
        encode(writer, v);
        return Ok(());
    }
    match text.strip_prefix('-') {
        Some(mag) => {
            writer.write_flag(true);
            unsigned_integer::encode_digits(writer, &decrement(mag))
        }
        None => {
            writer.write_flag(false);
            unsigned_integer::encode_digits(writer, text)
        }
    }
}

/// Decodes a signed integer of any size into its canonical lexical form.
pub fn decode_digits(reader: &mut BitReader) -> Result<String> {
    let negative = reader.read_flag()?;
    let magnitude = unsigned_integer::decode_digits(reader)?;
    if negative {
        Ok(format!("-{}", increment(&magnitude)))
    } else {
        Ok(magnitude)
    }
}

/// Encodes `value` as n-bit offset from `min`.
pub fn encode_bounded(writer: &mut BitWriter, value: i64, min: i64, bits: u8) -> Result<()> {
    let offset = value.checked_sub(min).ok_or(Error::IntegerOverflow)?;
    if offset < 0 || (bits < 64 && offset as u64 >= (1u64 << bits)) {
        return Err(Error::IntegerOverflow);
    }
    writer.write_n_bit(offset as u64, bits);
    Ok(())
}

/// Decodes an n-bit offset from `min`.
pub fn decode_bounded(reader: &mut BitReader, min: i64, bits: u8) -> Result<i64> {
    let offset = reader.read_n_bit(bits)?;
    i64::try_from(offset)
        .ok()
        .and_then(|o| min.checked_add(o))
        .ok_or(Error::IntegerOverflow)
}

/// Dezimal-String minus eins; Eingabe > 0, ohne Vorzeichen.
fn decrement(digits: &str) -> String {
    let mut bytes: Vec<u8> = digits.bytes().collect();
    for b in bytes.iter_mut().rev() {
        if *b == b'0' {
            *b = b'9';
        } else {
            *b -= 1;
            break;
        }
    }
    let s: String = bytes.into_iter().map(char::from).collect();
    let trimmed = s.trim_start_matches('0');
    if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
}

/// Dezimal-String plus eins, ohne Vorzeichen.
fn increment(digits: &str) -> String {
    let mut bytes: Vec<u8> = digits.bytes().collect();
    let mut carry = true;
    for b in bytes.iter_mut().rev() {
        if *b == b'9' {
            *b = b'0';
        } else {
            *b += 1;
            carry = false;
            break;
        }
    }
    let mut s: String = bytes.into_iter().map(char::from).collect();
    if carry {
        s.insert(0, '1');
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: i64) -> i64 {
        let mut w = BitWriter::new();
        encode(&mut w, v);
        let mut r = BitReader::new(w.into_vec());
        decode(&mut r).unwrap()
    }

    #[test]
    fn signed_values() {
        for v in [0, 1, -1, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(round_trip(v), v);
        }
    }

    #[test]
    fn negative_one_stores_zero_magnitude() {
        let mut w = BitWriter::new();
        encode(&mut w, -1);
        // Sign-Bit 1, danach Oktett 0x00
        assert_eq!(w.into_vec(), vec![0x80, 0x00]);
    }

    #[test]
    fn big_negative_digit_run() {
        let text = "-98765432109876543210";
        let mut w = BitWriter::new();
        encode_digits(&mut w, text).unwrap();
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode_digits(&mut r).unwrap(), text);
    }

    #[test]
    fn big_positive_digit_run() {
        let text = "98765432109876543210";
        let mut w = BitWriter::byte_aligned();
        encode_digits(&mut w, text).unwrap();
        let mut r = BitReader::byte_aligned(w.into_vec());
        assert_eq!(decode_digits(&mut r).unwrap(), text);
    }

    #[test]
    fn bounded_offsets() {
        let mut w = BitWriter::new();
        encode_bounded(&mut w, 105, 100, 4).unwrap();
        assert!(encode_bounded(&mut w, 99, 100, 4).is_err());
        assert!(encode_bounded(&mut w, 116, 100, 4).is_err());
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode_bounded(&mut r, 100, 4).unwrap(), 105);
    }

    #[test]
    fn decimal_string_helpers() {
        assert_eq!(decrement("1000"), "999");
        assert_eq!(decrement("1"), "0");
        assert_eq!(increment("999"), "1000");
        assert_eq!(increment("0"), "1");
    }
}

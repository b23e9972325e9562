//! String encoding (EXI 7.1.10).
//!
//! Laenge in Zeichen als Unsigned Integer, danach jeder Code Point als
//! Unsigned Integer. Die String-Tabellen verschieben die Laenge um einen
//! Offset (+1 fuer Local Names, +2 fuer Values), daher die `_with_offset`
//! Varianten.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, unsigned_integer};

pub fn encode(writer: &mut BitWriter, value: &str) {
    encode_with_offset(writer, value, 0);
}

/// Writes `char_count + offset`, then the code points.
pub fn encode_with_offset(writer: &mut BitWriter, value: &str, offset: u64) {
    let count = if value.is_ascii() { value.len() } else { value.chars().count() };
    unsigned_integer::encode(writer, count as u64 + offset);
    encode_chars(writer, value);
}

/// Writes only the code points (length already written by the caller).
pub fn encode_chars(writer: &mut BitWriter, value: &str) {
    if value.is_ascii() && !writer.is_aligned() {
        // ASCII-Codepoints sind genau ein Unsigned-Integer-Oktett
        writer.write_bytes(value.as_bytes());
        return;
    }
    for ch in value.chars() {
        unsigned_integer::encode(writer, u64::from(u32::from(ch)));
    }
}

pub fn decode(reader: &mut BitReader) -> Result<String> {
    let len = unsigned_integer::decode_usize(reader)?;
    decode_chars(reader, len)
}

/// Reads `len` code points.
pub fn decode_chars(reader: &mut BitReader, len: usize) -> Result<String> {
    // Jeder Code Point braucht mindestens ein Oktett
    if len.saturating_mul(8) > reader.remaining_bits() {
        return Err(Error::TruncatedStream);
    }
    let mut s = String::with_capacity(len);
    for _ in 0..len {
        let cp = unsigned_integer::decode(reader)?;
        let ch = u32::try_from(cp)
            .ok()
            .and_then(char::from_u32)
            .ok_or(Error::InvalidCodePoint(cp))?;
        s.push(ch);
    }
    Ok(s)
}

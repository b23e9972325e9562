//! Variable-length unsigned integers (EXI 7.1.6).
//!
//! Each octet carries seven data bits and a continuation bit (MSB); the least
//! significant group comes first. Values beyond `u64` travel the same way: the
//! decimal digit run is converted to 7-bit groups and back.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result};

/// Obergrenze fuer 7-Bit-Gruppen einer Zahl (~ 2000 Dezimalstellen).
const MAX_GROUPS: usize = 1024;

/// Limb-Basis fuer die Dezimal-Arithmetik.
const LIMB: u64 = 1_000_000_000;

/// Encodes a `u64`.
#[inline]
pub fn encode(writer: &mut BitWriter, value: u64) {
    let mut v = value;
    loop {
        let low7 = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            writer.write_byte(low7);
            break;
        }
        writer.write_byte(0x80 | low7);
    }
}

/// Decodes a value that must fit into `u64`.
pub fn decode(reader: &mut BitReader) -> Result<u64> {
    let mut result = 0u64;
    let mut shift: u32 = 0;
    loop {
        let byte = reader.read_byte()?;
        let data = u64::from(byte & 0x7F);
        // Bei shift 63 ist nur noch Daten-Bit 0 gueltig
        if shift >= 63 && (data > 1 || byte & 0x80 != 0 || shift > 63) {
            return Err(Error::IntegerOverflow);
        }
        result |= data << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Decodes a value and narrows it to `usize` (lengths, counts).
pub fn decode_usize(reader: &mut BitReader) -> Result<usize> {
    usize::try_from(decode(reader)?).map_err(|_| Error::IntegerOverflow)
}

/// Encodes an arbitrary-size non-negative integer given as ASCII decimal digits.
///
/// Leading zeros are ignored. Fails with `MalformedValue` on non-digits.
pub fn encode_digits(writer: &mut BitWriter, digits: &str) -> Result<()> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::malformed_value(format!("not a digit run: '{digits}'")));
    }
    if let Ok(v) = digits.parse::<u64>() {
        encode(writer, v);
        return Ok(());
    }
    let mut limbs = parse_limbs(digits);
    let mut groups = Vec::new();
    while !is_zero(&limbs) {
        groups.push(div_small(&mut limbs, 128) as u8);
    }
    if groups.len() > MAX_GROUPS {
        return Err(Error::IntegerOverflow);
    }
    let last = groups.len() - 1;
    for (i, g) in groups.iter().enumerate() {
        writer.write_byte(if i == last { *g } else { 0x80 | *g });
    }
    Ok(())
}

/// Decodes an arbitrary-size non-negative integer into canonical decimal digits.
pub fn decode_digits(reader: &mut BitReader) -> Result<String> {
    let mut groups = Vec::new();
    loop {
        let byte = reader.read_byte()?;
        groups.push(byte & 0x7F);
        if byte & 0x80 == 0 {
            break;
        }
        if groups.len() >= MAX_GROUPS {
            return Err(Error::IntegerOverflow);
        }
    }
    if groups.len() <= 9 {
        let v = groups
            .iter()
            .rev()
            .fold(0u64, |acc, g| (acc << 7) | u64::from(*g));
        return Ok(v.to_string());
    }
    // Von der hoechstwertigen Gruppe abwaerts: n = n*128 + g
    let mut limbs: Vec<u64> = vec![0];
    for g in groups.iter().rev() {
        mul_add_small(&mut limbs, 128, u64::from(*g));
    }
    Ok(limbs_to_string(&limbs))
}

/// Little-endian Limbs zur Basis 10^9.
fn parse_limbs(digits: &str) -> Vec<u64> {
    let bytes = digits.as_bytes();
    let mut limbs = Vec::with_capacity(bytes.len() / 9 + 1);
    let mut end = bytes.len();
    while end > 0 {
        let start = end.saturating_sub(9);
        let chunk = bytes[start..end]
            .iter()
            .fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'));
        limbs.push(chunk);
        end = start;
    }
    limbs
}

fn is_zero(limbs: &[u64]) -> bool {
    limbs.iter().all(|l| *l == 0)
}

fn div_small(limbs: &mut [u64], divisor: u64) -> u64 {
    let mut rem = 0u64;
    for limb in limbs.iter_mut().rev() {
        let cur = rem * LIMB + *limb;
        *limb = cur / divisor;
        rem = cur % divisor;
    }
    rem
}

fn mul_add_small(limbs: &mut Vec<u64>, mul: u64, add: u64) {
    let mut carry = add;
    for limb in limbs.iter_mut() {
        let cur = *limb * mul + carry;
        *limb = cur % LIMB;
        carry = cur / LIMB;
    }
    while carry > 0 {
        limbs.push(carry % LIMB);
        carry /= LIMB;
    }
}

fn limbs_to_string(limbs: &[u64]) -> String {
    let mut iter = limbs.iter().rev().skip_while(|l| **l == 0);
    let Some(first) = iter.next() else {
        return "0".to_string();
    };
    let mut out = first.to_string();
    for limb in iter {
        out.push_str(&format!("{limb:09}"));
    }
    out
}

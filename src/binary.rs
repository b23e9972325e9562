//! Binary encoding (EXI 7.1.1) for xs:base64Binary and xs:hexBinary.
//!
//! On the wire: octet count as Unsigned Integer, then the raw octets. The
//! textual form is only reconstructed when events are materialised.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::bitstream::{BitReader, BitWriter};
use crate::{Result, unsigned_integer};

/// Which lexical space a binary value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryForm {
    Base64,
    Hex,
}

impl BinaryForm {
    /// Parses the lexical text into octets. Whitespace is ignored.
    pub fn parse(self, text: &str) -> Option<Vec<u8>> {
        let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        match self {
            Self::Base64 => STANDARD.decode(compact.as_bytes()).ok(),
            Self::Hex => parse_hex(&compact),
        }
    }

    /// Canonical text: padded base64 or uppercase hex.
    pub fn to_lexical(self, bytes: &[u8]) -> String {
        match self {
            Self::Base64 => STANDARD.encode(bytes),
            Self::Hex => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    out.push_str(&format!("{b:02X}"));
                }
                out
            }
        }
    }
}

fn parse_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    let digits = text.as_bytes();
    let mut out = Vec::with_capacity(digits.len() / 2);
    for pair in digits.chunks_exact(2) {
        let hi = (pair[0] as char).to_digit(16)?;
        let lo = (pair[1] as char).to_digit(16)?;
        out.push((hi * 16 + lo) as u8);
    }
    Some(out)
}

pub fn encode(writer: &mut BitWriter, value: &[u8]) {
    unsigned_integer::encode(writer, value.len() as u64);
    writer.write_bytes(value);
}

pub fn decode(reader: &mut BitReader) -> Result<Vec<u8>> {
    let len = unsigned_integer::decode_usize(reader)?;
    reader.read_bytes(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn base64_round_trip() {
        let bytes = BinaryForm::Base64.parse("SGVs\nbG8=").unwrap();
        assert_eq!(bytes, b"Hello");
        let mut w = BitWriter::new();
        encode(&mut w, &bytes);
        let mut r = BitReader::new(w.into_vec());
        let back = decode(&mut r).unwrap();
        assert_eq!(BinaryForm::Base64.to_lexical(&back), "SGVsbG8=");
    }

    #[test]
    fn hex_is_uppercased() {
        let bytes = BinaryForm::Hex.parse("0fb7").unwrap();
        assert_eq!(bytes, vec![0x0F, 0xB7]);
        assert_eq!(BinaryForm::Hex.to_lexical(&bytes), "0FB7");
        assert!(BinaryForm::Hex.parse("abc").is_none());
        assert!(BinaryForm::Hex.parse("zz").is_none());
    }

    #[test]
    fn empty_is_single_length_byte() {
        let mut w = BitWriter::new();
        encode(&mut w, &[]);
        assert_eq!(w.into_vec(), vec![0x00]);
    }

    #[test]
    fn truncated_octets() {
        let mut w = BitWriter::new();
        unsigned_integer::encode(&mut w, 5);
        w.write_byte(0xAA);
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode(&mut r).unwrap_err(), Error::TruncatedStream);
    }
}

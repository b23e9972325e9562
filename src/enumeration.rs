//! Enumeration encoding (EXI 7.2).
//!
//! Der Index des Werts in Schema-Reihenfolge als n-bit Unsigned Integer,
//! n = ⌈log₂(m)⌉. Union-, List- und QName-Typen laufen nicht hier durch.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, bit_width};

pub fn encode(writer: &mut BitWriter, index: usize, count: usize) -> Result<()> {
    if index >= count {
        return Err(Error::malformed_value(format!("enumeration index {index} >= {count}")));
    }
    writer.write_n_bit(index as u64, bit_width::for_count(count));
    Ok(())
}

/// Liest einen Index. Bei m keine Zweierpotenz kann ein korrupter Stream
/// einen Index >= m liefern.
pub fn decode(reader: &mut BitReader, count: usize) -> Result<usize> {
    let index = reader.read_n_bit(bit_width::for_count(count))? as usize;
    if index >= count {
        return Err(Error::malformed_value(format!("enumeration index {index} >= {count}")));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drei_werte_zwei_bits() {
        let mut w = BitWriter::new();
        encode(&mut w, 2, 3).unwrap();
        assert_eq!(w.bit_position(), 2);
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode(&mut r, 3).unwrap(), 2);
    }

    #[test]
    fn einzelwert_ohne_bits() {
        let mut w = BitWriter::new();
        encode(&mut w, 0, 1).unwrap();
        assert_eq!(w.bit_position(), 0);
    }

    #[test]
    fn index_ausserhalb() {
        let mut w = BitWriter::new();
        assert!(encode(&mut w, 3, 3).is_err());
        w.write_n_bit(3, 2);
        let mut r = BitReader::new(w.into_vec());
        assert!(matches!(decode(&mut r, 3), Err(Error::MalformedValue(_))));
    }

    #[test]
    fn byte_aligned_ein_byte() {
        let mut w = BitWriter::byte_aligned();
        encode(&mut w, 5, 7).unwrap();
        let bytes = w.into_vec();
        assert_eq!(bytes, vec![5]);
        let mut r = BitReader::byte_aligned(bytes);
        assert_eq!(decode(&mut r, 7).unwrap(), 5);
    }
}

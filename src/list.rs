//! List encoding (EXI 7.1.11).
//!
//! Anzahl der Items als Unsigned Integer, danach jedes Item in der
//! Repraesentation des Item-Typs.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, unsigned_integer};

/// Obergrenze gegen OOM bei korrupten Streams.
pub const MAX_LIST_LENGTH: usize = 1 << 24;

/// Splits an xs:list lexical value at XML whitespace.
pub fn split_items(text: &str) -> Vec<&str> {
    text.split_ascii_whitespace().collect()
}

pub fn encode<T, F>(writer: &mut BitWriter, items: &[T], mut encode_item: F) -> Result<()>
where
    F: FnMut(&mut BitWriter, &T) -> Result<()>,
{
    unsigned_integer::encode(writer, items.len() as u64);
    for item in items {
        encode_item(writer, item)?;
    }
    Ok(())
}

pub fn decode<T, F>(reader: &mut BitReader, mut decode_item: F) -> Result<Vec<T>>
where
    F: FnMut(&mut BitReader) -> Result<T>,
{
    let len = unsigned_integer::decode_usize(reader)?;
    if len > MAX_LIST_LENGTH {
        return Err(Error::malformed_value(format!("list length {len} exceeds limit")));
    }
    let mut items = Vec::with_capacity(len.min(1024));
    for _ in 0..len {
        items.push(decode_item(reader)?);
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{integer, string};

    #[test]
    fn leere_liste() {
        let mut w = BitWriter::new();
        encode(&mut w, &[] as &[i64], |w, v| {
            integer::encode(w, *v);
            Ok(())
        })
        .unwrap();
        assert_eq!(w.into_vec(), vec![0x00]);
    }

    #[test]
    fn integer_liste() {
        let items = vec![-3i64, 0, 700];
        let mut w = BitWriter::new();
        encode(&mut w, &items, |w, v| {
            integer::encode(w, *v);
            Ok(())
        })
        .unwrap();
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode(&mut r, integer::decode).unwrap(), items);
    }

    #[test]
    fn string_items_aus_lexical() {
        let items = split_items("  foo\tbar\n baz ");
        assert_eq!(items, vec!["foo", "bar", "baz"]);
        let mut w = BitWriter::new();
        encode(&mut w, &items, |w, s| {
            string::encode(w, s);
            Ok(())
        })
        .unwrap();
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(decode(&mut r, string::decode).unwrap(), vec!["foo", "bar", "baz"]);
    }

    #[test]
    fn zu_lang() {
        let mut w = BitWriter::new();
        unsigned_integer::encode(&mut w, (MAX_LIST_LENGTH + 1) as u64);
        let mut r = BitReader::new(w.into_vec());
        let res: Result<Vec<i64>> = decode(&mut r, integer::decode);
        assert!(matches!(res, Err(Error::MalformedValue(_))));
    }
}

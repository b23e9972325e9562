//! Typed values (EXI 7, Table 7-1).
//!
//! Jeder Simple Type bekommt beim Aufbau des `GrammarSet` eine feste
//! [`ValueRepr`]. Der Encoder prueft einen Wert mit [`ValueRepr::parse`]
//! (das entscheidet auch, ob eine typisierte Production passt) und schreibt
//! ihn spaeter mit [`encode`]; der Decoder liest mit [`decode`] direkt die
//! kanonische lexikalische Form.
//!
//! Mit `preserve.lexicalValues` laeuft jeder Wert als String durch die
//! Value-Partitionen (EXI 7.1.10), siehe [`encode_lexical`].

use std::sync::Arc;

use crate::binary::{self, BinaryForm};
use crate::bitstream::{BitReader, BitWriter};
use crate::boolean::{self, BooleanValue};
use crate::datetime::{self, DateTime, DateTimeKind};
use crate::decimal::{self, Decimal};
use crate::duration::{self, Duration};
use crate::float::{self, Float};
use crate::qname::QName;
use crate::schema::{DatatypeKind, SchemaQuery, SimpleTypeDef, TypeDef, TypeId, Variety};
use crate::string_table::StringTable;
use crate::{Result, bit_width, enumeration, integer, list, string, unsigned_integer};

// ============================================================================
// Repraesentation
// ============================================================================

/// Integer representation chosen from the range facets (EXI 7.1.5, 7.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerRepr {
    /// n-bit offset from `min`, range of at most 4096 values.
    Bounded { min: i64, bits: u8 },
    Unsigned,
    Signed,
}

/// How the values of one simple type travel on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ValueRepr {
    #[default]
    String,
    Boolean { patterned: bool },
    Integer { repr: IntegerRepr, min: Option<i128>, max: Option<i128> },
    Decimal,
    Float,
    Duration,
    DateTime(DateTimeKind),
    Binary(BinaryForm),
    QName,
    /// Declared values in schema order (EXI 7.2).
    Enumeration(Arc<[Arc<str>]>),
    List(Box<ValueRepr>),
}

impl ValueRepr {
    /// Representation of `type_id`; complex types and unions map to `String`.
    pub fn for_type(schema: &dyn SchemaQuery, type_id: TypeId) -> Self {
        let Some(simple) = schema.type_def(type_id).and_then(TypeDef::simple) else {
            return Self::String;
        };
        match &simple.variety {
            Variety::Union(_) => Self::String,
            Variety::List(item) => {
                let item_repr = match schema.type_def(*item).and_then(TypeDef::simple) {
                    Some(s) if s.variety == Variety::Atomic => Self::atomic(s),
                    // Union oder Liste als Item: nur noch Zeichen
                    _ => Self::String,
                };
                Self::List(Box::new(item_repr))
            }
            Variety::Atomic => Self::atomic(simple),
        }
    }

    fn atomic(simple: &SimpleTypeDef) -> Self {
        let facets = &simple.facets;
        if !facets.enumeration.is_empty() && !matches!(simple.kind, DatatypeKind::QName | DatatypeKind::Notation) {
            return Self::Enumeration(facets.enumeration.iter().map(|v| Arc::from(v.as_str())).collect());
        }
        match simple.kind {
            DatatypeKind::String | DatatypeKind::Notation => Self::String,
            DatatypeKind::Boolean => Self::Boolean { patterned: facets.patterned },
            DatatypeKind::Decimal => Self::Decimal,
            DatatypeKind::Integer => {
                let (min, max) = (facets.min_inclusive, facets.max_inclusive);
                let repr = match (min, max) {
                    (Some(lo), Some(hi))
                        if hi >= lo
                            && hi - lo < i128::from(integer::MAX_BOUNDED_RANGE)
                            && i64::try_from(lo).is_ok() =>
                    {
                        IntegerRepr::Bounded { min: lo as i64, bits: bit_width::for_range((hi - lo) as u64) }
                    }
                    (Some(lo), _) if lo >= 0 => IntegerRepr::Unsigned,
                    _ => IntegerRepr::Signed,
                };
                Self::Integer { repr, min, max }
            }
            DatatypeKind::Float | DatatypeKind::Double => Self::Float,
            DatatypeKind::Duration => Self::Duration,
            DatatypeKind::DateTime(kind) => Self::DateTime(kind),
            DatatypeKind::Base64Binary => Self::Binary(BinaryForm::Base64),
            DatatypeKind::HexBinary => Self::Binary(BinaryForm::Hex),
            DatatypeKind::QName => Self::QName,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String)
    }

    /// Validates `text` and converts it into its wire form.
    ///
    /// `resolve` maps a prefix to its namespace (QName values). `None` means
    /// the text is not in the value space; the caller then falls back to an
    /// untyped production or fails in strict mode.
    pub fn parse(&self, text: &str, resolve: &dyn Fn(&str) -> Option<Arc<str>>) -> Option<TypedValue> {
        match self {
            Self::String => Some(TypedValue::Text(Arc::from(text))),
            Self::Boolean { .. } => BooleanValue::parse(text).map(TypedValue::Boolean),
            Self::Integer { min, max, .. } => {
                let digits = canonical_integer(text)?;
                within(&digits, *min, *max).then_some(TypedValue::Integer(digits))
            }
            Self::Decimal => Decimal::parse(text).map(TypedValue::Decimal),
            Self::Float => Float::parse(text).map(TypedValue::Float),
            Self::Duration => Duration::parse(text).map(TypedValue::Duration),
            Self::DateTime(kind) => DateTime::parse(*kind, text).map(TypedValue::DateTime),
            Self::Binary(form) => form.parse(text).map(TypedValue::Binary),
            Self::QName => parse_qname(text.trim(), resolve).map(TypedValue::QName),
            Self::Enumeration(values) => values
                .iter()
                .position(|v| &**v == text)
                .or_else(|| values.iter().position(|v| &**v == text.trim()))
                .map(TypedValue::Enumeration),
            Self::List(item) => {
                let items = list::split_items(text)
                    .into_iter()
                    .map(|t| item.parse(t, resolve))
                    .collect::<Option<Vec<_>>>()?;
                Some(TypedValue::List(items))
            }
        }
    }
}

/// A validated value in wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(Arc<str>),
    Boolean(BooleanValue),
    /// Canonical digits, `-` for negatives.
    Integer(String),
    Decimal(Decimal),
    Float(Float),
    Duration(Duration),
    DateTime(DateTime),
    Binary(Vec<u8>),
    QName(QName),
    Enumeration(usize),
    List(Vec<TypedValue>),
}

fn canonical_integer(text: &str) -> Option<String> {
    let t = text.trim();
    let (negative, digits) = match t.as_bytes().first()? {
        b'-' => (true, &t[1..]),
        b'+' => (false, &t[1..]),
        _ => (false, t),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let trimmed = digits.trim_start_matches('0');
    let magnitude = if trimmed.is_empty() { "0" } else { trimmed };
    Some(if negative && magnitude != "0" { format!("-{magnitude}") } else { magnitude.to_string() })
}

fn within(digits: &str, min: Option<i128>, max: Option<i128>) -> bool {
    match digits.parse::<i128>() {
        Ok(v) => min.is_none_or(|m| v >= m) && max.is_none_or(|m| v <= m),
        // jenseits von i128: nur ohne Schranke in dieser Richtung
        Err(_) => {
            if digits.starts_with('-') {
                min.is_none()
            } else {
                max.is_none()
            }
        }
    }
}

fn parse_qname(text: &str, resolve: &dyn Fn(&str) -> Option<Arc<str>>) -> Option<QName> {
    let (prefix, local) = match text.split_once(':') {
        Some((p, l)) => (p, l),
        None => ("", text),
    };
    if local.is_empty() || local.contains(':') || text.contains(char::is_whitespace) {
        return None;
    }
    let uri = resolve(prefix)?;
    Some(QName::with_prefix(uri, local, prefix))
}

// ============================================================================
// Encode / Decode
// ============================================================================

/// Writes a validated value. `owner` selects the local value partition of
/// string values.
pub fn encode(
    writer: &mut BitWriter,
    repr: &ValueRepr,
    value: &TypedValue,
    strings: &mut StringTable,
    owner: &QName,
) -> Result<()> {
    encode_inner(writer, repr, value, Some((strings, owner)))
}

/// Writes the text of any value through the value partitions.
pub fn encode_lexical(writer: &mut BitWriter, text: &str, strings: &mut StringTable, owner: &QName) {
    strings.encode_value(writer, owner, text);
}

/// `table == None`: list items, strings without value partitions (EXI 7.1.11).
fn encode_inner(
    writer: &mut BitWriter,
    repr: &ValueRepr,
    value: &TypedValue,
    table: Option<(&mut StringTable, &QName)>,
) -> Result<()> {
    match (repr, value) {
        (_, TypedValue::Text(text)) => match table {
            Some((strings, owner)) => strings.encode_value(writer, owner, text),
            None => string::encode(writer, text),
        },
        (ValueRepr::Boolean { patterned: true }, TypedValue::Boolean(b)) => boolean::encode_patterned(writer, *b),
        (_, TypedValue::Boolean(b)) => boolean::encode(writer, b.as_bool()),
        (ValueRepr::Integer { repr, .. }, TypedValue::Integer(digits)) => match repr {
            IntegerRepr::Bounded { min, bits } => {
                let v: i64 = digits.parse().map_err(|_| crate::Error::IntegerOverflow)?;
                integer::encode_bounded(writer, v, *min, *bits)?;
            }
            IntegerRepr::Unsigned => unsigned_integer::encode_digits(writer, digits)?,
            IntegerRepr::Signed => integer::encode_digits(writer, digits)?,
        },
        (_, TypedValue::Integer(digits)) => integer::encode_digits(writer, digits)?,
        (_, TypedValue::Decimal(d)) => decimal::encode(writer, d)?,
        (_, TypedValue::Float(f)) => float::encode(writer, *f),
        (_, TypedValue::Duration(d)) => duration::encode(writer, d)?,
        (_, TypedValue::DateTime(dt)) => datetime::encode(writer, dt)?,
        (_, TypedValue::Binary(bytes)) => binary::encode(writer, bytes),
        (_, TypedValue::QName(q)) => match table {
            Some((strings, _)) => strings.encode_qname(writer, q, true),
            None => string::encode(writer, &q.lexical()),
        },
        (ValueRepr::Enumeration(values), TypedValue::Enumeration(index)) => {
            enumeration::encode(writer, *index, values.len())?;
        }
        (ValueRepr::List(item), TypedValue::List(items)) => {
            list::encode(writer, items, |w, v| encode_inner(w, item, v, None))?;
        }
        (repr, value) => {
            return Err(crate::Error::malformed_value(format!("{value:?} does not fit {repr:?}")));
        }
    }
    Ok(())
}

/// Reads a value and returns its canonical lexical form.
pub fn decode(reader: &mut BitReader, repr: &ValueRepr, strings: &mut StringTable, owner: &QName) -> Result<Arc<str>> {
    decode_inner(reader, repr, Some((strings, owner)))
}

pub fn decode_lexical(reader: &mut BitReader, strings: &mut StringTable, owner: &QName) -> Result<Arc<str>> {
    strings.decode_value(reader, owner)
}

fn decode_inner(reader: &mut BitReader, repr: &ValueRepr, table: Option<(&mut StringTable, &QName)>) -> Result<Arc<str>> {
    Ok(match repr {
        ValueRepr::String => match table {
            Some((strings, owner)) => return strings.decode_value(reader, owner),
            None => Arc::from(string::decode(reader)?),
        },
        ValueRepr::Boolean { patterned: true } => Arc::from(boolean::decode_patterned(reader)?.lexical()),
        ValueRepr::Boolean { patterned: false } => Arc::from(boolean::canonical(boolean::decode(reader)?)),
        ValueRepr::Integer { repr, .. } => Arc::from(match repr {
            IntegerRepr::Bounded { min, bits } => integer::decode_bounded(reader, *min, *bits)?.to_string(),
            IntegerRepr::Unsigned => unsigned_integer::decode_digits(reader)?,
            IntegerRepr::Signed => integer::decode_digits(reader)?,
        }),
        ValueRepr::Decimal => Arc::from(decimal::decode(reader)?.to_lexical()),
        ValueRepr::Float => Arc::from(float::decode(reader)?.to_lexical()),
        ValueRepr::Duration => Arc::from(duration::decode(reader)?.to_lexical()),
        ValueRepr::DateTime(kind) => Arc::from(datetime::decode(reader, *kind)?.to_lexical()),
        ValueRepr::Binary(form) => Arc::from(form.to_lexical(&binary::decode(reader)?)),
        ValueRepr::QName => match table {
            Some((strings, _)) => Arc::from(strings.decode_qname(reader, true)?.lexical()),
            None => Arc::from(string::decode(reader)?),
        },
        ValueRepr::Enumeration(values) => {
            let index = enumeration::decode(reader, values.len())?;
            Arc::clone(&values[index])
        }
        ValueRepr::List(item) => {
            let items = list::decode(reader, |r| decode_inner(r, item, None))?;
            Arc::from(items.iter().map(|s| &**s).collect::<Vec<_>>().join(" "))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qname::URI_XSI;
    use crate::schema::{Facets, SchemaModel};

    fn no_ns(prefix: &str) -> Option<Arc<str>> {
        match prefix {
            "" => Some(Arc::from("")),
            "xsi" => Some(Arc::from(URI_XSI)),
            _ => None,
        }
    }

    fn roundtrip(repr: &ValueRepr, text: &str, aligned: bool) -> String {
        let owner = QName::new("", "v");
        let value = repr.parse(text, &no_ns).unwrap_or_else(|| panic!("'{text}' ungueltig"));
        let mut w = if aligned { BitWriter::byte_aligned() } else { BitWriter::new() };
        let mut enc = StringTable::new(None);
        encode(&mut w, repr, &value, &mut enc, &owner).unwrap();
        let bytes = w.into_vec();
        let mut r = if aligned { BitReader::byte_aligned(bytes) } else { BitReader::new(bytes) };
        let mut dec = StringTable::new(None);
        decode(&mut r, repr, &mut dec, &owner).unwrap().to_string()
    }

    fn repr_of(name: &str) -> ValueRepr {
        let schema = SchemaModel::builder().build().unwrap();
        ValueRepr::for_type(&schema, schema.builtin(name).unwrap())
    }

    #[test]
    fn repraesentation_aus_facetten() {
        assert_eq!(repr_of("string"), ValueRepr::String);
        assert_eq!(repr_of("boolean"), ValueRepr::Boolean { patterned: false });
        assert!(matches!(repr_of("unsignedByte"), ValueRepr::Integer { repr: IntegerRepr::Bounded { min: 0, bits: 8 }, .. }));
        assert!(matches!(repr_of("byte"), ValueRepr::Integer { repr: IntegerRepr::Bounded { min: -128, bits: 8 }, .. }));
        assert!(matches!(repr_of("int"), ValueRepr::Integer { repr: IntegerRepr::Signed, .. }));
        assert!(matches!(repr_of("nonNegativeInteger"), ValueRepr::Integer { repr: IntegerRepr::Unsigned, .. }));
        assert_eq!(repr_of("double"), ValueRepr::Float);
        assert_eq!(repr_of("NMTOKENS"), ValueRepr::List(Box::new(ValueRepr::String)));
    }

    #[test]
    fn grosse_und_kleine_integer() {
        for aligned in [false, true] {
            let integer = repr_of("integer");
            assert_eq!(roundtrip(&integer, "98765432109876543210", aligned), "98765432109876543210");
            assert_eq!(roundtrip(&integer, "-98765432109876543210", aligned), "-98765432109876543210");
            assert_eq!(roundtrip(&integer, "+007", aligned), "7");
            assert_eq!(roundtrip(&repr_of("byte"), "-128", aligned), "-128");
            assert_eq!(roundtrip(&repr_of("unsignedLong"), "18446744073709551615", aligned), "18446744073709551615");
        }
    }

    #[test]
    fn integer_ausserhalb_des_bereichs() {
        assert!(repr_of("byte").parse("128", &no_ns).is_none());
        assert!(repr_of("nonNegativeInteger").parse("-1", &no_ns).is_none());
        assert!(repr_of("int").parse("1.5", &no_ns).is_none());
    }

    #[test]
    fn float_sonderwerte() {
        let f = repr_of("double");
        assert_eq!(roundtrip(&f, "-0", false), "-0E0");
        assert_eq!(roundtrip(&f, "INF", false), "INF");
        assert_eq!(roundtrip(&f, "-INF", true), "-INF");
        assert_eq!(roundtrip(&f, "NaN", true), "NaN");
        assert_eq!(roundtrip(&f, "1.25e2", false), "125E0");
    }

    #[test]
    fn boolean_mit_pattern() {
        let plain = repr_of("boolean");
        assert_eq!(roundtrip(&plain, "1", false), "true");
        let patterned = ValueRepr::Boolean { patterned: true };
        assert_eq!(roundtrip(&patterned, "1", false), "1");
        assert_eq!(roundtrip(&patterned, "false", true), "false");
    }

    #[test]
    fn enumeration_und_liste() {
        let mut b = SchemaModel::builder();
        let s = b.builtin("string");
        let colors = b.simple_restriction(None, s, Facets::enumeration(["red", "green", "blue"]));
        let int = b.builtin("int");
        let ints = b.list_type(None, int);
        let schema = b.build().unwrap();
        let e = ValueRepr::for_type(&schema, colors);
        assert_eq!(roundtrip(&e, "blue", false), "blue");
        assert!(e.parse("pink", &no_ns).is_none());
        let l = ValueRepr::for_type(&schema, ints);
        assert_eq!(roundtrip(&l, " 1  -2 3 ", true), "1 -2 3");
    }

    #[test]
    fn qname_wert_mit_prefix() {
        let q = repr_of("QName");
        assert_eq!(roundtrip(&q, "xsi:type", false), "xsi:type");
        assert!(q.parse("unbekannt:x", &no_ns).is_none());
    }

    #[test]
    fn datum_behaelt_zeitzone() {
        let d = repr_of("dateTime");
        assert_eq!(roundtrip(&d, "2024-02-29T23:59:59.5+05:30", false), "2024-02-29T23:59:59.5+05:30");
    }

    #[test]
    fn strings_nutzen_value_partition() {
        let owner = QName::new("", "v");
        let mut strings = StringTable::new(None);
        let mut w = BitWriter::new();
        let v = ValueRepr::String.parse("abc", &no_ns).unwrap();
        encode(&mut w, &ValueRepr::String, &v, &mut strings, &owner).unwrap();
        assert_eq!(strings.local_value_count(&owner), 1);
        encode_lexical(&mut w, "abc", &mut strings, &owner);
        let mut r = BitReader::new(w.into_vec());
        let mut dec = StringTable::new(None);
        assert_eq!(&*decode(&mut r, &ValueRepr::String, &mut dec, &owner).unwrap(), "abc");
        assert_eq!(&*decode_lexical(&mut r, &mut dec, &owner).unwrap(), "abc");
    }
}

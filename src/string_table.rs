//! String tables (EXI 7.3, Appendix D).
//!
//! Partitionen: URI, Prefix und Local-Name je URI, Values global und lokal
//! je besitzendem QName. Alle sind append-only und leben eine Session lang.
//!
//! Codierung:
//! - URI / Prefix: n-bit `id+1` bei Treffer (n = ⌈log₂(m+1)⌉), sonst `0` + String
//! - Local-Name: Treffer `0` + n-bit Index, sonst `len+1` + Zeichen
//! - Value: lokaler Treffer `0` + n-bit, globaler Treffer `1` + n-bit,
//!   sonst `len+2` + Zeichen

use std::sync::Arc;

use crate::bitstream::{BitReader, BitWriter};
use crate::qname::{QName, URI_XML, URI_XSD, URI_XSI};
use crate::{Error, FastHashMap, Result, bit_width, string, unsigned_integer};

/// Local names of the XML Schema built-in types in the pre-populated table (EXI D.3).
pub const XSD_TYPE_NAMES: [&str; 46] = [
    "ENTITIES", "ENTITY", "ID", "IDREF", "IDREFS", "NCName", "NMTOKEN", "NMTOKENS",
    "NOTATION", "Name", "QName", "anySimpleType", "anyType", "anyURI", "base64Binary",
    "boolean", "byte", "date", "dateTime", "decimal", "double", "duration", "float",
    "gDay", "gMonth", "gMonthDay", "gYear", "gYearMonth", "hexBinary", "int", "integer",
    "language", "long", "negativeInteger", "nonNegativeInteger", "nonPositiveInteger",
    "normalizedString", "positiveInteger", "short", "string", "time", "token",
    "unsignedByte", "unsignedInt", "unsignedLong", "unsignedShort",
];

/// Appendix D: URI-IDs der vorbelegten Partitionen.
pub const URI_ID_EMPTY: usize = 0;
pub const URI_ID_XML: usize = 1;
pub const URI_ID_XSI: usize = 2;

#[derive(Debug, Clone, Default)]
struct Partition {
    entries: Vec<Arc<str>>,
    lookup: FastHashMap<Arc<str>, usize>,
}

impl Partition {
    fn with_entries<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut p = Self::default();
        for v in values {
            p.add(v);
        }
        p
    }

    fn get_id(&self, value: &str) -> Option<usize> {
        self.lookup.get(value).copied()
    }

    /// Fuegt hinzu, falls neu. Liefert die ID.
    fn add(&mut self, value: &str) -> usize {
        if let Some(id) = self.get_id(value) {
            return id;
        }
        let id = self.entries.len();
        let rc: Arc<str> = Arc::from(value);
        self.entries.push(Arc::clone(&rc));
        self.lookup.insert(rc, id);
        id
    }

    fn get(&self, id: usize) -> Option<&Arc<str>> {
        self.entries.get(id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Pre-population for one URI: the URI and its local names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialEntry {
    pub uri: Arc<str>,
    pub local_names: Vec<Arc<str>>,
}

/// The string tables of one encode or decode session.
#[derive(Debug, Clone)]
pub struct StringTable {
    uris: Partition,
    prefixes: Vec<Partition>,
    local_names: Vec<Partition>,
    global_values: Partition,
    local_values: FastHashMap<QName, Partition>,
    value_max_length: Option<u32>,
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StringTable {
    /// Tables for a schema-less stream (EXI D.1, D.2).
    pub fn new(value_max_length: Option<u32>) -> Self {
        let mut table = Self {
            uris: Partition::default(),
            prefixes: Vec::new(),
            local_names: Vec::new(),
            global_values: Partition::default(),
            local_values: FastHashMap::default(),
            value_max_length,
        };
        table.push_uri("", &[""], &[]);
        table.push_uri(URI_XML, &["xml"], &["base", "id", "lang", "space"]);
        table.push_uri(URI_XSI, &["xsi"], &["nil", "type"]);
        table
    }

    /// Tables for a schema-informed stream: XSD types plus the schema's URIs and
    /// names, which the caller provides sorted (EXI D.3).
    pub fn with_schema(entries: &[InitialEntry], value_max_length: Option<u32>) -> Self {
        let mut table = Self::new(value_max_length);
        table.push_uri(URI_XSD, &[], &XSD_TYPE_NAMES);
        for entry in entries {
            let uri_id = table.uris.add(&entry.uri);
            table.ensure_uri_slots(uri_id);
            for name in &entry.local_names {
                table.local_names[uri_id].add(name);
            }
        }
        table
    }

    fn push_uri(&mut self, uri: &str, prefixes: &[&str], names: &[&str]) {
        let id = self.uris.add(uri);
        self.ensure_uri_slots(id);
        for p in prefixes {
            self.prefixes[id].add(p);
        }
        for n in names {
            self.local_names[id].add(n);
        }
    }

    fn ensure_uri_slots(&mut self, uri_id: usize) {
        while self.prefixes.len() <= uri_id {
            self.prefixes.push(Partition::default());
            self.local_names.push(Partition::default());
        }
    }

    pub fn uri_count(&self) -> usize {
        self.uris.len()
    }

    pub fn uri_id(&self, uri: &str) -> Option<usize> {
        self.uris.get_id(uri)
    }

    /// ID of a URI the grammar implies (SE(uri:*), declared names), added
    /// without writing anything when new.
    pub fn intern_uri(&mut self, uri: &str) -> usize {
        let id = self.uris.add(uri);
        self.ensure_uri_slots(id);
        id
    }

    pub fn local_name_count(&self, uri_id: usize) -> usize {
        self.local_names.get(uri_id).map_or(0, Partition::len)
    }

    pub fn local_name_id(&self, uri_id: usize, name: &str) -> Option<usize> {
        self.local_names.get(uri_id)?.get_id(name)
    }

    pub fn global_value_count(&self) -> usize {
        self.global_values.len()
    }

    pub fn local_value_count(&self, owner: &QName) -> usize {
        self.local_values.get(owner).map_or(0, Partition::len)
    }

    // --- URI ---

    pub fn encode_uri(&mut self, writer: &mut BitWriter, uri: &str) -> usize {
        let bits = bit_width::for_count(self.uris.len() + 1);
        if let Some(id) = self.uris.get_id(uri) {
            writer.write_n_bit(id as u64 + 1, bits);
            return id;
        }
        writer.write_n_bit(0, bits);
        string::encode(writer, uri);
        let id = self.uris.add(uri);
        self.ensure_uri_slots(id);
        id
    }

    pub fn decode_uri(&mut self, reader: &mut BitReader) -> Result<(usize, Arc<str>)> {
        let bits = bit_width::for_count(self.uris.len() + 1);
        let code = reader.read_n_bit(bits)? as usize;
        if code == 0 {
            let uri = string::decode(reader)?;
            let id = self.uris.add(&uri);
            self.ensure_uri_slots(id);
            return Ok((id, Arc::clone(&self.uris.entries[id])));
        }
        let id = code - 1;
        let uri = self.uris.get(id).ok_or(Error::StringTableIndex {
            partition: "uri",
            index: id,
            len: self.uris.len(),
        })?;
        Ok((id, Arc::clone(uri)))
    }

    // --- Local-Name ---

    pub fn encode_local_name(&mut self, writer: &mut BitWriter, uri_id: usize, name: &str) {
        let partition = &mut self.local_names[uri_id];
        if let Some(id) = partition.get_id(name) {
            unsigned_integer::encode(writer, 0);
            writer.write_n_bit(id as u64, bit_width::for_count(partition.len()));
            return;
        }
        string::encode_with_offset(writer, name, 1);
        partition.add(name);
    }

    pub fn decode_local_name(&mut self, reader: &mut BitReader, uri_id: usize) -> Result<Arc<str>> {
        let partition = &mut self.local_names[uri_id];
        let len = unsigned_integer::decode_usize(reader)?;
        if len == 0 {
            let id = reader.read_n_bit(bit_width::for_count(partition.len()))? as usize;
            return partition.get(id).cloned().ok_or(Error::StringTableIndex {
                partition: "local-name",
                index: id,
                len: partition.len(),
            });
        }
        let name = string::decode_chars(reader, len - 1)?;
        let id = partition.add(&name);
        Ok(Arc::clone(&partition.entries[id]))
    }

    // --- Prefix ---

    pub fn encode_prefix(&mut self, writer: &mut BitWriter, uri_id: usize, prefix: &str) {
        let partition = &mut self.prefixes[uri_id];
        let bits = bit_width::for_count(partition.len() + 1);
        if let Some(id) = partition.get_id(prefix) {
            writer.write_n_bit(id as u64 + 1, bits);
            return;
        }
        writer.write_n_bit(0, bits);
        string::encode(writer, prefix);
        partition.add(prefix);
    }

    pub fn decode_prefix(&mut self, reader: &mut BitReader, uri_id: usize) -> Result<Arc<str>> {
        let partition = &mut self.prefixes[uri_id];
        let bits = bit_width::for_count(partition.len() + 1);
        let code = reader.read_n_bit(bits)? as usize;
        if code == 0 {
            let prefix = string::decode(reader)?;
            let id = partition.add(&prefix);
            return Ok(Arc::clone(&partition.entries[id]));
        }
        partition.get(code - 1).cloned().ok_or(Error::StringTableIndex {
            partition: "prefix",
            index: code - 1,
            len: partition.len(),
        })
    }

    /// Most recently added prefix for `uri_id`, used when a name needs one.
    pub fn last_prefix(&self, uri_id: usize) -> Option<Arc<str>> {
        self.prefixes.get(uri_id)?.entries.last().cloned()
    }

    // --- QName (EXI 7.1.7) ---

    /// URI, local name and, with `with_prefix`, the prefix (empty if none).
    pub fn encode_qname(&mut self, writer: &mut BitWriter, qname: &QName, with_prefix: bool) {
        let uri_id = self.encode_uri(writer, &qname.uri);
        self.encode_local_name(writer, uri_id, &qname.local_name);
        if with_prefix {
            self.encode_prefix(writer, uri_id, qname.prefix.as_deref().unwrap_or(""));
        }
    }

    pub fn decode_qname(&mut self, reader: &mut BitReader, with_prefix: bool) -> Result<QName> {
        let (uri_id, uri) = self.decode_uri(reader)?;
        let local = self.decode_local_name(reader, uri_id)?;
        let mut qname = QName::new(uri, local);
        if with_prefix {
            qname.prefix = Some(self.decode_prefix(reader, uri_id)?);
        }
        Ok(qname)
    }

    /// Writes only the prefix of a name whose URI and local name the grammar implies.
    pub fn encode_prefix_of(&mut self, writer: &mut BitWriter, qname: &QName) {
        let uri_id = self.intern_uri(&qname.uri);
        self.encode_prefix(writer, uri_id, qname.prefix.as_deref().unwrap_or(""));
    }

    pub fn decode_prefix_of(&mut self, reader: &mut BitReader, qname: &QName) -> Result<Arc<str>> {
        let uri_id = self.intern_uri(&qname.uri);
        self.decode_prefix(reader, uri_id)
    }

    // --- Values (EXI 7.3.3) ---

    fn admits(&self, value: &str) -> bool {
        let len = value.chars().count();
        len > 0 && self.value_max_length.is_none_or(|max| len <= max as usize)
    }

    fn add_value(&mut self, owner: &QName, value: &str) {
        if self.admits(value) && self.global_values.get_id(value).is_none() {
            self.global_values.add(value);
            self.local_values.entry(owner.expanded()).or_default().add(value);
        }
    }

    pub fn encode_value(&mut self, writer: &mut BitWriter, owner: &QName, value: &str) {
        if let Some(local) = self.local_values.get(owner)
            && let Some(id) = local.get_id(value)
        {
            unsigned_integer::encode(writer, 0);
            writer.write_n_bit(id as u64, bit_width::for_count(local.len()));
            return;
        }
        if let Some(id) = self.global_values.get_id(value) {
            unsigned_integer::encode(writer, 1);
            writer.write_n_bit(id as u64, bit_width::for_count(self.global_values.len()));
            return;
        }
        string::encode_with_offset(writer, value, 2);
        self.add_value(owner, value);
    }

    pub fn decode_value(&mut self, reader: &mut BitReader, owner: &QName) -> Result<Arc<str>> {
        match unsigned_integer::decode_usize(reader)? {
            0 => {
                let local = self.local_values.get(owner);
                let len = local.map_or(0, Partition::len);
                let id = reader.read_n_bit(bit_width::for_count(len))? as usize;
                local.and_then(|p| p.get(id)).cloned().ok_or(Error::StringTableIndex {
                    partition: "local-value",
                    index: id,
                    len,
                })
            }
            1 => {
                let len = self.global_values.len();
                let id = reader.read_n_bit(bit_width::for_count(len))? as usize;
                self.global_values.get(id).cloned().ok_or(Error::StringTableIndex {
                    partition: "global-value",
                    index: id,
                    len,
                })
            }
            n => {
                let value = string::decode_chars(reader, n - 2)?;
                self.add_value(owner, &value);
                Ok(Arc::from(value))
            }
        }
    }
}

//! Transmogrifier: EXI events → EXI stream (EXI 6).
//!
//! Der Encoder sucht fuer jedes Event die passende Production im Katalog des
//! aktuellen Zustands (benannte vor Wildcards), schreibt deren Event Code und
//! den Inhalt und folgt der Production. Ein Start-Tag (SE, NS, AT) wird
//! gepuffert, damit xsi:type, xsi:nil und die sortierten Attribute in
//! Grammatik-Reihenfolge geschrieben werden koennen; aufeinanderfolgende
//! CH-Events werden zusammengefasst.
//!
//! # Beispiel
//!
//! ```
//! use std::sync::Arc;
//! use exigram::encoder::encode;
//! use exigram::event::ExiEvent;
//! use exigram::options::ExiOptions;
//! use exigram::qname::QName;
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(Arc::new(QName::new("", "root"))),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let bytes = encode(&events, &ExiOptions::default()).unwrap();
//! assert!(!bytes.is_empty());
//! ```

mod compression;
mod qname;
mod value;


use std::sync::Arc;

use crate::bitstream::BitWriter;
use crate::context::{Session, ValueSpec};
use crate::event::{AtContent, ExiEvent, NsContent};
use crate::event_code;
use crate::event_types::{EventType, EventTypeList};
use crate::grammar::{EventShape, GrammarCache};
use crate::header;
use crate::options::{Alignment, ExiOptions, GrammarOptions};
use crate::qname::{QName, URI_XML};
use crate::schema::SchemaQuery;
use crate::{Error, Result, boolean, string};

use compression::ChannelBuffer;

// ============================================================================
// Start-Tag / Namespaces
// ============================================================================

/// Buffered SE with its NS and AT events.
#[derive(Debug)]
struct StartTag {
    qname: Arc<QName>,
    namespaces: Vec<NsContent>,
    xsi_type: Option<Arc<QName>>,
    /// `xsi:type` given as a plain attribute; resolved when the tag is flushed.
    xsi_type_text: Option<Arc<str>>,
    xsi_nil: Option<Arc<str>>,
    attributes: Vec<AtContent>,
}

impl StartTag {
    fn new(qname: Arc<QName>) -> Self {
        Self {
            qname,
            namespaces: Vec::new(),
            xsi_type: None,
            xsi_type_text: None,
            xsi_nil: None,
            attributes: Vec::new(),
        }
    }
}

/// In-scope prefix bindings, needed to resolve QName values.
#[derive(Debug, Default)]
struct NamespaceScopes {
    bindings: Vec<(Arc<str>, Arc<str>)>,
    marks: Vec<usize>,
}

impl NamespaceScopes {
    fn push(&mut self) {
        self.marks.push(self.bindings.len());
    }

    fn pop(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.bindings.truncate(mark);
        }
    }

    fn declare(&mut self, prefix: &Arc<str>, uri: &Arc<str>) {
        self.bindings.push((Arc::clone(prefix), Arc::clone(uri)));
    }

    fn resolve(&self, prefix: &str) -> Option<Arc<str>> {
        if let Some((_, uri)) = self.bindings.iter().rev().find(|(p, _)| &**p == prefix) {
            return Some(Arc::clone(uri));
        }
        match prefix {
            "" => Some(Arc::from("")),
            "xml" => Some(Arc::from(URI_XML)),
            _ => None,
        }
    }
}

// ============================================================================
// Transmogrifier
// ============================================================================

/// EXI stream encoder.
pub struct Transmogrifier {
    session: Session,
    /// Body (bit-packed, byte-aligned) or structure channel of the current block.
    writer: BitWriter,
    /// Header and finished blocks (channel alignments).
    out: BitWriter,
    channels: Option<ChannelBuffer>,
    start_tag: Option<StartTag>,
    text: Option<String>,
    scopes: NamespaceScopes,
}

impl Transmogrifier {
    /// Encoder for a schema-less stream.
    pub fn new(options: ExiOptions) -> Result<Self> {
        Self::build(None, options)
    }

    /// Encoder for a schema-informed stream.
    pub fn with_schema(schema: Arc<dyn SchemaQuery>, options: ExiOptions) -> Result<Self> {
        Self::build(Some(schema), options)
    }

    fn build(schema: Option<Arc<dyn SchemaQuery>>, options: ExiOptions) -> Result<Self> {
        options.validate_for(schema.is_some())?;
        let set = GrammarCache::global().get(schema.as_ref(), GrammarOptions::from(&options))?;

        let mut writer = BitWriter::new();
        header::encode(&mut writer, &options, set.is_schema_informed());
        let alignment = options.alignment();
        let mut out = BitWriter::byte_aligned();
        let channels = if alignment.uses_channels() {
            out.write_bytes(&std::mem::replace(&mut writer, BitWriter::byte_aligned()).into_vec());
            Some(ChannelBuffer::new(options.block_size(), alignment == Alignment::Compression))
        } else {
            writer.set_aligned(alignment.is_byte_aligned());
            None
        };
        log::debug!("encoder: alignment={alignment:?}, schema_informed={}", set.is_schema_informed());

        Ok(Self {
            session: Session::new(set, options),
            writer,
            out,
            channels,
            start_tag: None,
            text: None,
            scopes: NamespaceScopes::default(),
        })
    }

    pub fn options(&self) -> &ExiOptions {
        &self.session.options
    }

    /// Encodes one event.
    pub fn encode_event(&mut self, event: &ExiEvent) -> Result<()> {
        if self.session.finished() {
            return Err(Error::EventOrder(format!("{} after ED", event.describe()).into()));
        }
        match event {
            ExiEvent::Characters(ch) => {
                self.flush_start_tag()?;
                self.text.get_or_insert_with(String::new).push_str(&ch.value);
                return Ok(());
            }
            ExiEvent::NamespaceDeclaration(ns) => {
                let tag = self.open_tag(event)?;
                tag.namespaces.push(ns.clone());
                self.scopes.declare(&ns.prefix, &ns.uri);
                return Ok(());
            }
            ExiEvent::Attribute(at) => {
                let tag = self.open_tag(event)?;
                if at.qname.is_xsi_type() {
                    tag.xsi_type_text = Some(Arc::clone(&at.value));
                } else if at.qname.is_xsi_nil() {
                    tag.xsi_nil = Some(Arc::clone(&at.value));
                } else {
                    tag.attributes.push(at.clone());
                }
                return Ok(());
            }
            ExiEvent::SchemaType(q) => {
                self.open_tag(event)?.xsi_type = Some(Arc::clone(q));
                return Ok(());
            }
            ExiEvent::SchemaNil(v) => {
                self.open_tag(event)?.xsi_nil = Some(Arc::clone(v));
                return Ok(());
            }
            _ => {}
        }

        self.flush_text()?;
        self.flush_start_tag()?;
        match event {
            ExiEvent::StartDocument => self.encode_simple(EventShape::StartDocument, event),
            ExiEvent::EndDocument => self.encode_end_document(),
            ExiEvent::StartElement(q) => {
                self.scopes.push();
                self.start_tag = Some(StartTag::new(Arc::clone(q)));
                Ok(())
            }
            ExiEvent::EndElement => {
                self.encode_simple(EventShape::EndElement, event)?;
                self.scopes.pop();
                Ok(())
            }
            ExiEvent::Comment(_)
            | ExiEvent::ProcessingInstruction(_)
            | ExiEvent::DocType(_)
            | ExiEvent::EntityReference(_) => self.encode_misc(event),
            ExiEvent::Characters(_)
            | ExiEvent::NamespaceDeclaration(_)
            | ExiEvent::Attribute(_)
            | ExiEvent::SchemaType(_)
            | ExiEvent::SchemaNil(_) => Ok(()),
        }
    }

    /// Encodes a complete event sequence.
    pub fn encode_all<'a>(&mut self, events: impl IntoIterator<Item = &'a ExiEvent>) -> Result<()> {
        for event in events {
            self.encode_event(event)?;
        }
        Ok(())
    }

    /// Returns the stream. ED must have been encoded.
    pub fn finish(self) -> Result<Vec<u8>> {
        if !self.session.finished() {
            return Err(Error::EventOrder("stream finished before ED".into()));
        }
        Ok(if self.channels.is_some() { self.out.into_vec() } else { self.writer.into_vec() })
    }

    fn open_tag(&mut self, event: &ExiEvent) -> Result<&mut StartTag> {
        self.start_tag
            .as_mut()
            .ok_or_else(|| Error::EventOrder(format!("{} outside a start tag", event.describe()).into()))
    }

    // ========================================================================
    // Event Codes
    // ========================================================================

    fn write_code(&mut self, list: &EventTypeList, ty: &EventType) -> Result<()> {
        if log::log_enabled!(log::Level::Trace) {
            let code = list.code(ty.ordinal).map(|c| c.to_string()).unwrap_or_default();
            log::trace!("{} → {code} in {}", ty.shape, list.key());
        }
        event_code::write(&mut self.writer, list, ty.ordinal)
    }

    fn mismatch(list: &EventTypeList, event: impl Into<String>) -> Error {
        Error::grammar_mismatch(event.into(), list.key().to_string())
    }

    /// Events without content: SD, EE.
    fn encode_simple(&mut self, shape: EventShape, event: &ExiEvent) -> Result<()> {
        let list = self.session.catalog()?;
        let ty = list.position(&shape).and_then(|i| list.get(i)).cloned();
        let ty = ty.ok_or_else(|| Self::mismatch(&list, event.describe()))?;
        self.write_code(&list, &ty)?;
        self.session.step(&ty, None)
    }

    fn encode_end_document(&mut self) -> Result<()> {
        if self.session.depth() > 0 {
            return Err(Error::EventOrder(format!("ED with {} open elements", self.session.depth()).into()));
        }
        self.encode_simple(EventShape::EndDocument, &ExiEvent::EndDocument)?;
        self.flush_block()
    }

    // ========================================================================
    // Start-Tag
    // ========================================================================

    fn flush_start_tag(&mut self) -> Result<()> {
        let Some(mut tag) = self.start_tag.take() else { return Ok(()) };
        // SE ohne Prefix: das folgende NS mit local-element-ns liefert ihn (EXI 4)
        if self.session.prefixes()
            && tag.qname.prefix.is_none()
            && let Some(ns) = tag.namespaces.iter().find(|ns| ns.local_element_ns && ns.uri == tag.qname.uri)
        {
            let q = &tag.qname;
            tag.qname = Arc::new(QName::with_prefix(Arc::clone(&q.uri), Arc::clone(&q.local_name), Arc::clone(&ns.prefix)));
        }
        self.encode_start_element(&tag.qname)?;
        for ns in &tag.namespaces {
            self.encode_namespace(ns)?;
        }
        if let Some(text) = tag.xsi_type_text.take() {
            tag.xsi_type = Some(Arc::new(self.resolve_qname(&text)?));
        }
        if let Some(type_name) = &tag.xsi_type {
            self.encode_xsi_type(type_name)?;
        }
        if let Some(nil) = &tag.xsi_nil {
            self.encode_xsi_nil(nil)?;
        }
        tag.attributes.sort_by(|a, b| a.qname.cmp(&b.qname));
        for at in &tag.attributes {
            self.encode_attribute(at)?;
        }
        Ok(())
    }

    fn resolve_qname(&self, text: &str) -> Result<QName> {
        let text = text.trim();
        let (prefix, local) = text.split_once(':').unwrap_or(("", text));
        let uri = self
            .scopes
            .resolve(prefix)
            .ok_or_else(|| Error::malformed_value(format!("undeclared prefix in QName '{text}'")))?;
        Ok(QName::with_prefix(uri, local, prefix))
    }

    fn encode_start_element(&mut self, qname: &Arc<QName>) -> Result<()> {
        let list = self.session.catalog()?;
        let ty = list
            .find(|s| match s {
                EventShape::StartElementSchemaQName { qname: q, .. } | EventShape::StartElementNamed(q) => {
                    q == qname
                }
                _ => false,
            })
            .or_else(|| {
                list.find(|s| matches!(s, EventShape::StartElementWildcardNs(uri) if **uri == *qname.uri))
            })
            .or_else(|| list.find(|s| *s == EventShape::StartElementWildcard))
            .cloned()
            .ok_or_else(|| Self::mismatch(&list, format!("SE({qname})")))?;
        if ty.tier > 0 {
            log::debug!("SE({qname}) via undeclared {} in {}", ty.shape, list.key());
        }
        self.write_code(&list, &ty)?;
        self.write_name(&ty.shape, qname);
        self.session.start_element(&ty, Arc::clone(qname))
    }

    fn encode_namespace(&mut self, ns: &NsContent) -> Result<()> {
        let list = self.session.catalog()?;
        let Some(ty) = list.find(|s| *s == EventShape::NamespaceDecl).cloned() else {
            if self.session.prefixes() {
                return Err(Self::mismatch(&list, format!("NS({})", ns.prefix)));
            }
            return Ok(());
        };
        self.write_code(&list, &ty)?;
        let strings = &mut self.session.strings;
        let uri_id = strings.encode_uri(&mut self.writer, &ns.uri);
        strings.encode_prefix(&mut self.writer, uri_id, &ns.prefix);
        boolean::encode(&mut self.writer, ns.local_element_ns);
        self.session.step(&ty, None)
    }

    /// `xsi:type` (EXI 8.5.4.4.2). Without an AT(xsi:type) production the
    /// attribute takes an attribute wildcard with a QName value.
    fn encode_xsi_type(&mut self, type_name: &Arc<QName>) -> Result<()> {
        let list = self.session.catalog()?;
        if let Some(ty) = list.find(|s| *s == EventShape::SchemaType).cloned() {
            self.write_code(&list, &ty)?;
            self.session.strings.encode_qname(&mut self.writer, type_name, true);
            self.session.step(&ty, None)?;
            return self.session.apply_xsi_type(type_name);
        }
        let qname = Arc::new(QName::xsi_type());
        let ty = self.special_attribute(&list, &qname)?;
        self.write_code(&list, &ty)?;
        self.write_name(&ty.shape, &qname);
        self.session.strings.encode_qname(&mut self.writer, type_name, true);
        self.session.step(&ty, Some(&qname))?;
        self.session.apply_xsi_type(type_name)
    }

    /// `xsi:nil` (EXI 8.5.4.4.2). Only AT(xsi:nil) productions give the value
    /// a meaning; otherwise it is an ordinary string in the structure.
    fn encode_xsi_nil(&mut self, text: &Arc<str>) -> Result<()> {
        let list = self.session.catalog()?;
        if let Some(ty) = list.find(|s| *s == EventShape::SchemaNil).cloned() {
            let nil = boolean::BooleanValue::parse(text)
                .ok_or_else(|| Error::malformed_value(format!("xsi:nil='{text}' is not a boolean")))?;
            self.write_code(&list, &ty)?;
            self.write_nil(text, nil);
            self.session.step(&ty, None)?;
            return self.session.apply_xsi_nil(nil.as_bool());
        }
        let qname = Arc::new(QName::xsi_nil());
        let ty = self.special_attribute(&list, &qname)?;
        self.write_code(&list, &ty)?;
        self.write_name(&ty.shape, &qname);
        self.session.strings.encode_value(&mut self.writer, &qname, text);
        self.session.step(&ty, Some(&qname))
    }

    /// Production for xsi:type / xsi:nil outside their own productions.
    fn special_attribute(&self, list: &EventTypeList, qname: &QName) -> Result<EventType> {
        list.find(|s| matches!(s, EventShape::AttributeNamed { qname: q, .. } if **q == *qname))
            .or_else(|| list.find(|s| matches!(s, EventShape::AttributeWildcardNs(uri) if **uri == *qname.uri)))
            .or_else(|| list.find(|s| *s == EventShape::AttributeWildcardAny))
            .or_else(|| list.find(|s| *s == EventShape::AttributeUntyped))
            .cloned()
            .ok_or_else(|| Self::mismatch(list, format!("AT({qname})")))
    }

    /// AT: declared name with a valid value first, then wildcards, then
    /// the untyped fallback.
    fn encode_attribute(&mut self, at: &AtContent) -> Result<()> {
        let list = self.session.catalog()?;
        let qname = &at.qname;
        let named = list
            .iter()
            .filter(|t| matches!(&t.shape, EventShape::AttributeNamed { qname: q, .. } if q == qname))
            .find_map(|t| self.prepare(t.type_id(), &at.value).map(|d| (t, t.type_id(), d)));
        let picked = named
            .or_else(|| {
                list.iter()
                    .filter(|t| match &t.shape {
                        EventShape::AttributeWildcardNs(uri) => **uri == *qname.uri,
                        EventShape::AttributeWildcardAny => true,
                        _ => false,
                    })
                    .find_map(|t| {
                        let type_id = self.session.attribute_type(t, qname);
                        self.prepare(type_id, &at.value).map(|d| (t, type_id, d))
                    })
            })
            .or_else(|| {
                list.find(|s| *s == EventShape::AttributeUntyped)
                    .and_then(|t| self.prepare(None, &at.value).map(|d| (t, None, d)))
            })
            .map(|(t, type_id, d)| (t.clone(), type_id, d));
        let Some((ty, type_id, data)) = picked else {
            return Err(Self::mismatch(&list, format!("AT({qname}=\"{}\")", at.value)));
        };
        if ty.tier > 0 {
            log::debug!("AT({qname}) via undeclared {} in {}", ty.shape, list.key());
        }
        self.write_code(&list, &ty)?;
        self.write_name(&ty.shape, qname);
        self.write_value(ValueSpec { owner: Arc::clone(qname), type_id }, data)?;
        self.session.step(&ty, Some(qname))?;
        self.maybe_flush_block()
    }

    // ========================================================================
    // Content
    // ========================================================================

    fn flush_text(&mut self) -> Result<()> {
        let Some(text) = self.text.take() else { return Ok(()) };
        if text.is_empty() {
            return Ok(());
        }
        let whitespace = text.chars().all(char::is_whitespace);
        if self.session.depth() == 0 {
            if whitespace {
                return Ok(());
            }
            return Err(Error::EventOrder("character data outside the root element".into()));
        }
        let text: Arc<str> = Arc::from(text);
        let list = self.session.catalog()?;
        let picked = list
            .iter()
            .filter(|t| matches!(t.shape, EventShape::CharactersTyped(_)))
            .find_map(|t| self.prepare(t.type_id(), &text).map(|d| (t, d)))
            .or_else(|| {
                list.find(|s| *s == EventShape::CharactersUntyped)
                    .and_then(|t| self.prepare(None, &text).map(|d| (t, d)))
            })
            .map(|(t, d)| (t.clone(), d));
        let Some((ty, data)) = picked else {
            if whitespace && self.session.strict() {
                log::debug!("whitespace dropped in {}", list.key());
                return Ok(());
            }
            return Err(Self::mismatch(&list, format!("CH(\"{text}\")")));
        };
        self.write_code(&list, &ty)?;
        let spec = self.session.characters_spec(&ty)?;
        self.write_value(spec, data)?;
        self.session.step(&ty, None)?;
        self.maybe_flush_block()
    }

    /// CM, PI, DT, ER. Without a production (option off) the event is dropped.
    fn encode_misc(&mut self, event: &ExiEvent) -> Result<()> {
        let shape = match event {
            ExiEvent::Comment(_) => EventShape::Comment,
            ExiEvent::ProcessingInstruction(_) => EventShape::ProcessingInstruction,
            ExiEvent::DocType(_) => EventShape::Dtd,
            _ => EventShape::EntityReference,
        };
        let list = self.session.catalog()?;
        let Some(ty) = list.position(&shape).and_then(|i| list.get(i)).cloned() else {
            log::trace!("{} dropped in {}", event.describe(), list.key());
            return Ok(());
        };
        self.write_code(&list, &ty)?;
        let w = &mut self.writer;
        match event {
            ExiEvent::Comment(text) => string::encode(w, text),
            ExiEvent::ProcessingInstruction(pi) => {
                string::encode(w, &pi.name);
                string::encode(w, &pi.text);
            }
            ExiEvent::DocType(dt) => {
                for part in [&dt.name, &dt.public, &dt.system, &dt.text] {
                    string::encode(w, part);
                }
            }
            ExiEvent::EntityReference(name) => string::encode(w, name),
            _ => {}
        }
        self.session.step(&ty, None)
    }
}

// ============================================================================
// Convenience
// ============================================================================

/// Encodes `events` without a schema.
pub fn encode(events: &[ExiEvent], options: &ExiOptions) -> Result<Vec<u8>> {
    let mut encoder = Transmogrifier::new(options.clone())?;
    encoder.encode_all(events)?;
    encoder.finish()
}

/// Encodes `events` against `schema`.
pub fn encode_with_schema(events: &[ExiEvent], schema: Arc<dyn SchemaQuery>, options: &ExiOptions) -> Result<Vec<u8>> {
    let mut encoder = Transmogrifier::with_schema(schema, options.clone())?;
    encoder.encode_all(events)?;
    encoder.finish()
}

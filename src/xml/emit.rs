use std::path::Path;
use std::sync::Arc;

use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::event::{AtContent, ChContent, ExiEvent, NsContent, PiContent};
use crate::qname::QName;
use crate::{Error, FastHashMap, Result};

use super::dtd::{EntityDecl, parse_doctype};
use super::{ParseFlags, normalize_line_endings};

/// One pass over an XML document.
pub(crate) struct Parser<'p> {
    flags: ParseFlags,
    base: Option<&'p Path>,
    events: Vec<ExiEvent>,
    /// CH-Coalescing: Text wird bis zum naechsten anderen Event gesammelt.
    text: Option<String>,
    depth: usize,
    entities: FastHashMap<String, EntityDecl>,
}

fn xml_err(e: impl std::fmt::Display) -> Error {
    Error::XmlParseError(e.to_string())
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(xml_err)
}

impl<'p> Parser<'p> {
    pub(crate) fn new(flags: ParseFlags, base: Option<&'p Path>) -> Self {
        Self { flags, base, events: Vec::new(), text: None, depth: 0, entities: FastHashMap::default() }
    }

    pub(crate) fn run(mut self, xml: &str) -> Result<Vec<ExiEvent>> {
        let xml = normalize_line_endings(xml);
        let mut reader = NsReader::from_str(&xml);
        reader.config_mut().trim_text(false);

        self.events.push(ExiEvent::StartDocument);
        loop {
            let event = reader
                .read_event()
                .map_err(|e| Error::XmlParseError(format!("at byte {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(e) => {
                    self.start(&reader, &e)?;
                    self.depth += 1;
                }
                Event::Empty(e) => {
                    self.start(&reader, &e)?;
                    self.events.push(ExiEvent::EndElement);
                }
                Event::End(_) => {
                    self.flush_text()?;
                    self.depth = self
                        .depth
                        .checked_sub(1)
                        .ok_or_else(|| xml_err("end tag without start tag"))?;
                    self.events.push(ExiEvent::EndElement);
                }
                Event::Text(e) => {
                    let raw = utf8(&e)?;
                    self.push_text(&unescape(raw).map_err(xml_err)?);
                }
                Event::CData(e) => self.push_text(utf8(&e)?),
                Event::GeneralRef(e) => self.reference(utf8(&e)?)?,
                Event::Comment(e) => {
                    if self.flags.comments {
                        let text = utf8(&e)?;
                        self.flush_text()?;
                        self.events.push(ExiEvent::Comment(Arc::from(text)));
                    }
                }
                Event::PI(e) => {
                    if self.flags.pis {
                        let name = Arc::from(utf8(e.target())?);
                        // S zwischen Target und Daten gehoert nicht zu den Daten (XML 1.0, 2.6)
                        let text = Arc::from(utf8(e.content())?.trim_start());
                        self.flush_text()?;
                        self.events.push(ExiEvent::ProcessingInstruction(PiContent { name, text }));
                    }
                }
                Event::DocType(e) => {
                    let (doctype, entities) = parse_doctype(utf8(&e)?);
                    self.entities = entities;
                    if self.flags.dtd {
                        self.flush_text()?;
                        self.events.push(ExiEvent::DocType(doctype));
                    }
                }
                Event::Decl(_) => {}
                Event::Eof => break,
            }
        }
        self.flush_text()?;
        if self.depth > 0 {
            return Err(xml_err(format!("{} unclosed elements at end of input", self.depth)));
        }
        self.events.push(ExiEvent::EndDocument);
        log::debug!("xml: {} events", self.events.len());
        Ok(self.events)
    }

    fn push_text(&mut self, s: &str) {
        if !s.is_empty() {
            self.text.get_or_insert_with(String::new).push_str(s);
        }
    }

    fn flush_text(&mut self) -> Result<()> {
        let Some(text) = self.text.take() else { return Ok(()) };
        if self.depth == 0 {
            if text.chars().all(char::is_whitespace) {
                return Ok(());
            }
            return Err(xml_err("character data outside the root element"));
        }
        self.events.push(ExiEvent::Characters(ChContent { value: Arc::from(text) }));
        Ok(())
    }

    /// `&name;` im Inhalt.
    fn reference(&mut self, name: &str) -> Result<()> {
        if let Some(code) = name.strip_prefix('#') {
            let ch = char_reference(code).ok_or_else(|| xml_err(format!("invalid character reference &{name};")))?;
            self.push_text(ch.encode_utf8(&mut [0; 4]));
            return Ok(());
        }
        if let Some(resolved) = resolve_predefined_entity(name) {
            self.push_text(resolved);
            return Ok(());
        }
        let decl = self.entities.get(name).cloned();
        match decl {
            Some(_) if self.flags.dtd => {
                self.flush_text()?;
                self.events.push(ExiEvent::EntityReference(Arc::from(name)));
            }
            Some(EntityDecl::Internal(value)) => self.push_text(&value),
            Some(EntityDecl::External(system)) if self.flags.resolve_external => {
                let path = self.base.map_or_else(|| Path::new(&system).to_path_buf(), |b| b.join(&system));
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::IoError(format!("external entity '{name}' ({}): {e}", path.display())))?;
                self.push_text(&normalize_line_endings(&content));
            }
            Some(EntityDecl::External(system)) => {
                log::debug!("external entity '{name}' ({system}) kept as reference");
                self.flush_text()?;
                self.events.push(ExiEvent::EntityReference(Arc::from(name)));
            }
            None => return Err(xml_err(format!("undeclared entity &{name};"))),
        }
        Ok(())
    }

    fn start(&mut self, reader: &NsReader<&[u8]>, e: &BytesStart<'_>) -> Result<()> {
        self.flush_text()?;
        let (uri, local) = reader.resolver().resolve_element(e.name());
        let qname = Arc::new(make_qname(resolved_uri(uri)?, utf8(local.as_ref())?, prefix_of(e.name())?));
        self.events.push(ExiEvent::StartElement(Arc::clone(&qname)));

        let mut attributes = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(xml_err)?;
            let key = attr.key.as_ref();
            let raw = utf8(&attr.value)?;
            let value = self.attribute_value(raw)?;

            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                let prefix = key.get(6..).map_or(Ok(""), utf8)?;
                let local_element_ns = *qname.uri == *value && qname.prefix.as_deref().unwrap_or("") == prefix;
                self.events.push(ExiEvent::NamespaceDeclaration(NsContent {
                    uri: Arc::from(value.as_str()),
                    prefix: Arc::from(prefix),
                    local_element_ns,
                }));
                continue;
            }
            let (uri, local) = reader.resolver().resolve_attribute(attr.key);
            let name = make_qname(resolved_uri(uri)?, utf8(local.as_ref())?, prefix_of(attr.key)?);
            if name.is_xsi_type() {
                let (uri, local) = reader.resolver().resolve_element(XmlQName(value.trim().as_bytes()));
                let type_name = make_qname(resolved_uri(uri)?, utf8(local.as_ref())?, prefix_of(XmlQName(value.trim().as_bytes()))?);
                attributes.push(ExiEvent::SchemaType(Arc::new(type_name)));
            } else if name.is_xsi_nil() {
                attributes.push(ExiEvent::SchemaNil(Arc::from(value.as_str())));
            } else {
                attributes.push(ExiEvent::Attribute(AtContent { qname: Arc::new(name), value: Arc::from(value) }));
            }
        }
        self.events.extend(attributes);
        Ok(())
    }

    /// Unescapes an attribute value with the predefined and the internal entities.
    fn attribute_value(&self, raw: &str) -> Result<String> {
        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(amp) = memchr::memchr(b'&', rest.as_bytes()) {
            out.push_str(&rest[..amp]);
            let after = &rest[amp + 1..];
            let semi = after.find(';').ok_or_else(|| xml_err(format!("unterminated reference in '{raw}'")))?;
            let name = &after[..semi];
            if let Some(code) = name.strip_prefix('#') {
                out.push(char_reference(code).ok_or_else(|| xml_err(format!("invalid character reference &{name};")))?);
            } else if let Some(resolved) = resolve_predefined_entity(name) {
                out.push_str(resolved);
            } else if let Some(EntityDecl::Internal(value)) = self.entities.get(name) {
                out.push_str(value);
            } else {
                return Err(xml_err(format!("entity &{name}; not allowed in attribute value")));
            }
            rest = &after[semi + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn make_qname(uri: &str, local: &str, prefix: Option<&str>) -> QName {
    match prefix {
        Some(p) => QName::with_prefix(uri, local, p),
        None => QName::new(uri, local),
    }
}

fn resolved_uri(ns: ResolveResult<'_>) -> Result<&str> {
    match ns {
        ResolveResult::Bound(ns) => utf8(ns.into_inner()),
        ResolveResult::Unbound => Ok(""),
        ResolveResult::Unknown(prefix) => {
            Err(xml_err(format!("unbound namespace prefix '{}'", String::from_utf8_lossy(&prefix))))
        }
    }
}

fn prefix_of(name: XmlQName<'_>) -> Result<Option<&str>> {
    name.prefix().map(|p| utf8(p.into_inner())).transpose()
}

/// `#65` oder `#x41` (ohne `&#` und `;`).
fn char_reference(code: &str) -> Option<char> {
    let value = match code.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => code.parse().ok()?,
    };
    char::from_u32(value)
}

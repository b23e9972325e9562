//! EXI events → XML text.
//!
//! Der Serializer haelt den offenen Start-Tag zurueck, bis feststeht, welche
//! NS- und Attribut-Events dazugehoeren. Fehlende Namespace-Deklarationen
//! werden ergaenzt: bevorzugt mit dem Prefix des Namens, sonst mit `ns0`,
//! `ns1`, ... . Ein unmittelbar folgendes EE ergibt `<a/>`.

use std::io::Write;
use std::sync::Arc;

use quick_xml::escape::{escape, partial_escape};

use crate::event::{ExiEvent, NsContent};
use crate::qname::{QName, URI_XML, URI_XSI};
use crate::{Error, Result};

/// Serialises an event sequence into an XML string.
pub fn events_to_xml(events: &[ExiEvent]) -> Result<String> {
    let mut buf = Vec::new();
    events_to_xml_writer(events, &mut buf)?;
    String::from_utf8(buf).map_err(|_| Error::IoError("XML output is not valid UTF-8".into()))
}

/// Serialises an event sequence into `writer`.
pub fn events_to_xml_writer(events: &[ExiEvent], writer: impl Write) -> Result<()> {
    let mut ser = XmlSerializer::new(writer);
    for event in events {
        ser.process(event)?;
    }
    ser.finish()
}

#[derive(Debug)]
struct OpenTag {
    qname: Arc<QName>,
    namespaces: Vec<NsContent>,
    attributes: Vec<(Arc<QName>, Arc<str>)>,
    xsi_type: Option<Arc<QName>>,
    xsi_nil: Option<Arc<str>>,
}

/// Streaming serializer; one instance per document.
pub struct XmlSerializer<W: Write> {
    out: W,
    open: Option<OpenTag>,
    /// Written names of the open elements with the binding mark of their scope.
    elements: Vec<(String, usize)>,
    bindings: Vec<(Arc<str>, Arc<str>)>,
    generated: usize,
}

impl<W: Write> XmlSerializer<W> {
    pub fn new(out: W) -> Self {
        Self { out, open: None, elements: Vec::new(), bindings: Vec::new(), generated: 0 }
    }

    fn w(&mut self, s: &str) -> Result<()> {
        self.out.write_all(s.as_bytes()).map_err(Error::from)
    }

    fn tag(&mut self, event: &ExiEvent) -> Result<&mut OpenTag> {
        self.open
            .as_mut()
            .ok_or_else(|| Error::EventOrder(format!("{} outside a start tag", event.describe()).into()))
    }

    pub fn process(&mut self, event: &ExiEvent) -> Result<()> {
        match event {
            ExiEvent::NamespaceDeclaration(ns) => {
                self.tag(event)?.namespaces.push(ns.clone());
                return Ok(());
            }
            ExiEvent::Attribute(at) => {
                let value = Arc::clone(&at.value);
                self.tag(event)?.attributes.push((Arc::clone(&at.qname), value));
                return Ok(());
            }
            ExiEvent::SchemaType(q) => {
                self.tag(event)?.xsi_type = Some(Arc::clone(q));
                return Ok(());
            }
            ExiEvent::SchemaNil(v) => {
                self.tag(event)?.xsi_nil = Some(Arc::clone(v));
                return Ok(());
            }
            ExiEvent::EndElement if self.open.is_some() => {
                self.write_start_tag(true)?;
                return self.close_scope();
            }
            _ => {}
        }
        self.write_start_tag(false)?;
        match event {
            ExiEvent::StartDocument => Ok(()),
            ExiEvent::EndDocument => self.out.flush().map_err(Error::from),
            ExiEvent::StartElement(q) => {
                self.open = Some(OpenTag {
                    qname: Arc::clone(q),
                    namespaces: Vec::new(),
                    attributes: Vec::new(),
                    xsi_type: None,
                    xsi_nil: None,
                });
                Ok(())
            }
            ExiEvent::EndElement => {
                let (name, _) = self.elements.last().cloned().ok_or_else(|| Error::EventOrder("EE without SE".into()))?;
                self.w("</")?;
                self.w(&name)?;
                self.w(">")?;
                self.close_scope()
            }
            ExiEvent::Characters(ch) => {
                let text = partial_escape(&*ch.value).into_owned();
                self.w(&text)
            }
            ExiEvent::Comment(text) => {
                self.w("<!--")?;
                self.w(text)?;
                self.w("-->")
            }
            ExiEvent::ProcessingInstruction(pi) => {
                self.w("<?")?;
                self.w(&pi.name)?;
                if !pi.text.is_empty() {
                    self.w(" ")?;
                    self.w(&pi.text)?;
                }
                self.w("?>")
            }
            ExiEvent::DocType(dt) => {
                let mut decl = format!("<!DOCTYPE {}", dt.name);
                if !dt.public.is_empty() {
                    decl.push_str(&format!(" PUBLIC \"{}\" \"{}\"", dt.public, dt.system));
                } else if !dt.system.is_empty() {
                    decl.push_str(&format!(" SYSTEM \"{}\"", dt.system));
                }
                if !dt.text.is_empty() {
                    decl.push_str(&format!(" [{}]", dt.text));
                }
                decl.push_str(">\n");
                self.w(&decl)
            }
            ExiEvent::EntityReference(name) => {
                self.w("&")?;
                self.w(name)?;
                self.w(";")
            }
            ExiEvent::NamespaceDeclaration(_)
            | ExiEvent::Attribute(_)
            | ExiEvent::SchemaType(_)
            | ExiEvent::SchemaNil(_) => Ok(()),
        }
    }

    pub fn finish(mut self) -> Result<()> {
        self.write_start_tag(false)?;
        if let Some((name, _)) = self.elements.last() {
            return Err(Error::EventOrder(format!("element {name} not closed").into()));
        }
        self.out.flush().map_err(Error::from)
    }

    fn close_scope(&mut self) -> Result<()> {
        let (_, mark) = self.elements.pop().ok_or_else(|| Error::EventOrder("EE without SE".into()))?;
        self.bindings.truncate(mark);
        Ok(())
    }

    // ========================================================================
    // Namespaces
    // ========================================================================

    fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(URI_XML);
        }
        self.bindings.iter().rev().find(|(p, _)| &**p == prefix).map(|(_, u)| &**u)
    }

    /// Prefix for `uri`, declaring one when none is in scope.
    ///
    /// `element`: der Default-Namespace darf benutzt werden (nur Elemente).
    fn prefix_for(&mut self, uri: &str, wanted: Option<&str>, element: bool, decls: &mut Vec<NsContent>) -> String {
        if uri == URI_XML {
            return "xml".into();
        }
        if uri.is_empty() {
            if element && self.resolve("").is_some_and(|d| !d.is_empty()) {
                self.declare("", "", decls);
            }
            return String::new();
        }
        if let Some(p) = wanted
            && (element || !p.is_empty())
            && self.resolve(p) == Some(uri)
        {
            return p.to_string();
        }
        let bound = self
            .bindings
            .iter()
            .rev()
            .find(|(p, u)| &**u == uri && (element || !p.is_empty()) && self.resolve(p) == Some(uri))
            .map(|(p, _)| p.to_string());
        if let Some(p) = bound {
            return p;
        }
        let prefix = match wanted {
            Some(p) if !p.is_empty() && self.resolve(p).is_none() => p.to_string(),
            _ if uri == URI_XSI && self.resolve("xsi").is_none() => "xsi".to_string(),
            _ => loop {
                let candidate = format!("ns{}", self.generated);
                self.generated += 1;
                if self.resolve(&candidate).is_none() {
                    break candidate;
                }
            },
        };
        self.declare(&prefix, uri, decls);
        prefix
    }

    fn declare(&mut self, prefix: &str, uri: &str, decls: &mut Vec<NsContent>) {
        let ns = NsContent { uri: Arc::from(uri), prefix: Arc::from(prefix), local_element_ns: false };
        self.bindings.push((Arc::clone(&ns.prefix), Arc::clone(&ns.uri)));
        decls.push(ns);
    }

    fn lexical(prefix: &str, local: &str) -> String {
        if prefix.is_empty() { local.to_string() } else { format!("{prefix}:{local}") }
    }

    // ========================================================================
    // Start-Tag
    // ========================================================================

    fn write_start_tag(&mut self, empty: bool) -> Result<()> {
        let Some(tag) = self.open.take() else { return Ok(()) };
        let mark = self.bindings.len();
        for ns in &tag.namespaces {
            self.bindings.push((Arc::clone(&ns.prefix), Arc::clone(&ns.uri)));
        }
        let mut decls = tag.namespaces.clone();

        let prefix = self.prefix_for(&tag.qname.uri, tag.qname.prefix.as_deref(), true, &mut decls);
        let name = Self::lexical(&prefix, &tag.qname.local_name);

        let mut attrs: Vec<(String, String)> = Vec::new();
        if let Some(t) = &tag.xsi_type {
            let xsi = self.prefix_for(URI_XSI, Some("xsi"), false, &mut decls);
            let tp = self.prefix_for(&t.uri, t.prefix.as_deref(), true, &mut decls);
            attrs.push((Self::lexical(&xsi, "type"), Self::lexical(&tp, &t.local_name)));
        }
        if let Some(nil) = &tag.xsi_nil {
            let xsi = self.prefix_for(URI_XSI, Some("xsi"), false, &mut decls);
            attrs.push((Self::lexical(&xsi, "nil"), nil.to_string()));
        }
        for (q, value) in &tag.attributes {
            let p = self.prefix_for(&q.uri, q.prefix.as_deref(), false, &mut decls);
            attrs.push((Self::lexical(&p, &q.local_name), value.to_string()));
        }

        let mut s = format!("<{name}");
        for ns in &decls {
            if ns.prefix.is_empty() {
                s.push_str(&format!(" xmlns=\"{}\"", escape(&*ns.uri)));
            } else {
                s.push_str(&format!(" xmlns:{}=\"{}\"", ns.prefix, escape(&*ns.uri)));
            }
        }
        for (n, v) in &attrs {
            s.push_str(&format!(" {n}=\"{}\"", escape(v.as_str())));
        }
        s.push_str(if empty { "/>" } else { ">" });
        self.w(&s)?;
        self.elements.push((name, mark));
        Ok(())
    }
}

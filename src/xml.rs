//! XML text → EXI events.
//!
//! Liest XML mit quick-xml und erzeugt die Event-Folge, die der
//! [`crate::encoder::Transmogrifier`] erwartet:
//!
//! - SD zuerst, ED zuletzt; Whitespace ausserhalb der Wurzel entfaellt
//! - NS-Events immer (der Encoder braucht sie fuer QName-Werte)
//! - `xsi:type` / `xsi:nil` als [`ExiEvent::SchemaType`] / [`ExiEvent::SchemaNil`]
//! - CM, PI und DT nur, wenn die Options sie erhalten
//! - Entities: vordefinierte und Zeichenreferenzen werden Text, interne
//!   Entities werden expandiert (oder ER bei erhaltener DTD), externe nur mit
//!   `resolve_external_general_entities`, sonst bleiben sie ER

use std::path::Path;

use crate::options::ExiOptions;
use crate::{Error, ExiEvent, Result};

mod dtd;
mod emit;

/// What the parser keeps, derived from the options.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ParseFlags {
    comments: bool,
    pis: bool,
    dtd: bool,
    resolve_external: bool,
}

impl ParseFlags {
    pub(crate) fn from_options(options: &ExiOptions) -> Self {
        let p = options.preserve();
        Self {
            comments: p.comments,
            pis: p.pis,
            dtd: p.dtd,
            resolve_external: options.resolve_external_general_entities(),
        }
    }
}

/// Parses an XML document. External entities resolve against the working directory.
pub fn parse_events(xml: &str, options: &ExiOptions) -> Result<Vec<ExiEvent>> {
    emit::Parser::new(ParseFlags::from_options(options), None).run(xml)
}

/// Parses an XML file. External entities resolve against the file's directory.
pub fn parse_file(path: &Path, options: &ExiOptions) -> Result<Vec<ExiEvent>> {
    let xml = std::fs::read_to_string(path)
        .map_err(|e| Error::XmlParseError(format!("read {}: {e}", path.display())))?;
    emit::Parser::new(ParseFlags::from_options(options), path.parent()).run(&xml)
}

/// XML 1.0, 2.11: `\r\n` und einzelnes `\r` werden zu `\n`.
pub(crate) fn normalize_line_endings(s: &str) -> std::borrow::Cow<'_, str> {
    if memchr::memchr(b'\r', s.as_bytes()).is_none() {
        return std::borrow::Cow::Borrowed(s);
    }
    std::borrow::Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::event::{ChContent, NsContent, PiContent};
    use crate::options::Preserve;
    use crate::qname::{QName, URI_XSD};

    fn parse(xml: &str) -> Vec<ExiEvent> {
        parse_events(xml, &ExiOptions::default()).unwrap()
    }

    fn text(s: &str) -> ExiEvent {
        ExiEvent::Characters(ChContent { value: Arc::from(s) })
    }

    #[test]
    fn einfaches_dokument() {
        let events = parse("<?xml version=\"1.0\"?>\n<a x=\"1\"><b>hi</b><c/></a>\n");
        assert_eq!(
            events,
            vec![
                ExiEvent::StartDocument,
                ExiEvent::start_element("", "a"),
                ExiEvent::attribute("", "x", "1"),
                ExiEvent::start_element("", "b"),
                text("hi"),
                ExiEvent::EndElement,
                ExiEvent::start_element("", "c"),
                ExiEvent::EndElement,
                ExiEvent::EndElement,
                ExiEvent::EndDocument,
            ]
        );
    }

    #[test]
    fn namespaces_immer_gemeldet() {
        let events = parse(r#"<p:a xmlns:p="urn:p" xmlns="urn:d"><b/></p:a>"#);
        let ExiEvent::StartElement(q) = &events[1] else { panic!("SE erwartet") };
        assert_eq!(&*q.uri, "urn:p");
        assert_eq!(q.prefix.as_deref(), Some("p"));
        assert_eq!(
            events[2],
            ExiEvent::NamespaceDeclaration(NsContent { uri: Arc::from("urn:p"), prefix: Arc::from("p"), local_element_ns: true })
        );
        assert_eq!(
            events[3],
            ExiEvent::NamespaceDeclaration(NsContent { uri: Arc::from("urn:d"), prefix: Arc::from(""), local_element_ns: false })
        );
        assert_eq!(events[4], ExiEvent::start_element("urn:d", "b"));
    }

    #[test]
    fn xsi_attribute_werden_events() {
        let events = parse(&format!(
            r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:xs="{URI_XSD}" xsi:type="xs:int" xsi:nil="true"/>"#
        ));
        assert!(events.contains(&ExiEvent::SchemaType(Arc::new(QName::new(URI_XSD, "int")))));
        assert!(events.contains(&ExiEvent::schema_nil("true")));
        assert!(!events.iter().any(|e| matches!(e, ExiEvent::Attribute(_))));
    }

    #[test]
    fn entities_und_cdata_werden_text() {
        let events = parse("<a>x &amp; &#65;<![CDATA[<y>]]>z</a>");
        assert_eq!(events[2], text("x & A<y>z"));
    }

    #[test]
    fn interne_entity_expandiert() {
        let events = parse("<!DOCTYPE a [<!ENTITY gruss \"hallo\">]><a>&gruss; welt</a>");
        assert_eq!(events[2], text("hallo welt"));
    }

    #[test]
    fn entity_referenz_bei_erhaltener_dtd() {
        let options = ExiOptions::default().with_preserve(Preserve { dtd: true, ..Preserve::default() });
        let events = parse_events("<!DOCTYPE a [<!ENTITY e \"v\">]><a>&e;</a>", &options).unwrap();
        assert!(matches!(events[1], ExiEvent::DocType(_)));
        assert_eq!(events[3], ExiEvent::EntityReference(Arc::from("e")));
    }

    #[test]
    fn externe_entity_je_nach_option() {
        let dir = std::env::temp_dir().join(format!("exigram-entity-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("teil.txt"), "von aussen").unwrap();
        let doc = dir.join("doc.xml");
        std::fs::write(&doc, "<!DOCTYPE a [<!ENTITY ext SYSTEM \"teil.txt\">]><a>vor &ext; nach</a>").unwrap();

        let kept = parse_file(&doc, &ExiOptions::default()).unwrap();
        assert_eq!(
            kept[2..5],
            [text("vor "), ExiEvent::EntityReference(Arc::from("ext")), text(" nach")]
        );

        let resolved = parse_file(&doc, &ExiOptions::default().with_resolve_external_general_entities()).unwrap();
        assert_eq!(resolved[2], text("vor von aussen nach"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn kommentare_nur_wenn_erhalten() {
        let xml = "<a>x<!-- c -->y<?pi data?></a>";
        assert_eq!(parse(xml)[2], text("xy"));
        let options = ExiOptions::default().with_preserve(Preserve { comments: true, pis: true, ..Preserve::default() });
        let events = parse_events(xml, &options).unwrap();
        assert_eq!(events[3], ExiEvent::Comment(Arc::from(" c ")));
        assert_eq!(
            events[5],
            ExiEvent::ProcessingInstruction(PiContent { name: Arc::from("pi"), text: Arc::from("data") })
        );
    }

    #[test]
    fn zeilenenden_normalisiert() {
        assert_eq!(parse("<a>x\r\ny\rz</a>")[2], text("x\ny\nz"));
    }

    #[test]
    fn text_ausserhalb_der_wurzel() {
        assert!(matches!(parse_events("<a/>nachher", &ExiOptions::default()), Err(Error::XmlParseError(_))));
    }

    #[test]
    fn unbekannter_prefix() {
        assert!(parse_events("<p:a/>", &ExiOptions::default()).is_err());
    }
}

//! Infoset Round-Trip-Tests.
//!
//! Fuer jeden Item-Typ ein Round-Trip: XML → Events → Encode → Decode →
//! Events vergleichen. Jeder Test laeuft ueber alle 4 Alignments.

use std::sync::Arc;

use exigram::{Alignment, ExiEvent, ExiOptions, Preserve, QName, decode_with_options, encode, parse_events};

// ============================================================================
// Alignment-Konfigurationen
// ============================================================================

const ALIGNMENTS: &[(&str, Alignment)] = &[
    ("bitpacked", Alignment::BitPacked),
    ("bytealigned", Alignment::ByteAlignment),
    ("precompression", Alignment::PreCompression),
    ("compression", Alignment::Compression),
];

// ============================================================================
// Hilfsfunktionen
// ============================================================================

fn round_trip_events(events: &[ExiEvent], opts: &ExiOptions) -> Vec<ExiEvent> {
    let exi = encode(events, opts).unwrap_or_else(|e| panic!("Encode-Fehler: {e}\nEvents: {events:?}"));
    let (decoded, _opts) = decode_with_options(&exi, opts.clone())
        .unwrap_or_else(|e| panic!("Decode-Fehler: {e}\nEXI: {} bytes", exi.len()));
    decoded
}

/// Parst `xml`, laeuft ueber alle Alignments und vergleicht mit `expected`
/// (die geparsten Events, ggf. gefiltert).
fn check_all_alignments(xml: &str, base: ExiOptions, expected: fn(Vec<ExiEvent>) -> Vec<ExiEvent>) {
    for &(name, alignment) in ALIGNMENTS {
        let opts = base.clone().with_alignment(alignment);
        let events = parse_events(xml, &opts).unwrap_or_else(|e| panic!("XML-Parse-Fehler: {e}\nXML: {xml}"));
        let decoded = round_trip_events(&events, &opts);
        assert_eq!(decoded, expected(events), "[{name}] XML: {xml}");
    }
}

/// Ohne erhaltene Prefixe verschwinden die NS-Events.
fn without_ns(events: Vec<ExiEvent>) -> Vec<ExiEvent> {
    events.into_iter().filter(|e| !matches!(e, ExiEvent::NamespaceDeclaration(_))).collect()
}

fn unchanged(events: Vec<ExiEvent>) -> Vec<ExiEvent> {
    events
}

fn prefixes() -> ExiOptions {
    ExiOptions::default().with_preserve(Preserve { prefixes: true, ..Preserve::default() })
}

// ============================================================================
// Document und Element
// ============================================================================

#[test]
fn dokument_mit_elementen() {
    check_all_alignments("<a><b>eins</b><b>zwei</b><c/></a>", ExiOptions::default(), without_ns);
}

#[test]
fn gemischter_inhalt_mit_whitespace() {
    check_all_alignments("<a>\n  <b>x</b>\n  text <i>kursiv</i> mehr\n</a>", ExiOptions::default(), without_ns);
}

#[test]
fn tiefe_verschachtelung() {
    let xml = format!("{}{}", "<e>".repeat(40), "</e>".repeat(40));
    check_all_alignments(&xml, ExiOptions::default(), without_ns);
}

// ============================================================================
// Attribute
// ============================================================================

#[test]
fn attribute_sortiert() {
    check_all_alignments(r#"<a k="1" m="2" z=""><b k="wieder"/></a>"#, ExiOptions::default(), without_ns);
}

#[test]
fn attribute_in_namespaces() {
    check_all_alignments(
        r#"<a xmlns:p="urn:p" xmlns:q="urn:q" p:x="1" q:x="2" x="3"/>"#,
        ExiOptions::default(),
        |events| {
            let mut events = without_ns(events);
            // Encoder schreibt AT in (uri, local)-Reihenfolge
            let first = events.iter().position(|e| matches!(e, ExiEvent::Attribute(_))).unwrap();
            let last = events.iter().rposition(|e| matches!(e, ExiEvent::Attribute(_))).unwrap();
            events[first..=last].sort_by(|a, b| match (a, b) {
                (ExiEvent::Attribute(x), ExiEvent::Attribute(y)) => x.qname.cmp(&y.qname),
                _ => std::cmp::Ordering::Equal,
            });
            events
        },
    );
}

// ============================================================================
// Namespaces
// ============================================================================

#[test]
fn namespaces_ohne_prefixe() {
    check_all_alignments(r#"<p:a xmlns:p="urn:p" xmlns="urn:d"><b/><p:c/></p:a>"#, ExiOptions::default(), without_ns);
}

#[test]
fn namespaces_mit_prefixen() {
    check_all_alignments(r#"<p:a xmlns:p="urn:p" xmlns="urn:d"><b/><p:c/></p:a>"#, prefixes(), unchanged);
}

#[test]
fn prefixe_bleiben_erhalten() {
    for &(name, alignment) in ALIGNMENTS {
        let opts = prefixes().with_alignment(alignment);
        let events = parse_events(r#"<p:a xmlns:p="urn:p"><p:b/></p:a>"#, &opts).unwrap();
        let decoded = round_trip_events(&events, &opts);
        let prefixes: Vec<_> = decoded
            .iter()
            .filter_map(|e| match e {
                ExiEvent::StartElement(q) => q.prefix.clone(),
                _ => None,
            })
            .collect();
        assert_eq!(prefixes, vec![Arc::<str>::from("p"), Arc::from("p")], "[{name}]");
    }
}

// ============================================================================
// Comment, PI, DOCTYPE, Entity Reference
// ============================================================================

#[test]
fn kommentare_und_pis() {
    let opts = ExiOptions::default().with_preserve(Preserve { comments: true, pis: true, ..Preserve::default() });
    check_all_alignments("<!--vorn--><?ziel daten?><a>x<!--innen-->y<?p?></a><!--hinten-->", opts, without_ns);
}

#[test]
fn doctype_und_entity_referenz() {
    let opts = ExiOptions::default().with_preserve(Preserve { dtd: true, ..Preserve::default() });
    check_all_alignments(
        r#"<!DOCTYPE a SYSTEM "a.dtd" [<!ENTITY e "wert">]><a>vor &e; nach</a>"#,
        opts,
        without_ns,
    );
}

#[test]
fn ohne_fidelity_entfallen_cm_und_pi() {
    for &(name, alignment) in ALIGNMENTS {
        let with = ExiOptions::default()
            .with_alignment(alignment)
            .with_preserve(Preserve { comments: true, pis: true, ..Preserve::default() });
        let events = parse_events("<a>x<!--c-->y</a>", &with).unwrap();
        let opts = ExiOptions::default().with_alignment(alignment);
        let decoded = round_trip_events(&events, &opts);
        assert_eq!(decoded, vec![
            ExiEvent::StartDocument,
            ExiEvent::start_element("", "a"),
            ExiEvent::characters("x"),
            ExiEvent::characters("y"),
            ExiEvent::EndElement,
            ExiEvent::EndDocument,
        ], "[{name}]");
    }
}

// ============================================================================
// xsi:type und xsi:nil ohne Schema
// ============================================================================

#[test]
fn xsi_attribute_ohne_schema() {
    check_all_alignments(
        r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:t="urn:t" xsi:type="t:T"><b xsi:nil="true"/></a>"#,
        ExiOptions::default(),
        without_ns,
    );
}

// ============================================================================
// Fragmente
// ============================================================================

#[test]
fn fragment_mit_mehreren_wurzeln() {
    let events = vec![
        ExiEvent::StartDocument,
        ExiEvent::start_element("", "a"),
        ExiEvent::EndElement,
        ExiEvent::start_element("urn:x", "b"),
        ExiEvent::characters("t"),
        ExiEvent::EndElement,
        ExiEvent::start_element("", "a"),
        ExiEvent::EndElement,
        ExiEvent::EndDocument,
    ];
    for &(name, alignment) in ALIGNMENTS {
        let opts = ExiOptions::default().with_fragment().with_alignment(alignment);
        assert_eq!(round_trip_events(&events, &opts), events, "[{name}]");
    }
}

#[test]
fn dokument_ohne_fragment_nur_eine_wurzel() {
    let events = vec![
        ExiEvent::StartDocument,
        ExiEvent::StartElement(Arc::new(QName::new("", "a"))),
        ExiEvent::EndElement,
        ExiEvent::StartElement(Arc::new(QName::new("", "b"))),
        ExiEvent::EndElement,
        ExiEvent::EndDocument,
    ];
    assert!(encode(&events, &ExiOptions::default()).is_err());
}

// ============================================================================
// Grosse Dokumente ueber Blockgrenzen
// ============================================================================

#[test]
fn viele_werte_ueber_mehrere_bloecke() {
    let mut xml = String::from("<liste>");
    for i in 0..600 {
        xml.push_str(&format!(r#"<eintrag nr="{i}" typ="t{}">wert {}</eintrag>"#, i % 7, i % 50));
    }
    xml.push_str("</liste>");
    for &(name, alignment) in ALIGNMENTS {
        let opts = ExiOptions::default().with_alignment(alignment).with_block_size(250);
        let events = parse_events(&xml, &opts).unwrap();
        assert_eq!(round_trip_events(&events, &opts), without_ns(events), "[{name}]");
    }
}

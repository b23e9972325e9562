//! XML → EXI → XML.
//!
//! Der Serializer ergaenzt fehlende Namespace-Deklarationen; ohne erhaltene
//! Prefixe entstehen daher `ns0`, `ns1`, ... .

use exigram::{Alignment, ExiOptions, Preserve, decode_with_options, encode, events_to_xml, parse_events};

const ALIGNMENTS: &[(&str, Alignment)] = &[
    ("bitpacked", Alignment::BitPacked),
    ("bytealigned", Alignment::ByteAlignment),
    ("precompression", Alignment::PreCompression),
    ("compression", Alignment::Compression),
];

fn xml_round_trip(xml: &str, opts: &ExiOptions) -> String {
    let events = parse_events(xml, opts).unwrap_or_else(|e| panic!("XML-Parse-Fehler: {e}\nXML: {xml}"));
    let exi = encode(&events, opts).unwrap_or_else(|e| panic!("Encode-Fehler: {e}"));
    let (decoded, _) = decode_with_options(&exi, opts.clone()).unwrap_or_else(|e| panic!("Decode-Fehler: {e}"));
    events_to_xml(&decoded).unwrap()
}

fn check(xml: &str, base: ExiOptions, expected: &str) {
    for &(name, alignment) in ALIGNMENTS {
        let opts = base.clone().with_alignment(alignment);
        assert_eq!(xml_round_trip(xml, &opts), expected, "[{name}]");
    }
}

fn prefixes() -> Preserve {
    Preserve { prefixes: true, ..Preserve::default() }
}

#[test]
fn einfaches_dokument() {
    let xml = r#"<a k="1 &lt; 2"><b>x &amp; y</b><c/></a>"#;
    check(xml, ExiOptions::default(), xml);
}

#[test]
fn xml_deklaration_entfaellt() {
    check("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<a>t</a>\n", ExiOptions::default(), "<a>t</a>");
}

#[test]
fn namespaces_mit_prefixen() {
    let xml = r#"<p:a xmlns:p="urn:p" xmlns="urn:d" p:k="v"><b/><p:c/></p:a>"#;
    check(xml, ExiOptions::default().with_preserve(prefixes()), xml);
}

#[test]
fn namespaces_ohne_prefixe_werden_erzeugt() {
    check(
        r#"<p:a xmlns:p="urn:p"><p:b/></p:a>"#,
        ExiOptions::default(),
        r#"<ns0:a xmlns:ns0="urn:p"><ns0:b/></ns0:a>"#,
    );
}

#[test]
fn xsi_nil_ohne_deklaration() {
    check(
        r#"<a xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><b xsi:nil="true"/></a>"#,
        ExiOptions::default(),
        r#"<a><b xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/></a>"#,
    );
}

#[test]
fn kommentare_pis_und_doctype() {
    let xml = "<!DOCTYPE a [<!ENTITY e \"v\">]>\n<!--vorn--><a>x<?ziel daten?>&e;</a>";
    let opts = ExiOptions::default().with_preserve(Preserve {
        comments: true,
        pis: true,
        dtd: true,
        ..Preserve::default()
    });
    check(xml, opts, xml);
}

#[test]
fn entities_ohne_dtd_expandiert() {
    check("<!DOCTYPE a [<!ENTITY e \"wert\">]><a>&e;</a>", ExiOptions::default(), "<a>wert</a>");
}

#[test]
fn grosses_dokument() {
    let mut xml = String::from("<r>");
    for i in 0..300 {
        xml.push_str(&format!(r#"<e i="{i}">t{}</e>"#, i % 17));
    }
    xml.push_str("</r>");
    let opts = ExiOptions::default().with_block_size(64);
    check(&xml, opts, &xml);
}

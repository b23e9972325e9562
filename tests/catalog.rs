//! Event-Type-Kataloge: Reihenfolge, Stufen, Codebreiten und Cache.

use std::sync::Arc;

use exigram::event_code::{EventCode, part_widths};
use exigram::event_types::EventTypeList;
use exigram::grammar::{EventShape, GrammarCache, GrammarSet};
use exigram::options::GrammarOptions;
use exigram::schema::{AttributeUse, ComplexTypeDef, Particle};
use exigram::{
    Alignment, ExiEvent, ExiOptions, Preserve, QName, SchemaModel, SchemaQuery, decode_with_schema,
    encode_with_schema,
};

const ALIGNMENTS: &[(&str, Alignment)] = &[
    ("bitpacked", Alignment::BitPacked),
    ("bytealigned", Alignment::ByteAlignment),
    ("precompression", Alignment::PreCompression),
    ("compression", Alignment::Compression),
];

fn schema() -> Arc<dyn SchemaQuery> {
    let mut b = SchemaModel::builder();
    let s = b.builtin("string");
    let int = b.builtin("int");
    let child = b.element(QName::new("", "child"), int);
    let t = b.complex_type(
        None,
        ComplexTypeDef::element_only(Particle::element(child).repeated())
            .with_attribute(AttributeUse::required(QName::new("", "b"), s))
            .with_attribute(AttributeUse::optional(QName::new("urn:z", "a"), s))
            .with_attribute(AttributeUse::optional(QName::new("", "a"), int)),
    );
    let root = b.global_element(QName::new("", "zeta"), t);
    b.set_nillable(root, true);
    b.global_element(QName::new("", "alpha"), s);
    b.global_element(QName::new("urn:a", "mitte"), s);
    Arc::new(b.build().unwrap())
}

fn grammars(opts: &ExiOptions) -> Arc<GrammarSet> {
    GrammarCache::global().get(Some(&schema()), GrammarOptions::from(opts)).unwrap()
}

fn names(list: &EventTypeList) -> Vec<String> {
    list.iter().map(|t| t.shape.to_string()).collect()
}

fn root_catalog(set: &GrammarSet, state: usize) -> Arc<EventTypeList> {
    let schema = set.schema().unwrap();
    let root = schema.global_element_decl("zeta", "").unwrap();
    Arc::clone(set.catalog(set.element_grammar(root).unwrap(), state).unwrap())
}

// ============================================================================
// Reihenfolge
// ============================================================================

#[test]
fn dokument_elemente_sortiert() {
    let set = grammars(&ExiOptions::default());
    let list = set.catalog(set.document(), 1).unwrap();
    let n = names(list);
    assert_eq!(&n[..4], ["SE(alpha)", "SE({urn:a}mitte)", "SE(zeta)", "SE(*)"]);
    assert_eq!(list.code(0), Some(EventCode::one(0)));
}

#[test]
fn xsi_vor_den_attributen() {
    let set = grammars(&ExiOptions::default());
    let list = root_catalog(&set, 0);
    let n = names(&list);
    assert_eq!(&n[..5], ["AT(xsi:type)", "AT(xsi:nil)", "AT(a)", "AT({urn:z}a)", "AT(b)"]);
    // b ist Pflicht: kein EE in der ersten Stufe von Zustand 0
    let first = list.tier_len()[0];
    assert!(list.iter().take(first).all(|t| t.shape != EventShape::EndElement));
}

#[test]
fn strict_nur_deklarierte_productions() {
    let set = grammars(&ExiOptions::default().with_strict());
    let list = root_catalog(&set, 0);
    assert_eq!(list.tier_len()[1..], [0, 0]);
    assert_eq!(names(&list)[0], "AT(xsi:nil)");
    assert!(list.position(&EventShape::SchemaType).is_none());
}

#[test]
fn dritte_stufe_fuer_kommentare() {
    let opts = ExiOptions::default().with_preserve(Preserve { comments: true, pis: true, ..Preserve::default() });
    let set = grammars(&opts);
    let list = root_catalog(&set, 0);
    let [n0, n1, n2] = list.tier_len();
    assert_eq!(n2, 2);
    let cm = list.position(&EventShape::Comment).unwrap();
    assert_eq!(list.code(cm), Some(EventCode::three(n0 as u32, n1 as u32, 0)));
    let pi = list.position(&EventShape::ProcessingInstruction).unwrap();
    assert_eq!(list.code(pi), Some(EventCode::three(n0 as u32, n1 as u32, 1)));
}

#[test]
fn codebreiten() {
    let set = grammars(&ExiOptions::default().with_strict());
    let list = root_catalog(&set, 0);
    let [n0, _, _] = list.tier_len();
    let expected = (usize::BITS - (n0 - 1).leading_zeros()) as u8;
    assert_eq!(part_widths(&list), [expected, 0, 0]);
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn cache_teilt_grammatiken() {
    let schema = schema();
    let cache = GrammarCache::new();
    let opts = GrammarOptions::from(&ExiOptions::default());
    let a = cache.get(Some(&schema), opts).unwrap();
    let b = cache.get(Some(&schema), opts).unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    // Alignment aendert die Grammatik nicht
    let aligned = GrammarOptions::from(&ExiOptions::default().with_alignment(Alignment::Compression));
    assert!(Arc::ptr_eq(&a, &cache.get(Some(&schema), aligned).unwrap()));
    let strict = GrammarOptions::from(&ExiOptions::default().with_strict());
    let strict_set = cache.get(Some(&schema), strict).unwrap();
    assert!(!Arc::ptr_eq(&a, &strict_set));
    assert_eq!(cache.len(), 2);
    // nicht mehr benutzte Sets haelt der Cache nicht fest
    drop(strict_set);
    assert_eq!(cache.len(), 1);
}

#[test]
fn kataloge_deterministisch() {
    let opts = GrammarOptions::from(&ExiOptions::default());
    let one = GrammarSet::build(Some(schema()), opts).unwrap();
    let two = GrammarSet::build(Some(schema()), opts).unwrap();
    assert_eq!(names(&root_catalog(&one, 0)), names(&root_catalog(&two, 0)));
    assert_eq!(names(&root_catalog(&one, 1)), names(&root_catalog(&two, 1)));
}

// ============================================================================
// Codes aller Stufen im Stream
// ============================================================================

/// Erste, zweite und dritte Stufe in einem Dokument, ueber alle Alignments.
#[test]
fn codes_aller_stufen() {
    let events = vec![
        ExiEvent::StartDocument,
        ExiEvent::start_element("", "zeta"),
        ExiEvent::attribute("", "a", "12"),
        ExiEvent::attribute("", "b", "pflicht"),
        ExiEvent::attribute("", "fremd", "undeklariert"),
        ExiEvent::Comment(Arc::from("dritte Stufe")),
        ExiEvent::start_element("", "child"),
        ExiEvent::characters("1"),
        ExiEvent::EndElement,
        ExiEvent::start_element("", "child"),
        ExiEvent::characters("2"),
        ExiEvent::EndElement,
        ExiEvent::EndElement,
        ExiEvent::EndDocument,
    ];
    let base = ExiOptions::default().with_preserve(Preserve { comments: true, ..Preserve::default() });
    for &(name, alignment) in ALIGNMENTS {
        let opts = base.clone().with_alignment(alignment);
        let exi = encode_with_schema(&events, schema(), &opts).unwrap();
        let (decoded, _) = decode_with_schema(&exi, schema(), opts).unwrap();
        assert_eq!(decoded, events, "[{name}]");
    }
}

//! Grammar state of one encode or decode session.
//!
//! Encoder und Decoder teilen sich dieselbe Zustandsmaschine: einen Stack aus
//! [`Frame`]s (einer pro offenem Element, darunter der Dokument-Frame) ueber
//! dem geteilten [`GrammarSet`] und den gelernten [`BuiltinGrammars`]. Beide
//! Seiten rufen nach jedem Event dieselben Uebergaenge auf; nur so bleiben
//! Kataloge, Lernschritte und String-Tabellen synchron.

use std::sync::Arc;

use crate::builtin::BuiltinGrammars;
use crate::event_types::{EventType, EventTypeList, GrammarRef};
use crate::grammar::{EventShape, GrammarSet, Next};
use crate::options::{ExiOptions, GrammarOptions};
use crate::qname::QName;
use crate::schema::{ElementId, TypeId};
use crate::string_table::StringTable;
use crate::typed_value::ValueRepr;
use crate::{Error, Result};

/// One open element (or the document itself).
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) grammar: GrammarRef,
    pub(crate) state: usize,
    /// Element name; owner of its character values. Empty for the document.
    pub(crate) qname: Arc<QName>,
    /// The declaration allows `xsi:nil`; selects the type grammar after `xsi:type`.
    pub(crate) nillable: bool,
}

/// Owner and expected type of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValueSpec {
    pub(crate) owner: Arc<QName>,
    pub(crate) type_id: Option<TypeId>,
}

pub(crate) struct Session {
    pub(crate) options: ExiOptions,
    pub(crate) set: Arc<GrammarSet>,
    pub(crate) builtins: BuiltinGrammars,
    pub(crate) strings: StringTable,
    frames: Vec<Frame>,
    finished: bool,
}

impl Session {
    pub(crate) fn new(set: Arc<GrammarSet>, options: ExiOptions) -> Self {
        let strings = if set.is_schema_informed() {
            StringTable::with_schema(set.initial_strings(), options.value_max_length())
        } else {
            StringTable::new(options.value_max_length())
        };
        let root = match (options.fragment(), set.is_schema_informed()) {
            (false, _) => GrammarRef::Set(set.document()),
            (true, true) => GrammarRef::Set(set.fragment()),
            (true, false) => GrammarRef::Fragment,
        };
        let builtins = BuiltinGrammars::new(GrammarOptions::from(&options));
        Self {
            options,
            set,
            builtins,
            strings,
            frames: vec![Frame { grammar: root, state: 0, qname: Arc::new(QName::new("", "")), nillable: false }],
            finished: false,
        }
    }

    pub(crate) fn finished(&self) -> bool {
        self.finished
    }

    pub(crate) fn prefixes(&self) -> bool {
        self.options.preserve().prefixes
    }

    pub(crate) fn strict(&self) -> bool {
        self.options.strict()
    }

    /// Open elements, without the document frame.
    pub(crate) fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub(crate) fn frame(&self) -> Result<&Frame> {
        self.frames.last().ok_or_else(|| Error::EventOrder("event after end of document".into()))
    }

    fn frame_mut(&mut self) -> Result<&mut Frame> {
        self.frames.last_mut().ok_or_else(|| Error::EventOrder("event after end of document".into()))
    }

    /// Catalog of the current state.
    pub(crate) fn catalog(&mut self) -> Result<Arc<EventTypeList>> {
        let frame = self.frame()?;
        let (grammar, state) = (frame.grammar, frame.state);
        match grammar {
            GrammarRef::Set(id) => self.set.catalog(id, state).map(Arc::clone),
            other => self.builtins.catalog(other, state),
        }
    }

    /// Follows `next` in the current frame. `End` closes the frame.
    fn advance(&mut self, next: Next) -> Result<()> {
        match next {
            Next::State(state) => self.frame_mut()?.state = state,
            Next::Grammar(id) => {
                let frame = self.frame_mut()?;
                frame.grammar = GrammarRef::Set(id);
                frame.state = 0;
            }
            Next::End => {
                self.frames.pop();
                if self.frames.is_empty() {
                    self.finished = true;
                }
            }
        }
        Ok(())
    }

    /// Learns from `used` (built-in grammars only) and follows its production.
    pub(crate) fn step(&mut self, used: &EventType, qname: Option<&Arc<QName>>) -> Result<()> {
        self.builtins.learn(used, qname);
        self.advance(used.next)
    }

    /// SE: advances the parent and opens the element's frame.
    ///
    /// Ein deklariertes SE bringt seine Element-Grammatik mit. Bei SE(*) und
    /// gelernten SE(qname) entscheidet die globale Deklaration; ohne sie
    /// greift die Built-in Grammatik, die strict nicht erlaubt.
    pub(crate) fn start_element(&mut self, used: &EventType, qname: Arc<QName>) -> Result<()> {
        let element: Option<ElementId> = match &used.shape {
            EventShape::StartElementSchemaQName { element, .. } => Some(*element),
            _ => self.set.global_element(&qname),
        };
        let (grammar, nillable) = match element {
            Some(e) => {
                let id = self.set.element_grammar(e).ok_or_else(|| {
                    Error::schema_inconsistency(format!("no grammar for element declaration #{e}"))
                })?;
                (GrammarRef::Set(id), self.set.element_nillable(e))
            }
            None if self.strict() => {
                return Err(Error::grammar_mismatch(format!("SE({qname})"), "undeclared element in strict mode"));
            }
            None => (GrammarRef::Builtin(self.builtins.element(&qname)), false),
        };
        self.step(used, Some(&qname))?;
        self.frames.push(Frame { grammar, state: 0, qname, nillable });
        Ok(())
    }

    /// `xsi:type`: switches to the named type's grammar (EXI 8.5.4.4.2).
    ///
    /// Unbekannte Typen bleiben non-strict folgenlos.
    pub(crate) fn apply_xsi_type(&mut self, type_name: &QName) -> Result<()> {
        let Some(type_id) = self.set.type_by_name(type_name) else {
            if self.strict() {
                return Err(Error::grammar_mismatch(format!("xsi:type={type_name}"), "unknown type in strict mode"));
            }
            log::debug!("xsi:type {type_name} names no known type, grammar kept");
            return Ok(());
        };
        let nillable = self.frame()?.nillable;
        let id = self
            .set
            .type_grammar(type_id, nillable)
            .ok_or_else(|| Error::schema_inconsistency(format!("no grammar for type #{type_id}")))?;
        let frame = self.frame_mut()?;
        frame.grammar = GrammarRef::Set(id);
        frame.state = 0;
        Ok(())
    }

    /// `xsi:nil="true"`: only attributes and EE remain (TypeEmpty).
    pub(crate) fn apply_xsi_nil(&mut self, nil: bool) -> Result<()> {
        if !nil {
            return Ok(());
        }
        let GrammarRef::Set(id) = self.frame()?.grammar else { return Ok(()) };
        let Some(type_id) = self.set.grammar(id).and_then(|g| g.type_id()) else { return Ok(()) };
        let empty = self
            .set
            .type_empty_grammar(type_id)
            .ok_or_else(|| Error::schema_inconsistency(format!("no empty grammar for type #{type_id}")))?;
        let frame = self.frame_mut()?;
        frame.grammar = GrammarRef::Set(empty);
        frame.state = 0;
        Ok(())
    }

    /// Value type of an attribute encoded with `used`.
    ///
    /// AT(*) und AT(uri:*) einer Schema-Grammatik typisieren ueber die globale
    /// Attribut-Deklaration; Built-in Grammatiken schreiben immer Strings.
    pub(crate) fn attribute_type(&self, used: &EventType, qname: &QName) -> Option<TypeId> {
        match &used.shape {
            EventShape::AttributeNamed { type_id, .. } => *type_id,
            EventShape::AttributeWildcardAny | EventShape::AttributeWildcardNs(_) => match used.key.grammar {
                GrammarRef::Set(_) => self.set.global_attribute_type(qname),
                _ => None,
            },
            _ => None,
        }
    }

    /// Spec of a character value in the current element.
    pub(crate) fn characters_spec(&self, used: &EventType) -> Result<ValueSpec> {
        Ok(ValueSpec { owner: Arc::clone(&self.frame()?.qname), type_id: used.type_id() })
    }

    pub(crate) fn value_repr(&self, type_id: Option<TypeId>) -> &ValueRepr {
        repr_of(&self.set, type_id)
    }
}

/// Representation of a value; untyped values are strings.
pub(crate) fn repr_of(set: &GrammarSet, type_id: Option<TypeId>) -> &ValueRepr {
    static UNTYPED: ValueRepr = ValueRepr::String;
    type_id.map_or(&UNTYPED, |t| set.value_repr(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarCache;
    use crate::schema::{ComplexTypeDef, Particle, SchemaModel, SchemaQuery};

    fn session(schema: Option<Arc<dyn SchemaQuery>>, options: ExiOptions) -> Session {
        let set = GrammarCache::new().get(schema.as_ref(), GrammarOptions::from(&options)).unwrap();
        Session::new(set, options)
    }

    fn entry(s: &mut Session, pred: impl Fn(&EventShape) -> bool) -> EventType {
        s.catalog().unwrap().find(pred).unwrap().clone()
    }

    #[test]
    fn schemaloses_dokument() {
        let mut s = session(None, ExiOptions::default());
        let sd = entry(&mut s, |e| *e == EventShape::StartDocument);
        s.step(&sd, None).unwrap();
        let se = entry(&mut s, |e| *e == EventShape::StartElementWildcard);
        s.start_element(&se, Arc::new(QName::new("", "a"))).unwrap();
        assert_eq!(s.depth(), 1);
        assert!(matches!(s.frame().unwrap().grammar, GrammarRef::Builtin(0)));

        let ee = entry(&mut s, |e| *e == EventShape::EndElement);
        s.step(&ee, None).unwrap();
        assert_eq!(s.depth(), 0);
        let ed = entry(&mut s, |e| *e == EventShape::EndDocument);
        s.step(&ed, None).unwrap();
        assert!(s.finished());
        assert!(s.catalog().is_err());
    }

    #[test]
    fn fragment_ohne_schema_lernt() {
        let mut s = session(None, ExiOptions::default().with_fragment());
        assert_eq!(s.frame().unwrap().grammar, GrammarRef::Fragment);
        let sd = entry(&mut s, |e| *e == EventShape::StartDocument);
        s.step(&sd, None).unwrap();
        let se = entry(&mut s, |e| *e == EventShape::StartElementWildcard);
        s.start_element(&se, Arc::new(QName::new("", "a"))).unwrap();
        let ee = entry(&mut s, |e| *e == EventShape::EndElement);
        s.step(&ee, None).unwrap();
        assert_eq!(s.catalog().unwrap().get(0).unwrap().shape.to_string(), "SE(a)");
    }

    fn schema() -> Arc<dyn SchemaQuery> {
        let mut b = SchemaModel::builder();
        let int = b.builtin("int");
        let t = b.complex_type(None, ComplexTypeDef::simple_content(int));
        let child = b.element(QName::new("", "n"), int);
        let list = b.complex_type(None, ComplexTypeDef::element_only(Particle::element(child).repeated()));
        let root = b.global_element(QName::new("", "root"), list);
        b.set_nillable(root, true);
        b.global_element(QName::new("", "num"), t);
        Arc::new(b.build().unwrap())
    }

    #[test]
    fn wildcard_nutzt_globale_deklaration() {
        let mut s = session(Some(schema()), ExiOptions::default().with_fragment());
        let sd = entry(&mut s, |e| *e == EventShape::StartDocument);
        s.step(&sd, None).unwrap();
        let se = entry(&mut s, |e| *e == EventShape::StartElementWildcard);
        s.start_element(&se, Arc::new(QName::new("", "root"))).unwrap();
        assert!(matches!(s.frame().unwrap().grammar, GrammarRef::Set(_)));
        assert!(s.frame().unwrap().nillable);
    }

    #[test]
    fn strict_verbietet_undeklarierte_elemente() {
        let mut s = session(Some(schema()), ExiOptions::default().with_strict());
        let sd = entry(&mut s, |e| *e == EventShape::StartDocument);
        s.step(&sd, None).unwrap();
        let se = entry(&mut s, |e| *e == EventShape::StartElementWildcard);
        let err = s.start_element(&se, Arc::new(QName::new("", "fremd"))).unwrap_err();
        assert!(matches!(err, Error::GrammarMismatch { .. }));
    }

    #[test]
    fn nil_wechselt_in_leere_grammatik() {
        let mut s = session(Some(schema()), ExiOptions::default());
        let sd = entry(&mut s, |e| *e == EventShape::StartDocument);
        s.step(&sd, None).unwrap();
        let se = entry(&mut s, |e| matches!(e, EventShape::StartElementSchemaQName { qname, .. } if &*qname.local_name == "root"));
        s.start_element(&se, Arc::new(QName::new("", "root"))).unwrap();
        let nil = entry(&mut s, |e| *e == EventShape::SchemaNil);
        s.step(&nil, None).unwrap();
        s.apply_xsi_nil(true).unwrap();
        let list = s.catalog().unwrap();
        // keine SE(n) mehr in der ersten Stufe
        assert!(list.iter().take(list.tier_len()[0]).all(|t| !t.shape.is_start_element()));
        assert!(list.find(|e| *e == EventShape::EndElement).is_some());
    }

    #[test]
    fn unbekannter_typ_non_strict_ignoriert() {
        let mut s = session(Some(schema()), ExiOptions::default());
        let before = s.frame().unwrap().grammar;
        s.apply_xsi_type(&QName::new("urn:nix", "T")).unwrap();
        assert_eq!(s.frame().unwrap().grammar, before);
    }
}

//! Event-Type-Kataloge (EXI 8.5.4.4, 6.2).
//!
//! Ein [`EventTypeList`] ist die geordnete Liste aller Events, die in einem
//! Grammatik-Zustand zulaessig sind, aufgeteilt in drei Code-Stufen:
//!
//! 1. deklarierte Productions (xsi:type/xsi:nil zuerst, dann AT, SE, EE, CH)
//! 2. undeklarierte Productions (EE, AT(*), NS, SC, SE(*), CH, ER, DT)
//! 3. CM und PI
//!
//! Die Liste haengt nur von (Grammatik, Zustand, [`GrammarOptions`]) ab.
//! Schema-informed Kataloge werden beim Aufbau des `GrammarSet` berechnet,
//! die der lernenden Built-in Grammatiken bei Bedarf.

use std::fmt;
use std::sync::Arc;

use crate::event_code::EventCode;
use crate::grammar::{EventShape, Grammar, GrammarId, GrammarKind, Next, Production};
use crate::options::GrammarOptions;
use crate::qname::QName;
use crate::schema::TypeId;

/// Which grammar a catalog belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarRef {
    /// Grammar of the shared [`crate::grammar::GrammarSet`].
    Set(GrammarId),
    /// Session-owned built-in element grammar.
    Builtin(usize),
    /// Session-owned learning fragment grammar.
    Fragment,
}

/// Identity of a catalog: (grammar, state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CatalogKey {
    pub grammar: GrammarRef,
    pub state: usize,
}

impl fmt::Display for CatalogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.grammar {
            GrammarRef::Set(id) => write!(f, "grammar #{id} state {}", self.state),
            GrammarRef::Builtin(id) => write!(f, "built-in #{id} state {}", self.state),
            GrammarRef::Fragment => write!(f, "fragment state {}", self.state),
        }
    }
}

/// One positioned entry of a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventType {
    pub shape: EventShape,
    pub next: Next,
    /// 0, 1 or 2.
    pub tier: u8,
    /// Position within the whole catalog.
    pub ordinal: usize,
    pub key: CatalogKey,
}

impl EventType {
    /// Name implied by the production (declared SE/AT).
    pub fn qname(&self) -> Option<&Arc<QName>> {
        match &self.shape {
            EventShape::StartElementNamed(q)
            | EventShape::StartElementSchemaQName { qname: q, .. }
            | EventShape::AttributeNamed { qname: q, .. } => Some(q),
            _ => None,
        }
    }

    /// Expected simple type of the value (typed CH/AT).
    pub fn type_id(&self) -> Option<TypeId> {
        match &self.shape {
            EventShape::CharactersTyped(t) => Some(*t),
            EventShape::AttributeNamed { type_id, .. } => *type_id,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTypeList {
    key: CatalogKey,
    types: Vec<EventType>,
    tier_len: [usize; 3],
}

impl EventTypeList {
    /// Builds a catalog from three tiers.
    ///
    /// Ist die zweite Stufe leer, rueckt die dritte nach (DocEnd: CM 1.0, PI 1.1).
    pub fn from_tiers(key: CatalogKey, mut tiers: [Vec<Production>; 3]) -> Self {
        if tiers[1].is_empty() && !tiers[2].is_empty() {
            tiers.swap(1, 2);
        }
        let tier_len = [tiers[0].len(), tiers[1].len(), tiers[2].len()];
        let mut types = Vec::with_capacity(tier_len.iter().sum());
        for (tier, productions) in tiers.into_iter().enumerate() {
            for p in productions {
                let ordinal = types.len();
                types.push(EventType { shape: p.shape, next: p.next, tier: tier as u8, ordinal, key });
            }
        }
        Self { key, types, tier_len }
    }

    /// Catalog of a grammar of the shared set.
    pub fn for_state(grammar: &Grammar, state: usize, options: GrammarOptions) -> Self {
        let key = CatalogKey { grammar: GrammarRef::Set(grammar.id()), state };
        let declared = grammar.table().state(state).unwrap_or_default();
        let mut tiers: [Vec<Production>; 3] = Default::default();

        match grammar.kind() {
            GrammarKind::SchemaInformedElement | GrammarKind::SchemaInformedType => {
                if state == 0 {
                    if grammar.admits_xsi_type() {
                        tiers[0].push(Production::new(EventShape::SchemaType, Next::State(0)));
                    }
                    if grammar.admits_xsi_nil() {
                        tiers[0].push(Production::new(EventShape::SchemaNil, Next::State(0)));
                    }
                }
                tiers[0].extend(declared.iter().cloned());
                if !options.strict() {
                    undeclared(grammar, state, declared, options, &mut tiers);
                }
            }
            GrammarKind::Document => {
                tiers[0].extend(declared.iter().cloned());
                if state == 1 {
                    if options.dtd() {
                        tiers[1].push(Production::new(EventShape::Dtd, Next::State(1)));
                    }
                    comments_and_pis(options, Next::State(1), &mut tiers[2]);
                }
            }
            GrammarKind::DocumentEnd => {
                tiers[0].extend(declared.iter().cloned());
                comments_and_pis(options, Next::State(0), &mut tiers[2]);
            }
            GrammarKind::BuiltinFragment | GrammarKind::BuiltinElement => {
                tiers[0].extend(declared.iter().cloned());
                if state == 1 {
                    comments_and_pis(options, Next::State(1), &mut tiers[2]);
                }
            }
        }
        Self::from_tiers(key, tiers)
    }

    pub fn key(&self) -> CatalogKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, ordinal: usize) -> Option<&EventType> {
        self.types.get(ordinal)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EventType> {
        self.types.iter()
    }

    pub fn tier_len(&self) -> [usize; 3] {
        self.tier_len
    }

    /// Event code of the entry at `ordinal`.
    pub fn code(&self, ordinal: usize) -> Option<EventCode> {
        let ty = self.types.get(ordinal)?;
        let [n0, n1, _] = self.tier_len;
        Some(match ty.tier {
            0 => EventCode::one(ordinal as u32),
            1 => EventCode::two(n0 as u32, (ordinal - n0) as u32),
            _ => EventCode::three(n0 as u32, n1 as u32, (ordinal - n0 - n1) as u32),
        })
    }

    /// First entry with the given shape.
    pub fn position(&self, shape: &EventShape) -> Option<usize> {
        self.types.iter().position(|t| &t.shape == shape)
    }

    /// First entry matching `pred`, tiers in order.
    pub fn find(&self, pred: impl Fn(&EventShape) -> bool) -> Option<&EventType> {
        self.types.iter().find(|t| pred(&t.shape))
    }
}

impl<'a> IntoIterator for &'a EventTypeList {
    type Item = &'a EventType;
    type IntoIter = std::slice::Iter<'a, EventType>;

    fn into_iter(self) -> Self::IntoIter {
        self.types.iter()
    }
}

fn comments_and_pis(options: GrammarOptions, next: Next, tier: &mut Vec<Production>) {
    if options.comments() {
        tier.push(Production::new(EventShape::Comment, next));
    }
    if options.pis() {
        tier.push(Production::new(EventShape::ProcessingInstruction, next));
    }
}

/// Undeclared productions of a non-strict schema-informed state (EXI 8.5.4.4.1).
fn undeclared(
    grammar: &Grammar,
    state: usize,
    declared: &[Production],
    options: GrammarOptions,
    tiers: &mut [Vec<Production>; 3],
) {
    let table = grammar.table();
    let content = table.content().unwrap_or(0);
    let content2 = table.content2().unwrap_or(state);
    let in_start_tag = state <= content && state != content2;
    let tier = &mut tiers[1];

    if !declared.iter().any(|p| p.shape == EventShape::EndElement) {
        tier.push(Production::new(EventShape::EndElement, Next::End));
    }
    if in_start_tag {
        tier.push(Production::new(EventShape::AttributeWildcardAny, Next::State(state)));
        tier.push(Production::new(EventShape::AttributeUntyped, Next::State(state)));
    }
    if state == 0 {
        if options.prefixes() {
            tier.push(Production::new(EventShape::NamespaceDecl, Next::State(0)));
        }
        if options.self_contained() {
            tier.push(Production::new(EventShape::SelfContained, Next::State(0)));
        }
    }
    let target = Next::State(if in_start_tag { content2 } else { state });
    tier.push(Production::new(EventShape::StartElementWildcard, target));
    tier.push(Production::new(EventShape::CharactersUntyped, target));
    if options.dtd() {
        tier.push(Production::new(EventShape::EntityReference, target));
    }
    comments_and_pis(options, target, &mut tiers[2]);
}

//! Proto-Grammars fuer schema-informed Grammatiken (EXI 8.5.4.1, 8.5.4.2).
//!
//! Proto-Grammars sind ein Zwischenformat: ein NFA mit ε-Productions, der
//! direkt aus dem Content-Modell entsteht. [`ProtoGrammar::normalize`]
//! ersetzt die ε-Productions und vereinigt doppelte Terminals per
//! Teilmengenkonstruktion. Heraus kommt eine deterministische Zustandstabelle
//! mit Productions in Event-Code-Reihenfolge (EXI 8.5.4.3).
//!
//! ```text
//! Type_i = Attribute_0 ⊕ ... ⊕ Attribute_n-1 ⊕ Content
//! TypeEmpty_i = Attribute_0 ⊕ ... ⊕ Attribute_n-1 ⊕ EE
//! ```

use std::cmp::Ordering;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use crate::grammar::{EventShape, Next, Production, StateTable};
use crate::qname::QName;
use crate::schema::{Content, ElementId, Particle, SchemaQuery, Term, TypeId, TypeKind, Variety, Wildcard};
use crate::{Error, FastHashMap, FastIndexMap, Result};

// ============================================================================
// ProtoProduction / ProtoGrammar
// ============================================================================

/// Production einer Proto-Grammar; `terminal == None` ist eine ε-Production.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtoProduction {
    pub terminal: Option<EventShape>,
    pub right_hand_side: usize,
    /// Position des Particles bei depth-first Traversierung (EXI 8.5.4.3).
    pub schema_order: u32,
}

impl ProtoProduction {
    pub fn new(terminal: EventShape, rhs: usize) -> Self {
        Self { terminal: Some(terminal), right_hand_side: rhs, schema_order: 0 }
    }

    pub fn ordered(terminal: EventShape, rhs: usize, order: u32) -> Self {
        Self { terminal: Some(terminal), right_hand_side: rhs, schema_order: order }
    }

    pub fn epsilon(rhs: usize) -> Self {
        Self { terminal: None, right_hand_side: rhs, schema_order: 0 }
    }

    pub fn is_epsilon(&self) -> bool {
        self.terminal.is_none()
    }

    fn is_end_element(&self) -> bool {
        self.terminal == Some(EventShape::EndElement)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtoGrammar {
    non_terminals: Vec<Vec<ProtoProduction>>,
}

impl ProtoGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_non_terminal(&mut self, productions: Vec<ProtoProduction>) -> usize {
        self.non_terminals.push(productions);
        self.non_terminals.len() - 1
    }

    pub fn len(&self) -> usize {
        self.non_terminals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.non_terminals.is_empty()
    }

    /// `G_0 : EE`
    pub fn end_element_only() -> Self {
        let mut g = Self::new();
        g.add_non_terminal(vec![ProtoProduction::new(EventShape::EndElement, 0)]);
        g
    }

    /// Grammar concatenation ⊕ (EXI 8.5.4.1.1): every EE of `self` becomes an
    /// ε-production to the start of `other`.
    pub fn concatenate(mut self, other: ProtoGrammar) -> ProtoGrammar {
        if other.is_empty() {
            return self;
        }
        let offset = self.non_terminals.len();
        for nt in &mut self.non_terminals {
            for p in nt.iter_mut().filter(|p| p.is_end_element()) {
                *p = ProtoProduction::epsilon(offset);
            }
        }
        self.append_shifted(other, offset);
        self
    }

    fn append_shifted(&mut self, other: ProtoGrammar, offset: usize) {
        for nt in other.non_terminals {
            self.non_terminals.push(
                nt.into_iter()
                    .map(|p| ProtoProduction { right_hand_side: p.right_hand_side + offset, ..p })
                    .collect(),
            );
        }
    }

    /// EE am Start: der Term darf entfallen.
    fn make_optional(&mut self) {
        if let Some(first) = self.non_terminals.first_mut() {
            first.push(ProtoProduction::new(EventShape::EndElement, 0));
        }
    }

    /// Jedes EE wird zu ε zurueck an den Start.
    fn make_loop(&mut self) {
        self.make_loop_to(0);
    }

    /// Mixed content: `Content_j : CH [untyped] Content_j` fuer jedes j.
    fn add_mixed_characters(&mut self) {
        for (idx, nt) in self.non_terminals.iter_mut().enumerate() {
            nt.push(ProtoProduction::new(EventShape::CharactersUntyped, idx));
        }
    }

    /// Groups each particle's start under a new start state via ε
    /// (`ee_to_start`: EE inside particles returns to the start, used by `all`).
    fn alternatives(parts: Vec<ProtoGrammar>, ee_at_start: bool, ee_to_start: bool) -> ProtoGrammar {
        let mut g = ProtoGrammar::new();
        g.add_non_terminal(Vec::new());
        let mut starts = Vec::with_capacity(parts.len());
        for mut part in parts {
            if ee_to_start {
                part.make_loop_to(usize::MAX);
            }
            let offset = g.len();
            starts.push(offset);
            g.append_shifted_with(part, offset);
        }
        let start = &mut g.non_terminals[0];
        if ee_at_start {
            start.push(ProtoProduction::new(EventShape::EndElement, 0));
        }
        start.extend(starts.into_iter().map(ProtoProduction::epsilon));
        g
    }

    /// Markiert EE als ε zu `target` (usize::MAX = Start der umgebenden Grammatik).
    fn make_loop_to(&mut self, target: usize) {
        for nt in &mut self.non_terminals {
            for p in nt.iter_mut().filter(|p| p.is_end_element()) {
                *p = ProtoProduction::epsilon(target);
            }
        }
    }

    fn append_shifted_with(&mut self, other: ProtoGrammar, offset: usize) {
        for nt in other.non_terminals {
            self.non_terminals.push(
                nt.into_iter()
                    .map(|p| {
                        let rhs = if p.right_hand_side == usize::MAX { 0 } else { p.right_hand_side + offset };
                        ProtoProduction { right_hand_side: rhs, ..p }
                    })
                    .collect(),
            );
        }
    }

    // ========================================================================
    // Normalisierung (EXI 8.5.4.2)
    // ========================================================================

    fn epsilon_closure(&self, seed: impl IntoIterator<Item = usize>) -> Vec<usize> {
        let mut seen: BTreeSet<usize> = BTreeSet::new();
        let mut stack: Vec<usize> = seed.into_iter().collect();
        while let Some(nt) = stack.pop() {
            if !seen.insert(nt) {
                continue;
            }
            for p in &self.non_terminals[nt] {
                if p.is_epsilon() && !seen.contains(&p.right_hand_side) {
                    stack.push(p.right_hand_side);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Eliminates ε-productions and duplicate terminals; returns the states in
    /// breadth-first order from the start, productions in event-code order.
    pub fn normalize(&self) -> Vec<Vec<Production>> {
        if self.is_empty() {
            return vec![vec![Production::new(EventShape::EndElement, Next::End)]];
        }
        let mut index: FastHashMap<Vec<usize>, usize> = FastHashMap::default();
        let mut sets: Vec<Vec<usize>> = Vec::new();
        let mut queue = VecDeque::new();
        let start = self.epsilon_closure([0]);
        index.insert(start.clone(), 0);
        sets.push(start);
        queue.push_back(0usize);
        let mut states: Vec<Vec<Production>> = Vec::new();

        while let Some(state) = queue.pop_front() {
            let members = sets[state].clone();
            let mut groups: FastIndexMap<TerminalKey, (EventShape, u32, Vec<usize>)> = FastIndexMap::default();
            let mut accepts = false;
            for &nt in &members {
                for p in &self.non_terminals[nt] {
                    let Some(terminal) = &p.terminal else { continue };
                    if *terminal == EventShape::EndElement {
                        accepts = true;
                        continue;
                    }
                    let entry = groups
                        .entry(TerminalKey::of(terminal))
                        .or_insert_with(|| (terminal.clone(), p.schema_order, Vec::new()));
                    entry.1 = entry.1.min(p.schema_order);
                    entry.2.push(p.right_hand_side);
                }
            }
            let mut prods: Vec<(Production, u32)> = Vec::with_capacity(groups.len() + 1);
            for (_, (shape, order, targets)) in groups {
                let closure = self.epsilon_closure(targets);
                let next = match index.get(&closure) {
                    Some(&id) => id,
                    None => {
                        let id = sets.len();
                        index.insert(closure.clone(), id);
                        sets.push(closure);
                        queue.push_back(id);
                        id
                    }
                };
                prods.push((Production::new(shape, Next::State(next)), order));
            }
            if accepts {
                prods.push((Production::new(EventShape::EndElement, Next::End), 0));
            }
            prods.sort_by(|a, b| compare_for_event_code(&a.0.shape, a.1, &b.0.shape, b.1));
            // Zustaende entstehen in BFS-Reihenfolge, daher ist `state` der naechste Index
            debug_assert_eq!(states.len(), state);
            states.push(prods.into_iter().map(|(p, _)| p).collect());
        }
        states
    }
}

/// Gleiche Schluessel sind doppelte Terminals (EXI 8.5.4.2.2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TerminalKey {
    StartElement(QName),
    StartElementNs(Arc<str>),
    StartElementAny,
    Attribute(QName, Option<TypeId>),
    AttributeNs(Arc<str>),
    AttributeAny,
    Characters(TypeId),
    CharactersUntyped,
    Other(String),
}

impl TerminalKey {
    fn of(shape: &EventShape) -> Self {
        match shape {
            EventShape::StartElementSchemaQName { qname, .. } | EventShape::StartElementNamed(qname) => {
                Self::StartElement(qname.expanded())
            }
            EventShape::StartElementWildcardNs(uri) => Self::StartElementNs(Arc::clone(uri)),
            EventShape::StartElementWildcard => Self::StartElementAny,
            EventShape::AttributeNamed { qname, type_id } => Self::Attribute(qname.expanded(), *type_id),
            EventShape::AttributeWildcardNs(uri) => Self::AttributeNs(Arc::clone(uri)),
            EventShape::AttributeWildcardAny => Self::AttributeAny,
            EventShape::CharactersTyped(t) => Self::Characters(*t),
            EventShape::CharactersUntyped => Self::CharactersUntyped,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Rang in der Event-Code-Reihenfolge (EXI 8.5.4.3).
fn rank(shape: &EventShape) -> u8 {
    match shape {
        EventShape::AttributeNamed { .. } => 0,
        EventShape::AttributeWildcardNs(_) => 1,
        EventShape::AttributeWildcardAny => 2,
        EventShape::StartElementSchemaQName { .. } | EventShape::StartElementNamed(_) => 3,
        EventShape::StartElementWildcardNs(_) => 4,
        EventShape::StartElementWildcard => 5,
        EventShape::EndElement => 6,
        EventShape::CharactersTyped(_) => 7,
        EventShape::CharactersUntyped => 8,
        _ => 9,
    }
}

/// AT(qname) nach local-name, URI; AT(uri:*) nach URI; SE nach Schema-Order;
/// typisierte CH nach Member-Reihenfolge.
fn compare_for_event_code(a: &EventShape, oa: u32, b: &EventShape, ob: u32) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (EventShape::AttributeNamed { qname: qa, .. }, EventShape::AttributeNamed { qname: qb, .. }) => {
            qa.cmp(qb).then(oa.cmp(&ob))
        }
        (EventShape::AttributeWildcardNs(ua), EventShape::AttributeWildcardNs(ub)) => ua.cmp(ub),
        (EventShape::StartElementSchemaQName { qname: qa, .. }, EventShape::StartElementSchemaQName { qname: qb, .. }) => {
            oa.cmp(&ob).then_with(|| qa.cmp(qb))
        }
        (EventShape::StartElementWildcardNs(ua), EventShape::StartElementWildcardNs(ub)) => {
            oa.cmp(&ob).then_with(|| ua.cmp(ub))
        }
        _ => oa.cmp(&ob),
    })
}

// ============================================================================
// Aufbau aus dem Schema (EXI 8.5.4.1)
// ============================================================================

struct Builder<'a> {
    schema: &'a dyn SchemaQuery,
    order: u32,
}

impl Builder<'_> {
    fn next_order(&mut self) -> u32 {
        let o = self.order;
        self.order += 1;
        o
    }

    /// `Type_0 : CH [member] Type_1`, `Type_1 : EE` (EXI 8.5.4.1.3.1).
    fn simple_type(&self, type_id: TypeId) -> ProtoGrammar {
        let mut g = ProtoGrammar::new();
        let members = flatten_union(self.schema, type_id);
        g.add_non_terminal(
            members
                .into_iter()
                .enumerate()
                .map(|(i, m)| ProtoProduction::ordered(EventShape::CharactersTyped(m), 1, i as u32))
                .collect(),
        );
        g.add_non_terminal(vec![ProtoProduction::new(EventShape::EndElement, 0)]);
        g
    }

    /// Attribute use grammar with optional wildcard loops (EXI 8.5.4.1.4).
    fn attribute_use(&self, qname: &QName, type_id: TypeId, required: bool, wildcard: &[EventShape]) -> ProtoGrammar {
        let qname = Arc::new(qname.expanded());
        let mut start: Vec<ProtoProduction> = flatten_union(self.schema, type_id)
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                ProtoProduction::ordered(
                    EventShape::AttributeNamed { qname: Arc::clone(&qname), type_id: Some(m) },
                    1,
                    i as u32,
                )
            })
            .collect();
        start.extend(wildcard.iter().map(|w| ProtoProduction::new(w.clone(), 0)));
        if !required {
            start.push(ProtoProduction::new(EventShape::EndElement, 0));
        }
        let mut g = ProtoGrammar::new();
        g.add_non_terminal(start);
        g.add_non_terminal(vec![ProtoProduction::new(EventShape::EndElement, 0)]);
        g
    }

    fn wildcard_loop(wildcard: &[EventShape]) -> ProtoGrammar {
        let mut start: Vec<ProtoProduction> = wildcard.iter().map(|w| ProtoProduction::new(w.clone(), 0)).collect();
        start.push(ProtoProduction::new(EventShape::EndElement, 0));
        let mut g = ProtoGrammar::new();
        g.add_non_terminal(start);
        g
    }

    fn particle(&mut self, p: &Particle) -> Result<ProtoGrammar> {
        if let Some(max) = p.max_occurs
            && max < p.min_occurs
        {
            return Err(Error::schema_inconsistency(format!("maxOccurs {max} < minOccurs {}", p.min_occurs)));
        }
        if p.max_occurs == Some(0) {
            return Ok(ProtoGrammar::end_element_only());
        }
        let term = self.term(&p.term)?;
        let required = p.min_occurs.max(1) as usize;
        let mut copies = Vec::new();
        let mut first = term.clone();
        if p.min_occurs == 0 {
            first.make_optional();
        }
        copies.push(first);
        for _ in 1..required {
            copies.push(term.clone());
        }
        match p.max_occurs {
            None => {
                if p.min_occurs == 0 {
                    if let Some(only) = copies.last_mut() {
                        only.make_loop();
                        only.make_optional();
                    }
                } else {
                    let mut tail = term;
                    tail.make_loop();
                    tail.make_optional();
                    copies.push(tail);
                }
            }
            Some(max) => {
                for _ in required..max as usize {
                    let mut optional = term.clone();
                    optional.make_optional();
                    copies.push(optional);
                }
            }
        }
        let mut iter = copies.into_iter();
        let mut g = iter.next().unwrap_or_else(ProtoGrammar::end_element_only);
        for c in iter {
            g = g.concatenate(c);
        }
        Ok(g)
    }

    fn term(&mut self, term: &Term) -> Result<ProtoGrammar> {
        match term {
            Term::Element(e) => self.element_term(*e),
            Term::Wildcard(w) => {
                let order = self.next_order();
                let shapes = match w {
                    Wildcard::Any => vec![EventShape::StartElementWildcard],
                    Wildcard::Namespaces(uris) => {
                        uris.iter().map(|u| EventShape::StartElementWildcardNs(Arc::from(u.as_str()))).collect()
                    }
                };
                let mut g = ProtoGrammar::new();
                g.add_non_terminal(shapes.into_iter().map(|s| ProtoProduction::ordered(s, 1, order)).collect());
                g.add_non_terminal(vec![ProtoProduction::new(EventShape::EndElement, 0)]);
                Ok(g)
            }
            Term::Sequence(ps) => {
                let mut g: Option<ProtoGrammar> = None;
                for p in ps {
                    let next = self.particle(p)?;
                    g = Some(match g {
                        Some(acc) => acc.concatenate(next),
                        None => next,
                    });
                }
                Ok(g.unwrap_or_else(ProtoGrammar::end_element_only))
            }
            Term::Choice(ps) => {
                if ps.is_empty() {
                    return Ok(ProtoGrammar::end_element_only());
                }
                let parts = ps.iter().map(|p| self.particle(p)).collect::<Result<Vec<_>>>()?;
                Ok(ProtoGrammar::alternatives(parts, false, false))
            }
            Term::All(ps) => {
                if ps.is_empty() {
                    return Ok(ProtoGrammar::end_element_only());
                }
                let parts = ps.iter().map(|p| self.particle(p)).collect::<Result<Vec<_>>>()?;
                Ok(ProtoGrammar::alternatives(parts, true, true))
            }
        }
    }

    /// SE for the element and every non-abstract member of its substitution
    /// group (EXI 8.5.4.1.6).
    fn element_term(&mut self, element: ElementId) -> Result<ProtoGrammar> {
        let order = self.next_order();
        let mut candidates = vec![element];
        candidates.extend(self.schema.substitution_group_members(element));
        let mut starts = Vec::new();
        for e in candidates {
            let decl = self
                .schema
                .element_decl(e)
                .ok_or_else(|| Error::schema_inconsistency(format!("undefined element #{e}")))?;
            if decl.is_abstract {
                continue;
            }
            starts.push(ProtoProduction::ordered(
                EventShape::StartElementSchemaQName { qname: Arc::new(decl.qname.expanded()), element: e },
                1,
                order,
            ));
        }
        let mut g = ProtoGrammar::new();
        g.add_non_terminal(starts);
        g.add_non_terminal(vec![ProtoProduction::new(EventShape::EndElement, 0)]);
        Ok(g)
    }
}

/// Member types of a union, nested unions flattened; `[type_id]` otherwise.
pub(crate) fn flatten_union(schema: &dyn SchemaQuery, type_id: TypeId) -> Vec<TypeId> {
    let mut out = Vec::new();
    let mut stack = vec![type_id];
    let mut guard = 0usize;
    while let Some(t) = stack.pop() {
        guard += 1;
        if guard > schema.type_count() + 16 {
            break;
        }
        match schema.variety_of(t) {
            Some(Variety::Union(members)) => stack.extend(members.iter().rev().copied()),
            _ => {
                if !out.contains(&t) {
                    out.push(t);
                }
            }
        }
    }
    out
}

fn wildcard_shapes(w: &Wildcard) -> Vec<EventShape> {
    match w {
        Wildcard::Any => vec![EventShape::AttributeWildcardAny],
        Wildcard::Namespaces(uris) => {
            uris.iter().map(|u| EventShape::AttributeWildcardNs(Arc::from(u.as_str()))).collect()
        }
    }
}

/// Builds the normalised `(Type, TypeEmpty)` tables of one type.
pub(crate) fn type_tables(schema: &dyn SchemaQuery, type_id: TypeId) -> Result<(StateTable, StateTable)> {
    let def = schema
        .type_def(type_id)
        .ok_or_else(|| Error::schema_inconsistency(format!("undefined type #{type_id}")))?;
    let mut b = Builder { schema, order: 0 };
    let (full, empty) = match &def.kind {
        TypeKind::Simple(_) => (b.simple_type(type_id), ProtoGrammar::end_element_only()),
        TypeKind::Placeholder => {
            return Err(Error::schema_inconsistency(format!("type #{type_id} declared but never defined")));
        }
        TypeKind::Complex(c) => {
            let wildcard = c.attribute_wildcard.as_ref().map(wildcard_shapes).unwrap_or_default();
            let mut attrs: Option<ProtoGrammar> = None;
            for a in &c.attributes {
                if schema.type_def(a.type_id).is_none() {
                    return Err(Error::schema_inconsistency(format!(
                        "attribute {} references undefined type #{}",
                        a.qname, a.type_id
                    )));
                }
                let g = b.attribute_use(&a.qname, a.type_id, a.required, &wildcard);
                attrs = Some(match attrs {
                    Some(acc) => acc.concatenate(g),
                    None => g,
                });
            }
            if !wildcard.is_empty() {
                let g = Builder::wildcard_loop(&wildcard);
                attrs = Some(match attrs {
                    Some(acc) => acc.concatenate(g),
                    None => g,
                });
            }
            let content = match &c.content {
                Content::Empty => ProtoGrammar::end_element_only(),
                Content::Simple(t) => {
                    if !schema.type_def(*t).is_some_and(|d| d.is_simple()) {
                        return Err(Error::schema_inconsistency(format!(
                            "simple content of type #{type_id} is not a simple type"
                        )));
                    }
                    b.simple_type(*t)
                }
                Content::ElementOnly(p) => b.particle(p)?,
                Content::Mixed(p) => {
                    let mut g = b.particle(p)?;
                    g.add_mixed_characters();
                    g
                }
            };
            match attrs {
                Some(a) => (a.clone().concatenate(content), a.concatenate(ProtoGrammar::end_element_only())),
                None => (content, ProtoGrammar::end_element_only()),
            }
        }
    };
    Ok((StateTable::with_content(full.normalize()), StateTable::with_content(empty.normalize())))
}

//! Grammar model and grammar cache (EXI 8).
//!
//! Alle Schema-Grammatiken einer Options-Kombination liegen in einem
//! [`GrammarSet`]: eine Arena aus Zustandstabellen, adressiert ueber Indizes.
//! Ein Typ, der sich selbst enthaelt, verweist nur auf eine `ElementId`;
//! die passende Grammatik wird erst beim Betreten des Elements aufgeloest.
//! Dadurch terminiert der Aufbau auch bei zyklischen Typgraphen.
//!
//! Ein `GrammarSet` ist unveraenderlich und wird ueber `Arc` zwischen Sessions
//! und Threads geteilt. Gelernte Built-in Grammatiken (EXI 8.4.3) gehoeren
//! der Session, siehe [`crate::builtin`].
//!
//! # Aufbau
//!
//! ```text
//! SchemaQuery → proto_grammar (NFA → DFA) → StateTable ─┐
//!                                                       ├→ Grammar → EventTypeList
//!                         xsi:type / xsi:nil flags  ────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::event_types::EventTypeList;
use crate::options::GrammarOptions;
use crate::proto_grammar;
use crate::qname::{QName, URI_XSD};
use crate::schema::{ElementId, SchemaQuery, TypeId, Variety};
use crate::string_table::InitialEntry;
use crate::typed_value::ValueRepr;
use crate::{Error, FastHashMap, Result};

/// Index of a grammar in a [`GrammarSet`].
pub type GrammarId = usize;

// ============================================================================
// EventShape (EXI 4, Table 4-1)
// ============================================================================

/// The event a production matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventShape {
    StartDocument,
    EndDocument,
    /// SE(qname) learned by a built-in grammar.
    StartElementNamed(Arc<QName>),
    /// SE(qname) of a declared element.
    StartElementSchemaQName { qname: Arc<QName>, element: ElementId },
    /// SE(uri:*)
    StartElementWildcardNs(Arc<str>),
    /// SE(*)
    StartElementWildcard,
    /// AT(qname), typed when declared, untyped when learned.
    AttributeNamed { qname: Arc<QName>, type_id: Option<TypeId> },
    /// AT(uri:*)
    AttributeWildcardNs(Arc<str>),
    /// AT(*)
    AttributeWildcardAny,
    /// AT(*) [untyped value]: undeclared attribute or invalid value.
    AttributeUntyped,
    /// AT(xsi:type)
    SchemaType,
    /// AT(xsi:nil)
    SchemaNil,
    CharactersTyped(TypeId),
    CharactersUntyped,
    EndElement,
    NamespaceDecl,
    SelfContained,
    EntityReference,
    Dtd,
    Comment,
    ProcessingInstruction,
}

impl EventShape {
    pub fn is_attribute(&self) -> bool {
        matches!(
            self,
            Self::AttributeNamed { .. }
                | Self::AttributeWildcardNs(_)
                | Self::AttributeWildcardAny
                | Self::AttributeUntyped
        )
    }

    pub fn is_start_element(&self) -> bool {
        matches!(
            self,
            Self::StartElementNamed(_)
                | Self::StartElementSchemaQName { .. }
                | Self::StartElementWildcardNs(_)
                | Self::StartElementWildcard
        )
    }

    pub fn is_characters(&self) -> bool {
        matches!(self, Self::CharactersTyped(_) | Self::CharactersUntyped)
    }

    /// The qname is written to the stream (not implied by the production).
    pub fn has_wildcard_name(&self) -> bool {
        matches!(
            self,
            Self::StartElementWildcardNs(_)
                | Self::StartElementWildcard
                | Self::AttributeWildcardNs(_)
                | Self::AttributeWildcardAny
                | Self::AttributeUntyped
        )
    }
}

impl fmt::Display for EventShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartDocument => f.write_str("SD"),
            Self::EndDocument => f.write_str("ED"),
            Self::StartElementNamed(q) => write!(f, "SE({q})"),
            Self::StartElementSchemaQName { qname, .. } => write!(f, "SE({qname})"),
            Self::StartElementWildcardNs(uri) => write!(f, "SE({uri}:*)"),
            Self::StartElementWildcard => f.write_str("SE(*)"),
            Self::AttributeNamed { qname, type_id: Some(_) } => write!(f, "AT({qname})"),
            Self::AttributeNamed { qname, type_id: None } => write!(f, "AT({qname})[learned]"),
            Self::AttributeWildcardNs(uri) => write!(f, "AT({uri}:*)"),
            Self::AttributeWildcardAny => f.write_str("AT(*)"),
            Self::AttributeUntyped => f.write_str("AT(*)[untyped]"),
            Self::SchemaType => f.write_str("AT(xsi:type)"),
            Self::SchemaNil => f.write_str("AT(xsi:nil)"),
            Self::CharactersTyped(t) => write!(f, "CH[#{t}]"),
            Self::CharactersUntyped => f.write_str("CH[untyped]"),
            Self::EndElement => f.write_str("EE"),
            Self::NamespaceDecl => f.write_str("NS"),
            Self::SelfContained => f.write_str("SC"),
            Self::EntityReference => f.write_str("ER"),
            Self::Dtd => f.write_str("DT"),
            Self::Comment => f.write_str("CM"),
            Self::ProcessingInstruction => f.write_str("PI"),
        }
    }
}

// ============================================================================
// Production / StateTable
// ============================================================================

/// Where a production leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Next {
    /// A state of the same grammar.
    State(usize),
    /// State 0 of another grammar (document content → document end).
    Grammar(GrammarId),
    /// EE / ED: the grammar is left.
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Production {
    pub shape: EventShape,
    pub next: Next,
}

impl Production {
    pub fn new(shape: EventShape, next: Next) -> Self {
        Self { shape, next }
    }
}

/// Declared productions of every state of one grammar, in event-code order.
///
/// Undeclared productions are not stored; the catalog derives them from
/// `content` and `content2` (EXI 8.5.4.4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    pub(crate) states: Vec<Vec<Production>>,
    /// First state without AT productions.
    pub(crate) content: Option<usize>,
    /// Copy of `content` reached by undeclared SE(*)/CH/ER.
    pub(crate) content2: Option<usize>,
}

impl StateTable {
    /// Table without undeclared-production bookkeeping (document, fragment).
    pub fn plain(states: Vec<Vec<Production>>) -> Self {
        Self { states, content: None, content2: None }
    }

    /// Element or type table: finds the content state and appends content2.
    pub fn with_content(mut states: Vec<Vec<Production>>) -> Self {
        let content = states
            .iter()
            .position(|ps| !ps.iter().any(|p| p.shape.is_attribute()))
            .unwrap_or(states.len().saturating_sub(1));
        let copy = states.get(content).cloned().unwrap_or_default();
        states.push(copy);
        let content2 = states.len() - 1;
        Self { states, content: Some(content), content2: Some(content2) }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> Option<&[Production]> {
        self.states.get(index).map(Vec::as_slice)
    }

    pub fn content(&self) -> Option<usize> {
        self.content
    }

    pub fn content2(&self) -> Option<usize> {
        self.content2
    }
}

// ============================================================================
// Grammar
// ============================================================================

/// Grammar variants (EXI 8.4, 8.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarKind {
    SchemaInformedElement,
    SchemaInformedType,
    BuiltinElement,
    BuiltinFragment,
    Document,
    DocumentEnd,
}

impl GrammarKind {
    pub fn is_schema_informed(self) -> bool {
        matches!(self, Self::SchemaInformedElement | Self::SchemaInformedType)
    }
}

#[derive(Debug, Clone)]
pub struct Grammar {
    pub(crate) id: GrammarId,
    pub(crate) kind: GrammarKind,
    pub(crate) table: Arc<StateTable>,
    pub(crate) type_id: Option<TypeId>,
    /// State 0 admits AT(xsi:type).
    pub(crate) xsi_type: bool,
    /// State 0 admits AT(xsi:nil).
    pub(crate) xsi_nil: bool,
}

impl Grammar {
    pub fn id(&self) -> GrammarId {
        self.id
    }

    pub fn kind(&self) -> GrammarKind {
        self.kind
    }

    pub fn table(&self) -> &StateTable {
        &self.table
    }

    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    pub fn admits_xsi_type(&self) -> bool {
        self.xsi_type
    }

    pub fn admits_xsi_nil(&self) -> bool {
        self.xsi_nil
    }
}

// ============================================================================
// GrammarSet
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GrammarKey {
    table: usize,
    kind: GrammarKind,
    xsi_type: bool,
    xsi_nil: bool,
}

/// Every grammar of one (schema, options) pair with precomputed catalogs.
pub struct GrammarSet {
    options: GrammarOptions,
    schema: Option<Arc<dyn SchemaQuery>>,
    grammars: Vec<Grammar>,
    catalogs: Vec<Vec<Arc<EventTypeList>>>,
    element_grammars: Vec<GrammarId>,
    /// Per type: grammar after xsi:type, for [non-nillable, nillable] elements.
    type_grammars: Vec<[GrammarId; 2]>,
    type_empty: Vec<GrammarId>,
    reprs: Vec<ValueRepr>,
    document: GrammarId,
    document_end: GrammarId,
    fragment: GrammarId,
    initial_strings: Vec<InitialEntry>,
}

impl fmt::Debug for GrammarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarSet")
            .field("options", &self.options)
            .field("schema_informed", &self.schema.is_some())
            .field("grammars", &self.grammars.len())
            .finish()
    }
}

struct SetBuilder {
    tables: Vec<Arc<StateTable>>,
    grammars: Vec<Grammar>,
    index: FastHashMap<GrammarKey, GrammarId>,
}

impl SetBuilder {
    fn add_table(&mut self, table: StateTable) -> usize {
        self.tables.push(Arc::new(table));
        self.tables.len() - 1
    }

    fn grammar(&mut self, key: GrammarKey, type_id: Option<TypeId>) -> GrammarId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.grammars.len();
        self.grammars.push(Grammar {
            id,
            kind: key.kind,
            table: Arc::clone(&self.tables[key.table]),
            type_id,
            xsi_type: key.xsi_type,
            xsi_nil: key.xsi_nil,
        });
        self.index.insert(key, id);
        id
    }
}

impl GrammarSet {
    /// Builds all grammars for `schema` (or the schema-less set) and `options`.
    pub fn build(schema: Option<Arc<dyn SchemaQuery>>, options: GrammarOptions) -> Result<Self> {
        let mut b = SetBuilder { tables: Vec::new(), grammars: Vec::new(), index: FastHashMap::default() };
        let strict = options.strict();
        let mut element_grammars = Vec::new();
        let mut type_grammars = Vec::new();
        let mut type_empty = Vec::new();
        let mut reprs = Vec::new();
        let mut initial_strings = Vec::new();

        let (doc_elements, frag_elements) = match schema.as_deref() {
            Some(s) => {
                let type_count = s.type_count();
                let mut full_tables = Vec::with_capacity(type_count);
                for t in 0..type_count {
                    let (full, empty) = proto_grammar::type_tables(s, t)?;
                    let full = b.add_table(full);
                    let empty = b.add_table(empty);
                    full_tables.push(full);
                    // xsi:type fuehrt in die Typ-Grammatik ohne erneutes xsi:type
                    let pair = if strict {
                        [(false, false), (false, true)]
                    } else {
                        [(true, true), (true, true)]
                    };
                    let ids = pair.map(|(xt, xn)| {
                        b.grammar(
                            GrammarKey { table: full, kind: GrammarKind::SchemaInformedType, xsi_type: xt, xsi_nil: xn },
                            Some(t),
                        )
                    });
                    type_grammars.push(ids);
                    let (xt, xn) = if strict { (false, false) } else { (true, true) };
                    type_empty.push(b.grammar(
                        GrammarKey { table: empty, kind: GrammarKind::SchemaInformedType, xsi_type: xt, xsi_nil: xn },
                        Some(t),
                    ));
                    reprs.push(ValueRepr::for_type(s, t));
                }
                for e in 0..s.element_count() {
                    let decl = s
                        .element_decl(e)
                        .ok_or_else(|| Error::schema_inconsistency(format!("element #{e} missing")))?;
                    let table = *full_tables.get(decl.type_id).ok_or_else(|| {
                        Error::schema_inconsistency(format!("{} references undefined type #{}", decl.qname, decl.type_id))
                    })?;
                    let (xt, xn) = if strict {
                        (s.has_named_subtypes(decl.type_id) || is_union(s, decl.type_id), decl.nillable)
                    } else {
                        (true, true)
                    };
                    element_grammars.push(b.grammar(
                        GrammarKey { table, kind: GrammarKind::SchemaInformedElement, xsi_type: xt, xsi_nil: xn },
                        Some(decl.type_id),
                    ));
                }
                initial_strings = initial_entries(s);
                (sorted_elements(s, s.global_elements().iter().copied()), fragment_elements(s))
            }
            None => (Vec::new(), Vec::new()),
        };

        // Document (EXI 8.5.1 / 8.4.1)
        let doc_end_table = b.add_table(StateTable::plain(vec![vec![Production::new(EventShape::EndDocument, Next::End)]]));
        let document_end = b.grammar(
            GrammarKey { table: doc_end_table, kind: GrammarKind::DocumentEnd, xsi_type: false, xsi_nil: false },
            None,
        );
        let mut content: Vec<Production> = doc_elements
            .iter()
            .map(|(qname, e)| {
                Production::new(
                    EventShape::StartElementSchemaQName { qname: Arc::clone(qname), element: *e },
                    Next::Grammar(document_end),
                )
            })
            .collect();
        content.push(Production::new(EventShape::StartElementWildcard, Next::Grammar(document_end)));
        let doc_table = b.add_table(StateTable::plain(vec![
            vec![Production::new(EventShape::StartDocument, Next::State(1))],
            content,
        ]));
        let document = b.grammar(
            GrammarKey { table: doc_table, kind: GrammarKind::Document, xsi_type: false, xsi_nil: false },
            None,
        );

        // Fragment (EXI 8.5.2 / 8.4.2)
        let mut content: Vec<Production> = frag_elements
            .iter()
            .map(|(qname, e)| {
                Production::new(
                    EventShape::StartElementSchemaQName { qname: Arc::clone(qname), element: *e },
                    Next::State(1),
                )
            })
            .collect();
        content.push(Production::new(EventShape::StartElementWildcard, Next::State(1)));
        content.push(Production::new(EventShape::EndDocument, Next::End));
        let frag_table = b.add_table(StateTable::plain(vec![
            vec![Production::new(EventShape::StartDocument, Next::State(1))],
            content,
        ]));
        let fragment = b.grammar(
            GrammarKey { table: frag_table, kind: GrammarKind::BuiltinFragment, xsi_type: false, xsi_nil: false },
            None,
        );

        let catalogs = b
            .grammars
            .iter()
            .map(|g| {
                (0..g.table.len())
                    .map(|state| Arc::new(EventTypeList::for_state(g, state, options)))
                    .collect()
            })
            .collect();

        log::debug!(
            "grammar set built: {} tables, {} grammars, schema_informed={}, options={:?}",
            b.tables.len(),
            b.grammars.len(),
            schema.is_some(),
            options
        );

        Ok(Self {
            options,
            schema,
            grammars: b.grammars,
            catalogs,
            element_grammars,
            type_grammars,
            type_empty,
            reprs,
            document,
            document_end,
            fragment,
            initial_strings,
        })
    }

    pub fn options(&self) -> GrammarOptions {
        self.options
    }

    pub fn schema(&self) -> Option<&Arc<dyn SchemaQuery>> {
        self.schema.as_ref()
    }

    pub fn is_schema_informed(&self) -> bool {
        self.schema.is_some()
    }

    pub fn len(&self) -> usize {
        self.grammars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grammars.is_empty()
    }

    pub fn grammar(&self, id: GrammarId) -> Option<&Grammar> {
        self.grammars.get(id)
    }

    /// Precomputed catalog of (grammar, state).
    pub fn catalog(&self, id: GrammarId, state: usize) -> Result<&Arc<EventTypeList>> {
        self.catalogs
            .get(id)
            .and_then(|states| states.get(state))
            .ok_or_else(|| Error::schema_inconsistency(format!("no grammar state {id}/{state}")))
    }

    pub fn document(&self) -> GrammarId {
        self.document
    }

    pub fn document_end(&self) -> GrammarId {
        self.document_end
    }

    pub fn fragment(&self) -> GrammarId {
        self.fragment
    }

    pub fn element_grammar(&self, element: ElementId) -> Option<GrammarId> {
        self.element_grammars.get(element).copied()
    }

    /// Grammar an element switches to after `xsi:type`.
    pub fn type_grammar(&self, type_id: TypeId, nillable: bool) -> Option<GrammarId> {
        self.type_grammars.get(type_id).map(|pair| pair[usize::from(nillable)])
    }

    /// Grammar after `xsi:nil="true"`.
    pub fn type_empty_grammar(&self, type_id: TypeId) -> Option<GrammarId> {
        self.type_empty.get(type_id).copied()
    }

    /// Value representation of a simple type.
    pub fn value_repr(&self, type_id: TypeId) -> &ValueRepr {
        static UNTYPED: ValueRepr = ValueRepr::String;
        self.reprs.get(type_id).unwrap_or(&UNTYPED)
    }

    pub fn initial_strings(&self) -> &[InitialEntry] {
        &self.initial_strings
    }

    pub fn element_nillable(&self, element: ElementId) -> bool {
        self.schema
            .as_deref()
            .and_then(|s| s.element_decl(element))
            .is_some_and(|d| d.nillable)
    }

    pub fn global_element(&self, qname: &QName) -> Option<ElementId> {
        self.schema.as_deref()?.global_element_decl(&qname.local_name, &qname.uri)
    }

    pub fn global_attribute_type(&self, qname: &QName) -> Option<TypeId> {
        self.schema.as_deref()?.global_attribute_decl(qname)
    }

    pub fn type_by_name(&self, qname: &QName) -> Option<TypeId> {
        self.schema.as_deref()?.type_by_name(&qname.expanded())
    }
}

fn is_union(schema: &dyn SchemaQuery, type_id: TypeId) -> bool {
    matches!(schema.variety_of(type_id), Some(Variety::Union(_)))
}

/// (qname, element) sorted by local name, then URI.
fn sorted_elements(
    schema: &dyn SchemaQuery,
    ids: impl Iterator<Item = ElementId>,
) -> Vec<(Arc<QName>, ElementId)> {
    let mut out: Vec<(Arc<QName>, ElementId)> = ids
        .filter_map(|e| schema.element_decl(e).map(|d| (Arc::new(d.qname.expanded()), e)))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out
}

/// Fragment content: every declared element name once, global declarations first.
fn fragment_elements(schema: &dyn SchemaQuery) -> Vec<(Arc<QName>, ElementId)> {
    let mut seen: FastHashMap<QName, ElementId> = FastHashMap::default();
    let globals = schema.global_elements().iter().copied();
    for e in globals.chain(0..schema.element_count()) {
        if let Some(d) = schema.element_decl(e) {
            seen.entry(d.qname.expanded()).or_insert(e);
        }
    }
    sorted_elements(schema, seen.into_values())
}

/// String table pre-population (EXI D.3): URIs and local names sorted.
fn initial_entries(schema: &dyn SchemaQuery) -> Vec<InitialEntry> {
    let mut by_uri: BTreeMap<Arc<str>, BTreeSet<Arc<str>>> = BTreeMap::new();
    for q in schema.declared_names() {
        by_uri.entry(Arc::clone(&q.uri)).or_default().insert(Arc::clone(&q.local_name));
    }
    by_uri
        .into_iter()
        .filter(|(uri, _)| &**uri != URI_XSD)
        .map(|(uri, names)| InitialEntry { uri, local_names: names.into_iter().collect() })
        .collect()
}

// ============================================================================
// GrammarCache
// ============================================================================

/// Process-wide memo of grammar sets, keyed by (schema identity, options).
///
/// Entries are weak: a set lives as long as a session or caller holds it,
/// and with it its schema. Dead entries are pruned on every insert.
#[derive(Default)]
pub struct GrammarCache {
    entries: Mutex<FastHashMap<(u64, GrammarOptions), Weak<GrammarSet>>>,
}

impl fmt::Debug for GrammarCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrammarCache").field("entries", &self.len()).finish()
    }
}

impl GrammarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared cache used by encoder and decoder.
    pub fn global() -> &'static GrammarCache {
        static CACHE: OnceLock<GrammarCache> = OnceLock::new();
        CACHE.get_or_init(GrammarCache::new)
    }

    /// Returns the grammar set for `schema` and `options`, building it when
    /// no live set exists.
    ///
    /// The lock is held while building, so concurrent callers for the same key
    /// never build twice.
    pub fn get(&self, schema: Option<&Arc<dyn SchemaQuery>>, options: GrammarOptions) -> Result<Arc<GrammarSet>> {
        let key = (schema.map_or(0, |s| s.identity()), options);
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(set) = entries.get(&key).and_then(Weak::upgrade) {
            log::trace!("grammar cache hit: schema #{} {:?}", key.0, options);
            return Ok(set);
        }
        let set = Arc::new(GrammarSet::build(schema.cloned(), options)?);
        let before = entries.len();
        entries.retain(|_, weak| weak.strong_count() > 0);
        if entries.len() < before {
            log::debug!("grammar cache: {} dead entries pruned", before - entries.len());
        }
        entries.insert(key, Arc::downgrade(&set));
        Ok(set)
    }

    /// Number of grammar sets still in use.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .map_or(0, |e| e.values().filter(|weak| weak.strong_count() > 0).count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut e) = self.entries.lock() {
            e.clear();
        }
    }
}

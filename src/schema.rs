//! Compiled schema model and its read-only query interface.
//!
//! Die Grammatik-Erzeugung liest das Schema nur ueber [`SchemaQuery`].
//! [`SchemaModel`] ist die mitgelieferte Implementierung: eine Arena aus
//! Typen und Element-Deklarationen, adressiert ueber Indizes, damit zyklische
//! Typgraphen ohne Rekursion beim Aufbau auskommen. XSD-Parsing gehoert nicht
//! hierher; Schemas werden ueber [`SchemaBuilder`] programmatisch aufgebaut.
//!
//! # Beispiel
//!
//! ```
//! use exigram::qname::QName;
//! use exigram::schema::{AttributeUse, ComplexTypeDef, Particle, SchemaModel, SchemaQuery};
//!
//! let mut b = SchemaModel::builder();
//! let int = b.builtin("int");
//! let name = b.element(QName::new("urn:shop", "name"), b.builtin("string"));
//! let item = b.complex_type(
//!     Some(QName::new("urn:shop", "Item")),
//!     ComplexTypeDef::element_only(Particle::sequence(vec![Particle::element(name)]))
//!         .with_attribute(AttributeUse::required(QName::new("", "id"), int)),
//! );
//! b.global_element(QName::new("urn:shop", "item"), item);
//! let schema = b.build().unwrap();
//! assert_eq!(schema.global_elements().len(), 1);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::datetime::DateTimeKind;
use crate::qname::{QName, URI_XSD};
use crate::{Error, FastHashMap, Result};

/// Index of a type definition in a schema.
pub type TypeId = usize;
/// Index of an element declaration in a schema.
pub type ElementId = usize;

/// Built-in datatype a simple type finally derives from (EXI 7.1, Table 7-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatatypeKind {
    /// anySimpleType and every string-like type.
    String,
    Boolean,
    Decimal,
    Integer,
    Float,
    Double,
    Duration,
    DateTime(DateTimeKind),
    Base64Binary,
    HexBinary,
    QName,
    Notation,
}

/// XSD simple type variety.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Variety {
    #[default]
    Atomic,
    List(TypeId),
    /// Member types in declaration order.
    Union(Vec<TypeId>),
}

/// The constraining facets that change the EXI representation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub min_inclusive: Option<i128>,
    pub max_inclusive: Option<i128>,
    /// A pattern facet is present (changes the boolean representation).
    pub patterned: bool,
}

impl Facets {
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { enumeration: values.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    pub fn range(min: i128, max: i128) -> Self {
        Self { min_inclusive: Some(min), max_inclusive: Some(max), ..Self::default() }
    }

    /// Restriction: own facets override, bounds only tighten.
    fn restrict(&self, own: &Facets) -> Facets {
        Facets {
            enumeration: if own.enumeration.is_empty() { self.enumeration.clone() } else { own.enumeration.clone() },
            min_inclusive: tighter(self.min_inclusive, own.min_inclusive, i128::max),
            max_inclusive: tighter(self.max_inclusive, own.max_inclusive, i128::min),
            patterned: self.patterned || own.patterned,
        }
    }
}

fn tighter(a: Option<i128>, b: Option<i128>, pick: fn(i128, i128) -> i128) -> Option<i128> {
    match (a, b) {
        (Some(x), Some(y)) => Some(pick(x, y)),
        (x, None) => x,
        (None, y) => y,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleTypeDef {
    pub variety: Variety,
    pub kind: DatatypeKind,
    pub facets: Facets,
}

/// Namespace constraint of a wildcard (EXI 8.5.4.1.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wildcard {
    /// `##any` and `##other` both map to `*`.
    Any,
    /// Explicit namespaces; "" stands for absent.
    Namespaces(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeUse {
    pub qname: QName,
    pub type_id: TypeId,
    pub required: bool,
}

impl AttributeUse {
    pub fn required(qname: QName, type_id: TypeId) -> Self {
        Self { qname, type_id, required: true }
    }

    pub fn optional(qname: QName, type_id: TypeId) -> Self {
        Self { qname, type_id, required: false }
    }
}

/// Upper bound of a particle; `None` is unbounded.
pub type MaxOccurs = Option<u32>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Element(ElementId),
    Wildcard(Wildcard),
    Sequence(Vec<Particle>),
    Choice(Vec<Particle>),
    All(Vec<Particle>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Particle {
    pub min_occurs: u32,
    pub max_occurs: MaxOccurs,
    pub term: Term,
}

impl Particle {
    pub fn new(min_occurs: u32, max_occurs: MaxOccurs, term: Term) -> Self {
        Self { min_occurs, max_occurs, term }
    }

    pub fn element(id: ElementId) -> Self {
        Self::new(1, Some(1), Term::Element(id))
    }

    pub fn wildcard(w: Wildcard) -> Self {
        Self::new(1, Some(1), Term::Wildcard(w))
    }

    pub fn sequence(particles: Vec<Particle>) -> Self {
        Self::new(1, Some(1), Term::Sequence(particles))
    }

    pub fn choice(particles: Vec<Particle>) -> Self {
        Self::new(1, Some(1), Term::Choice(particles))
    }

    pub fn all(particles: Vec<Particle>) -> Self {
        Self::new(1, Some(1), Term::All(particles))
    }

    pub fn occurs(mut self, min: u32, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    pub fn optional(self) -> Self {
        self.occurs(0, Some(1))
    }

    pub fn repeated(self) -> Self {
        self.occurs(0, None)
    }
}

/// Content type of a complex type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Empty,
    /// Simple content of the given simple type.
    Simple(TypeId),
    ElementOnly(Particle),
    Mixed(Particle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexTypeDef {
    /// Sorted by (local name, URI) at build time.
    pub attributes: Vec<AttributeUse>,
    pub attribute_wildcard: Option<Wildcard>,
    pub content: Content,
}

impl ComplexTypeDef {
    pub fn new(content: Content) -> Self {
        Self { attributes: Vec::new(), attribute_wildcard: None, content }
    }

    pub fn empty() -> Self {
        Self::new(Content::Empty)
    }

    pub fn element_only(particle: Particle) -> Self {
        Self::new(Content::ElementOnly(particle))
    }

    pub fn mixed(particle: Particle) -> Self {
        Self::new(Content::Mixed(particle))
    }

    pub fn simple_content(type_id: TypeId) -> Self {
        Self::new(Content::Simple(type_id))
    }

    pub fn with_attribute(mut self, attr: AttributeUse) -> Self {
        self.attributes.push(attr);
        self
    }

    pub fn with_attribute_wildcard(mut self, wildcard: Wildcard) -> Self {
        self.attribute_wildcard = Some(wildcard);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Simple(SimpleTypeDef),
    Complex(ComplexTypeDef),
    /// Declared but never defined (rejected by `build`).
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub name: Option<QName>,
    pub base: Option<TypeId>,
    pub kind: TypeKind,
}

impl TypeDef {
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, TypeKind::Simple(_))
    }

    pub fn simple(&self) -> Option<&SimpleTypeDef> {
        match &self.kind {
            TypeKind::Simple(s) => Some(s),
            _ => None,
        }
    }

    pub fn complex(&self) -> Option<&ComplexTypeDef> {
        match &self.kind {
            TypeKind::Complex(c) => Some(c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDecl {
    pub qname: QName,
    pub type_id: TypeId,
    pub nillable: bool,
    pub is_abstract: bool,
    /// Head of the substitution group this element belongs to.
    pub substitution_head: Option<ElementId>,
    pub global: bool,
}

/// Read-only view of a compiled schema, as consumed by the grammar builder
/// and the value codec.
pub trait SchemaQuery: fmt::Debug + Send + Sync {
    /// Identity for caching; distinct for every schema instance.
    fn identity(&self) -> u64;
    fn type_count(&self) -> usize;
    fn type_def(&self, id: TypeId) -> Option<&TypeDef>;
    fn type_by_name(&self, qname: &QName) -> Option<TypeId>;
    fn element_count(&self) -> usize;
    fn element_decl(&self, id: ElementId) -> Option<&ElementDecl>;
    /// Global elements in declaration order.
    fn global_elements(&self) -> &[ElementId];
    fn global_element_decl(&self, local_name: &str, uri: &str) -> Option<ElementId>;
    fn global_attribute_decl(&self, qname: &QName) -> Option<TypeId>;
    /// Non-abstract-filtering list of every element substitutable for `head`
    /// (transitively), excluding `head` itself.
    fn substitution_group_members(&self, head: ElementId) -> Vec<ElementId>;
    /// A named type derives from this one.
    fn has_named_subtypes(&self, id: TypeId) -> bool;

    /// Stable serial of a type within this schema.
    fn serial_of(&self, id: TypeId) -> usize {
        id
    }

    /// Built-in datatype of a simple type (None for complex types).
    fn builtin_type_of(&self, id: TypeId) -> Option<DatatypeKind> {
        self.type_def(id)?.simple().map(|s| s.kind)
    }

    fn variety_of(&self, id: TypeId) -> Option<&Variety> {
        self.type_def(id)?.simple().map(|s| &s.variety)
    }

    fn facets_of(&self, id: TypeId) -> Option<&Facets> {
        self.type_def(id)?.simple().map(|s| &s.facets)
    }

    /// The content particle of a complex type with element-only or mixed content.
    fn particles_of(&self, id: TypeId) -> Option<&Particle> {
        match &self.type_def(id)?.complex()?.content {
            Content::ElementOnly(p) | Content::Mixed(p) => Some(p),
            _ => None,
        }
    }

    /// Every (uri, local name) the schema declares, for string table pre-population.
    fn declared_names(&self) -> Vec<QName>;
}

static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// In-memory schema.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    identity: u64,
    types: Vec<TypeDef>,
    type_names: FastHashMap<QName, TypeId>,
    elements: Vec<ElementDecl>,
    globals: Vec<ElementId>,
    global_names: FastHashMap<QName, ElementId>,
    global_attributes: FastHashMap<QName, TypeId>,
    substitutions: Vec<Vec<ElementId>>,
    named_subtypes: Vec<bool>,
}

impl SchemaModel {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Id of the XSD built-in type `local_name`.
    pub fn builtin(&self, local_name: &str) -> Option<TypeId> {
        self.type_names.get(&QName::new(URI_XSD, local_name)).copied()
    }

    pub fn elements(&self) -> &[ElementDecl] {
        &self.elements
    }
}

impl SchemaQuery for SchemaModel {
    fn identity(&self) -> u64 {
        self.identity
    }

    fn type_count(&self) -> usize {
        self.types.len()
    }

    fn type_def(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id)
    }

    fn type_by_name(&self, qname: &QName) -> Option<TypeId> {
        self.type_names.get(qname).copied()
    }

    fn element_count(&self) -> usize {
        self.elements.len()
    }

    fn element_decl(&self, id: ElementId) -> Option<&ElementDecl> {
        self.elements.get(id)
    }

    fn global_elements(&self) -> &[ElementId] {
        &self.globals
    }

    fn global_element_decl(&self, local_name: &str, uri: &str) -> Option<ElementId> {
        self.global_names.get(&QName::new(uri, local_name)).copied()
    }

    fn global_attribute_decl(&self, qname: &QName) -> Option<TypeId> {
        self.global_attributes.get(qname).copied()
    }

    fn substitution_group_members(&self, head: ElementId) -> Vec<ElementId> {
        self.substitutions.get(head).cloned().unwrap_or_default()
    }

    fn has_named_subtypes(&self, id: TypeId) -> bool {
        self.named_subtypes.get(id).copied().unwrap_or(false)
    }

    fn declared_names(&self) -> Vec<QName> {
        let mut names: Vec<QName> = Vec::new();
        for e in &self.elements {
            names.push(e.qname.expanded());
        }
        for (i, t) in self.types.iter().enumerate() {
            // XSD-Typnamen stehen schon in der vorbelegten XSD-Partition
            if let Some(n) = &t.name
                && i >= BUILTIN_COUNT
            {
                names.push(n.expanded());
            }
            if let Some(c) = t.complex() {
                names.extend(c.attributes.iter().map(|a| a.qname.expanded()));
            }
        }
        names.extend(self.global_attributes.keys().map(QName::expanded));
        names
    }
}

/// (name, base, kind, facets) of the built-in simple types, base before derived.
const BUILTINS: &[(&str, &str, BuiltinKind)] = &[
    ("anySimpleType", "", BuiltinKind::Atomic(DatatypeKind::String)),
    ("string", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::String)),
    ("normalizedString", "string", BuiltinKind::Atomic(DatatypeKind::String)),
    ("token", "normalizedString", BuiltinKind::Atomic(DatatypeKind::String)),
    ("language", "token", BuiltinKind::Atomic(DatatypeKind::String)),
    ("Name", "token", BuiltinKind::Atomic(DatatypeKind::String)),
    ("NCName", "Name", BuiltinKind::Atomic(DatatypeKind::String)),
    ("ID", "NCName", BuiltinKind::Atomic(DatatypeKind::String)),
    ("IDREF", "NCName", BuiltinKind::Atomic(DatatypeKind::String)),
    ("ENTITY", "NCName", BuiltinKind::Atomic(DatatypeKind::String)),
    ("NMTOKEN", "token", BuiltinKind::Atomic(DatatypeKind::String)),
    ("anyURI", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::String)),
    ("IDREFS", "anySimpleType", BuiltinKind::List("IDREF")),
    ("ENTITIES", "anySimpleType", BuiltinKind::List("ENTITY")),
    ("NMTOKENS", "anySimpleType", BuiltinKind::List("NMTOKEN")),
    ("boolean", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Boolean)),
    ("decimal", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Decimal)),
    ("integer", "decimal", BuiltinKind::Integer(None, None)),
    ("nonPositiveInteger", "integer", BuiltinKind::Integer(None, Some(0))),
    ("negativeInteger", "nonPositiveInteger", BuiltinKind::Integer(None, Some(-1))),
    ("long", "integer", BuiltinKind::Integer(Some(i64::MIN as i128), Some(i64::MAX as i128))),
    ("int", "long", BuiltinKind::Integer(Some(i32::MIN as i128), Some(i32::MAX as i128))),
    ("short", "int", BuiltinKind::Integer(Some(i16::MIN as i128), Some(i16::MAX as i128))),
    ("byte", "short", BuiltinKind::Integer(Some(i8::MIN as i128), Some(i8::MAX as i128))),
    ("nonNegativeInteger", "integer", BuiltinKind::Integer(Some(0), None)),
    ("unsignedLong", "nonNegativeInteger", BuiltinKind::Integer(Some(0), Some(u64::MAX as i128))),
    ("unsignedInt", "unsignedLong", BuiltinKind::Integer(Some(0), Some(u32::MAX as i128))),
    ("unsignedShort", "unsignedInt", BuiltinKind::Integer(Some(0), Some(u16::MAX as i128))),
    ("unsignedByte", "unsignedShort", BuiltinKind::Integer(Some(0), Some(u8::MAX as i128))),
    ("positiveInteger", "nonNegativeInteger", BuiltinKind::Integer(Some(1), None)),
    ("float", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Float)),
    ("double", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Double)),
    ("duration", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Duration)),
    ("dateTime", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::DateTime))),
    ("time", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::Time))),
    ("date", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::Date))),
    ("gYearMonth", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::GYearMonth))),
    ("gYear", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::GYear))),
    ("gMonthDay", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::GMonthDay))),
    ("gDay", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::GDay))),
    ("gMonth", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::DateTime(DateTimeKind::GMonth))),
    ("hexBinary", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::HexBinary)),
    ("base64Binary", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Base64Binary)),
    ("QName", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::QName)),
    ("NOTATION", "anySimpleType", BuiltinKind::Atomic(DatatypeKind::Notation)),
];

/// Simple built-ins plus anyType.
const BUILTIN_COUNT: usize = BUILTINS.len() + 1;

/// Id for unknown built-in names; never a valid index.
const UNKNOWN_BUILTIN: TypeId = TypeId::MAX;

#[derive(Debug, Clone, Copy)]
enum BuiltinKind {
    Atomic(DatatypeKind),
    Integer(Option<i128>, Option<i128>),
    List(&'static str),
}

/// Builds a [`SchemaModel`]. Built-in XSD types are pre-registered.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    types: Vec<TypeDef>,
    type_names: FastHashMap<QName, TypeId>,
    elements: Vec<ElementDecl>,
    globals: Vec<ElementId>,
    global_attributes: FastHashMap<QName, TypeId>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    pub fn new() -> Self {
        let mut b = Self {
            types: Vec::new(),
            type_names: FastHashMap::default(),
            elements: Vec::new(),
            globals: Vec::new(),
            global_attributes: FastHashMap::default(),
        };
        for &(name, base, kind) in BUILTINS {
            let base_id = (!base.is_empty()).then(|| b.builtin(base));
            let simple = match kind {
                BuiltinKind::Atomic(kind) => SimpleTypeDef { variety: Variety::Atomic, kind, facets: Facets::default() },
                BuiltinKind::Integer(min, max) => SimpleTypeDef {
                    variety: Variety::Atomic,
                    kind: DatatypeKind::Integer,
                    facets: Facets { min_inclusive: min, max_inclusive: max, ..Facets::default() },
                },
                BuiltinKind::List(item) => SimpleTypeDef {
                    variety: Variety::List(b.builtin(item)),
                    kind: DatatypeKind::String,
                    facets: Facets::default(),
                },
            };
            b.push_type(Some(QName::new(URI_XSD, name)), base_id, TypeKind::Simple(simple));
        }
        // anyType: mixed, beliebige Elemente und Attribute (EXI 8.5.4.1.3.2)
        let any_particle = Particle::wildcard(Wildcard::Any).repeated();
        b.push_type(
            Some(QName::new(URI_XSD, "anyType")),
            None,
            TypeKind::Complex(ComplexTypeDef::mixed(any_particle).with_attribute_wildcard(Wildcard::Any)),
        );
        b
    }

    fn push_type(&mut self, name: Option<QName>, base: Option<TypeId>, kind: TypeKind) -> TypeId {
        let id = self.types.len();
        if let Some(n) = &name {
            self.type_names.insert(n.expanded(), id);
        }
        self.types.push(TypeDef { name, base, kind });
        id
    }

    /// Id of a built-in XSD type. An unknown name yields an id that
    /// [`build`](Self::build) rejects with `SchemaInconsistency`.
    pub fn builtin(&self, local_name: &str) -> TypeId {
        match self.type_names.get(&QName::new(URI_XSD, local_name)) {
            Some(&id) => id,
            None => {
                log::warn!("unknown XSD built-in type '{local_name}'");
                UNKNOWN_BUILTIN
            }
        }
    }

    pub fn any_type(&self) -> TypeId {
        self.builtin("anyType")
    }

    /// Reserves a type id (for cyclic definitions); define it with [`define`](Self::define).
    pub fn declare_type(&mut self, name: Option<QName>) -> TypeId {
        self.push_type(name, None, TypeKind::Placeholder)
    }

    pub fn define(&mut self, id: TypeId, base: Option<TypeId>, kind: TypeKind) {
        if let Some(t) = self.types.get_mut(id) {
            t.base = base;
            t.kind = kind;
        }
    }

    /// Restriction of a simple type: inherits kind, variety and facets.
    pub fn simple_restriction(&mut self, name: Option<QName>, base: TypeId, facets: Facets) -> TypeId {
        let simple = match self.types.get(base).and_then(TypeDef::simple) {
            Some(b) => SimpleTypeDef { variety: b.variety.clone(), kind: b.kind, facets: b.facets.restrict(&facets) },
            None => SimpleTypeDef { variety: Variety::Atomic, kind: DatatypeKind::String, facets },
        };
        self.push_type(name, Some(base), TypeKind::Simple(simple))
    }

    pub fn list_type(&mut self, name: Option<QName>, item: TypeId) -> TypeId {
        let any = self.builtin("anySimpleType");
        let simple = SimpleTypeDef { variety: Variety::List(item), kind: DatatypeKind::String, facets: Facets::default() };
        self.push_type(name, Some(any), TypeKind::Simple(simple))
    }

    pub fn union_type(&mut self, name: Option<QName>, members: Vec<TypeId>) -> TypeId {
        let any = self.builtin("anySimpleType");
        let simple = SimpleTypeDef { variety: Variety::Union(members), kind: DatatypeKind::String, facets: Facets::default() };
        self.push_type(name, Some(any), TypeKind::Simple(simple))
    }

    pub fn complex_type(&mut self, name: Option<QName>, def: ComplexTypeDef) -> TypeId {
        let any = self.any_type();
        self.push_type(name, Some(any), TypeKind::Complex(def))
    }

    /// Complex type derived from `base` (for xsi:type substitution).
    pub fn derived_complex_type(&mut self, name: Option<QName>, base: TypeId, def: ComplexTypeDef) -> TypeId {
        self.push_type(name, Some(base), TypeKind::Complex(def))
    }

    /// Local element declaration.
    pub fn element(&mut self, qname: QName, type_id: TypeId) -> ElementId {
        self.push_element(qname, type_id, false)
    }

    pub fn global_element(&mut self, qname: QName, type_id: TypeId) -> ElementId {
        let id = self.push_element(qname, type_id, true);
        self.globals.push(id);
        id
    }

    fn push_element(&mut self, qname: QName, type_id: TypeId, global: bool) -> ElementId {
        let id = self.elements.len();
        self.elements.push(ElementDecl {
            qname,
            type_id,
            nillable: false,
            is_abstract: false,
            substitution_head: None,
            global,
        });
        id
    }

    pub fn set_nillable(&mut self, id: ElementId, nillable: bool) {
        if let Some(e) = self.elements.get_mut(id) {
            e.nillable = nillable;
        }
    }

    pub fn set_abstract(&mut self, id: ElementId, is_abstract: bool) {
        if let Some(e) = self.elements.get_mut(id) {
            e.is_abstract = is_abstract;
        }
    }

    pub fn set_substitution_head(&mut self, id: ElementId, head: ElementId) {
        if let Some(e) = self.elements.get_mut(id) {
            e.substitution_head = Some(head);
        }
    }

    pub fn global_attribute(&mut self, qname: QName, type_id: TypeId) {
        self.global_attributes.insert(qname.expanded(), type_id);
    }

    /// Validates references and computes derived tables.
    ///
    /// A dangling type or element reference, an undefined placeholder, or a
    /// cyclic substitution group is a [`Error::SchemaInconsistency`].
    pub fn build(mut self) -> Result<SchemaModel> {
        let type_count = self.types.len();
        let element_count = self.elements.len();
        let check_type = |id: TypeId, what: &dyn fmt::Display| -> Result<()> {
            if id < type_count {
                Ok(())
            } else if id == UNKNOWN_BUILTIN {
                Err(Error::schema_inconsistency(format!("{what} references an unknown XSD built-in type")))
            } else {
                Err(Error::schema_inconsistency(format!("{what} references undefined type #{id}")))
            }
        };
        for (id, t) in self.types.iter().enumerate() {
            let label = t.name.as_ref().map_or_else(|| format!("anonymous type #{id}"), |n| n.to_string());
            if let Some(base) = t.base {
                check_type(base, &label)?;
            }
            match &t.kind {
                TypeKind::Placeholder => {
                    return Err(Error::schema_inconsistency(format!("{label} declared but never defined")));
                }
                TypeKind::Simple(s) => match &s.variety {
                    Variety::Atomic => {}
                    Variety::List(item) => check_type(*item, &label)?,
                    Variety::Union(members) => {
                        if members.is_empty() {
                            return Err(Error::schema_inconsistency(format!("{label}: union without members")));
                        }
                        for m in members {
                            check_type(*m, &label)?;
                        }
                    }
                },
                TypeKind::Complex(c) => {
                    for a in &c.attributes {
                        check_type(a.type_id, &label)?;
                    }
                    match &c.content {
                        Content::Simple(s) => check_type(*s, &label)?,
                        Content::ElementOnly(p) | Content::Mixed(p) => check_particle(p, element_count, &label)?,
                        Content::Empty => {}
                    }
                }
            }
        }
        for e in &self.elements {
            check_type(e.type_id, &e.qname)?;
            if let Some(h) = e.substitution_head
                && h >= element_count
            {
                return Err(Error::schema_inconsistency(format!("{} has undefined substitution head", e.qname)));
            }
        }
        for (_, ty) in self.global_attributes.iter() {
            check_type(*ty, &"global attribute")?;
        }

        // Attribute nach (local-name, uri) sortieren (EXI 8.5.4.1.3.2)
        for t in &mut self.types {
            if let TypeKind::Complex(c) = &mut t.kind {
                c.attributes.sort_by(|a, b| a.qname.cmp(&b.qname));
            }
        }

        let substitutions = substitution_closure(&self.elements)?;
        let mut named_subtypes = vec![false; type_count];
        for t in &self.types {
            if t.name.is_some()
                && let Some(base) = t.base
            {
                named_subtypes[base] = true;
            }
        }
        let global_names = self.globals.iter().map(|&id| (self.elements[id].qname.expanded(), id)).collect();
        let identity = NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed);
        log::debug!("schema #{identity}: {type_count} types, {element_count} elements");
        Ok(SchemaModel {
            identity,
            types: self.types,
            type_names: self.type_names,
            elements: self.elements,
            globals: self.globals,
            global_names,
            global_attributes: self.global_attributes,
            substitutions,
            named_subtypes,
        })
    }
}

fn check_particle(p: &Particle, element_count: usize, label: &str) -> Result<()> {
    if let Some(max) = p.max_occurs
        && max < p.min_occurs
    {
        return Err(Error::schema_inconsistency(format!("{label}: maxOccurs {max} < minOccurs {}", p.min_occurs)));
    }
    match &p.term {
        Term::Element(e) if *e >= element_count => {
            Err(Error::schema_inconsistency(format!("{label} references undefined element #{e}")))
        }
        Term::Element(_) | Term::Wildcard(_) => Ok(()),
        Term::Sequence(ps) | Term::Choice(ps) | Term::All(ps) => {
            ps.iter().try_for_each(|c| check_particle(c, element_count, label))
        }
    }
}

/// Transitive members of each substitution head.
fn substitution_closure(elements: &[ElementDecl]) -> Result<Vec<Vec<ElementId>>> {
    let mut members = vec![Vec::new(); elements.len()];
    for (id, e) in elements.iter().enumerate() {
        let mut head = e.substitution_head;
        let mut steps = 0;
        while let Some(h) = head {
            if h == id || steps > elements.len() {
                return Err(Error::schema_inconsistency(format!("cyclic substitution group at {}", e.qname)));
            }
            members[h].push(id);
            head = elements[h].substitution_head;
            steps += 1;
        }
    }
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_vorhanden() {
        let schema = SchemaModel::builder().build().unwrap();
        let int = schema.builtin("int").unwrap();
        assert_eq!(schema.builtin_type_of(int), Some(DatatypeKind::Integer));
        let facets = schema.facets_of(int).unwrap();
        assert_eq!(facets.min_inclusive, Some(i32::MIN as i128));
        let idrefs = schema.builtin("IDREFS").unwrap();
        assert!(matches!(schema.variety_of(idrefs), Some(Variety::List(_))));
        assert!(schema.has_named_subtypes(schema.builtin("integer").unwrap()));
        assert!(!schema.has_named_subtypes(schema.builtin("byte").unwrap()));
    }

    #[test]
    fn restriction_verengt_grenzen() {
        let mut b = SchemaModel::builder();
        let short = b.builtin("short");
        let small = b.simple_restriction(None, short, Facets::range(0, 100));
        let schema = b.build().unwrap();
        let f = schema.facets_of(small).unwrap();
        assert_eq!((f.min_inclusive, f.max_inclusive), (Some(0), Some(100)));
        assert_eq!(schema.builtin_type_of(small), Some(DatatypeKind::Integer));
    }

    #[test]
    fn attribute_werden_sortiert() {
        let mut b = SchemaModel::builder();
        let s = b.builtin("string");
        let t = b.complex_type(
            None,
            ComplexTypeDef::empty()
                .with_attribute(AttributeUse::optional(QName::new("urn:b", "x"), s))
                .with_attribute(AttributeUse::optional(QName::new("", "b"), s))
                .with_attribute(AttributeUse::optional(QName::new("urn:a", "x"), s)),
        );
        let schema = b.build().unwrap();
        let attrs = &schema.type_def(t).unwrap().complex().unwrap().attributes;
        let names: Vec<String> = attrs.iter().map(|a| a.qname.to_string()).collect();
        assert_eq!(names, vec!["b", "{urn:a}x", "{urn:b}x"]);
    }

    #[test]
    fn zyklischer_typ() {
        let mut b = SchemaModel::builder();
        let node = b.declare_type(Some(QName::new("", "Node")));
        let child = b.element(QName::new("", "node"), node);
        b.define(node, None, TypeKind::Complex(ComplexTypeDef::element_only(Particle::element(child).repeated())));
        b.global_element(QName::new("", "root"), node);
        let schema = b.build().unwrap();
        assert!(schema.particles_of(node).is_some());
    }

    #[test]
    fn haengende_referenzen() {
        let mut b = SchemaModel::builder();
        b.global_element(QName::new("", "x"), 9999);
        assert!(matches!(b.build(), Err(Error::SchemaInconsistency(_))));

        let mut b = SchemaModel::builder();
        b.declare_type(None);
        assert!(matches!(b.build(), Err(Error::SchemaInconsistency(_))));
    }

    #[test]
    fn unbekannter_builtin_typ() {
        let mut b = SchemaModel::builder();
        let t = b.builtin("integr");
        b.global_element(QName::new("", "x"), t);
        let err = b.build().unwrap_err();
        assert!(matches!(&err, Error::SchemaInconsistency(m) if m.contains("unknown XSD built-in")), "{err:?}");
    }

    #[test]
    fn substitution_transitiv() {
        let mut b = SchemaModel::builder();
        let s = b.builtin("string");
        let head = b.global_element(QName::new("", "head"), s);
        let mid = b.global_element(QName::new("", "mid"), s);
        let leaf = b.global_element(QName::new("", "leaf"), s);
        b.set_substitution_head(mid, head);
        b.set_substitution_head(leaf, mid);
        let schema = b.build().unwrap();
        let mut m = schema.substitution_group_members(head);
        m.sort();
        assert_eq!(m, vec![mid, leaf]);
        assert_eq!(schema.global_element_decl("leaf", ""), Some(leaf));
    }

    #[test]
    fn identitaet_eindeutig() {
        let a = SchemaModel::builder().build().unwrap();
        let b = SchemaModel::builder().build().unwrap();
        assert_ne!(a.identity(), b.identity());
    }
}

//! EXI event model (EXI 4, Table 4-1).
//!
//! Ein `ExiEvent` ist ein Infoset-Item, wie es der Transmogrifier konsumiert
//! und der Scanner produziert. `xsi:type` und `xsi:nil` sind eigene Events,
//! weil sie die aktive Grammatik umschalten.

use std::sync::Arc;

use crate::qname::QName;

/// Namespace declaration.
///
/// `local_element_ns` markiert die Deklaration, die den Namespace des
/// zugehoerigen Elements liefert (hoechstens eine pro Element).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsContent {
    pub uri: Arc<str>,
    /// Empty for the default namespace.
    pub prefix: Arc<str>,
    pub local_element_ns: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtContent {
    pub qname: Arc<QName>,
    pub value: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChContent {
    pub value: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiContent {
    pub name: Arc<str>,
    pub text: Arc<str>,
}

/// DOCTYPE: name, public id, system id, internal subset text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtContent {
    pub name: Arc<str>,
    pub public: Arc<str>,
    pub system: Arc<str>,
    pub text: Arc<str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExiEvent {
    StartDocument,
    EndDocument,
    StartElement(Arc<QName>),
    EndElement,
    Attribute(AtContent),
    Characters(ChContent),
    NamespaceDeclaration(NsContent),
    Comment(Arc<str>),
    ProcessingInstruction(PiContent),
    DocType(DtContent),
    EntityReference(Arc<str>),
    /// `xsi:type`: the named type, its prefix as written (if known).
    SchemaType(Arc<QName>),
    /// `xsi:nil` with its lexical value.
    SchemaNil(Arc<str>),
}

impl ExiEvent {
    pub fn start_element(uri: &str, local_name: &str) -> Self {
        Self::StartElement(Arc::new(QName::new(uri, local_name)))
    }

    pub fn attribute(uri: &str, local_name: &str, value: &str) -> Self {
        Self::Attribute(AtContent { qname: Arc::new(QName::new(uri, local_name)), value: value.into() })
    }

    pub fn characters(value: &str) -> Self {
        Self::Characters(ChContent { value: value.into() })
    }

    pub fn namespace(uri: &str, prefix: &str, local_element_ns: bool) -> Self {
        Self::NamespaceDeclaration(NsContent { uri: uri.into(), prefix: prefix.into(), local_element_ns })
    }

    pub fn schema_type(uri: &str, local_name: &str) -> Self {
        Self::SchemaType(Arc::new(QName::new(uri, local_name)))
    }

    pub fn schema_nil(value: &str) -> Self {
        Self::SchemaNil(value.into())
    }

    /// Kurzname fuer Fehlermeldungen ("SE({urn}a)", "CH", ...).
    pub fn describe(&self) -> String {
        match self {
            Self::StartDocument => "SD".into(),
            Self::EndDocument => "ED".into(),
            Self::StartElement(q) => format!("SE({q})"),
            Self::EndElement => "EE".into(),
            Self::Attribute(at) => format!("AT({})", at.qname),
            Self::Characters(_) => "CH".into(),
            Self::NamespaceDeclaration(ns) => format!("NS({}={})", ns.prefix, ns.uri),
            Self::Comment(_) => "CM".into(),
            Self::ProcessingInstruction(pi) => format!("PI({})", pi.name),
            Self::DocType(dt) => format!("DT({})", dt.name),
            Self::EntityReference(name) => format!("ER({name})"),
            Self::SchemaType(q) => format!("AT(xsi:type={q})"),
            Self::SchemaNil(v) => format!("AT(xsi:nil={v})"),
        }
    }
}

//! Qualified names (EXI 7.1.7).
//!
//! Zwei QNames sind gleich, wenn URI und local-name gleich sind; der Prefix
//! zaehlt nicht. Die Strings liegen als `Arc<str>`, weil Grammatiken mit
//! QNames ueber Threads geteilt werden.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

/// Namespace of the `xml` prefix.
pub const URI_XML: &str = "http://www.w3.org/XML/1998/namespace";
/// XML Schema instance namespace (`xsi:type`, `xsi:nil`).
pub const URI_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
/// XML Schema namespace of the built-in datatypes.
pub const URI_XSD: &str = "http://www.w3.org/2001/XMLSchema";
/// Namespace reserved for namespace declarations.
pub const URI_XMLNS: &str = "http://www.w3.org/2000/xmlns/";

#[derive(Clone)]
pub struct QName {
    /// Empty string means no namespace.
    pub uri: Arc<str>,
    pub local_name: Arc<str>,
    /// Only carried when prefixes are preserved or needed for serialisation.
    pub prefix: Option<Arc<str>>,
    /// Vorberechneter Hash von (uri, local_name).
    identity: u64,
}

fn compute_identity(uri: &str, local_name: &str) -> u64 {
    // Feste Seeds: die Identitaet muss ueber Sessions stabil sein
    let state = ahash::RandomState::with_seeds(0x45_58_49, 0x67_72_61_6d, 0x71_6e, 0x61_6d_65);
    let mut hasher = state.build_hasher();
    uri.hash(&mut hasher);
    local_name.hash(&mut hasher);
    hasher.finish()
}

impl QName {
    pub fn new(uri: impl Into<Arc<str>>, local_name: impl Into<Arc<str>>) -> Self {
        let uri = uri.into();
        let local_name = local_name.into();
        let identity = compute_identity(&uri, &local_name);
        Self { uri, local_name, prefix: None, identity }
    }

    pub fn with_prefix(
        uri: impl Into<Arc<str>>,
        local_name: impl Into<Arc<str>>,
        prefix: impl Into<Arc<str>>,
    ) -> Self {
        let mut q = Self::new(uri, local_name);
        q.prefix = Some(prefix.into());
        q
    }

    /// `xsi:type`.
    pub fn xsi_type() -> Self {
        Self::with_prefix(URI_XSI, "type", "xsi")
    }

    /// `xsi:nil`.
    pub fn xsi_nil() -> Self {
        Self::with_prefix(URI_XSI, "nil", "xsi")
    }

    pub fn is_xsi_type(&self) -> bool {
        &*self.local_name == "type" && &*self.uri == URI_XSI
    }

    pub fn is_xsi_nil(&self) -> bool {
        &*self.local_name == "nil" && &*self.uri == URI_XSI
    }

    /// Same name without prefix.
    pub fn expanded(&self) -> Self {
        Self { prefix: None, ..self.clone() }
    }

    /// `prefix:local` or `local`.
    pub fn lexical(&self) -> String {
        match self.prefix.as_deref() {
            Some(p) if !p.is_empty() => format!("{p}:{}", self.local_name),
            _ => self.local_name.to_string(),
        }
    }
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QName")
            .field("uri", &self.uri)
            .field("local_name", &self.local_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// `{uri}local` (James-Clark-Notation).
impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.uri.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.uri, self.local_name)
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.uri == other.uri && self.local_name == other.local_name
    }
}

impl Eq for QName {}

impl Hash for QName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}

/// Erst local-name, dann URI (EXI 8.5.4.1.6 Sortierung der Attribute).
impl PartialOrd for QName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_name.cmp(&other.local_name).then_with(|| self.uri.cmp(&other.uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn prefix_ignoriert() {
        let a = QName::with_prefix("urn:a", "x", "p");
        let b = QName::with_prefix("urn:a", "x", "q");
        assert_eq!(a, b);
        let set: HashSet<QName> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn sortierung_local_vor_uri() {
        let mut names = vec![QName::new("urn:b", "a"), QName::new("", "b"), QName::new("urn:a", "a")];
        names.sort();
        let got: Vec<String> = names.iter().map(ToString::to_string).collect();
        assert_eq!(got, vec!["{urn:a}a", "{urn:b}a", "b"]);
    }

    #[test]
    fn xsi_erkennung() {
        assert!(QName::xsi_type().is_xsi_type());
        assert!(QName::new(URI_XSI, "nil").is_xsi_nil());
        assert!(!QName::new("", "nil").is_xsi_nil());
        assert_eq!(QName::xsi_nil().lexical(), "xsi:nil");
    }
}

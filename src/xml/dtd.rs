//! DOCTYPE parsing: the four DT fields and the general entities of the
//! internal subset.

use crate::FastHashMap;
use crate::event::DtContent;

/// A general entity declared in the internal subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EntityDecl {
    /// `<!ENTITY name "value">`
    Internal(String),
    /// `<!ENTITY name SYSTEM "uri">` (PUBLIC traegt zusaetzlich eine Public-ID)
    External(String),
}

/// Parses the content of `<!DOCTYPE ...>` (without the keyword).
pub(crate) fn parse_doctype(raw: &str) -> (DtContent, FastHashMap<String, EntityDecl>) {
    let trimmed = raw.trim();
    let name_end = trimmed.find(|c: char| c.is_whitespace() || c == '[').unwrap_or(trimmed.len());
    let name = &trimmed[..name_end];
    let mut rest = trimmed[name_end..].trim_start();

    let mut public = "";
    let mut system = "";
    if let Some(after) = rest.strip_prefix("SYSTEM") {
        let (sys, remaining) = quoted(after.trim_start());
        system = sys;
        rest = remaining.trim_start();
    } else if let Some(after) = rest.strip_prefix("PUBLIC") {
        let (id, remaining) = quoted(after.trim_start());
        let (sys, remaining) = quoted(remaining.trim_start());
        public = id;
        system = sys;
        rest = remaining.trim_start();
    }

    let subset = rest
        .strip_prefix('[')
        .and_then(|s| s.rfind(']').map(|close| &s[..close]))
        .unwrap_or("")
        .trim();
    let content = DtContent {
        name: name.into(),
        public: public.into(),
        system: system.into(),
        text: subset.into(),
    };
    (content, parse_entities(subset))
}

/// Quoted literal at the start of `s` and the rest after it.
fn quoted(s: &str) -> (&str, &str) {
    let Some(quote) = s.chars().next().filter(|c| *c == '"' || *c == '\'') else {
        return ("", s);
    };
    match s[1..].find(quote) {
        Some(end) => (&s[1..1 + end], &s[2 + end..]),
        None => ("", s),
    }
}

/// General entities of an internal subset. Parameter entities (`%`) are skipped.
fn parse_entities(subset: &str) -> FastHashMap<String, EntityDecl> {
    let mut entities = FastHashMap::default();
    let mut pos = 0;
    while let Some(offset) = subset[pos..].find("<!ENTITY") {
        let start = pos + offset + "<!ENTITY".len();
        let decl = subset[start..].trim_start();
        let decl_start = subset.len() - decl.len();
        let Some(gt) = closing_bracket(decl) else { break };
        pos = decl_start + gt + 1;

        let body = &decl[..gt];
        if body.starts_with('%') {
            continue;
        }
        let name_end = body.find(char::is_whitespace).unwrap_or(body.len());
        let name = &body[..name_end];
        let after = body[name_end..].trim_start();
        let entity = if let Some(ext) = after.strip_prefix("SYSTEM") {
            EntityDecl::External(quoted(ext.trim_start()).0.to_string())
        } else if let Some(ext) = after.strip_prefix("PUBLIC") {
            let (_, rest) = quoted(ext.trim_start());
            EntityDecl::External(quoted(rest.trim_start()).0.to_string())
        } else {
            EntityDecl::Internal(quoted(after).0.to_string())
        };
        // erste Deklaration gewinnt (XML 1.0, 4.2)
        entities.entry(name.to_string()).or_insert(entity);
    }
    entities
}

/// Index of the `>` that closes a declaration, skipping quoted literals.
fn closing_bracket(decl: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in decl.char_indices() {
        match (quote, c) {
            (None, '"' | '\'') => quote = Some(c),
            (Some(q), c) if c == q => quote = None,
            (None, '>') => return Some(i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nur_name() {
        let (dt, entities) = parse_doctype(" html");
        assert_eq!(&*dt.name, "html");
        assert!(dt.system.is_empty() && dt.text.is_empty());
        assert!(entities.is_empty());
    }

    #[test]
    fn public_und_system() {
        let (dt, _) = parse_doctype(r#" r PUBLIC "-//X//DTD" 'r.dtd'"#);
        assert_eq!(&*dt.public, "-//X//DTD");
        assert_eq!(&*dt.system, "r.dtd");
    }

    #[test]
    fn interne_und_externe_entities() {
        let (dt, entities) = parse_doctype(
            r#" r [ <!ENTITY a "x > y"> <!ENTITY % p "q"> <!ENTITY b SYSTEM "b.txt"> <!ENTITY a "zweite"> ]"#,
        );
        assert!(dt.text.starts_with("<!ENTITY a"));
        assert_eq!(entities.get("a"), Some(&EntityDecl::Internal("x > y".into())));
        assert_eq!(entities.get("b"), Some(&EntityDecl::External("b.txt".into())));
        assert!(!entities.contains_key("p"));
        assert!(!entities.contains_key("%"));
    }
}

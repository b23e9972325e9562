//! Name content of SE and AT events (EXI 7.1.7, 8.4.2).

use std::sync::Arc;

use crate::grammar::EventShape;
use crate::qname::QName;

use super::Transmogrifier;

impl Transmogrifier {
    /// Writes the part of `qname` the production does not imply.
    ///
    /// - SE(*), AT(*): URI, local-name, Prefix
    /// - SE(uri:*), AT(uri:*): local-name, Prefix
    /// - SE(qname), AT(qname): nur der Prefix (wenn erhalten)
    pub(super) fn write_name(&mut self, shape: &EventShape, qname: &Arc<QName>) {
        let prefixes = self.session.prefixes();
        let strings = &mut self.session.strings;
        let w = &mut self.writer;
        match shape {
            EventShape::StartElementWildcard | EventShape::AttributeWildcardAny | EventShape::AttributeUntyped => {
                strings.encode_qname(w, qname, prefixes);
            }
            EventShape::StartElementWildcardNs(uri) | EventShape::AttributeWildcardNs(uri) => {
                let uri_id = strings.intern_uri(uri);
                strings.encode_local_name(w, uri_id, &qname.local_name);
                if prefixes {
                    strings.encode_prefix(w, uri_id, qname.prefix.as_deref().unwrap_or(""));
                }
            }
            EventShape::StartElementNamed(_)
            | EventShape::StartElementSchemaQName { .. }
            | EventShape::AttributeNamed { .. }
                if prefixes =>
            {
                strings.encode_prefix_of(w, qname);
            }
            _ => {}
        }
    }
}

//! Name content of SE and AT events (EXI 7.1.7, 8.4.2).

use std::sync::Arc;

use crate::bitstream::BitReader;
use crate::context::Session;
use crate::grammar::EventShape;
use crate::qname::QName;
use crate::{Error, Result};

/// Reads the part of the name the production does not imply.
pub(super) fn read_name(session: &mut Session, r: &mut BitReader, shape: &EventShape) -> Result<QName> {
    let prefixes = session.prefixes();
    let strings = &mut session.strings;
    match shape {
        EventShape::StartElementWildcard | EventShape::AttributeWildcardAny | EventShape::AttributeUntyped => {
            strings.decode_qname(r, prefixes)
        }
        EventShape::StartElementWildcardNs(uri) | EventShape::AttributeWildcardNs(uri) => {
            let uri_id = strings.intern_uri(uri);
            let local = strings.decode_local_name(r, uri_id)?;
            if prefixes {
                let prefix = strings.decode_prefix(r, uri_id)?;
                return Ok(QName::with_prefix(Arc::clone(uri), local, prefix));
            }
            Ok(QName::new(Arc::clone(uri), local))
        }
        EventShape::StartElementNamed(q)
        | EventShape::StartElementSchemaQName { qname: q, .. }
        | EventShape::AttributeNamed { qname: q, .. } => {
            if !prefixes {
                return Ok(q.expanded());
            }
            let prefix = strings.decode_prefix_of(r, q)?;
            Ok(QName::with_prefix(Arc::clone(&q.uri), Arc::clone(&q.local_name), prefix))
        }
        other => Err(Error::schema_inconsistency(format!("{other} carries no name"))),
    }
}

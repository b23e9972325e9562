//! Value reading (EXI 7).

use std::sync::Arc;

use crate::bitstream::BitReader;
use crate::boolean;
use crate::context::{Session, ValueSpec, repr_of};
use crate::qname::QName;
use crate::typed_value;
use crate::Result;

/// Reads a value with the representation of `spec` and returns its lexical form.
pub(super) fn read_value(session: &mut Session, r: &mut BitReader, spec: &ValueSpec) -> Result<Arc<str>> {
    if session.options.lexical() {
        return typed_value::decode_lexical(r, &mut session.strings, &spec.owner);
    }
    let repr = repr_of(&session.set, spec.type_id);
    typed_value::decode(r, repr, &mut session.strings, &spec.owner)
}

/// Value of AT(xsi:nil).
pub(super) fn read_nil(session: &mut Session, r: &mut BitReader) -> Result<Arc<str>> {
    if session.options.lexical() {
        return session.strings.decode_value(r, &QName::xsi_nil());
    }
    Ok(Arc::from(boolean::canonical(boolean::decode(r)?)))
}

//! Value preparation and writing (EXI 7).

use std::sync::Arc;

use crate::bitstream::BitWriter;
use crate::boolean::{self, BooleanValue};
use crate::context::{Session, ValueSpec, repr_of};
use crate::qname::QName;
use crate::schema::TypeId;
use crate::typed_value::{self, TypedValue};
use crate::Result;

use super::Transmogrifier;

/// A value that passed the checks of its production.
#[derive(Debug, Clone)]
pub(super) enum ValueData {
    Typed(TypedValue),
    /// Preserve.lexicalValues: the text as given.
    Lexical(Arc<str>),
}

impl Transmogrifier {
    /// Checks `text` against the expected type. `None`: the production does
    /// not fit and the next one has to be tried.
    pub(super) fn prepare(&self, type_id: Option<TypeId>, text: &Arc<str>) -> Option<ValueData> {
        let repr = self.session.value_repr(type_id);
        let typed = repr.parse(text, &|prefix| self.scopes.resolve(prefix))?;
        if self.session.options.lexical() {
            return Some(ValueData::Lexical(Arc::clone(text)));
        }
        Some(ValueData::Typed(typed))
    }

    /// Writes a value into the body or defers it to its value channel.
    pub(super) fn write_value(&mut self, spec: ValueSpec, data: ValueData) -> Result<()> {
        if let Some(channels) = self.channels.as_mut() {
            channels.push(spec, data);
            return Ok(());
        }
        write_value_to(&mut self.writer, &mut self.session, &spec, &data)
    }

    /// Value of AT(xsi:nil). Lexical mode keeps the text.
    pub(super) fn write_nil(&mut self, text: &str, nil: BooleanValue) {
        if self.session.options.lexical() {
            self.session.strings.encode_value(&mut self.writer, &QName::xsi_nil(), text);
        } else {
            boolean::encode(&mut self.writer, nil.as_bool());
        }
    }
}

/// Writes `data` with the representation of `spec`.
pub(super) fn write_value_to(w: &mut BitWriter, session: &mut Session, spec: &ValueSpec, data: &ValueData) -> Result<()> {
    match data {
        ValueData::Lexical(text) => {
            typed_value::encode_lexical(w, text, &mut session.strings, &spec.owner);
            Ok(())
        }
        ValueData::Typed(value) => {
            let repr = repr_of(&session.set, spec.type_id);
            typed_value::encode(w, repr, value, &mut session.strings, &spec.owner)
        }
    }
}

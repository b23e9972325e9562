//! EXI Processor (Decoder): EXI stream → EXI events (EXI 6).
//!
//! Der Decoder liest pro Event den Event Code im Katalog des aktuellen
//! Zustands, danach den Inhalt der gewaehlten Production, und folgt ihr ueber
//! dieselbe [`Session`] wie der Encoder. Bei (pre-)compression wird blockweise
//! gelesen: erst der Structure Channel bis `blockSize` Values, dann die Value
//! Channels.
//!
//! # Beispiel
//!
//! ```
//! use exigram::decoder::ExiDecoder;
//! use exigram::encoder::encode;
//! use exigram::event::ExiEvent;
//! use exigram::options::ExiOptions;
//!
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::start_element("", "a"),
//!     ExiEvent::characters("x"),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let bytes = encode(&events, &ExiOptions::default()).unwrap();
//! let scanner = ExiDecoder::new(bytes).process_header().unwrap();
//! let decoded: Vec<_> = scanner.collect::<Result<_, _>>().unwrap();
//! assert_eq!(decoded, events);
//! ```

mod api;
mod compression;
mod qname;
mod value;

#[cfg(test)]
mod tests;

pub use api::{decode, decode_with_options, decode_with_schema};

use std::collections::VecDeque;
use std::sync::Arc;

use crate::bitstream::BitReader;
use crate::boolean::{self, BooleanValue};
use crate::context::{Session, ValueSpec};
use crate::event::{AtContent, ChContent, DtContent, ExiEvent, NsContent, PiContent};
use crate::event_code;
use crate::grammar::{EventShape, GrammarCache};
use crate::header::{self, ExiHeader};
use crate::options::{Alignment, ExiOptions, GrammarOptions};
use crate::qname::QName;
use crate::schema::SchemaQuery;
use crate::{Error, Result, string};

use compression::ChannelState;

// ============================================================================
// ExiDecoder
// ============================================================================

/// Stream plus the out-of-band information needed to read it.
pub struct ExiDecoder {
    bytes: Vec<u8>,
    schema: Option<Arc<dyn SchemaQuery>>,
    defaults: ExiOptions,
}

impl ExiDecoder {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into(), schema: None, defaults: ExiOptions::default() }
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaQuery>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Options in effect when the header carries none.
    pub fn with_options(mut self, defaults: ExiOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Reads the header and prepares the body.
    ///
    /// Ein Header mit "schema-informed" ohne uebergebenes Schema ist nicht
    /// lesbar; "schema-less" ignoriert ein uebergebenes Schema.
    pub fn process_header(self) -> Result<Scanner> {
        let mut reader = BitReader::new(self.bytes);
        let header = header::decode(&mut reader, &self.defaults)?;
        let schema = match header.schema_informed {
            Some(true) if self.schema.is_none() => {
                return Err(Error::unsupported_option("stream is schema-informed, but no schema was given"));
            }
            Some(false) => None,
            _ => self.schema,
        };
        let options = header.options.clone();
        options.validate_for(schema.is_some())?;
        let set = GrammarCache::global().get(schema.as_ref(), GrammarOptions::from(&options))?;

        let alignment = options.alignment();
        reader.set_aligned(alignment.is_byte_aligned());
        let channels = alignment
            .uses_channels()
            .then(|| ChannelState::new(options.block_size(), alignment == Alignment::Compression));
        log::debug!(
            "decoder: alignment={alignment:?}, schema_informed={}, fragment={}",
            set.is_schema_informed(),
            options.fragment()
        );

        Ok(Scanner {
            session: Session::new(set, options),
            reader,
            queue: VecDeque::new(),
            header,
            channels,
            failed: false,
        })
    }
}

// ============================================================================
// Scanner
// ============================================================================

/// Pull parser over the body of a stream.
///
/// Nach ED (oder einem Fehler) liefert [`Scanner::next_event`] nur noch `None`.
pub struct Scanner {
    session: Session,
    reader: BitReader,
    queue: VecDeque<ExiEvent>,
    header: ExiHeader,
    channels: Option<ChannelState>,
    failed: bool,
}

impl Scanner {
    pub fn header(&self) -> &ExiHeader {
        &self.header
    }

    /// Options the body is read with.
    pub fn options(&self) -> &ExiOptions {
        &self.session.options
    }

    pub fn next_event(&mut self) -> Result<Option<ExiEvent>> {
        if let Some(event) = self.queue.pop_front() {
            return Ok(Some(event));
        }
        if self.failed || self.session.finished() {
            return Ok(None);
        }
        let result = match self.channels {
            Some(_) => self.decode_block().map(|()| self.queue.pop_front()),
            None => decode_event(&mut self.session, &mut self.reader, false).and_then(Slot::into_event).map(Some),
        };
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

impl Iterator for Scanner {
    type Item = Result<ExiEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}

// ============================================================================
// Events
// ============================================================================

/// A decoded event; AT and CH wait for their value in channel modes.
#[derive(Debug)]
enum Slot {
    Ready(ExiEvent),
    Attribute(Arc<QName>, ValueSpec),
    Characters(ValueSpec),
}

impl Slot {
    fn into_event(self) -> Result<ExiEvent> {
        match self {
            Slot::Ready(event) => Ok(event),
            Slot::Attribute(..) | Slot::Characters(_) => {
                Err(Error::EventOrder("value of a deferred event is missing".into()))
            }
        }
    }

    fn spec(&self) -> Option<&ValueSpec> {
        match self {
            Slot::Attribute(_, spec) | Slot::Characters(spec) => Some(spec),
            Slot::Ready(_) => None,
        }
    }
}

/// Reads one event from the structure. With `deferred` AT and CH values are
/// left to the value channels.
fn decode_event(session: &mut Session, r: &mut BitReader, deferred: bool) -> Result<Slot> {
    let list = session.catalog()?;
    let ordinal = event_code::read(r, &list)?;
    let ty = list
        .get(ordinal)
        .cloned()
        .ok_or_else(|| Error::invalid_event_code(ordinal.to_string(), list.key().to_string()))?;
    log::trace!("{} ← #{ordinal} in {}", ty.shape, list.key());

    let slot = match &ty.shape {
        EventShape::StartDocument => {
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::StartDocument)
        }
        EventShape::EndDocument => {
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::EndDocument)
        }
        EventShape::EndElement => {
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::EndElement)
        }
        shape if shape.is_start_element() => {
            let qname = Arc::new(qname::read_name(session, r, shape)?);
            session.start_element(&ty, Arc::clone(&qname))?;
            Slot::Ready(ExiEvent::StartElement(qname))
        }
        EventShape::SchemaType => {
            let type_name = Arc::new(session.strings.decode_qname(r, true)?);
            session.step(&ty, None)?;
            session.apply_xsi_type(&type_name)?;
            Slot::Ready(ExiEvent::SchemaType(type_name))
        }
        EventShape::SchemaNil => {
            let text = value::read_nil(session, r)?;
            session.step(&ty, None)?;
            session.apply_xsi_nil(BooleanValue::parse(&text).is_some_and(BooleanValue::as_bool))?;
            Slot::Ready(ExiEvent::SchemaNil(text))
        }
        shape if shape.is_attribute() => {
            let qname = Arc::new(qname::read_name(session, r, shape)?);
            if qname.is_xsi_type() {
                let type_name = Arc::new(session.strings.decode_qname(r, true)?);
                session.step(&ty, Some(&qname))?;
                session.apply_xsi_type(&type_name)?;
                Slot::Ready(ExiEvent::SchemaType(type_name))
            } else if qname.is_xsi_nil() {
                let text = session.strings.decode_value(r, &qname)?;
                session.step(&ty, Some(&qname))?;
                Slot::Ready(ExiEvent::SchemaNil(text))
            } else {
                let spec = ValueSpec { owner: Arc::clone(&qname), type_id: session.attribute_type(&ty, &qname) };
                let slot = if deferred {
                    Slot::Attribute(Arc::clone(&qname), spec)
                } else {
                    let value = value::read_value(session, r, &spec)?;
                    Slot::Ready(ExiEvent::Attribute(AtContent { qname: Arc::clone(&qname), value }))
                };
                session.step(&ty, Some(&qname))?;
                slot
            }
        }
        shape if shape.is_characters() => {
            let spec = session.characters_spec(&ty)?;
            let slot = if deferred {
                Slot::Characters(spec)
            } else {
                let value = value::read_value(session, r, &spec)?;
                Slot::Ready(ExiEvent::Characters(ChContent { value }))
            };
            session.step(&ty, None)?;
            slot
        }
        EventShape::NamespaceDecl => {
            let (uri_id, uri) = session.strings.decode_uri(r)?;
            let prefix = session.strings.decode_prefix(r, uri_id)?;
            let local_element_ns = boolean::decode(r)?;
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::NamespaceDeclaration(NsContent { uri, prefix, local_element_ns }))
        }
        EventShape::SelfContained => {
            return Err(Error::unsupported_option("self-contained elements are not supported"));
        }
        EventShape::Comment => {
            let text = Arc::from(string::decode(r)?);
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::Comment(text))
        }
        EventShape::ProcessingInstruction => {
            let name = Arc::from(string::decode(r)?);
            let text = Arc::from(string::decode(r)?);
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::ProcessingInstruction(PiContent { name, text }))
        }
        EventShape::Dtd => {
            let name = Arc::from(string::decode(r)?);
            let public = Arc::from(string::decode(r)?);
            let system = Arc::from(string::decode(r)?);
            let text = Arc::from(string::decode(r)?);
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::DocType(DtContent { name, public, system, text }))
        }
        EventShape::EntityReference => {
            let name = Arc::from(string::decode(r)?);
            session.step(&ty, None)?;
            Slot::Ready(ExiEvent::EntityReference(name))
        }
        other => {
            return Err(Error::schema_inconsistency(format!("{other} cannot be decoded")));
        }
    };
    Ok(slot)
}

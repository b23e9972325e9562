//! exigram – grammar-driven EXI 1.0 encoder and decoder
//!
//! # Beispiel
//!
//! ```
//! use std::sync::Arc;
//! use exigram::{ChContent, ExiEvent, ExiOptions, QName};
//! use exigram::encoder::encode;
//! use exigram::decoder::decode;
//!
//! // Encode
//! let events = vec![
//!     ExiEvent::StartDocument,
//!     ExiEvent::StartElement(Arc::new(QName::new("", "greeting"))),
//!     ExiEvent::Characters(ChContent { value: "Hello".into() }),
//!     ExiEvent::EndElement,
//!     ExiEvent::EndDocument,
//! ];
//! let bytes = encode(&events, &ExiOptions::default()).unwrap();
//!
//! // Decode
//! let (decoded, _opts) = decode(&bytes).unwrap();
//! assert_eq!(decoded, events);
//! ```

pub mod binary;
pub mod bit_width;
pub mod bitstream;
pub mod boolean;
mod builtin;
pub mod compression;
mod context;
pub mod datetime;
pub mod decimal;
pub mod decoder;
pub mod duration;
pub mod encoder;
pub mod enumeration;
pub mod error;
pub mod event;
pub mod event_code;
pub mod event_types;
pub mod float;
pub mod grammar;
pub mod header;
pub mod integer;
pub mod list;
pub mod options;
pub mod precompression;
pub mod proto_grammar;
pub mod qname;
pub mod schema;
pub mod string;
pub mod string_table;
pub mod typed_value;
pub mod unsigned_integer;
pub mod xml;
pub mod xml_serializer;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, fuer interne Datenstrukturen).
/// Nutzt hashbrown direkt fuer entry_ref().
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{AtContent, ChContent, DtContent, ExiEvent, NsContent, PiContent};

// Public API: Options
pub use options::{Alignment, ExiOptions, Preserve};

// Public API: Header
pub use header::ExiHeader;

// Public API: Encoder/Decoder
pub use decoder::{ExiDecoder, Scanner, decode, decode_with_options, decode_with_schema};
pub use encoder::{Transmogrifier, encode, encode_with_schema};

// Public API: Types
pub use qname::QName;
pub use schema::{SchemaModel, SchemaQuery};

// Public API: XML
pub use xml::{parse_events, parse_file};
pub use xml_serializer::{events_to_xml, events_to_xml_writer};

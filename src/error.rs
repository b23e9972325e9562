//! Central error type for the EXI codec.
//!
//! Every fallible operation returns [`Result`]. Nothing is retried internally:
//! an error aborts the encode/decode session and its partial output is garbage.

use core::fmt;
use std::borrow::Cow;

/// All failures the grammar engine, the codecs and the adapters can raise.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The compiled schema references something it does not define (EXI 8.5).
    ///
    /// Raised once while a `GrammarSet` is built, never per event.
    SchemaInconsistency(Cow<'static, str>),
    /// An infoset event matches no production of the current grammar state (EXI 8).
    GrammarMismatch {
        /// Kurzform des Events (z.B. `SE({urn:a}b)`).
        event: Cow<'static, str>,
        /// Grammar und State in dem gesucht wurde.
        context: Cow<'static, str>,
    },
    /// Fewer bits remain in the stream or channel than the next field needs.
    TruncatedStream,
    /// A binary value violates the layout of its datatype (EXI 7.1).
    MalformedValue(Cow<'static, str>),
    /// Options that cannot be honoured together or at all (EXI 5.4).
    UnsupportedOption(Cow<'static, str>),
    /// EXI header is malformed (EXI 5).
    MalformedHeader(Cow<'static, str>),
    /// EXI version number is not supported (EXI 5.3).
    UnsupportedVersion(u32),
    /// A decoded event code is outside the current catalog (EXI 6.2).
    InvalidEventCode {
        event_code: Cow<'static, str>,
        grammar_state: Cow<'static, str>,
    },
    /// An integer exceeds the range of its target representation (EXI 7.1.5, 7.1.6).
    IntegerOverflow,
    /// Surrogate or out-of-range Unicode code point (EXI 7.1.10).
    InvalidCodePoint(u64),
    /// A compact identifier points past the end of its partition (EXI 7.3).
    StringTableIndex { partition: &'static str, index: usize, len: usize },
    /// Infoset events arrive in an order no XML document can have.
    EventOrder(Cow<'static, str>),
    /// DEFLATE compression failed (EXI 9.3).
    CompressionError(String),
    /// DEFLATE decompression failed (EXI 9.3).
    DecompressionError(String),
    /// XML front end could not parse its input.
    XmlParseError(String),
    /// Underlying reader or writer failed.
    IoError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaInconsistency(msg) => write!(f, "schema inconsistency: {msg} (EXI 8.5)"),
            Self::GrammarMismatch { event, context } => {
                if context.is_empty() {
                    write!(f, "no production matches {event} (EXI 8)")
                } else {
                    write!(f, "no production matches {event} in {context} (EXI 8)")
                }
            }
            Self::TruncatedStream => write!(f, "truncated stream: not enough bits left (EXI 6)"),
            Self::MalformedValue(msg) => write!(f, "malformed value: {msg} (EXI 7.1)"),
            Self::UnsupportedOption(msg) => write!(f, "unsupported option: {msg} (EXI 5.4)"),
            Self::MalformedHeader(msg) => write!(f, "malformed EXI header: {msg} (EXI 5)"),
            Self::UnsupportedVersion(v) => write!(f, "unsupported EXI version {v} (EXI 5.3)"),
            Self::InvalidEventCode { event_code, grammar_state } => {
                if grammar_state.is_empty() {
                    write!(f, "invalid event code '{event_code}' (EXI 6.2)")
                } else {
                    write!(f, "invalid event code '{event_code}' in state '{grammar_state}' (EXI 6.2)")
                }
            }
            Self::IntegerOverflow => write!(f, "integer overflow (EXI 7.1.5, 7.1.6)"),
            Self::InvalidCodePoint(cp) => write!(f, "invalid Unicode code point U+{cp:X} (EXI 7.1.10)"),
            Self::StringTableIndex { partition, index, len } => {
                write!(f, "compact identifier {index} out of range for {partition} partition of size {len} (EXI 7.3)")
            }
            Self::EventOrder(msg) => write!(f, "event order violation: {msg}"),
            Self::CompressionError(msg) => write!(f, "DEFLATE compression failed (EXI 9.3): {msg}"),
            Self::DecompressionError(msg) => write!(f, "DEFLATE decompression failed (EXI 9.3): {msg}"),
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl Error {
    /// Erstellt einen `GrammarMismatch` Fehler mit Kontext.
    pub fn grammar_mismatch(event: impl Into<Cow<'static, str>>, context: impl Into<Cow<'static, str>>) -> Self {
        Self::GrammarMismatch {
            event: event.into(),
            context: context.into(),
        }
    }

    /// Erstellt einen `InvalidEventCode` Fehler mit Kontext.
    pub fn invalid_event_code(event_code: impl Into<Cow<'static, str>>, grammar_state: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidEventCode {
            event_code: event_code.into(),
            grammar_state: grammar_state.into(),
        }
    }

    pub fn schema_inconsistency(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::SchemaInconsistency(msg.into())
    }

    pub fn malformed_value(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedValue(msg.into())
    }

    pub fn unsupported_option(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedOption(msg.into())
    }

    pub fn malformed_header(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::MalformedHeader(msg.into())
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_inconsistency_display() {
        let msg = Error::schema_inconsistency("type #17 not defined").to_string();
        assert!(msg.contains("#17"), "{msg}");
        assert!(msg.contains("8.5"), "{msg}");
    }

    #[test]
    fn grammar_mismatch_with_context() {
        let msg = Error::grammar_mismatch("SE({urn:a}b)", "Type#3 state 1").to_string();
        assert!(msg.contains("SE({urn:a}b)"), "{msg}");
        assert!(msg.contains("state 1"), "{msg}");
    }

    #[test]
    fn grammar_mismatch_without_context() {
        let msg = Error::grammar_mismatch("CH", "").to_string();
        assert!(msg.contains("CH"), "{msg}");
        assert!(!msg.contains(" in "), "{msg}");
    }

    #[test]
    fn truncated_stream_display() {
        let msg = Error::TruncatedStream.to_string();
        assert!(msg.contains("truncated"), "{msg}");
    }

    #[test]
    fn invalid_code_point_hex() {
        let msg = Error::InvalidCodePoint(0xD800).to_string();
        assert!(msg.contains("D800"), "{msg}");
        assert!(msg.contains("7.1.10"), "{msg}");
    }

    #[test]
    fn string_table_index_display() {
        let msg = Error::StringTableIndex { partition: "uri", index: 9, len: 4 }.to_string();
        assert!(msg.contains("uri"), "{msg}");
        assert!(msg.contains('9'), "{msg}");
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let e: Error = io.into();
        assert!(matches!(e, Error::IoError(ref m) if m.contains("eof")));
    }

    #[test]
    fn error_implements_std_error() {
        let e: Box<dyn std::error::Error> = Box::new(Error::IntegerOverflow);
        assert!(!e.to_string().is_empty());
    }
}

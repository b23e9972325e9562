//! Convenience functions that decode a whole stream.

use std::sync::Arc;

use crate::event::ExiEvent;
use crate::options::ExiOptions;
use crate::schema::SchemaQuery;
use crate::Result;

use super::{ExiDecoder, Scanner};

fn drain(scanner: Scanner) -> Result<(Vec<ExiEvent>, ExiOptions)> {
    let options = scanner.options().clone();
    let events = scanner.collect::<Result<Vec<_>>>()?;
    Ok((events, options))
}

/// Decodes a schema-less stream whose header carries its options.
///
/// Returns: (Events, Options des Streams)
pub fn decode(bytes: &[u8]) -> Result<(Vec<ExiEvent>, ExiOptions)> {
    drain(ExiDecoder::new(bytes).process_header()?)
}

/// Decodes a schema-less stream; `options` apply when the header has none.
pub fn decode_with_options(bytes: &[u8], options: ExiOptions) -> Result<(Vec<ExiEvent>, ExiOptions)> {
    drain(ExiDecoder::new(bytes).with_options(options).process_header()?)
}

/// Decodes a stream against `schema`.
pub fn decode_with_schema(
    bytes: &[u8],
    schema: Arc<dyn SchemaQuery>,
    options: ExiOptions,
) -> Result<(Vec<ExiEvent>, ExiOptions)> {
    drain(ExiDecoder::new(bytes).with_schema(schema).with_options(options).process_header()?)
}

//! EXI header (EXI 5).
//!
//! Aufbau:
//! - optional `$EXI` Cookie (EXI 5.1)
//! - Distinguishing Bits `10` (EXI 5.2)
//! - Presence Bit fuer Options
//! - Format-Version: Preview-Bit + 4-Bit-Chunks (EXI 5.3)
//! - optional kompakter Options-Fingerprint
//! - Padding bis zur Byte-Grenze ausser bei bit-packed
//!
//! Der Fingerprint ersetzt das EXI-Options-Dokument: Alignment (2 Bits),
//! je ein Bit fuer strict, fragment, comments, pis, dtd, prefixes,
//! lexicalValues, selfContained, dann valueMaxLength und blockSize (Flag +
//! Unsigned Integer) und ein Bit fuer "schema-informed".
//!
//! ```
//! use exigram::bitstream::{BitReader, BitWriter};
//! use exigram::header;
//! use exigram::options::ExiOptions;
//!
//! let opts = ExiOptions::default().with_value_max_length(8);
//! let mut w = BitWriter::new();
//! header::encode(&mut w, &opts, false);
//! let mut r = BitReader::new(w.into_vec());
//! let h = header::decode(&mut r, &ExiOptions::default()).unwrap();
//! assert_eq!(h.options.value_max_length(), Some(8));
//! ```

use crate::bitstream::{BitReader, BitWriter};
use crate::options::{Alignment, ExiOptions, Preserve};
use crate::{Error, Result, unsigned_integer};

const EXI_COOKIE: [u8; 4] = *b"$EXI";
const DISTINGUISHING_BITS: u64 = 0b10;
const FORMAT_VERSION: u32 = 1;
const DEFAULT_BLOCK_SIZE: u32 = 1_000_000;

/// A decoded header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExiHeader {
    pub cookie: bool,
    pub version: u32,
    /// Options in effect for the body: from the header, or the caller's defaults.
    pub options: ExiOptions,
    /// The body was encoded against a schema. `None` when the header had no options.
    pub schema_informed: Option<bool>,
}

/// Writes the header for `options`. The writer must be in bit-packed mode.
pub fn encode(writer: &mut BitWriter, options: &ExiOptions, schema_informed: bool) {
    if options.include_cookie() {
        writer.write_bytes(&EXI_COOKIE);
    }
    writer.write_bits(DISTINGUISHING_BITS, 2);
    writer.write_bits(u64::from(options.include_options()), 1);
    encode_version(writer, false, FORMAT_VERSION);
    if options.include_options() {
        encode_fingerprint(writer, options, schema_informed);
    }
    if options.alignment().is_byte_aligned() {
        writer.align_to_byte();
    }
}

/// Preview-Bit, dann (version-1) in 4-Bit-Chunks; 15 heisst "weiter".
fn encode_version(writer: &mut BitWriter, preview: bool, version: u32) {
    writer.write_bits(u64::from(preview), 1);
    let mut rest = version - 1;
    while rest >= 15 {
        writer.write_bits(15, 4);
        rest -= 15;
    }
    writer.write_bits(u64::from(rest), 4);
}

fn encode_fingerprint(writer: &mut BitWriter, options: &ExiOptions, schema_informed: bool) {
    writer.write_bits(u64::from(options.alignment().code()), 2);
    let p = options.preserve();
    for flag in [
        options.strict(),
        options.fragment(),
        p.comments,
        p.pis,
        p.dtd,
        p.prefixes,
        p.lexical_values,
        options.self_contained(),
    ] {
        writer.write_bits(u64::from(flag), 1);
    }
    match options.value_max_length() {
        Some(len) => {
            writer.write_bits(1, 1);
            unsigned_integer::encode(writer, u64::from(len));
        }
        None => writer.write_bits(0, 1),
    }
    if options.block_size() != DEFAULT_BLOCK_SIZE {
        writer.write_bits(1, 1);
        unsigned_integer::encode(writer, u64::from(options.block_size()));
    } else {
        writer.write_bits(0, 1);
    }
    writer.write_bits(u64::from(schema_informed), 1);
}

/// Reads the header. `defaults` supplies the options when the header carries none.
pub fn decode(reader: &mut BitReader, defaults: &ExiOptions) -> Result<ExiHeader> {
    let cookie = reader.remaining_bits() >= 32 && reader.bit_position() == 0 && peek_cookie(reader)?;
    if cookie {
        reader.read_bytes(EXI_COOKIE.len())?;
    }
    let bits = reader.read_bits(2)?;
    if bits != DISTINGUISHING_BITS {
        return Err(Error::malformed_header(format!("distinguishing bits {bits:02b}, expected 10")));
    }
    let options_present = reader.read_bits(1)? == 1;
    let preview = reader.read_bits(1)? == 1;
    let mut version = 1u32;
    loop {
        let chunk = reader.read_bits(4)? as u32;
        version = version.checked_add(chunk).ok_or(Error::UnsupportedVersion(u32::MAX))?;
        if chunk < 15 {
            break;
        }
    }
    if preview || version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    let (mut options, schema_informed) = if options_present {
        let (o, s) = decode_fingerprint(reader)?;
        (o, Some(s))
    } else {
        (defaults.clone(), None)
    };
    options.include_cookie = cookie;
    options.include_options = options_present;
    if options.alignment().is_byte_aligned() {
        reader.align_to_byte();
    }
    Ok(ExiHeader { cookie, version, options, schema_informed })
}

fn peek_cookie(reader: &BitReader) -> Result<bool> {
    let mut probe = reader.clone();
    Ok(probe.read_bytes(EXI_COOKIE.len())? == EXI_COOKIE)
}

fn decode_fingerprint(reader: &mut BitReader) -> Result<(ExiOptions, bool)> {
    let code = reader.read_bits(2)? as u8;
    let alignment = Alignment::from_code(code)
        .ok_or_else(|| Error::malformed_header(format!("alignment code {code}")))?;
    let mut flags = [false; 8];
    for flag in flags.iter_mut() {
        *flag = reader.read_bits(1)? == 1;
    }
    let [strict, fragment, comments, pis, dtd, prefixes, lexical_values, self_contained] = flags;
    let value_max_length = if reader.read_bits(1)? == 1 {
        Some(narrow(unsigned_integer::decode(reader)?)?)
    } else {
        None
    };
    let block_size =
        if reader.read_bits(1)? == 1 { narrow(unsigned_integer::decode(reader)?)? } else { DEFAULT_BLOCK_SIZE };
    let schema_informed = reader.read_bits(1)? == 1;
    let options = ExiOptions {
        alignment,
        strict,
        fragment,
        preserve: Preserve { comments, pis, dtd, prefixes, lexical_values },
        self_contained,
        block_size,
        value_max_length,
        ..ExiOptions::default()
    };
    options.validate().map_err(|e| Error::malformed_header(format!("invalid option combination: {e}")))?;
    Ok((options, schema_informed))
}

fn narrow(v: u64) -> Result<u32> {
    u32::try_from(v).map_err(|_| Error::malformed_header(format!("option value {v} too large")))
}

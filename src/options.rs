//! EXI options (EXI 5.4) and the grammar-relevant subset.
//!
//! ```
//! use exigram::options::{Alignment, ExiOptions, Preserve};
//!
//! let opts = ExiOptions::default()
//!     .with_alignment(Alignment::ByteAlignment)
//!     .with_preserve(Preserve { comments: true, ..Preserve::default() })
//!     .with_value_max_length(16);
//!
//! assert_eq!(opts.alignment(), Alignment::ByteAlignment);
//! assert!(opts.preserve().comments);
//! assert_eq!(opts.value_max_length(), Some(16));
//! ```

use crate::{Error, Result};

/// Layout of event codes and values in the body (EXI 5.4, 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Alignment {
    #[default]
    BitPacked,
    /// Every field rounded up to whole bytes.
    ByteAlignment,
    /// Channels demultiplexed, byte aligned, not deflated.
    PreCompression,
    /// Channels demultiplexed and deflated per block.
    Compression,
}

impl Alignment {
    /// Fields are rounded to bytes in every mode but bit-packed.
    pub fn is_byte_aligned(self) -> bool {
        self != Self::BitPacked
    }

    /// Structure and values travel in separate channels.
    pub fn uses_channels(self) -> bool {
        matches!(self, Self::PreCompression | Self::Compression)
    }

    pub(crate) fn code(self) -> u8 {
        match self {
            Self::BitPacked => 0,
            Self::ByteAlignment => 1,
            Self::PreCompression => 2,
            Self::Compression => 3,
        }
    }

    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::BitPacked),
            1 => Some(Self::ByteAlignment),
            2 => Some(Self::PreCompression),
            3 => Some(Self::Compression),
            _ => None,
        }
    }
}

/// Fidelity options (EXI 6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Preserve {
    pub comments: bool,
    pub pis: bool,
    /// DOCTYPE and entity references.
    pub dtd: bool,
    /// Namespace declarations and prefixes.
    pub prefixes: bool,
    /// Original text of typed values.
    pub lexical_values: bool,
}

/// EXI options controlling one stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExiOptions {
    pub(crate) alignment: Alignment,
    pub(crate) strict: bool,
    pub(crate) fragment: bool,
    pub(crate) preserve: Preserve,
    pub(crate) self_contained: bool,
    pub(crate) block_size: u32,
    pub(crate) value_max_length: Option<u32>,
    pub(crate) resolve_external_general_entities: bool,
    pub(crate) include_cookie: bool,
    pub(crate) include_options: bool,
}

impl Default for ExiOptions {
    fn default() -> Self {
        Self {
            alignment: Alignment::BitPacked,
            strict: false,
            fragment: false,
            preserve: Preserve::default(),
            self_contained: false,
            block_size: 1_000_000,
            value_max_length: None,
            resolve_external_general_entities: false,
            include_cookie: false,
            include_options: true,
        }
    }
}

impl ExiOptions {
    pub fn alignment(&self) -> Alignment { self.alignment }
    pub fn strict(&self) -> bool { self.strict }
    pub fn fragment(&self) -> bool { self.fragment }
    pub fn preserve(&self) -> &Preserve { &self.preserve }
    pub fn self_contained(&self) -> bool { self.self_contained }
    /// Values per compression block (EXI 9.1).
    pub fn block_size(&self) -> u32 { self.block_size }
    /// Longest value that still enters the value partitions. `None` = unbounded.
    pub fn value_max_length(&self) -> Option<u32> { self.value_max_length }
    /// Expand entity references from the DTD before encoding instead of keeping ER events.
    pub fn resolve_external_general_entities(&self) -> bool { self.resolve_external_general_entities }
    /// Write the `$EXI` cookie in front of the header.
    pub fn include_cookie(&self) -> bool { self.include_cookie }
    /// Write the options into the header (otherwise the decoder must know them).
    pub fn include_options(&self) -> bool { self.include_options }

    pub fn with_alignment(mut self, alignment: Alignment) -> Self { self.alignment = alignment; self }
    pub fn with_strict(mut self) -> Self { self.strict = true; self }
    pub fn with_fragment(mut self) -> Self { self.fragment = true; self }
    pub fn with_preserve(mut self, preserve: Preserve) -> Self { self.preserve = preserve; self }
    pub fn with_lexical_values(mut self) -> Self { self.preserve.lexical_values = true; self }
    pub fn with_self_contained(mut self) -> Self { self.self_contained = true; self }
    pub fn with_block_size(mut self, size: u32) -> Self { self.block_size = size; self }
    pub fn with_value_max_length(mut self, len: u32) -> Self { self.value_max_length = Some(len); self }
    pub fn with_resolve_external_general_entities(mut self) -> Self { self.resolve_external_general_entities = true; self }
    pub fn with_cookie(mut self) -> Self { self.include_cookie = true; self }
    pub fn without_header_options(mut self) -> Self { self.include_options = false; self }

    pub fn set_alignment(&mut self, alignment: Alignment) { self.alignment = alignment; }
    pub fn set_strict(&mut self, val: bool) { self.strict = val; }
    pub fn set_fragment(&mut self, val: bool) { self.fragment = val; }
    pub fn set_preserve(&mut self, preserve: Preserve) { self.preserve = preserve; }
    pub fn set_block_size(&mut self, size: u32) { self.block_size = size; }
    pub fn set_value_max_length(&mut self, len: Option<u32>) { self.value_max_length = len; }

    /// Checks combinations that no stream may use (EXI 5.4).
    ///
    /// - `block_size` must be positive.
    /// - `strict` excludes comments, PIs, DTD, prefixes and self-contained.
    /// - `self_contained` excludes the channel alignments.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::unsupported_option("blockSize must be positive"));
        }
        let incompatible_with_strict = self.preserve.comments
            || self.preserve.pis
            || self.preserve.dtd
            || self.preserve.prefixes
            || self.self_contained;
        if self.strict && incompatible_with_strict {
            return Err(Error::unsupported_option(
                "strict cannot be combined with comments, pis, dtd, prefixes or selfContained",
            ));
        }
        if self.self_contained && self.alignment.uses_channels() {
            return Err(Error::unsupported_option("selfContained cannot be combined with (pre-)compression"));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus the checks that depend on whether a schema is present.
    pub(crate) fn validate_for(&self, schema_informed: bool) -> Result<()> {
        self.validate()?;
        if self.strict && !schema_informed {
            return Err(Error::unsupported_option("strict requires a schema"));
        }
        Ok(())
    }

    /// Lexical values bypass the typed codecs completely.
    pub(crate) fn lexical(&self) -> bool {
        self.preserve.lexical_values
    }
}

/// Grammar-relevant options as a compact bit set.
///
/// Zwei Options-Saetze mit gleichem `GrammarOptions` teilen sich ein
/// `GrammarSet` (Cache-Schluessel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GrammarOptions(u8);

impl GrammarOptions {
    pub const COMMENTS: u8 = 1 << 0;
    pub const PIS: u8 = 1 << 1;
    pub const DTD: u8 = 1 << 2;
    pub const PREFIXES: u8 = 1 << 3;
    pub const STRICT: u8 = 1 << 4;
    pub const SELF_CONTAINED: u8 = 1 << 5;

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3F)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn has(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn comments(self) -> bool { self.has(Self::COMMENTS) }
    pub fn pis(self) -> bool { self.has(Self::PIS) }
    pub fn dtd(self) -> bool { self.has(Self::DTD) }
    pub fn prefixes(self) -> bool { self.has(Self::PREFIXES) }
    pub fn strict(self) -> bool { self.has(Self::STRICT) }
    pub fn self_contained(self) -> bool { self.has(Self::SELF_CONTAINED) }
}

impl From<&ExiOptions> for GrammarOptions {
    fn from(opts: &ExiOptions) -> Self {
        let mut bits = 0;
        let p = &opts.preserve;
        for (on, flag) in [
            (p.comments, Self::COMMENTS),
            (p.pis, Self::PIS),
            (p.dtd, Self::DTD),
            (p.prefixes, Self::PREFIXES),
            (opts.strict, Self::STRICT),
            (opts.self_contained, Self::SELF_CONTAINED),
        ] {
            if on {
                bits |= flag;
            }
        }
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = ExiOptions::default();
        assert_eq!(opts.alignment(), Alignment::BitPacked);
        assert_eq!(opts.block_size(), 1_000_000);
        assert_eq!(opts.value_max_length(), None);
        assert!(!opts.resolve_external_general_entities());
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn strict_verbietet_preserve() {
        let opts = ExiOptions::default()
            .with_strict()
            .with_preserve(Preserve { comments: true, ..Preserve::default() });
        assert!(matches!(opts.validate(), Err(Error::UnsupportedOption(_))));
        let opts = ExiOptions::default().with_strict().with_lexical_values();
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn strict_braucht_schema() {
        let opts = ExiOptions::default().with_strict();
        assert!(opts.validate_for(true).is_ok());
        assert!(matches!(opts.validate_for(false), Err(Error::UnsupportedOption(_))));
    }

    #[test]
    fn self_contained_ohne_channels() {
        let opts = ExiOptions::default().with_self_contained().with_alignment(Alignment::Compression);
        assert!(opts.validate().is_err());
        let opts = ExiOptions::default().with_self_contained().with_alignment(Alignment::ByteAlignment);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn block_size_null() {
        assert!(ExiOptions::default().with_block_size(0).validate().is_err());
    }

    #[test]
    fn grammar_options_bits() {
        let opts = ExiOptions::default()
            .with_preserve(Preserve { pis: true, prefixes: true, ..Preserve::default() });
        let g = GrammarOptions::from(&opts);
        assert!(g.pis() && g.prefixes());
        assert!(!g.comments() && !g.strict());
        assert_eq!(g, GrammarOptions::from_bits(GrammarOptions::PIS | GrammarOptions::PREFIXES));
        // lexical values beeinflussen die Grammatik nicht
        let lex = opts.clone().with_lexical_values();
        assert_eq!(GrammarOptions::from(&lex), g);
    }

    #[test]
    fn alignment_codes() {
        for a in [Alignment::BitPacked, Alignment::ByteAlignment, Alignment::PreCompression, Alignment::Compression] {
            assert_eq!(Alignment::from_code(a.code()), Some(a));
        }
        assert!(Alignment::Compression.uses_channels());
        assert!(!Alignment::ByteAlignment.uses_channels());
    }
}

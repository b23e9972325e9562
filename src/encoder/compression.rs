//! Blocks of the channel alignments (EXI 9).
//!
//! Values werden pro Block gepuffert. Erreicht ein Block `blockSize` Values,
//! wird er nach dem ausloesenden AT/CH abgeschlossen; der letzte Block endet
//! mit ED.

use std::sync::Arc;

use crate::bitstream::BitWriter;
use crate::compression::Block;
use crate::context::ValueSpec;
use crate::precompression::{self, ChannelCounts, ChannelKey};
use crate::{FastIndexMap, Result};

use super::Transmogrifier;
use super::value::{ValueData, write_value_to};

/// Deferred values of the open block.
#[derive(Debug)]
pub(super) struct ChannelBuffer {
    values: Vec<(ValueSpec, ValueData)>,
    block_size: usize,
    deflate: bool,
}

impl ChannelBuffer {
    pub(super) fn new(block_size: u32, deflate: bool) -> Self {
        Self { values: Vec::new(), block_size: block_size.max(1) as usize, deflate }
    }

    pub(super) fn push(&mut self, spec: ValueSpec, data: ValueData) {
        self.values.push((spec, data));
    }

    fn is_full(&self) -> bool {
        self.values.len() >= self.block_size
    }
}

impl Transmogrifier {
    pub(super) fn maybe_flush_block(&mut self) -> Result<()> {
        if self.channels.as_ref().is_some_and(ChannelBuffer::is_full) {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Closes the open block: structure, then the value channels.
    pub(super) fn flush_block(&mut self) -> Result<()> {
        let Some(buffer) = self.channels.as_mut() else { return Ok(()) };
        let values = std::mem::take(&mut buffer.values);
        let deflate = buffer.deflate;
        let structure = std::mem::replace(&mut self.writer, BitWriter::byte_aligned()).into_vec();

        let mut grouped: FastIndexMap<ChannelKey, Vec<(ValueSpec, ValueData)>> = FastIndexMap::default();
        for (spec, data) in values {
            grouped.entry(ChannelKey::from(&*spec.owner)).or_default().push((spec, data));
        }
        let counts: ChannelCounts = grouped.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        let total: usize = counts.values().sum();

        let mut block = Block::new(structure);
        for key in precompression::order_channels(&counts, total) {
            let Some(entries) = grouped.get(&key) else { continue };
            let mut w = BitWriter::byte_aligned();
            for (spec, data) in entries {
                write_value_to(&mut w, &mut self.session, spec, data)?;
            }
            block.push_channel(key, entries.len(), w.into_vec());
        }
        log::trace!("block closed: {} values, {} channels", total, counts.len());
        block.write(&mut self.out, deflate)
    }
}

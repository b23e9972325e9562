//! Blocks of the channel alignments (EXI 9).
//!
//! Ein Block wird in zwei Schritten gelesen: der Structure Channel liefert
//! die Events bis zum Value, der den Block fuellt (oder bis ED), danach
//! werden die Values Channel fuer Channel in die offenen Slots eingesetzt.

use std::sync::Arc;

use crate::bitstream::BitReader;
use crate::compression::read_stream;
use crate::event::{AtContent, ChContent, ExiEvent};
use crate::precompression::{self, ChannelCounts, ChannelKey, SMALL_CHANNEL, StreamPart};
use crate::{Error, FastIndexMap, Result};

use super::value::read_value;
use super::{Scanner, Slot, decode_event};

#[derive(Debug, Clone, Copy)]
pub(super) struct ChannelState {
    block_size: usize,
    deflate: bool,
}

impl ChannelState {
    pub(super) fn new(block_size: u32, deflate: bool) -> Self {
        Self { block_size: block_size.max(1) as usize, deflate }
    }
}

impl Scanner {
    /// Reads the next block and queues its events.
    pub(super) fn decode_block(&mut self) -> Result<()> {
        let Some(state) = self.channels else { return Ok(()) };
        let mut structure =
            if state.deflate { read_stream(&mut self.reader)? } else { std::mem::take(&mut self.reader) };

        let mut slots = Vec::new();
        let mut deferred = 0usize;
        loop {
            let slot = decode_event(&mut self.session, &mut structure, true)?;
            let end = matches!(slot, Slot::Ready(ExiEvent::EndDocument));
            if slot.spec().is_some() {
                deferred += 1;
            }
            slots.push(slot);
            if end || deferred >= state.block_size {
                break;
            }
        }

        let mut by_channel: FastIndexMap<ChannelKey, Vec<usize>> = FastIndexMap::default();
        for (i, slot) in slots.iter().enumerate() {
            if let Some(spec) = slot.spec() {
                by_channel.entry(ChannelKey::from(&*spec.owner)).or_default().push(i);
            }
        }
        let counts: ChannelCounts = by_channel.iter().map(|(k, v)| (k.clone(), v.len())).collect();
        log::trace!("block: {} events, {deferred} values, {} channels", slots.len(), counts.len());

        let mut values: Vec<Option<Arc<str>>> = vec![None; slots.len()];
        if !state.deflate || deferred <= SMALL_CHANNEL {
            for key in precompression::order_channels(&counts, deferred) {
                self.read_channel(&mut structure, &slots, &by_channel[&key], &mut values)?;
            }
        } else {
            for parts in precompression::group_streams(&counts, deferred).iter().skip(1) {
                let mut stream = read_stream(&mut self.reader)?;
                for part in parts {
                    if let StreamPart::Channel(key) = part {
                        self.read_channel(&mut stream, &slots, &by_channel[key], &mut values)?;
                    }
                }
            }
        }
        if !state.deflate {
            self.reader = structure;
        }

        for (slot, value) in slots.into_iter().zip(values) {
            let event = match (slot, value) {
                (Slot::Ready(event), _) => event,
                (Slot::Attribute(qname, _), Some(value)) => ExiEvent::Attribute(AtContent { qname, value }),
                (Slot::Characters(_), Some(value)) => ExiEvent::Characters(ChContent { value }),
                (slot, None) => return slot.into_event().map(|_| ()),
            };
            self.queue.push_back(event);
        }
        Ok(())
    }

    fn read_channel(
        &mut self,
        r: &mut BitReader,
        slots: &[Slot],
        indices: &[usize],
        values: &mut [Option<Arc<str>>],
    ) -> Result<()> {
        for &i in indices {
            let spec = slots[i].spec().ok_or_else(|| Error::EventOrder("channel slot without value".into()))?;
            values[i] = Some(read_value(&mut self.session, r, spec)?);
        }
        Ok(())
    }
}

//! Channel layout of the (pre-)compression alignments (EXI 9.2, 9.3).
//!
//! Ein Block besteht aus dem Structure Channel und je einem Value Channel pro
//! QName (URI + local-name). Encoder und Decoder muessen die Channels in
//! derselben Reihenfolge verarbeiten, weil die Value-Partitionen der
//! String-Tabelle in dieser Reihenfolge wachsen.

use std::sync::Arc;

use crate::FastIndexMap;
use crate::qname::QName;

/// Values per channel (and per block) up to which streams are combined.
pub const SMALL_CHANNEL: usize = 100;

/// Channel identity: the expanded name of the value's owner.
///
/// Gleiche (URI, local-name) mit unterschiedlichen Prefixes gehoeren zum
/// selben Channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub uri: Arc<str>,
    pub local_name: Arc<str>,
}

impl ChannelKey {
    pub fn new(uri: Arc<str>, local_name: Arc<str>) -> Self {
        Self { uri, local_name }
    }
}

impl From<&QName> for ChannelKey {
    fn from(qname: &QName) -> Self {
        Self { uri: Arc::clone(&qname.uri), local_name: Arc::clone(&qname.local_name) }
    }
}

/// Value counts per channel in order of first occurrence.
pub type ChannelCounts = FastIndexMap<ChannelKey, usize>;

/// Order in which the value channels of a block are written (EXI 9.3).
///
/// - bis 100 Values insgesamt: Reihenfolge des ersten Auftretens
/// - sonst: erst alle Channels mit hoechstens 100 Values, dann die grossen,
///   jeweils in Reihenfolge des ersten Auftretens
pub fn order_channels(counts: &ChannelCounts, total_values: usize) -> Vec<ChannelKey> {
    if total_values <= SMALL_CHANNEL {
        return counts.keys().cloned().collect();
    }
    let (small, large): (Vec<_>, Vec<_>) = counts.iter().partition(|&(_, &n)| n <= SMALL_CHANNEL);
    small.into_iter().chain(large).map(|(k, _)| k.clone()).collect()
}

/// One compressed stream of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPart {
    Structure,
    Channel(ChannelKey),
}

/// Groups the channels of a block into DEFLATE streams (EXI 9.3).
///
/// - bis 100 Values: ein Stream mit Structure und allen Channels
/// - sonst: Structure allein, dann alle kleinen Channels zusammen (falls es
///   welche gibt), dann jeder grosse Channel fuer sich
pub fn group_streams(counts: &ChannelCounts, total_values: usize) -> Vec<Vec<StreamPart>> {
    let ordered = order_channels(counts, total_values);
    if total_values <= SMALL_CHANNEL {
        let mut single = vec![StreamPart::Structure];
        single.extend(ordered.into_iter().map(StreamPart::Channel));
        return vec![single];
    }
    let mut streams = vec![vec![StreamPart::Structure]];
    let mut small = Vec::new();
    for key in ordered {
        if counts.get(&key).copied().unwrap_or(0) <= SMALL_CHANNEL {
            small.push(StreamPart::Channel(key));
        } else {
            if !small.is_empty() {
                streams.push(std::mem::take(&mut small));
            }
            streams.push(vec![StreamPart::Channel(key)]);
        }
    }
    if !small.is_empty() {
        streams.push(small);
    }
    streams
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(local: &str) -> ChannelKey {
        ChannelKey::new(Arc::from(""), Arc::from(local))
    }

    fn counts(entries: &[(&str, usize)]) -> ChannelCounts {
        entries.iter().map(|(k, n)| (key(k), *n)).collect()
    }

    #[test]
    fn wenige_values_behalten_reihenfolge() {
        let c = counts(&[("a", 10), ("b", 20), ("c", 30)]);
        assert_eq!(order_channels(&c, 60), vec![key("a"), key("b"), key("c")]);
    }

    #[test]
    fn kleine_channels_zuerst() {
        let c = counts(&[("big", 150), ("small1", 50), ("small2", 30)]);
        assert_eq!(order_channels(&c, 230), vec![key("small1"), key("small2"), key("big")]);
    }

    #[test]
    fn genau_hundert_ist_klein() {
        let c = counts(&[("a", 60), ("b", 40)]);
        assert_eq!(order_channels(&c, 100), vec![key("a"), key("b")]);
        assert_eq!(group_streams(&c, 100).len(), 1);
    }

    #[test]
    fn ein_stream_bei_kleinem_block() {
        let c = counts(&[("a", 3), ("b", 4)]);
        let streams = group_streams(&c, 7);
        assert_eq!(
            streams,
            vec![vec![StreamPart::Structure, StreamPart::Channel(key("a")), StreamPart::Channel(key("b"))]]
        );
    }

    #[test]
    fn grosse_channels_einzeln() {
        let c = counts(&[("big1", 101), ("s", 5), ("big2", 200), ("t", 1)]);
        let streams = group_streams(&c, 307);
        assert_eq!(streams.len(), 4);
        assert_eq!(streams[0], vec![StreamPart::Structure]);
        assert_eq!(streams[1], vec![StreamPart::Channel(key("s")), StreamPart::Channel(key("t"))]);
        assert_eq!(streams[2], vec![StreamPart::Channel(key("big1"))]);
        assert_eq!(streams[3], vec![StreamPart::Channel(key("big2"))]);
    }

    #[test]
    fn ohne_kleine_channels_kein_leerer_stream() {
        let c = counts(&[("big", 120)]);
        assert_eq!(group_streams(&c, 120).len(), 2);
    }

    #[test]
    fn prefix_spielt_keine_rolle() {
        let a = ChannelKey::from(&QName::with_prefix("urn:x", "v", "p"));
        let b = ChannelKey::from(&QName::new("urn:x", "v"));
        assert_eq!(a, b);
    }
}

//! Blocks and compressed streams (EXI 9).
//!
//! ```text
//! Events → [Block 1] → [Block 2] → ... → [Block N]
//!            ↓
//!          [Structure Channel] + [Value Channels nach QName]
//!            ↓
//!          [Streams] (kombiniert oder einzeln, je nach Value-Anzahl)
//!            ↓
//!          [DEFLATE + Laenge] (compression) oder [direkt] (pre-compression)
//! ```
//!
//! Jeder DEFLATE-Stream steht mit seiner Byte-Laenge (Unsigned Integer) vor
//! den Daten; der Decoder muss so die Stream-Grenzen nicht aus dem
//! DEFLATE-Format ableiten.

use std::io::Read;

use flate2::read::DeflateDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};

use crate::bitstream::{BitReader, BitWriter};
use crate::precompression::{self, ChannelCounts, ChannelKey, StreamPart};
use crate::{Error, FastIndexMap, Result, unsigned_integer};

/// The byte-aligned channels of one finished block.
#[derive(Debug, Default)]
pub struct Block {
    structure: Vec<u8>,
    channels: FastIndexMap<ChannelKey, Vec<u8>>,
    counts: ChannelCounts,
    total_values: usize,
}

impl Block {
    pub fn new(structure: Vec<u8>) -> Self {
        Self { structure, ..Self::default() }
    }

    /// Adds the encoded values of one channel.
    pub fn push_channel(&mut self, key: ChannelKey, values: usize, data: Vec<u8>) {
        self.total_values += values;
        self.counts.insert(key.clone(), values);
        self.channels.insert(key, data);
    }

    pub fn total_values(&self) -> usize {
        self.total_values
    }

    pub fn structure(&self) -> &[u8] {
        &self.structure
    }

    fn part(&self, part: &StreamPart) -> &[u8] {
        match part {
            StreamPart::Structure => &self.structure,
            StreamPart::Channel(key) => self.channels.get(key).map_or(&[][..], Vec::as_slice),
        }
    }

    /// Appends the block to the body.
    ///
    /// Pre-compression schreibt Structure und Channels direkt hintereinander,
    /// compression gruppiert sie nach EXI 9.3 in DEFLATE-Streams.
    pub fn write(&self, out: &mut BitWriter, deflate: bool) -> Result<()> {
        if !deflate {
            out.write_bytes(&self.structure);
            for key in precompression::order_channels(&self.counts, self.total_values) {
                out.write_bytes(self.part(&StreamPart::Channel(key)));
            }
            return Ok(());
        }
        let streams = precompression::group_streams(&self.counts, self.total_values);
        log::debug!(
            "block: {} values in {} channels, {} streams",
            self.total_values,
            self.channels.len(),
            streams.len()
        );
        for parts in &streams {
            let mut data = Vec::new();
            for part in parts {
                data.extend_from_slice(self.part(part));
            }
            write_stream(out, &deflate_compress(&data)?);
        }
        Ok(())
    }
}

/// Length-prefixed stream.
pub fn write_stream(out: &mut BitWriter, compressed: &[u8]) {
    unsigned_integer::encode(out, compressed.len() as u64);
    out.write_bytes(compressed);
}

/// Reads one length-prefixed DEFLATE stream and returns a reader over the
/// inflated bytes.
pub fn read_stream(reader: &mut BitReader) -> Result<BitReader> {
    let len = unsigned_integer::decode_usize(reader)?;
    if len.saturating_mul(8) > reader.remaining_bits() {
        return Err(Error::TruncatedStream);
    }
    let compressed = reader.read_bytes(len)?;
    Ok(BitReader::byte_aligned(deflate_decompress(&compressed)?))
}

/// Komprimiert Daten mit DEFLATE (RFC 1951, ohne zlib-Header).
pub fn deflate_compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut compressor = Compress::new(Compression::default(), false);
    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    let mut offset = 0usize;

    loop {
        let mut out_buf = [0u8; 8192];
        let before_in = compressor.total_in() as usize;
        let before_out = compressor.total_out() as usize;

        let status = compressor
            .compress(&data[offset..], &mut out_buf, FlushCompress::Finish)
            .map_err(|e| Error::CompressionError(format!("DEFLATE compress failed: {e}")))?;

        let consumed = (compressor.total_in() as usize).saturating_sub(before_in);
        let produced = (compressor.total_out() as usize).saturating_sub(before_out);
        offset += consumed;
        output.extend_from_slice(&out_buf[..produced]);

        match status {
            Status::StreamEnd => return Ok(output),
            Status::Ok | Status::BufError => {
                if consumed == 0 && produced == 0 {
                    return Err(Error::CompressionError("DEFLATE compress stalled".to_string()));
                }
            }
        }
    }
}

/// Dekomprimiert DEFLATE-komprimierte Daten.
pub fn deflate_decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| Error::DecompressionError(format!("DEFLATE decompression failed: {e}")))?;
    Ok(result)
}

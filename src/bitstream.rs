//! Bit-level stream reader and writer.
//!
//! EXI packs bits MSB first (EXI 7.1). Both ends carry an `aligned` flag: in
//! bit-packed mode an n-bit field takes exactly n bits, in byte-aligned and the
//! two channel modes every field is rounded up to whole bytes, least significant
//! byte first (EXI 7.1.9). The codecs never look at the alignment themselves.

use crate::{Error, Result};

/// Writes individual bits into a growable byte buffer, MSB first.
///
/// Intern wird ein u64-Akkumulator verwendet: Bits werden zuerst in `accum`
/// gesammelt und erst bei >= 8 akkumulierten Bits als volle Bytes in `buf`
/// geflusht.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    /// Akkumulator: enthält die nächsten `accum_bits` Bits (MSB = ältestes Bit).
    accum: u64,
    accum_bits: u8,
    aligned: bool,
}

impl BitWriter {
    /// Creates an empty bit-packed writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer that rounds every field to whole bytes.
    pub fn byte_aligned() -> Self {
        Self { aligned: true, ..Self::default() }
    }

    /// Whether fields are rounded to whole bytes.
    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    /// Switches the field layout. Used after the header, which is always bit-packed.
    pub fn set_aligned(&mut self, aligned: bool) {
        self.aligned = aligned;
    }

    #[inline(always)]
    fn flush_to_buf(&mut self) {
        while self.accum_bits >= 8 {
            self.accum_bits -= 8;
            self.buf.push((self.accum >> self.accum_bits) as u8);
        }
        if self.accum_bits > 0 {
            self.accum &= (1u64 << self.accum_bits) - 1;
        } else {
            self.accum = 0;
        }
    }

    /// Writes the lower `n` raw bits of `val`, MSB first, ignoring the alignment flag.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `n > 64`.
    #[inline]
    pub fn write_bits(&mut self, val: u64, n: u8) {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if n == 0 {
            return;
        }
        let total = u16::from(self.accum_bits) + u16::from(n);
        if total <= 64 {
            if n < 64 {
                self.accum = (self.accum << n) | (val & ((1u64 << n) - 1));
            } else {
                self.accum = val;
            }
            self.accum_bits = total as u8;
        } else {
            // n > 57: in zwei Schritten
            let first = 64 - self.accum_bits;
            let rest = n - first;
            self.accum = (self.accum << first) | ((val >> rest) & ((1u64 << first) - 1));
            self.accum_bits = 64;
            self.flush_to_buf();
            self.accum = val & ((1u64 << rest) - 1);
            self.accum_bits = rest;
        }
        if self.accum_bits >= 8 {
            self.flush_to_buf();
        }
    }

    /// Writes an n-bit unsigned field (EXI 7.1.9).
    ///
    /// Bit-packed: exactly `n` bits. Aligned: `ceil(n/8)` bytes, least significant
    /// byte first. `n == 0` writes nothing in either layout.
    pub fn write_n_bit(&mut self, val: u64, n: u8) {
        if n == 0 {
            return;
        }
        if self.aligned {
            let bytes = n.div_ceil(8);
            for i in 0..bytes {
                self.write_byte((val >> (8 * u32::from(i))) as u8);
            }
        } else {
            self.write_bits(val, n);
        }
    }

    /// Writes a one-bit flag (a whole byte when aligned).
    pub fn write_flag(&mut self, val: bool) {
        self.write_n_bit(u64::from(val), 1);
    }

    /// Writes one octet. Octets are never widened, only their start is unconstrained
    /// in bit-packed mode.
    #[inline(always)]
    pub fn write_byte(&mut self, val: u8) {
        if self.accum_bits == 0 {
            self.buf.push(val);
        } else {
            self.write_bits(u64::from(val), 8);
        }
    }

    /// Writes a run of octets.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.accum_bits == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(u64::from(b), 8);
            }
        }
    }

    /// Pads with zero bits up to the next byte boundary. No-op if already aligned.
    pub fn align_to_byte(&mut self) {
        if self.accum_bits > 0 {
            self.buf.push((self.accum << (8 - self.accum_bits)) as u8);
            self.accum = 0;
            self.accum_bits = 0;
        }
    }

    /// Number of bits written so far.
    pub fn bit_position(&self) -> usize {
        self.buf.len() * 8 + self.accum_bits as usize
    }

    /// Number of complete bytes in the buffer.
    pub fn buf_len(&self) -> usize {
        self.buf.len()
    }

    /// Pads the final partial byte with zeros and returns the buffer.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.buf
    }
}

/// Reads individual bits from an owned byte buffer, MSB first.
///
/// Der Reader besitzt seine Daten, damit der Decoder inflatierte Channel-Blöcke
/// ohne Lifetime-Akrobatik austauschen kann.
#[derive(Debug, Clone, Default)]
pub struct BitReader {
    data: Vec<u8>,
    /// Bit-Position des nächsten ungelesenen Bits.
    pos: usize,
    aligned: bool,
}

impl BitReader {
    /// Creates a bit-packed reader over `data`.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), pos: 0, aligned: false }
    }

    /// Creates a reader that expects every field rounded to whole bytes.
    pub fn byte_aligned(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into(), pos: 0, aligned: true }
    }

    pub fn is_aligned(&self) -> bool {
        self.aligned
    }

    pub fn set_aligned(&mut self, aligned: bool) {
        self.aligned = aligned;
    }

    fn total_bits(&self) -> usize {
        self.data.len() * 8
    }

    /// Bits not yet consumed.
    pub fn remaining_bits(&self) -> usize {
        self.total_bits().saturating_sub(self.pos)
    }

    /// Reads `n` raw bits, MSB first, ignoring the alignment flag.
    ///
    /// Fails with [`Error::TruncatedStream`] without consuming anything when fewer
    /// than `n` bits remain.
    pub fn read_bits(&mut self, n: u8) -> Result<u64> {
        debug_assert!(n <= 64, "bit count must be 0..=64, got {n}");
        if n == 0 {
            return Ok(0);
        }
        if usize::from(n) > self.remaining_bits() {
            return Err(Error::TruncatedStream);
        }
        let mut val = 0u64;
        let mut left = n;
        while left > 0 {
            let byte = self.data[self.pos / 8];
            let bit_off = (self.pos % 8) as u8;
            let avail = 8 - bit_off;
            let take = avail.min(left);
            let shifted = (byte >> (avail - take)) & (((1u16 << take) - 1) as u8);
            val = (val << take) | u64::from(shifted);
            self.pos += usize::from(take);
            left -= take;
        }
        Ok(val)
    }

    /// Reads an n-bit unsigned field (EXI 7.1.9), mirror of [`BitWriter::write_n_bit`].
    pub fn read_n_bit(&mut self, n: u8) -> Result<u64> {
        if n == 0 {
            return Ok(0);
        }
        if self.aligned {
            let bytes = n.div_ceil(8);
            let mut val = 0u64;
            for i in 0..bytes {
                val |= u64::from(self.read_byte()?) << (8 * u32::from(i));
            }
            Ok(val)
        } else {
            self.read_bits(n)
        }
    }

    /// Reads a one-bit flag (a whole byte when aligned).
    pub fn read_flag(&mut self) -> Result<bool> {
        Ok(self.read_n_bit(1)? != 0)
    }

    /// Reads one octet.
    #[inline]
    pub fn read_byte(&mut self) -> Result<u8> {
        if self.pos % 8 == 0 {
            let idx = self.pos / 8;
            let b = *self.data.get(idx).ok_or(Error::TruncatedStream)?;
            self.pos += 8;
            Ok(b)
        } else {
            Ok(self.read_bits(8)? as u8)
        }
    }

    /// Reads `len` octets.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len.saturating_mul(8) > self.remaining_bits() {
            return Err(Error::TruncatedStream);
        }
        if self.pos % 8 == 0 {
            let start = self.pos / 8;
            self.pos += len * 8;
            return Ok(self.data[start..start + len].to_vec());
        }
        (0..len).map(|_| self.read_byte()).collect()
    }

    /// Skips unread bits up to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        let rem = self.pos % 8;
        if rem != 0 {
            self.pos = (self.pos + 8 - rem).min(self.total_bits());
        }
    }

    /// Current bit position.
    pub fn bit_position(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_bits_roundtrip_across_bytes() {
        let mut w = BitWriter::new();
        w.write_bits(0b101, 3);
        w.write_bits(0x1FF, 9);
        w.write_bits(1, 1);
        assert_eq!(w.bit_position(), 13);
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(r.read_bits(3).unwrap(), 0b101);
        assert_eq!(r.read_bits(9).unwrap(), 0x1FF);
        assert_eq!(r.read_bits(1).unwrap(), 1);
    }

    #[test]
    fn msb_first_layout() {
        let mut w = BitWriter::new();
        w.write_bits(1, 1);
        w.write_bits(0, 1);
        w.write_bits(1, 1);
        assert_eq!(w.into_vec(), vec![0b1010_0000]);
    }

    #[test]
    fn sixty_four_bits_unaligned() {
        let mut w = BitWriter::new();
        w.write_bits(1, 3);
        w.write_bits(u64::MAX - 5, 64);
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(r.read_bits(3).unwrap(), 1);
        assert_eq!(r.read_bits(64).unwrap(), u64::MAX - 5);
    }

    #[test]
    fn aligned_n_bit_uses_lsb_first_bytes() {
        let mut w = BitWriter::byte_aligned();
        w.write_n_bit(0x1234, 9);
        // 9 Bits → 2 Bytes, LSB zuerst
        assert_eq!(w.into_vec(), vec![0x34, 0x12]);
    }

    #[test]
    fn aligned_zero_width_writes_nothing() {
        let mut w = BitWriter::byte_aligned();
        w.write_n_bit(0, 0);
        assert_eq!(w.bit_position(), 0);
    }

    #[test]
    fn aligned_flag_is_one_byte() {
        let mut w = BitWriter::byte_aligned();
        w.write_flag(true);
        w.write_flag(false);
        let bytes = w.into_vec();
        assert_eq!(bytes, vec![1, 0]);
        let mut r = BitReader::byte_aligned(bytes);
        assert!(r.read_flag().unwrap());
        assert!(!r.read_flag().unwrap());
    }

    #[test]
    fn read_past_end_is_truncated() {
        let mut r = BitReader::new(vec![0xFF]);
        assert_eq!(r.read_bits(4).unwrap(), 0xF);
        assert_eq!(r.read_bits(5), Err(Error::TruncatedStream));
        // Fehler konsumiert nichts
        assert_eq!(r.read_bits(4).unwrap(), 0xF);
        assert_eq!(r.read_byte(), Err(Error::TruncatedStream));
    }

    #[test]
    fn align_skips_partial_byte() {
        let mut r = BitReader::new(vec![0b1000_0000, 0xAB]);
        assert!(r.read_bits(1).unwrap() == 1);
        r.align_to_byte();
        assert_eq!(r.read_byte().unwrap(), 0xAB);
    }

    #[test]
    fn unaligned_bytes_roundtrip() {
        let mut w = BitWriter::new();
        w.write_bits(1, 1);
        w.write_bytes(&[0xDE, 0xAD]);
        let mut r = BitReader::new(w.into_vec());
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bytes(2).unwrap(), vec![0xDE, 0xAD]);
    }
}

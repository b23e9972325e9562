//! Bitbreiten fuer n-bit Felder (EXI 6.2, 7.1.9, 7.3).
//!
//! `⌈log₂(n)⌉`: so viele Bits braucht ein Index in eine Menge von `n`
//! Alternativen. Event-Code-Teile, Enumerationen, String-Table-Indizes und
//! beschraenkte Integer teilen sich diese Rechnung.

/// Bits fuer `n` unterschiedliche Werte. 0 und 1 brauchen kein Bit.
#[inline]
pub fn for_count(n: usize) -> u8 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()) as u8
    }
}

/// Bits fuer einen Bereich `0..=max` (beschraenkte Integer, EXI 7.1.5).
#[inline]
pub fn for_range(max: u64) -> u8 {
    (u64::BITS - max.leading_zeros()) as u8
}

/// Bytes, die ein n-bit Feld im byte-ausgerichteten Modus belegt.
#[inline]
pub fn aligned_bytes(bits: u8) -> usize {
    (bits as usize).div_ceil(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grundwerte() {
        assert_eq!(for_count(0), 0);
        assert_eq!(for_count(1), 0);
        assert_eq!(for_count(2), 1);
        assert_eq!(for_count(3), 2);
        assert_eq!(for_count(4), 2);
        assert_eq!(for_count(5), 3);
        assert_eq!(for_count(9), 4);
        assert_eq!(for_count(257), 9);
    }

    #[test]
    fn bereich() {
        assert_eq!(for_range(0), 0);
        assert_eq!(for_range(1), 1);
        assert_eq!(for_range(4095), 12);
        assert_eq!(for_range(4096), 13);
        for n in 1..=600u64 {
            assert_eq!(for_range(n - 1), for_count(n as usize));
        }
    }

    #[test]
    fn ausgerichtet() {
        assert_eq!(aligned_bytes(0), 0);
        assert_eq!(aligned_bytes(1), 1);
        assert_eq!(aligned_bytes(8), 1);
        assert_eq!(aligned_bytes(9), 2);
    }
}

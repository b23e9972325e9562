//! Event Codes (EXI 6.1, 6.2).
//!
//! Ein Event Code besteht aus 1-3 Teilen, einer pro Katalog-Stufe. Jeder Teil
//! ist ein n-bit unsigned integer; n haengt von der Zahl der Geschwister ab:
//!
//! - Part 1: alle Eintraege der ersten Stufe, +1 wenn es tiefere Stufen gibt
//! - Part 2: Eintraege der zweiten Stufe, +1 wenn es eine dritte gibt
//! - Part 3: Eintraege der dritten Stufe
//!
//! Byte-ausgerichtete Modi runden jeden Teil auf ganze Bytes; das erledigt
//! [`BitWriter::write_n_bit`].

use std::fmt;

use crate::bit_width;
use crate::bitstream::{BitReader, BitWriter};
use crate::event_types::EventTypeList;
use crate::{Error, Result};

/// Ein Event Code mit 1-3 Teilen ("1.3.0" = Teil1=1, Teil2=3, Teil3=0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventCode {
    parts: [u32; 3],
    len: u8,
}

impl EventCode {
    pub fn one(part1: u32) -> Self {
        Self { parts: [part1, 0, 0], len: 1 }
    }

    pub fn two(part1: u32, part2: u32) -> Self {
        Self { parts: [part1, part2, 0], len: 2 }
    }

    pub fn three(part1: u32, part2: u32, part3: u32) -> Self {
        Self { parts: [part1, part2, part3], len: 3 }
    }

    /// Anzahl der Teile.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn parts(&self) -> &[u32] {
        &self.parts[..self.len as usize]
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, p) in self.parts().iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{p}")?;
        }
        Ok(())
    }
}

/// Bitbreiten der drei Teile fuer einen Katalog.
pub fn part_widths(list: &EventTypeList) -> [u8; 3] {
    let [n0, n1, n2] = list.tier_len();
    [
        bit_width::for_count(n0 + usize::from(n1 + n2 > 0)),
        bit_width::for_count(n1 + usize::from(n2 > 0)),
        bit_width::for_count(n2),
    ]
}

/// Writes the event code of the entry at `ordinal`.
pub fn write(w: &mut BitWriter, list: &EventTypeList, ordinal: usize) -> Result<()> {
    let code = list
        .code(ordinal)
        .ok_or_else(|| Error::invalid_event_code(ordinal.to_string(), list.key().to_string()))?;
    let widths = part_widths(list);
    for (part, width) in code.parts().iter().zip(widths) {
        w.write_n_bit(u64::from(*part), width);
    }
    Ok(())
}

/// Reads an event code and returns the ordinal of the addressed entry.
pub fn read(r: &mut BitReader, list: &EventTypeList) -> Result<usize> {
    let [n0, n1, n2] = list.tier_len();
    let [w0, w1, w2] = part_widths(list);
    let invalid = |code: String| Error::invalid_event_code(code, list.key().to_string());

    let p0 = r.read_n_bit(w0)? as usize;
    if p0 < n0 {
        return Ok(p0);
    }
    if p0 > n0 || n1 + n2 == 0 {
        return Err(invalid(p0.to_string()));
    }
    let p1 = r.read_n_bit(w1)? as usize;
    if p1 < n1 {
        return Ok(n0 + p1);
    }
    if p1 > n1 || n2 == 0 {
        return Err(invalid(format!("{p0}.{p1}")));
    }
    let p2 = r.read_n_bit(w2)? as usize;
    if p2 < n2 {
        return Ok(n0 + n1 + p2);
    }
    Err(invalid(format!("{p0}.{p1}.{p2}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types::{CatalogKey, GrammarRef};
    use crate::grammar::{EventShape, Next, Production};

    fn list(n: [usize; 3]) -> EventTypeList {
        let make = |k: usize| vec![Production::new(EventShape::CharactersUntyped, Next::State(0)); k];
        EventTypeList::from_tiers(
            CatalogKey { grammar: GrammarRef::Fragment, state: 0 },
            [make(n[0]), make(n[1]), make(n[2])],
        )
    }

    #[test]
    fn anzeige() {
        assert_eq!(EventCode::one(4).to_string(), "4");
        assert_eq!(EventCode::three(2, 1, 0).to_string(), "2.1.0");
    }

    #[test]
    fn breiten() {
        // 3 deklarierte + Escape = 4 Werte, 2 undeklarierte + Escape = 3, 2 CM/PI
        assert_eq!(part_widths(&list([3, 2, 2])), [2, 2, 1]);
        assert_eq!(part_widths(&list([1, 0, 0])), [0, 0, 0]);
        assert_eq!(part_widths(&list([2, 0, 0])), [1, 0, 0]);
    }

    #[test]
    fn alle_ordinals_bitgepackt() {
        let l = list([3, 2, 2]);
        let mut w = BitWriter::new();
        for ord in 0..l.len() {
            write(&mut w, &l, ord).unwrap();
        }
        let mut r = BitReader::new(w.into_vec());
        for ord in 0..l.len() {
            assert_eq!(read(&mut r, &l).unwrap(), ord);
        }
    }

    #[test]
    fn byte_ausgerichtet() {
        let l = list([3, 2, 2]);
        let mut w = BitWriter::byte_aligned();
        write(&mut w, &l, 6).unwrap();
        // drei Teile, je ein Byte
        assert_eq!(w.into_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn einziger_eintrag_braucht_keine_bits() {
        let l = list([1, 0, 0]);
        let mut w = BitWriter::new();
        write(&mut w, &l, 0).unwrap();
        assert_eq!(w.bit_position(), 0);
    }

    #[test]
    fn ungueltiger_code() {
        let l = list([3, 0, 0]);
        // 2 Bits, Wert 3 ist kein Eintrag
        let mut r = BitReader::new(vec![0b1100_0000]);
        assert!(matches!(read(&mut r, &l), Err(Error::InvalidEventCode { .. })));
    }
}

//! xs:duration encoding.
//!
//! Layout: sign flag, then years, months, days, hours, minutes and whole
//! seconds as unsigned integers, then fractional seconds as presence flag plus
//! reversed digits. Before encoding, seconds carry into minutes and minutes
//! into hours. Hours never carry into days and days never into months, since
//! those units have no fixed ratio.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, boolean, unsigned_integer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Duration {
    pub negative: bool,
    pub years: u64,
    pub months: u64,
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
    pub seconds: u64,
    /// Digits after the decimal point of the seconds, trailing zeros stripped.
    pub fraction: String,
}

impl Duration {
    /// Parses `-?PnYnMnDTnHnMn.nS`. The result is already normalised.
    pub fn parse(text: &str) -> Option<Self> {
        let t = text.trim();
        let (negative, rest) = match t.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, t),
        };
        let rest = rest.strip_prefix('P')?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => {
                if t.is_empty() {
                    return None;
                }
                (d, Some(t))
            }
            None => (rest, None),
        };
        let mut d = Self { negative, ..Self::default() };
        let mut seen = false;
        let mut order = 0;
        for (value, unit) in components(date_part)? {
            let slot = match unit {
                'Y' => 1,
                'M' => 2,
                'D' => 3,
                _ => return None,
            };
            if slot <= order || value.contains('.') {
                return None;
            }
            order = slot;
            let v: u64 = value.parse().ok()?;
            match unit {
                'Y' => d.years = v,
                'M' => d.months = v,
                _ => d.days = v,
            }
            seen = true;
        }
        if let Some(time) = time_part {
            let mut order = 0;
            for (value, unit) in components(time)? {
                let slot = match unit {
                    'H' => 1,
                    'M' => 2,
                    'S' => 3,
                    _ => return None,
                };
                if slot <= order || (unit != 'S' && value.contains('.')) {
                    return None;
                }
                order = slot;
                match unit {
                    'H' => d.hours = value.parse().ok()?,
                    'M' => d.minutes = value.parse().ok()?,
                    _ => {
                        let (whole, frac) = value.split_once('.').unwrap_or((value, ""));
                        if whole.is_empty() || (value.contains('.') && frac.is_empty()) {
                            return None;
                        }
                        d.seconds = whole.parse().ok()?;
                        if !frac.bytes().all(|b| b.is_ascii_digit()) {
                            return None;
                        }
                        d.fraction = frac.trim_end_matches('0').to_string();
                    }
                }
                seen = true;
            }
        }
        if !seen {
            return None;
        }
        d.normalize()?;
        Some(d)
    }

    /// Carries seconds into minutes and minutes into hours.
    fn normalize(&mut self) -> Option<()> {
        self.minutes = self.minutes.checked_add(self.seconds / 60)?;
        self.seconds %= 60;
        self.hours = self.hours.checked_add(self.minutes / 60)?;
        self.minutes %= 60;
        if self.is_zero() {
            self.negative = false;
        }
        Some(())
    }

    fn is_zero(&self) -> bool {
        self.years == 0
            && self.months == 0
            && self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
            && self.fraction.is_empty()
    }

    /// Canonical lexical form, `PT0S` for the zero duration.
    pub fn to_lexical(&self) -> String {
        if self.is_zero() {
            return "PT0S".to_string();
        }
        let mut out = String::new();
        if self.negative {
            out.push('-');
        }
        out.push('P');
        for (v, unit) in [(self.years, 'Y'), (self.months, 'M'), (self.days, 'D')] {
            if v != 0 {
                out.push_str(&format!("{v}{unit}"));
            }
        }
        let has_seconds = self.seconds != 0 || !self.fraction.is_empty();
        if self.hours != 0 || self.minutes != 0 || has_seconds {
            out.push('T');
            if self.hours != 0 {
                out.push_str(&format!("{}H", self.hours));
            }
            if self.minutes != 0 {
                out.push_str(&format!("{}M", self.minutes));
            }
            if has_seconds {
                out.push_str(&self.seconds.to_string());
                if !self.fraction.is_empty() {
                    out.push('.');
                    out.push_str(&self.fraction);
                }
                out.push('S');
            }
        }
        out
    }
}

/// Zerlegt "12Y3M" in [("12",'Y'), ("3",'M')].
fn components(s: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c.is_ascii_alphabetic() {
            let value = &s[start..i];
            if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
                return None;
            }
            out.push((value, c));
            start = i + 1;
        }
    }
    if start != s.len() {
        return None;
    }
    Some(out)
}

pub fn encode(writer: &mut BitWriter, value: &Duration) -> Result<()> {
    boolean::encode(writer, value.negative);
    for v in [value.years, value.months, value.days, value.hours, value.minutes, value.seconds] {
        unsigned_integer::encode(writer, v);
    }
    writer.write_flag(!value.fraction.is_empty());
    if !value.fraction.is_empty() {
        let reversed: String = value.fraction.chars().rev().collect();
        unsigned_integer::encode_digits(writer, &reversed)?;
    }
    Ok(())
}

pub fn decode(reader: &mut BitReader) -> Result<Duration> {
    let negative = boolean::decode(reader)?;
    let mut parts = [0u64; 6];
    for slot in parts.iter_mut() {
        *slot = unsigned_integer::decode(reader)?;
    }
    let [years, months, days, hours, minutes, seconds] = parts;
    if minutes >= 60 || seconds >= 60 {
        return Err(Error::malformed_value("duration minutes/seconds not normalised"));
    }
    let fraction = if reader.read_flag()? {
        let reversed = unsigned_integer::decode_digits(reader)?;
        reversed.chars().rev().collect::<String>().trim_end_matches('0').to_string()
    } else {
        String::new()
    };
    Ok(Duration { negative, years, months, days, hours, minutes, seconds, fraction })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) -> String {
        let d = Duration::parse(text).unwrap_or_else(|| panic!("parse {text}"));
        let mut w = BitWriter::new();
        encode(&mut w, &d).unwrap();
        let mut r = BitReader::new(w.into_vec());
        decode(&mut r).unwrap().to_lexical()
    }

    #[test]
    fn ninety_minutes_carry_into_hours_only() {
        assert_eq!(round_trip("PT90M"), "PT1H30M");
        assert_eq!(round_trip("PT25H"), "PT25H");
        assert_eq!(round_trip("PT3600S"), "PT1H");
    }

    #[test]
    fn days_do_not_carry_into_months() {
        assert_eq!(round_trip("P45D"), "P45D");
        assert_eq!(round_trip("P1Y14M"), "P1Y14M");
    }

    #[test]
    fn negative_and_fraction() {
        assert_eq!(round_trip("-P1DT2.50S"), "-P1DT2.5S");
        assert_eq!(round_trip("PT0.05S"), "PT0.05S");
        assert_eq!(round_trip("-PT0S"), "PT0S");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["P", "PT", "P1H", "PT1D", "P1M1Y", "1Y", "P1.5Y", "PT1.S"] {
            assert!(Duration::parse(bad).is_none(), "{bad}");
        }
    }
}

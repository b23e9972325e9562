//! Date-time family encoding (EXI 7.1.8).
//!
//! Each kind writes the subset of components it carries, in this order:
//! Year (signed offset from 2000), MonthDay (9-bit `month*32+day`),
//! Time (17-bit `(h*64+m)*64+s`), fractional seconds (presence flag + digits
//! reversed as unsigned integer), timezone (presence flag + 11-bit
//! `h*64+m+896`). Timezone offsets are kept as written, never rebased.

use crate::bitstream::{BitReader, BitWriter};
use crate::{Error, Result, integer, unsigned_integer};

const YEAR_OFFSET: i64 = 2000;
const MONTHDAY_BITS: u8 = 9;
const TIME_BITS: u8 = 17;
const TZ_BITS: u8 = 11;
const TZ_BIAS: i64 = 896;

/// Which XSD date/time type a value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeKind {
    DateTime,
    Date,
    Time,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
}

impl DateTimeKind {
    fn has_year(self) -> bool {
        matches!(self, Self::DateTime | Self::Date | Self::GYearMonth | Self::GYear)
    }

    fn has_month_day(self) -> bool {
        !matches!(self, Self::Time | Self::GYear)
    }

    fn has_time(self) -> bool {
        matches!(self, Self::DateTime | Self::Time)
    }
}

/// A parsed date/time value. Components a kind does not carry stay zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateTime {
    pub kind: DateTimeKind,
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Fraction digits after the decimal point, trailing zeros stripped.
    pub fraction: String,
    /// Offset in minutes, `None` if the lexical form has no timezone.
    pub timezone: Option<i16>,
}

impl DateTime {
    fn empty(kind: DateTimeKind) -> Self {
        Self {
            kind,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fraction: String::new(),
            timezone: None,
        }
    }

    /// Parses the lexical form of `kind`. Returns `None` on any violation.
    pub fn parse(kind: DateTimeKind, text: &str) -> Option<Self> {
        let t = text.trim();
        let (body, timezone) = split_timezone(t)?;
        let mut dt = Self::empty(kind);
        dt.timezone = timezone;
        let rest = match kind {
            DateTimeKind::DateTime => {
                let (date, time) = body.split_once('T')?;
                let r = parse_year(date, &mut dt)?;
                let r = parse_month_day(r, &mut dt, true)?;
                if !r.is_empty() {
                    return None;
                }
                parse_time(time, &mut dt)?
            }
            DateTimeKind::Date => {
                let r = parse_year(body, &mut dt)?;
                parse_month_day(r, &mut dt, true)?
            }
            DateTimeKind::Time => parse_time(body, &mut dt)?,
            DateTimeKind::GYearMonth => {
                let r = parse_year(body, &mut dt)?;
                parse_month_day(r, &mut dt, false)?
            }
            DateTimeKind::GYear => parse_year(body, &mut dt)?,
            DateTimeKind::GMonthDay => {
                let r = body.strip_prefix("-")?;
                parse_month_day(r, &mut dt, true)?
            }
            DateTimeKind::GMonth => {
                let r = body.strip_prefix("-")?;
                parse_month_day(r, &mut dt, false)?
            }
            DateTimeKind::GDay => {
                let r = body.strip_prefix("---")?;
                dt.day = two_digits(r)?;
                if !(1..=31).contains(&dt.day) {
                    return None;
                }
                &r[2..]
            }
        };
        if rest.is_empty() { Some(dt) } else { None }
    }

    /// Canonical lexical form.
    pub fn to_lexical(&self) -> String {
        let mut out = String::new();
        let year = if self.year < 0 {
            format!("-{:04}", self.year.unsigned_abs())
        } else {
            format!("{:04}", self.year)
        };
        match self.kind {
            DateTimeKind::DateTime => {
                out.push_str(&format!("{year}-{:02}-{:02}T", self.month, self.day));
                self.push_time(&mut out);
            }
            DateTimeKind::Date => out.push_str(&format!("{year}-{:02}-{:02}", self.month, self.day)),
            DateTimeKind::Time => self.push_time(&mut out),
            DateTimeKind::GYearMonth => out.push_str(&format!("{year}-{:02}", self.month)),
            DateTimeKind::GYear => out.push_str(&year),
            DateTimeKind::GMonthDay => out.push_str(&format!("--{:02}-{:02}", self.month, self.day)),
            DateTimeKind::GDay => out.push_str(&format!("---{:02}", self.day)),
            DateTimeKind::GMonth => out.push_str(&format!("--{:02}", self.month)),
        }
        if let Some(tz) = self.timezone {
            if tz == 0 {
                out.push('Z');
            } else {
                let sign = if tz < 0 { '-' } else { '+' };
                let abs = tz.unsigned_abs();
                out.push_str(&format!("{sign}{:02}:{:02}", abs / 60, abs % 60));
            }
        }
        out
    }

    fn push_time(&self, out: &mut String) {
        out.push_str(&format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second));
        if !self.fraction.is_empty() {
            out.push('.');
            out.push_str(&self.fraction);
        }
    }
}

fn two_digits(s: &str) -> Option<u8> {
    let b = s.as_bytes();
    if b.len() < 2 || !b[0].is_ascii_digit() || !b[1].is_ascii_digit() {
        return None;
    }
    Some((b[0] - b'0') * 10 + (b[1] - b'0'))
}

fn split_timezone(t: &str) -> Option<(&str, Option<i16>)> {
    if let Some(body) = t.strip_suffix('Z') {
        return Some((body, Some(0)));
    }
    // [+-]hh:mm am Ende; Datums-Bindestriche duerfen nicht verwechselt werden
    if t.len() >= 6 {
        let (body, tz) = t.split_at(t.len() - 6);
        let tb = tz.as_bytes();
        if (tb[0] == b'+' || tb[0] == b'-') && tb[3] == b':' {
            let h = two_digits(&tz[1..3])?;
            let m = two_digits(&tz[4..6])?;
            if h > 14 || m > 59 || (h == 14 && m != 0) {
                return None;
            }
            let minutes = i16::from(h) * 60 + i16::from(m);
            return Some((body, Some(if tb[0] == b'-' { -minutes } else { minutes })));
        }
    }
    Some((t, None))
}

/// `-?YYYY+` bis zum naechsten '-' nach der Jahreszahl.
fn parse_year<'a>(s: &'a str, dt: &mut DateTime) -> Option<&'a str> {
    let (negative, digits_start) = if s.starts_with('-') { (true, 1) } else { (false, 0) };
    let body = &s[digits_start..];
    let end = body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len());
    let digits = &body[..end];
    if digits.len() < 4 || (digits.len() > 4 && digits.starts_with('0')) {
        return None;
    }
    let year: i64 = digits.parse().ok()?;
    dt.year = if negative { -year } else { year };
    Some(&body[end..])
}

fn parse_month_day<'a>(s: &'a str, dt: &mut DateTime, with_day: bool) -> Option<&'a str> {
    let r = s.strip_prefix('-')?;
    dt.month = two_digits(r)?;
    if !(1..=12).contains(&dt.month) {
        return None;
    }
    let r = &r[2..];
    if !with_day {
        return Some(r);
    }
    let r = r.strip_prefix('-')?;
    dt.day = two_digits(r)?;
    if !(1..=31).contains(&dt.day) {
        return None;
    }
    Some(&r[2..])
}

fn parse_time<'a>(s: &'a str, dt: &mut DateTime) -> Option<&'a str> {
    let b = s.as_bytes();
    if b.len() < 8 || b[2] != b':' || b[5] != b':' {
        return None;
    }
    dt.hour = two_digits(&s[0..2])?;
    dt.minute = two_digits(&s[3..5])?;
    dt.second = two_digits(&s[6..8])?;
    let mut rest = &s[8..];
    if let Some(frac) = rest.strip_prefix('.') {
        let end = frac.find(|c: char| !c.is_ascii_digit()).unwrap_or(frac.len());
        if end == 0 {
            return None;
        }
        dt.fraction = frac[..end].trim_end_matches('0').to_string();
        rest = &frac[end..];
    }
    let midnight = dt.hour == 24 && dt.minute == 0 && dt.second == 0 && dt.fraction.is_empty();
    if (dt.hour > 23 && !midnight) || dt.minute > 59 || dt.second > 59 {
        return None;
    }
    Some(rest)
}

pub fn encode(writer: &mut BitWriter, value: &DateTime) -> Result<()> {
    let kind = value.kind;
    if kind.has_year() {
        let offset = value.year.checked_sub(YEAR_OFFSET).ok_or(Error::IntegerOverflow)?;
        integer::encode(writer, offset);
    }
    if kind.has_month_day() {
        writer.write_n_bit(u64::from(value.month) * 32 + u64::from(value.day), MONTHDAY_BITS);
    }
    if kind.has_time() {
        let t = (u64::from(value.hour) * 64 + u64::from(value.minute)) * 64 + u64::from(value.second);
        writer.write_n_bit(t, TIME_BITS);
        writer.write_flag(!value.fraction.is_empty());
        if !value.fraction.is_empty() {
            let reversed: String = value.fraction.chars().rev().collect();
            unsigned_integer::encode_digits(writer, &reversed)?;
        }
    }
    writer.write_flag(value.timezone.is_some());
    if let Some(tz) = value.timezone {
        let tz = i64::from(tz);
        let packed = (tz / 60) * 64 + tz % 60 + TZ_BIAS;
        writer.write_n_bit(packed as u64, TZ_BITS);
    }
    Ok(())
}

pub fn decode(reader: &mut BitReader, kind: DateTimeKind) -> Result<DateTime> {
    let mut dt = DateTime::empty(kind);
    if kind.has_year() {
        dt.year = integer::decode(reader)?
            .checked_add(YEAR_OFFSET)
            .ok_or(Error::IntegerOverflow)?;
    }
    if kind.has_month_day() {
        let md = reader.read_n_bit(MONTHDAY_BITS)?;
        dt.month = (md / 32) as u8;
        dt.day = (md % 32) as u8;
        if dt.month > 12 {
            return Err(Error::malformed_value(format!("month {} out of range", dt.month)));
        }
    }
    if kind.has_time() {
        let t = reader.read_n_bit(TIME_BITS)?;
        dt.second = (t % 64) as u8;
        dt.minute = ((t / 64) % 64) as u8;
        dt.hour = (t / 4096) as u8;
        if dt.hour > 24 || dt.minute > 59 || dt.second > 59 {
            return Err(Error::malformed_value(format!("time component {t} out of range")));
        }
        if reader.read_flag()? {
            let reversed = unsigned_integer::decode_digits(reader)?;
            // fuehrende Nullen der Originalziffern sind in `reversed` Endnullen
            dt.fraction = reversed.chars().rev().collect::<String>();
            dt.fraction = dt.fraction.trim_end_matches('0').to_string();
        }
    }
    if reader.read_flag()? {
        let packed = reader.read_n_bit(TZ_BITS)? as i64 - TZ_BIAS;
        let minutes = (packed / 64) * 60 + packed % 64;
        if minutes.abs() > 14 * 60 {
            return Err(Error::malformed_value(format!("timezone offset {minutes} out of range")));
        }
        dt.timezone = Some(minutes as i16);
    }
    Ok(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(kind: DateTimeKind, text: &str) -> String {
        let dt = DateTime::parse(kind, text).unwrap_or_else(|| panic!("parse {text}"));
        let mut w = BitWriter::new();
        encode(&mut w, &dt).unwrap();
        let mut r = BitReader::new(w.into_vec());
        decode(&mut r, kind).unwrap().to_lexical()
    }

    #[test]
    fn date_time_keeps_offset() {
        assert_eq!(
            round_trip(DateTimeKind::DateTime, "2003-03-19T12:20:00-06:00"),
            "2003-03-19T12:20:00-06:00"
        );
        assert_eq!(
            round_trip(DateTimeKind::DateTime, "2003-03-19T12:20:00+00:00"),
            "2003-03-19T12:20:00Z"
        );
    }

    #[test]
    fn fraction_leading_zeros_survive() {
        assert_eq!(round_trip(DateTimeKind::Time, "12:00:00.0500"), "12:00:00.05");
        assert_eq!(round_trip(DateTimeKind::Time, "12:00:00.000"), "12:00:00");
    }

    #[test]
    fn g_kinds() {
        assert_eq!(round_trip(DateTimeKind::GYear, "1999"), "1999");
        assert_eq!(round_trip(DateTimeKind::GYear, "-0044"), "-0044");
        assert_eq!(round_trip(DateTimeKind::GYearMonth, "2024-02Z"), "2024-02Z");
        assert_eq!(round_trip(DateTimeKind::GMonthDay, "--12-25"), "--12-25");
        assert_eq!(round_trip(DateTimeKind::GMonth, "--07"), "--07");
        assert_eq!(round_trip(DateTimeKind::GDay, "---31+05:30"), "---31+05:30");
        assert_eq!(round_trip(DateTimeKind::Date, "2001-10-26-05:30"), "2001-10-26-05:30");
    }

    #[test]
    fn timezone_packing() {
        let dt = DateTime::parse(DateTimeKind::GDay, "---01-06:00").unwrap();
        let mut w = BitWriter::new();
        encode(&mut w, &dt).unwrap();
        let mut r = BitReader::new(w.into_vec());
        r.read_n_bit(MONTHDAY_BITS).unwrap();
        assert!(r.read_flag().unwrap());
        // -6*64 + 896
        assert_eq!(r.read_n_bit(TZ_BITS).unwrap(), 512);
    }

    #[test]
    fn rejects_invalid() {
        assert!(DateTime::parse(DateTimeKind::Date, "2001-13-01").is_none());
        assert!(DateTime::parse(DateTimeKind::Time, "25:00:00").is_none());
        assert!(DateTime::parse(DateTimeKind::DateTime, "2001-01-01").is_none());
        assert!(DateTime::parse(DateTimeKind::GYear, "99").is_none());
        assert!(DateTime::parse(DateTimeKind::Time, "10:00:00+15:00").is_none());
    }

    #[test]
    fn end_of_day() {
        assert_eq!(round_trip(DateTimeKind::Time, "24:00:00"), "24:00:00");
    }
}

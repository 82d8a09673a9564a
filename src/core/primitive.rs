//! Wire primitive types with exact-precision encoding rules.
//!
//! MS-PSRP dates and durations carry hundred-nanosecond (tick) precision.
//! [`PsDuration`] stores ticks directly; [`PsDateTime`] rides on chrono's
//! nanosecond-precision types, so both round-trip the full 7-digit
//! fraction the wire format allows.

use crate::error::{PsrpError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Timelike};
use std::fmt;
use std::str::FromStr;

/// Hundred-nanosecond ticks per second, the protocol's base resolution.
pub const TICKS_PER_SECOND: i64 = 10_000_000;
const TICKS_PER_MINUTE: i64 = 60 * TICKS_PER_SECOND;
const TICKS_PER_HOUR: i64 = 60 * TICKS_PER_MINUTE;
const TICKS_PER_DAY: i64 = 24 * TICKS_PER_HOUR;

/// A point in time with tick precision and an optional UTC offset.
///
/// An absent offset mirrors a .NET `DateTimeKind.Unspecified` value and
/// round-trips as such; a zero offset formats as `Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsDateTime {
    naive: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl PsDateTime {
    pub fn new(naive: NaiveDateTime) -> Self {
        Self {
            naive,
            offset: None,
        }
    }

    pub fn with_offset(naive: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            naive,
            offset: Some(offset),
        }
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.naive
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Sub-second portion in ticks (0..10_000_000).
    pub fn subsec_ticks(&self) -> u32 {
        self.naive.nanosecond() / 100
    }
}

impl From<DateTime<FixedOffset>> for PsDateTime {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::with_offset(value.naive_local(), *value.offset())
    }
}

impl fmt::Display for PsDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:07}",
            self.naive.format("%Y-%m-%dT%H:%M:%S"),
            self.subsec_ticks()
        )?;

        match self.offset {
            None => Ok(()),
            Some(offset) => {
                let secs = offset.local_minus_utc();
                if secs == 0 {
                    write!(f, "Z")
                } else {
                    let sign = if secs < 0 { '-' } else { '+' };
                    let abs = secs.unsigned_abs();
                    write!(f, "{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
                }
            }
        }
    }
}

impl FromStr for PsDateTime {
    type Err = PsrpError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || PsrpError::parse("DateTime", s);

        let (body, offset) = split_offset(s).ok_or_else(err)?;
        let (main, frac_ticks) = split_fraction(body, s)?;

        let naive = NaiveDateTime::parse_from_str(main, "%Y-%m-%dT%H:%M:%S")
            .map_err(|_| err())?
            .with_nanosecond(frac_ticks * 100)
            .ok_or_else(err)?;

        Ok(Self { naive, offset })
    }
}

/// Split a trailing `Z` or `±hh:mm` offset off a date-time literal.
fn split_offset(s: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(body) = s.strip_suffix('Z') {
        return Some((body, Some(FixedOffset::east_opt(0)?)));
    }

    // An offset can only follow the time portion, so search after 'T' to
    // leave the date separators alone.
    let t_pos = s.find('T')?;
    if let Some(rel) = s[t_pos..].rfind(['+', '-']) {
        let split = t_pos + rel;
        let tail = &s[split..];
        if tail.len() == 6 && tail.as_bytes()[3] == b':' {
            let sign: i32 = if tail.starts_with('-') { -1 } else { 1 };
            let hours: i32 = tail[1..3].parse().ok()?;
            let minutes: i32 = tail[4..6].parse().ok()?;
            let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
            return Some((&s[..split], Some(offset)));
        }
    }

    Some((s, None))
}

/// Split a fractional-seconds suffix into whole part and ticks (0..=7 digits).
fn split_fraction<'a>(body: &'a str, original: &str) -> Result<(&'a str, u32)> {
    match body.find('.') {
        None => Ok((body, 0)),
        Some(dot) => {
            let digits = &body[dot + 1..];
            if digits.is_empty()
                || digits.len() > 7
                || !digits.bytes().all(|b| b.is_ascii_digit())
            {
                return Err(PsrpError::parse("DateTime", original));
            }

            let mut padded = digits.to_string();
            while padded.len() < 7 {
                padded.push('0');
            }
            let ticks: u32 = padded
                .parse()
                .map_err(|_| PsrpError::parse("DateTime", original))?;
            Ok((&body[..dot], ticks))
        }
    }
}

/// A signed duration stored as hundred-nanosecond ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PsDuration {
    ticks: i64,
}

impl PsDuration {
    pub fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    pub fn from_days(days: i64) -> Self {
        Self {
            ticks: days * TICKS_PER_DAY,
        }
    }

    pub fn from_secs(secs: i64) -> Self {
        Self {
            ticks: secs * TICKS_PER_SECOND,
        }
    }

    pub fn new(days: i64, hours: i64, minutes: i64, seconds: i64) -> Self {
        Self {
            ticks: days * TICKS_PER_DAY
                + hours * TICKS_PER_HOUR
                + minutes * TICKS_PER_MINUTE
                + seconds * TICKS_PER_SECOND,
        }
    }

    pub fn ticks(&self) -> i64 {
        self.ticks
    }

    pub fn is_negative(&self) -> bool {
        self.ticks < 0
    }

    /// Whole seconds of the magnitude.
    pub fn total_seconds(&self) -> i64 {
        self.ticks.abs() / TICKS_PER_SECOND
    }

    /// Sub-second portion as whole microseconds.
    pub fn subsec_micros(&self) -> i64 {
        (self.ticks.abs() % TICKS_PER_SECOND) / 10
    }

    /// Sub-second portion in nanoseconds (tick resolution, so a multiple
    /// of 100).
    pub fn subsec_nanos(&self) -> i64 {
        (self.ticks.abs() % TICKS_PER_SECOND) * 100
    }
}

impl fmt::Display for PsDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ticks == 0 {
            return write!(f, "PT0S");
        }
        if self.ticks < 0 {
            write!(f, "-")?;
        }

        let mut t = self.ticks.unsigned_abs();
        let days = t / TICKS_PER_DAY as u64;
        t %= TICKS_PER_DAY as u64;
        let hours = t / TICKS_PER_HOUR as u64;
        t %= TICKS_PER_HOUR as u64;
        let minutes = t / TICKS_PER_MINUTE as u64;
        t %= TICKS_PER_MINUTE as u64;
        let seconds = t / TICKS_PER_SECOND as u64;
        let frac = t % TICKS_PER_SECOND as u64;

        write!(f, "P")?;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if hours > 0 || minutes > 0 || seconds > 0 || frac > 0 {
            write!(f, "T")?;
            if hours > 0 {
                write!(f, "{hours}H")?;
            }
            if minutes > 0 {
                write!(f, "{minutes}M")?;
            }
            if frac > 0 {
                let digits = format!("{frac:07}");
                write!(f, "{seconds}.{}S", digits.trim_end_matches('0'))?;
            } else if seconds > 0 {
                write!(f, "{seconds}S")?;
            }
        }

        Ok(())
    }
}

impl FromStr for PsDuration {
    type Err = PsrpError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || PsrpError::parse("Duration", s);

        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let rest = rest.strip_prefix('P').ok_or_else(err)?;

        let chars: Vec<char> = rest.chars().collect();
        let mut i = 0;
        let mut in_time = false;
        let mut last_unit = 0u8; // enforces D < H < M < S ordering
        let mut ticks: i64 = 0;
        let mut saw_component = false;

        while i < chars.len() {
            if chars[i] == 'T' {
                if in_time {
                    return Err(err());
                }
                in_time = true;
                i += 1;
                continue;
            }

            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            if i == start {
                return Err(err());
            }
            let magnitude: i64 = chars[start..i]
                .iter()
                .collect::<String>()
                .parse()
                .map_err(|_| err())?;

            let mut frac_ticks: i64 = 0;
            if i < chars.len() && chars[i] == '.' {
                i += 1;
                let frac_start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let digits: String = chars[frac_start..i].iter().collect();
                if digits.is_empty() || digits.len() > 7 {
                    return Err(err());
                }
                let mut padded = digits;
                while padded.len() < 7 {
                    padded.push('0');
                }
                frac_ticks = padded.parse().map_err(|_| err())?;
                // a fraction is only legal on the seconds component
                if i >= chars.len() || chars[i] != 'S' {
                    return Err(err());
                }
            }

            let unit = chars.get(i).ok_or_else(err)?;
            i += 1;

            let (rank, unit_ticks) = match (unit, in_time) {
                ('D', false) => (1u8, TICKS_PER_DAY),
                ('H', true) => (2, TICKS_PER_HOUR),
                ('M', true) => (3, TICKS_PER_MINUTE),
                ('S', true) => (4, TICKS_PER_SECOND),
                _ => return Err(err()),
            };
            if rank <= last_unit {
                return Err(err());
            }
            last_unit = rank;

            ticks = magnitude
                .checked_mul(unit_ticks)
                .and_then(|t| t.checked_add(ticks))
                .and_then(|t| t.checked_add(frac_ticks))
                .ok_or_else(err)?;
            saw_component = true;
        }

        if !saw_component {
            return Err(err());
        }

        Ok(Self {
            ticks: if negative { -ticks } else { ticks },
        })
    }
}

/// A .NET `System.Version`: 2 to 4 dotted components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PsVersion {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl PsVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }

    pub fn with_build(major: u32, minor: u32, build: u32) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: None,
        }
    }

    pub fn with_revision(major: u32, minor: u32, build: u32, revision: u32) -> Self {
        Self {
            major,
            minor,
            build: Some(build),
            revision: Some(revision),
        }
    }
}

impl fmt::Display for PsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{build}")?;
            if let Some(revision) = self.revision {
                write!(f, ".{revision}")?;
            }
        }
        Ok(())
    }
}

impl FromStr for PsVersion {
    type Err = PsrpError;

    fn from_str(s: &str) -> Result<Self> {
        let err = || PsrpError::parse("Version", s);

        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(err());
        }

        let numbers = parts
            .iter()
            .map(|p| p.parse::<u32>().map_err(|_| err()))
            .collect::<Result<Vec<u32>>>()?;
        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            build: numbers.get(2).copied(),
            revision: numbers.get(3).copied(),
        })
    }
}

/// A 128-bit decimal carried as its literal wire text.
///
/// Rust has no native decimal type; the literal is validated on entry and
/// preserved verbatim so precision survives a round-trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PsDecimal(String);

impl PsDecimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PsDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PsDecimal {
    type Err = PsrpError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s.strip_prefix('-').unwrap_or(s);
        let valid = match body.split_once('.') {
            None => !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()),
            Some((int, frac)) => {
                !int.is_empty()
                    && !frac.is_empty()
                    && int.bytes().all(|b| b.is_ascii_digit())
                    && frac.bytes().all(|b| b.is_ascii_digit())
            }
        };

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(PsrpError::parse("Decimal", s))
        }
    }
}

impl From<i64> for PsDecimal {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A string whose wire form must always be encrypted.
///
/// The plaintext only ever exists in memory; serialization refuses to emit
/// it without a [`crate::utils::crypto::CryptoProvider`].
#[derive(Clone, PartialEq, Eq)]
pub struct PsSecureString(String);

impl PsSecureString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PsSecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PsSecureString(****)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_one_day() {
        assert_eq!(PsDuration::from_days(1).to_string(), "P1D");
        assert_eq!("P1D".parse::<PsDuration>().unwrap(), PsDuration::from_days(1));
    }

    #[test]
    fn test_duration_zero() {
        assert_eq!(PsDuration::from_ticks(0).to_string(), "PT0S");
        assert_eq!("PT0S".parse::<PsDuration>().unwrap().ticks(), 0);
    }

    #[test]
    fn test_duration_subsecond_decomposition() {
        let d: PsDuration = "PT9.0269026S".parse().unwrap();
        assert_eq!(d.ticks(), 90_269_026);
        assert_eq!(d.total_seconds(), 9);
        assert_eq!(d.subsec_micros(), 26_902);
        assert_eq!(d.subsec_nanos(), 26_902_600);
        assert_eq!(d.to_string(), "PT9.0269026S");
    }

    #[test]
    fn test_duration_full_grammar() {
        let d: PsDuration = "P2DT3H4M5.5S".parse().unwrap();
        assert_eq!(d, PsDuration::from_ticks(
            2 * TICKS_PER_DAY + 3 * TICKS_PER_HOUR + 4 * TICKS_PER_MINUTE
                + 5 * TICKS_PER_SECOND + 5_000_000,
        ));
        assert_eq!(d.to_string(), "P2DT3H4M5.5S");
    }

    #[test]
    fn test_duration_negative() {
        let d: PsDuration = "-PT1H".parse().unwrap();
        assert!(d.is_negative());
        assert_eq!(d.to_string(), "-PT1H");
    }

    #[test]
    fn test_duration_rejects_bad_literals() {
        for bad in ["", "P", "PT", "1D", "P1H", "PT1D", "PT1M1H", "PT1.12345678S", "P1.5D"] {
            assert!(bad.parse::<PsDuration>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_datetime_format_seven_digits() {
        let dt: PsDateTime = "2008-04-11T10:42:32.2731993-07:00".parse().unwrap();
        assert_eq!(dt.subsec_ticks(), 2_731_993);
        assert_eq!(dt.to_string(), "2008-04-11T10:42:32.2731993-07:00");
    }

    #[test]
    fn test_datetime_offset_variants() {
        let zulu: PsDateTime = "2024-01-02T03:04:05Z".parse().unwrap();
        assert_eq!(zulu.offset().map(|o| o.local_minus_utc()), Some(0));
        assert_eq!(zulu.to_string(), "2024-01-02T03:04:05.0000000Z");

        let unspecified: PsDateTime = "2024-01-02T03:04:05.5".parse().unwrap();
        assert!(unspecified.offset().is_none());
        assert_eq!(unspecified.to_string(), "2024-01-02T03:04:05.5000000");
    }

    #[test]
    fn test_datetime_rejects_bad_literals() {
        for bad in ["", "2024-01-02", "2024-01-02T25:00:00", "2024-01-02T03:04:05.12345678"] {
            assert!(bad.parse::<PsDateTime>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_version_roundtrip() {
        let v: PsVersion = "5.1.17763".parse().unwrap();
        assert_eq!(v, PsVersion::with_build(5, 1, 17763));
        assert_eq!(v.to_string(), "5.1.17763");

        assert!("5".parse::<PsVersion>().is_err());
        assert!("1.2.3.4.5".parse::<PsVersion>().is_err());
    }

    #[test]
    fn test_decimal_validation() {
        assert!("-12.5".parse::<PsDecimal>().is_ok());
        assert!("0".parse::<PsDecimal>().is_ok());
        assert!("1.".parse::<PsDecimal>().is_err());
        assert!("abc".parse::<PsDecimal>().is_err());
    }

    #[test]
    fn test_secure_string_debug_redacts() {
        let s = PsSecureString::new("hunter2");
        assert_eq!(format!("{s:?}"), "PsSecureString(****)");
        assert_eq!(s.value(), "hunter2");
    }
}

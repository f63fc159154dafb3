//! CEL duration and timestamp values.
//!
//! Durations are stored as seconds plus nanoseconds with matching signs,
//! timestamps as absolute UTC instants. Arithmetic is checked: any result
//! that leaves the representable range is an error, never a wrap. Timezone
//! projection for the `get*` accessors accepts an IANA name (through the
//! chrono-tz database) or a fixed `±HH:MM` offset, defaulting to UTC.

use std::{
    cmp::Ordering,
    fmt::{self, Display, Write},
    str::FromStr,
};

use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, EvalError, EvalResult};

pub(crate) const NANOS_PER_SECOND: i64 = 1_000_000_000;

// Timestamps cover 0001-01-01T00:00:00Z through 9999-12-31T23:59:59.999999999Z.
const MIN_TIMESTAMP_SECONDS: i64 = -62_135_596_800;
const MAX_TIMESTAMP_SECONDS: i64 = 253_402_300_799;

/// A signed duration: seconds plus nanoseconds, both carrying the sign.
///
/// Invariant: `|nanos| < 1_000_000_000` and `nanos` has the same sign as
/// `secs` (or either is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Duration {
    secs: i64,
    nanos: i32,
}

impl Duration {
    /// Builds a duration from a seconds/nanos pair that may be unnormalized.
    ///
    /// Returns an overflow error when the normalized seconds leave i64 range.
    pub fn new(secs: i64, nanos: i64) -> EvalResult<Self> {
        let total = (i128::from(secs))
            .checked_mul(i128::from(NANOS_PER_SECOND))
            .and_then(|n| n.checked_add(i128::from(nanos)))
            .ok_or_else(EvalError::overflow)?;
        Self::from_total_nanos(total)
    }

    /// Builds a duration from a total nanosecond count.
    pub(crate) fn from_total_nanos(total: i128) -> EvalResult<Self> {
        let secs = total / i128::from(NANOS_PER_SECOND);
        let nanos = total % i128::from(NANOS_PER_SECOND);
        let secs = i64::try_from(secs).map_err(|_| EvalError::overflow())?;
        Ok(Self {
            secs,
            nanos: nanos as i32,
        })
    }

    /// A whole-seconds duration.
    #[must_use]
    pub fn from_seconds(secs: i64) -> Self {
        Self { secs, nanos: 0 }
    }

    #[must_use]
    pub fn seconds(&self) -> i64 {
        self.secs
    }

    #[must_use]
    pub fn subsec_nanos(&self) -> i32 {
        self.nanos
    }

    pub(crate) fn total_nanos(&self) -> i128 {
        i128::from(self.secs) * i128::from(NANOS_PER_SECOND) + i128::from(self.nanos)
    }

    pub(crate) fn checked_add(&self, other: &Self) -> EvalResult<Self> {
        Self::from_total_nanos(self.total_nanos() + other.total_nanos())
    }

    pub(crate) fn checked_sub(&self, other: &Self) -> EvalResult<Self> {
        Self::from_total_nanos(self.total_nanos() - other.total_nanos())
    }

    pub(crate) fn checked_neg(&self) -> EvalResult<Self> {
        Self::from_total_nanos(-self.total_nanos())
    }

    /// Total whole hours, truncated toward zero.
    pub(crate) fn hours(&self) -> i64 {
        self.secs / 3600
    }

    pub(crate) fn minutes(&self) -> i64 {
        self.secs / 60
    }

    /// Total milliseconds of the sub-second part.
    pub(crate) fn milliseconds(&self) -> i64 {
        i64::from(self.nanos) / 1_000_000
    }

    /// Parses a CEL duration string: a signed sequence of decimal numbers
    /// with unit suffixes, e.g. `"1h2m3.5s"`, `"-10s"`, `"250ms"`.
    ///
    /// Accepted units: `h`, `m`, `s`, `ms`, `us`, `ns`.
    pub fn parse(text: &str) -> EvalResult<Self> {
        let mut rest = text;
        let negative = if let Some(r) = rest.strip_prefix('-') {
            rest = r;
            true
        } else {
            rest = rest.strip_prefix('+').unwrap_or(rest);
            false
        };
        if rest.is_empty() {
            return Err(invalid_duration(text));
        }
        let mut total: i128 = 0;
        while !rest.is_empty() {
            let digits_end = rest
                .find(|c: char| !c.is_ascii_digit() && c != '.')
                .ok_or_else(|| invalid_duration(text))?;
            if digits_end == 0 {
                return Err(invalid_duration(text));
            }
            let (number, tail) = rest.split_at(digits_end);
            let unit_end = tail.find(|c: char| c.is_ascii_digit() || c == '.').unwrap_or(tail.len());
            let (unit, next) = tail.split_at(unit_end);
            let unit_nanos: i128 = match unit {
                "h" => 3_600_000_000_000,
                "m" => 60_000_000_000,
                "s" => 1_000_000_000,
                "ms" => 1_000_000,
                "us" => 1_000,
                "ns" => 1,
                _ => return Err(invalid_duration(text)),
            };
            let value = f64::from_str(number).map_err(|_| invalid_duration(text))?;
            let nanos = value * unit_nanos as f64;
            if !nanos.is_finite() {
                return Err(EvalError::range("duration"));
            }
            total = total.checked_add(nanos as i128).ok_or_else(|| EvalError::range("duration"))?;
            rest = next;
        }
        if negative {
            total = -total;
        }
        Self::from_total_nanos(total).map_err(|_| EvalError::range("duration"))
    }
}

impl Display for Duration {
    /// Canonical CEL form: seconds with the fractional part trimmed, suffixed
    /// with `s` (e.g. `3600s`, `-0.5s`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.secs == 0 && self.nanos < 0 {
            f.write_char('-')?;
        }
        write!(f, "{}", self.secs)?;
        if self.nanos != 0 {
            let mut frac = format!("{:09}", self.nanos.abs());
            while frac.ends_with('0') {
                frac.pop();
            }
            write!(f, ".{frac}")?;
        }
        f.write_char('s')
    }
}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_nanos().cmp(&other.total_nanos())
    }
}

fn invalid_duration(text: &str) -> EvalError {
    EvalError::new(ErrorKind::InvalidArgument, format!("invalid duration: '{text}'"))
}

/// An absolute instant, restricted to years 0001 through 9999.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Wraps an instant, rejecting values outside the representable range.
    pub fn new(instant: DateTime<Utc>) -> EvalResult<Self> {
        if !(MIN_TIMESTAMP_SECONDS..=MAX_TIMESTAMP_SECONDS).contains(&instant.timestamp()) {
            return Err(EvalError::range("timestamp"));
        }
        Ok(Self(instant))
    }

    /// Parses an RFC 3339 timestamp such as `2009-02-13T23:31:30Z` or
    /// `2009-02-13T23:31:30.123-08:00`.
    pub fn parse(text: &str) -> EvalResult<Self> {
        let parsed = DateTime::parse_from_rfc3339(text)
            .map_err(|_| EvalError::new(ErrorKind::Range, format!("invalid timestamp: '{text}'")))?;
        Self::new(parsed.with_timezone(&Utc))
    }

    /// Builds a timestamp from whole seconds since the Unix epoch.
    pub fn from_epoch_seconds(secs: i64) -> EvalResult<Self> {
        let instant = DateTime::from_timestamp(secs, 0).ok_or_else(|| EvalError::range("timestamp"))?;
        Self::new(instant)
    }

    /// Seconds since the Unix epoch, truncated toward negative infinity.
    #[must_use]
    pub fn epoch_seconds(&self) -> i64 {
        self.0.timestamp()
    }

    #[must_use]
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }

    pub(crate) fn checked_add(&self, d: &Duration) -> EvalResult<Self> {
        let delta_nanos = d.total_nanos();
        let delta = i64::try_from(delta_nanos).map_err(|_| EvalError::range("timestamp"))?;
        let shifted = self
            .0
            .checked_add_signed(chrono::TimeDelta::nanoseconds(delta))
            .ok_or_else(|| EvalError::range("timestamp"))?;
        Self::new(shifted)
    }

    pub(crate) fn checked_sub(&self, d: &Duration) -> EvalResult<Self> {
        self.checked_add(&d.checked_neg()?)
    }

    /// Difference between two instants as a duration.
    pub(crate) fn since(&self, earlier: &Self) -> EvalResult<Duration> {
        let delta = self.0.signed_duration_since(earlier.0);
        Duration::new(delta.num_seconds(), i64::from(delta.subsec_nanos()))
    }

    /// Projects the instant into a timezone and returns the civil fields the
    /// `get*` accessors read.
    pub(crate) fn civil(&self, tz: Option<&str>) -> EvalResult<CivilTime> {
        match tz {
            None => Ok(CivilTime::of(&self.0)),
            Some(name) => match parse_timezone(name)? {
                ParsedTz::Fixed(offset) => Ok(CivilTime::of(&self.0.with_timezone(&offset))),
                ParsedTz::Named(tz) => Ok(CivilTime::of(&self.0.with_timezone(&tz))),
            },
        }
    }
}

impl Display for Timestamp {
    /// RFC 3339 with a `Z` suffix; sub-second digits only when nonzero.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = if self.0.nanosecond() == 0 {
            chrono::SecondsFormat::Secs
        } else {
            chrono::SecondsFormat::AutoSi
        };
        f.write_str(&self.0.to_rfc3339_opts(format, true))
    }
}

/// Civil (wall-clock) fields of a timestamp after timezone projection.
///
/// Month, day-of-month, day-of-year, and day-of-week are zero-based per the
/// CEL accessor contract; `day_1based` backs `getDate`.
pub(crate) struct CivilTime {
    pub year: i64,
    pub month0: i64,
    pub day0: i64,
    pub day_1based: i64,
    pub day_of_year0: i64,
    /// Days since Sunday, 0..=6.
    pub day_of_week: i64,
    pub hour: i64,
    pub minute: i64,
    pub second: i64,
    pub millisecond: i64,
}

impl CivilTime {
    fn of<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            year: i64::from(dt.year()),
            month0: i64::from(dt.month0()),
            day0: i64::from(dt.day0()),
            day_1based: i64::from(dt.day()),
            day_of_year0: i64::from(dt.ordinal0()),
            day_of_week: i64::from(dt.weekday().num_days_from_sunday()),
            hour: i64::from(dt.hour()),
            minute: i64::from(dt.minute()),
            second: i64::from(dt.second()),
            millisecond: i64::from(dt.nanosecond() / 1_000_000),
        }
    }
}

enum ParsedTz {
    Fixed(FixedOffset),
    Named(Tz),
}

/// Parses a timezone argument: `±HH:MM` fixed offsets, `UTC`, or an IANA
/// name like `America/New_York` resolved through the bundled tz database.
fn parse_timezone(name: &str) -> EvalResult<ParsedTz> {
    if name.is_empty() || name == "UTC" || name == "Z" {
        return Ok(ParsedTz::Fixed(Utc.fix()));
    }
    if name.starts_with('+') || name.starts_with('-') {
        return parse_fixed_offset(name).map(ParsedTz::Fixed);
    }
    Tz::from_str(name)
        .map(ParsedTz::Named)
        .map_err(|_| EvalError::new(ErrorKind::InvalidArgument, format!("unknown timezone: '{name}'")))
}

fn parse_fixed_offset(name: &str) -> EvalResult<FixedOffset> {
    let bad = || EvalError::new(ErrorKind::InvalidArgument, format!("invalid timezone offset: '{name}'"));
    let (sign, rest) = match name.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return Err(bad()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = hours.parse().map_err(|_| bad())?;
    let minutes: i32 = minutes.parse().map_err(|_| bad())?;
    if hours > 18 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dur(text: &str) -> Duration {
        Duration::parse(text).unwrap()
    }

    #[test]
    fn duration_parse_compound_units() {
        assert_eq!(dur("1h2m3s").seconds(), 3723);
        assert_eq!(dur("-90s").seconds(), -90);
        assert_eq!(dur("1.5s").subsec_nanos(), 500_000_000);
        assert_eq!(dur("250ms").subsec_nanos(), 250_000_000);
    }

    #[test]
    fn duration_parse_rejects_garbage() {
        assert!(Duration::parse("").is_err());
        assert!(Duration::parse("10").is_err());
        assert!(Duration::parse("10x").is_err());
        assert!(Duration::parse("s").is_err());
    }

    #[test]
    fn duration_display_is_canonical() {
        assert_eq!(dur("1h").to_string(), "3600s");
        assert_eq!(dur("1.5s").to_string(), "1.5s");
        assert_eq!(dur("-500ms").to_string(), "-0.5s");
    }

    #[test]
    fn duration_addition_overflow_is_an_error() {
        let max = Duration::from_seconds(i64::MAX);
        assert!(max.checked_add(&Duration::from_seconds(1)).is_err());
    }

    #[test]
    fn timestamp_range_is_enforced() {
        assert!(Timestamp::parse("0001-01-01T00:00:00Z").is_ok());
        assert!(Timestamp::parse("9999-12-31T23:59:59Z").is_ok());
        let late = Timestamp::parse("9999-12-31T23:59:59Z").unwrap();
        assert!(late.checked_add(&dur("10s")).is_err());
    }

    #[test]
    fn timestamp_difference_yields_duration() {
        let a = Timestamp::parse("2009-02-13T23:31:30Z").unwrap();
        let b = Timestamp::parse("2009-02-13T23:31:00Z").unwrap();
        assert_eq!(a.since(&b).unwrap(), Duration::from_seconds(30));
    }

    #[test]
    fn civil_projection_with_fixed_offset() {
        let ts = Timestamp::parse("2009-02-13T23:31:30Z").unwrap();
        let civil = ts.civil(Some("+11:00")).unwrap();
        // 2009-02-14T10:31:30+11:00, day-of-month is zero-based
        assert_eq!(civil.day0, 13);
        assert_eq!(civil.day_1based, 14);
        assert_eq!(civil.hour, 10);
    }

    #[test]
    fn civil_projection_with_iana_name() {
        let ts = Timestamp::parse("2009-07-01T12:00:00Z").unwrap();
        let civil = ts.civil(Some("America/New_York")).unwrap();
        assert_eq!(civil.hour, 8); // EDT is UTC-4 in July
    }

    #[test]
    fn timestamp_display_round_trips() {
        let ts = Timestamp::parse("2009-02-13T23:31:30Z").unwrap();
        assert_eq!(ts.to_string(), "2009-02-13T23:31:30Z");
        let reparsed = Timestamp::parse(&ts.to_string()).unwrap();
        assert_eq!(reparsed, ts);
    }
}

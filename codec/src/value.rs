//! Wire scalar validators.
//!
//! The backend transmits every temporal value as a string. These functions
//! parse the shapes it can actually emit and format values back into the
//! canonical wire form.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// The predicate separating present wire strings from absent ones.
pub fn non_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Parse a wire date time.
///
/// Accepts the backend's native format (`YYYY-MM-DD HH:MM:SS` with optional
/// fractional seconds and trailing `Z`), RFC 3339, and a bare date.
pub fn parse_date_time(raw: &str) -> Result<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDateTime(raw.to_string()));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.fZ", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(start_of_day) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&start_of_day));
        }
    }

    Err(Error::InvalidDateTime(raw.to_string()))
}

/// Parse a wire date time, treating blank values as absent.
pub fn parse_optional_date_time(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if non_blank(raw) {
        parse_date_time(raw).map(Some)
    } else {
        Ok(None)
    }
}

/// Format a date time in the backend's canonical wire form.
pub fn format_date_time(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.3fZ").to_string()
}

/// Parse a wire duration.
///
/// Accepts a clock form (`HH:MM`, `HH:MM:SS`, optionally with fractional
/// seconds) or an ISO 8601 duration without calendar components
/// (`PnDTnHnMnS`).
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDuration(raw.to_string()));
    }

    parse_clock_duration(trimmed)
        .or_else(|| parse_iso_duration(trimmed))
        .ok_or_else(|| Error::InvalidDuration(raw.to_string()))
}

/// Parse a wire duration, treating blank values as absent.
pub fn parse_optional_duration(raw: &str) -> Result<Option<Duration>> {
    if non_blank(raw) {
        parse_duration(raw).map(Some)
    } else {
        Ok(None)
    }
}

/// Format a duration in the clock form the backend stores.
pub fn format_duration(value: &Duration) -> String {
    let total_seconds = value.num_seconds();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

fn parse_clock_duration(raw: &str) -> Option<Duration> {
    let parts: Vec<&str> = raw.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return None;
    }

    let hours: i64 = parse_number(parts[0])?;
    let minutes: i64 = parse_number(parts[1])?;
    if minutes >= 60 {
        return None;
    }

    let (seconds, millis) = match parts.get(2) {
        None => (0, 0),
        Some(part) => match part.split_once('.') {
            None => (parse_number(part)?, 0),
            Some((whole, frac)) => {
                if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                let mut padded = frac.to_string();
                padded.truncate(3);
                while padded.len() < 3 {
                    padded.push('0');
                }
                (parse_number(whole)?, padded.parse::<i64>().ok()?)
            }
        },
    };
    if seconds >= 60 {
        return None;
    }

    Some(
        Duration::hours(hours)
            + Duration::minutes(minutes)
            + Duration::seconds(seconds)
            + Duration::milliseconds(millis),
    )
}

fn parse_iso_duration(raw: &str) -> Option<Duration> {
    let rest = raw.strip_prefix('P')?;
    if rest.is_empty() {
        return None;
    }

    let (date_part, time_part) = match rest.split_once('T') {
        Some((date, time)) if !time.is_empty() => (date, time),
        Some(_) => return None,
        None => (rest, ""),
    };

    let mut total = Duration::zero();
    for (component, unit) in split_components(date_part)? {
        total = total
            + match unit {
                'D' => Duration::days(component),
                // Calendar units have no fixed length.
                _ => return None,
            };
    }
    for (component, unit) in split_components(time_part)? {
        total = total
            + match unit {
                'H' => Duration::hours(component),
                'M' => Duration::minutes(component),
                'S' => Duration::seconds(component),
                _ => return None,
            };
    }

    Some(total)
}

fn split_components(raw: &str) -> Option<Vec<(i64, char)>> {
    let mut components = Vec::new();
    let mut digits = String::new();
    for c in raw.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
        } else if c.is_ascii_uppercase() {
            if digits.is_empty() {
                return None;
            }
            components.push((digits.parse().ok()?, c));
            digits.clear();
        } else {
            return None;
        }
    }
    if digits.is_empty() {
        Some(components)
    } else {
        None
    }
}

fn parse_number(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A closed date-time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    /// Create an interval, rejecting a start after its end.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start <= end {
            Ok(Self { start, end })
        } else {
            Err(Error::InvalidInterval(format!(
                "{} > {}",
                format_date_time(&start),
                format_date_time(&end)
            )))
        }
    }

    /// The interval's length.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Parse a wire interval: either an ISO `start/end` string or a two-element
/// array of wire date times.
pub fn parse_interval(value: &serde_json::Value) -> Result<Interval> {
    match value {
        serde_json::Value::String(raw) => {
            let (start, end) = raw
                .split_once('/')
                .ok_or_else(|| Error::InvalidInterval(raw.clone()))?;
            let start = parse_date_time(start).map_err(|_| Error::InvalidInterval(raw.clone()))?;
            let end = parse_date_time(end).map_err(|_| Error::InvalidInterval(raw.clone()))?;
            Interval::new(start, end)
        }
        serde_json::Value::Array(items) if items.len() == 2 => {
            let mut bounds = Vec::with_capacity(2);
            for item in items {
                let raw = item
                    .as_str()
                    .ok_or_else(|| Error::InvalidInterval(value.to_string()))?;
                bounds
                    .push(parse_date_time(raw).map_err(|_| Error::InvalidInterval(value.to_string()))?);
            }
            Interval::new(bounds[0], bounds[1])
        }
        other => Err(Error::InvalidInterval(other.to_string())),
    }
}

//! Sample data model and its persisted row form.
//!
//! A `Sample` is one observation in a key's series: the wall-clock instant the price was
//! fetched and the price itself. Series files are plain text with a `timestamp,price`
//! header followed by one row per sample, so they stay readable with any spreadsheet.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Header row written as the first line of every series file.
pub const CSV_HEADER: &str = "timestamp,price";

/// One timestamped price observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Instant the price was observed.
    pub timestamp: DateTime<Utc>,
    /// Observed price; always finite.
    pub value: f64,
}

impl Sample {
    /// Build a sample, rejecting NaN and infinite values.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Option<Self> {
        value.is_finite().then_some(Self { timestamp, value })
    }

    /// Build a sample stamped with the current time.
    pub fn now(value: f64) -> Option<Self> {
        Self::new(Utc::now(), value)
    }

    /// Encode the sample as a single CSV row (without the trailing newline).
    pub fn to_row(&self) -> String {
        format!(
            "{},{}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.value
        )
    }

    /// Decode a CSV row written by [`Self::to_row`].
    ///
    /// Naive ISO-8601 timestamps without an offset are accepted too and interpreted as
    /// local time. Returns `None` for any row that does not hold exactly a timestamp and
    /// a finite price.
    pub fn from_row(row: &str) -> Option<Self> {
        let mut fields = row.trim_end_matches(['\r', '\n']).split(',');
        let (timestamp, value) = (fields.next()?, fields.next()?);
        if fields.next().is_some() {
            return None;
        }
        let timestamp = parse_timestamp(timestamp.trim())?;
        let value = value.trim().parse::<f64>().ok()?;
        Self::new(timestamp, value)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let naive = raw.parse::<NaiveDateTime>().ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trip_keeps_full_precision() {
        let sample = Sample::new(
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
                + chrono::Duration::nanoseconds(123_456_789),
            191.5,
        )
        .unwrap();
        let row = sample.to_row();
        assert_eq!(row, "2024-01-02T09:30:00.123456789Z,191.5");
        assert_eq!(Sample::from_row(&row), Some(sample));
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(Sample::now(f64::NAN).is_none());
        assert!(Sample::now(f64::NEG_INFINITY).is_none());
        assert!(Sample::from_row("2024-01-02T09:30:00Z,NaN").is_none());
        assert!(Sample::from_row("2024-01-02T09:30:00Z,inf").is_none());
    }

    #[test]
    fn reads_naive_local_timestamps() {
        let sample = Sample::from_row("2024-06-05T14:03:07.250000,101.25").unwrap();
        let local = sample.timestamp.with_timezone(&Local).naive_local();
        assert_eq!(local.to_string(), "2024-06-05 14:03:07.250");
        assert_eq!(sample.value, 101.25);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(Sample::from_row("").is_none());
        assert!(Sample::from_row(CSV_HEADER).is_none());
        assert!(Sample::from_row("2024-01-02T09:30:00Z").is_none());
        assert!(Sample::from_row("2024-01-02T09:30:00Z,1.0,extra").is_none());
        assert!(Sample::from_row("2024-01-02T09:3").is_none());
    }
}

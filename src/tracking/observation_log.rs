use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::api::{format_dollars, Listing};

const HEADER: [&str; 4] = ["timestamp", "listing_id", "price", "float"];

/// One tracked data point: what the cheapest (or every) listing looked like at a moment.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub listing_id: String,
    pub price_cents: Option<u64>,
    pub float_value: Option<f64>,
}

impl Observation {
    pub fn from_listing(listing: &Listing, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            listing_id: listing.id.clone(),
            price_cents: listing.price_cents,
            float_value: listing.float_value,
        }
    }

    /// Same listing, price and float as `other`, ignoring when it was seen.
    pub fn same_values(&self, other: &Observation) -> bool {
        self.listing_id == other.listing_id
            && self.price_cents == other.price_cents
            && self.float_value == other.float_value
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsvRow {
    pub timestamp: String,
    pub listing_id: String,
    pub price: String,
    pub float: String,
}

impl From<&Observation> for CsvRow {
    fn from(obs: &Observation) -> Self {
        Self {
            timestamp: obs.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            listing_id: obs.listing_id.clone(),
            price: obs.price_cents.map(format_dollars).unwrap_or_default(),
            float: obs.float_value.map(|f| f.to_string()).unwrap_or_default(),
        }
    }
}

/// Append-only CSV of observations for one tracked search.
pub struct ObservationLog {
    path: PathBuf,
    last_timestamp: Option<DateTime<Utc>>,
}

impl ObservationLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let last_timestamp = if path.exists() {
            last_valid_timestamp(&path)?
        } else {
            None
        };

        Ok(Self {
            path,
            last_timestamp,
        })
    }

    /// Append one row. The stored timestamp never goes backwards, even if the
    /// wall clock does; the observation actually written is returned.
    pub fn append(&mut self, observation: &Observation) -> Result<Observation> {
        let mut stored = observation.clone();
        if let Some(last) = self.last_timestamp {
            if stored.timestamp < last {
                tracing::debug!("Clock went backwards by {}", last - stored.timestamp);
                stored.timestamp = last;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let len = file.metadata()?.len();
        let needs_header = len == 0;
        if len > 0 {
            // A row cut short by a crash has no line ending; start a fresh line.
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(HEADER)?;
        }
        writer.serialize(CsvRow::from(&stored))?;
        writer.flush()?;

        self.last_timestamp = Some(stored.timestamp);
        Ok(stored)
    }
}

/// Latest RFC 3339 timestamp found in the first column of an existing log.
///
/// Rows that don't parse (a truncated last line, an older column layout) are
/// skipped with a warning.
fn last_valid_timestamp(path: &Path) -> Result<Option<DateTime<Utc>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut last = None;
    let mut skipped = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let parsed = result
            .ok()
            .and_then(|record| record.get(0).map(|ts| DateTime::parse_from_rfc3339(ts.trim())));
        match parsed {
            Some(Ok(ts)) => {
                let ts = ts.with_timezone(&Utc);
                last = Some(last.map_or(ts, |prev: DateTime<Utc>| prev.max(ts)));
            }
            // Header line.
            Some(Err(_)) if idx == 0 => {}
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(
            "⚠️ Skipped {} unreadable row(s) in {}; resuming after the latest valid timestamp",
            skipped,
            path.display()
        );
    }
    Ok(last)
}

/// Every row in a tracking CSV, header excluded.
pub fn read_rows(path: &Path) -> Result<Vec<CsvRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (line_num, result) in reader.deserialize().enumerate() {
        let row: CsvRow = result.with_context(|| {
            format!("Failed to parse CSV line {} in {}", line_num + 2, path.display())
        })?;
        rows.push(row);
    }
    Ok(rows)
}

/// File name for a tracked search: spaces and `|` become `_`.
pub fn log_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| match c {
            ' ' | '|' | '/' | '\\' => '_',
            other => other,
        })
        .collect();
    format!("{}.csv", safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn obs(ts: DateTime<Utc>, price: u64) -> Observation {
        Observation {
            timestamp: ts,
            listing_id: "991".into(),
            price_cents: Some(price),
            float_value: Some(0.071),
        }
    }

    #[test]
    fn test_n_appends_give_n_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ak.csv");
        let mut log = ObservationLog::open(&path).unwrap();

        let start = Utc::now();
        for i in 0..5 {
            log.append(&obs(start + Duration::seconds(i * 60), 1000 + i as u64)).unwrap();
        }

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].price, "10.00");
        assert_eq!(rows[4].price, "10.04");
        assert_eq!(rows[0].float, "0.071");

        let stamps: Vec<DateTime<Utc>> = rows
            .iter()
            .map(|r| DateTime::parse_from_rfc3339(&r.timestamp).unwrap().with_timezone(&Utc))
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock.csv");
        let mut log = ObservationLog::open(&path).unwrap();

        let now = Utc::now();
        log.append(&obs(now, 100)).unwrap();
        let stored = log.append(&obs(now - Duration::seconds(30), 200)).unwrap();
        assert_eq!(stored.timestamp, now);

        // Reopening picks up where the file left off.
        let mut reopened = ObservationLog::open(&path).unwrap();
        let stored = reopened.append(&obs(now - Duration::hours(1), 300)).unwrap();
        assert!(stored.timestamp >= now - Duration::milliseconds(1));
        assert_eq!(read_rows(&path).unwrap().len(), 3);
    }

    #[test]
    fn test_reopen_after_truncated_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cut.csv");
        fs::write(
            &path,
            "timestamp,listing_id,price,float\n\
             2025-01-01T09:00:00.000Z,1,12.00,0.1\n\
             2025-01-01T10:00:00.000Z,1,12.50",
        )
        .unwrap();

        let mut log = ObservationLog::open(&path).unwrap();
        let earlier = DateTime::parse_from_rfc3339("2025-01-01T09:30:00Z").unwrap().with_timezone(&Utc);
        let stored = log.append(&obs(earlier, 1_300)).unwrap();
        assert_eq!(
            stored.timestamp,
            DateTime::parse_from_rfc3339("2025-01-01T10:00:00Z").unwrap().with_timezone(&Utc)
        );

        let text = fs::read_to_string(&path).unwrap();
        let last = text.lines().last().unwrap();
        assert_eq!(last, "2025-01-01T10:00:00.000Z,991,13.00,0.071");
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_reopen_headerless_legacy_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            "2025-01-01T10:00:00.123456,12.5,0.1,42\n2025-01-01T10:01:00.654321,12.4,0.1,43\n",
        )
        .unwrap();

        let mut log = ObservationLog::open(&path).unwrap();
        let now = Utc::now();
        let stored = log.append(&obs(now, 100)).unwrap();
        assert_eq!(stored.timestamp, now);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.csv");
        let mut log = ObservationLog::open(&path).unwrap();
        log.append(&obs(Utc::now(), 1)).unwrap();
        log.append(&obs(Utc::now(), 2)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("timestamp,listing_id,price,float").count(), 1);
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_missing_values_are_blank() {
        let row = CsvRow::from(&Observation {
            timestamp: Utc::now(),
            listing_id: String::new(),
            price_cents: None,
            float_value: None,
        });
        assert!(row.price.is_empty());
        assert!(row.float.is_empty());
    }

    #[test]
    fn test_log_file_name() {
        assert_eq!(
            log_file_name("AK-47 | Redline (Field-Tested)"),
            "AK-47___Redline_(Field-Tested).csv"
        );
    }
}

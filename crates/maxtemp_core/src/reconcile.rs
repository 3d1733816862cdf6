use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;

use crate::dataset::{Dataset, StationRow};
use crate::reading::{StationKey, StationReading, SENTINEL};

/// What a call to [`reconcile`] did with the readings it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// A new date column was added.
    Merged(MergeSummary),
    /// The dataset already holds a column for this date; nothing changed.
    SkippedDuplicateDate { date: NaiveDate },
    /// No readings were supplied; nothing changed.
    NoInput,
}

impl MergeOutcome {
    /// True when the returned dataset differs from the one passed in.
    pub fn changed(&self) -> bool {
        matches!(self, MergeOutcome::Merged(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub date: NaiveDate,
    /// The dataset was empty and has been initialized from this run.
    pub bootstrapped: bool,
    /// Existing stations that received a reading.
    pub stations_updated: usize,
    /// Existing stations absent from this run, filled with the sentinel.
    pub stations_missing: usize,
    /// Stations seen for the first time.
    pub stations_appended: usize,
    /// Readings dropped because an earlier reading had the same key.
    pub duplicate_readings: usize,
    /// Readings dropped because they carried a different date.
    pub foreign_date_readings: usize,
    pub name_drift: Vec<NameDrift>,
}

/// A recorded station whose source name no longer matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameDrift {
    pub code: String,
    pub recorded: String,
    pub observed: String,
}

/// Folds one run's readings into the dataset.
///
/// Pure: returns the next dataset and what happened. An already recorded
/// date is never overwritten; existing rows keep their identity and position;
/// new stations are appended; stations missing from the run get the sentinel.
pub fn reconcile(existing: Dataset, today: &[StationReading]) -> (Dataset, MergeOutcome) {
    let Some(first) = today.first() else {
        return (existing, MergeOutcome::NoInput);
    };
    let date = first.observation_date;

    if existing.has_date(date) {
        return (existing, MergeOutcome::SkippedDuplicateDate { date });
    }

    let bootstrapped = existing.is_empty();
    let batch = dedupe(today, date);
    let (mut dates, mut rows) = existing.into_parts();
    let prior_columns = dates.len();

    let mut summary = MergeSummary {
        date,
        bootstrapped,
        stations_updated: 0,
        stations_missing: 0,
        stations_appended: 0,
        duplicate_readings: batch.duplicates,
        foreign_date_readings: batch.foreign_date,
        name_drift: Vec::new(),
    };

    let mut claimed = HashSet::with_capacity(rows.len());
    for row in &mut rows {
        let key = row.key();
        match batch.by_key.get(&key) {
            Some(&index) => {
                let reading = batch.readings[index];
                if let StationKey::Code(code) = &key {
                    let observed = reading.station_name.trim();
                    if !observed.is_empty() && observed != row.name() {
                        summary.name_drift.push(NameDrift {
                            code: code.clone(),
                            recorded: row.name().to_string(),
                            observed: observed.to_string(),
                        });
                    }
                }
                row.push_value(reading.cell_value());
                summary.stations_updated += 1;
                claimed.insert(key);
            }
            None => {
                row.push_value(SENTINEL.to_string());
                summary.stations_missing += 1;
            }
        }
    }

    for reading in &batch.readings {
        if claimed.contains(&reading.key()) {
            continue;
        }
        let mut values = vec![SENTINEL.to_string(); prior_columns];
        values.push(reading.cell_value());
        rows.push(StationRow::new(
            reading.station_code.trim().to_string(),
            reading.station_name.trim().to_string(),
            values,
        ));
        summary.stations_appended += 1;
    }

    dates.push(date);
    (Dataset::from_parts(dates, rows), MergeOutcome::Merged(summary))
}

struct Batch<'a> {
    readings: Vec<&'a StationReading>,
    by_key: HashMap<StationKey, usize>,
    duplicates: usize,
    foreign_date: usize,
}

/// Keeps the first reading per key, in source order, for the run's date.
fn dedupe(today: &[StationReading], date: NaiveDate) -> Batch<'_> {
    let mut batch = Batch {
        readings: Vec::with_capacity(today.len()),
        by_key: HashMap::with_capacity(today.len()),
        duplicates: 0,
        foreign_date: 0,
    };
    for reading in today {
        if reading.observation_date != date {
            batch.foreign_date += 1;
            continue;
        }
        let key = reading.key();
        if batch.by_key.contains_key(&key) {
            batch.duplicates += 1;
            continue;
        }
        batch.by_key.insert(key, batch.readings.len());
        batch.readings.push(reading);
    }
    batch
}

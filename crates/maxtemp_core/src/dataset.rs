use std::collections::HashSet;

use chrono::NaiveDate;
use thiserror::Error;

use crate::reading::{date_label, parse_date_label, StationKey, SENTINEL};

pub const CODE_COLUMN: &str = "station_code";
pub const NAME_COLUMN: &str = "station_name";

/// Reasons a stored table cannot be read back as a [`Dataset`].
///
/// Line numbers are 1-based positions in the table, the header being line 1.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("header must start with {CODE_COLUMN} and {NAME_COLUMN}, found {found:?}")]
    MissingIdentityColumns { found: Vec<String> },
    #[error("column {column} has label {label:?}, expected a YYYY-MM-DD date")]
    InvalidDateLabel { column: usize, label: String },
    #[error("date column {label} appears more than once")]
    DuplicateDateLabel { label: String },
    #[error("line {line} has {cells} cells but the header only has {columns}")]
    RowTooWide {
        line: usize,
        cells: usize,
        columns: usize,
    },
    #[error("line {line} repeats station {key}")]
    DuplicateStation { line: usize, key: StationKey },
}

/// One station row: identity plus one value per date column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationRow {
    code: String,
    name: String,
    values: Vec<String>,
}

impl StationRow {
    pub(crate) fn new(code: String, name: String, values: Vec<String>) -> Self {
        Self { code, name, values }
    }

    pub fn key(&self) -> StationKey {
        StationKey::from_identity(&self.code, &self.name)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values aligned with [`Dataset::dates`].
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub(crate) fn push_value(&mut self, value: String) {
        self.values.push(value);
    }
}

/// Wide-format time series: one row per station, one column per date.
///
/// Date columns keep the order in which they were first ingested and every
/// row holds exactly one non-empty value per date column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    dates: Vec<NaiveDate>,
    rows: Vec<StationRow>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(dates: Vec<NaiveDate>, rows: Vec<StationRow>) -> Self {
        debug_assert!(rows.iter().all(|row| row.values.len() == dates.len()));
        Self { dates, rows }
    }

    pub(crate) fn into_parts(self) -> (Vec<NaiveDate>, Vec<StationRow>) {
        (self.dates, self.rows)
    }

    /// True when the dataset has neither rows nor date columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.dates.is_empty()
    }

    /// Number of station rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rows(&self) -> &[StationRow] {
        &self.rows
    }

    pub fn has_date(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn row(&self, key: &StationKey) -> Option<&StationRow> {
        self.rows.iter().find(|row| &row.key() == key)
    }

    pub fn value(&self, key: &StationKey, date: NaiveDate) -> Option<&str> {
        let column = self.dates.iter().position(|d| *d == date)?;
        self.row(key).map(|row| row.values[column].as_str())
    }

    /// Builds a validated dataset from a raw grid whose first row is the header.
    ///
    /// An empty grid is an empty dataset. Short rows are padded and blank
    /// value cells become [`SENTINEL`]; fully blank rows are dropped.
    pub fn from_table(table: Vec<Vec<String>>) -> Result<Self, SchemaError> {
        let mut lines = table.into_iter();
        let Some(header) = lines.next() else {
            return Ok(Self::default());
        };
        let dates = parse_header(&header)?;
        let columns = dates.len() + 2;

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for (index, mut cells) in lines.enumerate() {
            let line = index + 2;
            if cells.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            if cells.len() > columns {
                if cells[columns..].iter().any(|cell| !cell.trim().is_empty()) {
                    return Err(SchemaError::RowTooWide {
                        line,
                        cells: cells.len(),
                        columns,
                    });
                }
                cells.truncate(columns);
            }
            cells.resize(columns, String::new());

            let mut cells = cells.into_iter();
            let code = cells.next().unwrap_or_default().trim().to_string();
            let name = cells.next().unwrap_or_default().trim().to_string();
            let values = cells
                .map(|cell| {
                    let cell = cell.trim();
                    if cell.is_empty() {
                        SENTINEL.to_string()
                    } else {
                        cell.to_string()
                    }
                })
                .collect();

            let row = StationRow::new(code, name, values);
            let key = row.key();
            if !seen.insert(key.clone()) {
                return Err(SchemaError::DuplicateStation { line, key });
            }
            rows.push(row);
        }

        Ok(Self { dates, rows })
    }

    /// The canonical grid: header row first, then one row per station.
    pub fn to_table(&self) -> Vec<Vec<String>> {
        let mut table = Vec::with_capacity(self.rows.len() + 1);
        table.push(self.header());
        for row in &self.rows {
            let mut line = Vec::with_capacity(row.values.len() + 2);
            line.push(row.code.clone());
            line.push(row.name.clone());
            line.extend(row.values.iter().cloned());
            table.push(line);
        }
        table
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = Vec::with_capacity(self.dates.len() + 2);
        header.push(CODE_COLUMN.to_string());
        header.push(NAME_COLUMN.to_string());
        header.extend(self.dates.iter().map(|date| date_label(*date)));
        header
    }
}

fn parse_header(header: &[String]) -> Result<Vec<NaiveDate>, SchemaError> {
    let identity_ok = header.len() >= 2
        && identity_label(&header[0]) == CODE_COLUMN
        && identity_label(&header[1]) == NAME_COLUMN;
    if !identity_ok {
        return Err(SchemaError::MissingIdentityColumns {
            found: header.iter().take(2).cloned().collect(),
        });
    }

    // Trailing blank header cells come from spreadsheets padding the grid.
    let labels = {
        let mut end = header.len();
        while end > 2 && header[end - 1].trim().is_empty() {
            end -= 1;
        }
        &header[2..end]
    };

    let mut dates = Vec::with_capacity(labels.len());
    for (offset, label) in labels.iter().enumerate() {
        let date = parse_date_label(label).ok_or_else(|| SchemaError::InvalidDateLabel {
            column: offset + 3,
            label: label.clone(),
        })?;
        if dates.contains(&date) {
            return Err(SchemaError::DuplicateDateLabel {
                label: date_label(date),
            });
        }
        dates.push(date);
    }
    Ok(dates)
}

/// Accepts both `station_code` and the older `Station Code` spelling.
fn identity_label(label: &str) -> String {
    label.trim().to_ascii_lowercase().replace(' ', "_")
}

use std::fmt;

use chrono::NaiveDate;

/// Marker stored in place of a missing or invalid temperature reading.
pub const SENTINEL: &str = "(-)";

/// One station's maximum temperature for a single observation date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationReading {
    pub station_code: String,
    pub station_name: String,
    pub max_temperature: String,
    pub observation_date: NaiveDate,
}

impl StationReading {
    pub fn new(
        station_code: impl Into<String>,
        station_name: impl Into<String>,
        max_temperature: impl Into<String>,
        observation_date: NaiveDate,
    ) -> Self {
        Self {
            station_code: station_code.into(),
            station_name: station_name.into(),
            max_temperature: max_temperature.into(),
            observation_date,
        }
    }

    pub fn key(&self) -> StationKey {
        StationKey::from_identity(&self.station_code, &self.station_name)
    }

    /// The value to store for this reading; blank readings become [`SENTINEL`].
    pub fn cell_value(&self) -> String {
        normalize_temperature(&self.max_temperature)
    }
}

/// Identity of a station row.
///
/// The code is authoritative whenever present; rows that never carried a
/// code fall back to their name. A `Code` never equals a `Name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StationKey {
    Code(String),
    Name(String),
}

impl StationKey {
    pub fn from_identity(code: &str, name: &str) -> Self {
        let code = code.trim();
        if code.is_empty() {
            StationKey::Name(name.trim().to_string())
        } else {
            StationKey::Code(code.to_string())
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationKey::Code(code) => write!(f, "code {code}"),
            StationKey::Name(name) => write!(f, "name {name:?}"),
        }
    }
}

/// Normalizes a raw temperature cell: blank or a lone `-` means no reading.
pub fn normalize_temperature(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        SENTINEL.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Canonical `YYYY-MM-DD` label for a date column.
pub fn date_label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a date column label. Only strict ISO `YYYY-MM-DD` is accepted.
pub fn parse_date_label(label: &str) -> Option<NaiveDate> {
    let label = label.trim();
    if label.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(label, "%Y-%m-%d").ok()
}

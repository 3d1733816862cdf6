//! Maxtemp core: station readings, the wide-format dataset and the pure
//! reconciler that folds each day's readings into it.
mod dataset;
mod reading;
mod reconcile;

pub use dataset::{Dataset, SchemaError, StationRow, CODE_COLUMN, NAME_COLUMN};
pub use reading::{
    date_label, normalize_temperature, parse_date_label, StationKey, StationReading, SENTINEL,
};
pub use reconcile::{reconcile, MergeOutcome, MergeSummary, NameDrift};

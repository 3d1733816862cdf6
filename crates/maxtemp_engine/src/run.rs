use chrono::NaiveDate;
use maxtemp_core::{reconcile, MergeOutcome};
use maxtemp_logging::{mt_info, mt_warn};
use thiserror::Error;

use crate::decode::{decode_page, DecodeError};
use crate::fetch::Fetcher;
use crate::store::{DatasetStore, StoreError};
use crate::table::{ParseError, RowSkipped, TableParser};
use crate::FetchError;

/// Reasons a run stops before the dataset is saved. Persisted state is
/// untouched in every case.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: MergeOutcome,
    /// Valid readings extracted from the page.
    pub readings: usize,
    pub skipped_rows: Vec<RowSkipped>,
    /// Shape of the dataset after the run.
    pub stations_total: usize,
    pub dates_total: usize,
}

/// The adapters a run is wired from.
pub struct Pipeline<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub parser: &'a dyn TableParser,
    pub store: &'a dyn DatasetStore,
}

impl Pipeline<'_> {
    /// Fetch, parse, load, reconcile and (only if something changed) save.
    pub async fn run_once(
        &self,
        source_url: &str,
        observation_date: NaiveDate,
    ) -> Result<RunReport, RunError> {
        let page = self.fetcher.fetch(source_url).await?;
        let decoded = decode_page(&page.bytes, page.metadata.content_type.as_deref())?;
        let parsed = self.parser.parse(&decoded.text, observation_date)?;
        for skipped in &parsed.skipped {
            mt_warn!(
                "Skipping malformed row {} ({} cells): {}",
                skipped.row_index,
                skipped.cell_count,
                skipped.excerpt
            );
        }
        mt_info!(
            "Parsed {} readings for {} ({} rows skipped)",
            parsed.readings.len(),
            observation_date,
            parsed.skipped.len()
        );

        let existing = self.store.load().await?;
        let (dataset, outcome) = reconcile(existing, &parsed.readings);

        match &outcome {
            MergeOutcome::Merged(summary) => {
                for drift in &summary.name_drift {
                    mt_info!(
                        "Station {} is now listed as {:?}; keeping recorded name {:?}",
                        drift.code,
                        drift.observed,
                        drift.recorded
                    );
                }
                if summary.duplicate_readings > 0 {
                    mt_warn!(
                        "Ignored {} repeated readings for already seen stations",
                        summary.duplicate_readings
                    );
                }
                self.store.save(&dataset).await?;
                mt_info!(
                    "Data for {} saved to {}: {} updated, {} missing, {} new stations",
                    summary.date,
                    self.store.describe(),
                    summary.stations_updated,
                    summary.stations_missing,
                    summary.stations_appended
                );
            }
            MergeOutcome::SkippedDuplicateDate { date } => {
                mt_info!("Data for {} already exists. Skipping update.", date);
            }
            MergeOutcome::NoInput => {
                mt_info!("No data to save.");
            }
        }

        Ok(RunReport {
            outcome,
            readings: parsed.readings.len(),
            skipped_rows: parsed.skipped,
            stations_total: dataset.len(),
            dates_total: dataset.dates().len(),
        })
    }
}

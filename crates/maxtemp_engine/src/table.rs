use chrono::NaiveDate;
use maxtemp_core::{normalize_temperature, StationReading};
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

/// Minimum `<td>` cells for a data row: serial, code, name, max temperature.
const MIN_CELLS: usize = 4;
const EXCERPT_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no <table> element found in page")]
    TableNotFound,
    #[error("invalid selector {0:?}")]
    InvalidSelector(&'static str),
}

/// A table row that could not be turned into a reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSkipped {
    /// 1-based position of the `<tr>` in the table, header included.
    pub row_index: usize,
    pub cell_count: usize,
    pub excerpt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedTable {
    pub readings: Vec<StationReading>,
    pub skipped: Vec<RowSkipped>,
}

pub trait TableParser: Send + Sync {
    /// Extracts one reading per valid row, all stamped with `observation_date`.
    fn parse(&self, html: &str, observation_date: NaiveDate) -> Result<ParsedTable, ParseError>;
}

/// Parser for the PMD "Max-Temp" page layout:
/// - the first `<table>` in the document holds the data
/// - its first `<tr>` is a header and is ignored
/// - cells 2, 3 and 4 are station code, station name and max temperature.
#[derive(Debug, Default)]
pub struct MaxTempTableParser;

impl TableParser for MaxTempTableParser {
    fn parse(&self, html: &str, observation_date: NaiveDate) -> Result<ParsedTable, ParseError> {
        let doc = Html::parse_document(html);
        let table_sel = selector("table")?;
        let row_sel = selector("tr")?;
        let cell_sel = selector("td")?;

        let table = doc
            .select(&table_sel)
            .next()
            .ok_or(ParseError::TableNotFound)?;

        let mut parsed = ParsedTable::default();
        for (index, row) in table.select(&row_sel).enumerate().skip(1) {
            let cells: Vec<String> = row.select(&cell_sel).map(cell_text).collect();
            if cells.len() < MIN_CELLS {
                parsed.skipped.push(RowSkipped {
                    row_index: index + 1,
                    cell_count: cells.len(),
                    excerpt: excerpt(&row),
                });
                continue;
            }
            parsed.readings.push(StationReading::new(
                cells[1].clone(),
                cells[2].clone(),
                normalize_temperature(&cells[3]),
                observation_date,
            ));
        }
        Ok(parsed)
    }
}

fn selector(css: &'static str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|_| ParseError::InvalidSelector(css))
}

/// Text of a cell with each fragment trimmed, e.g. `<td> 41780 </td>` -> `41780`.
fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

fn excerpt(row: &ElementRef<'_>) -> String {
    let html = row.html();
    let compact = html.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= EXCERPT_CHARS {
        compact
    } else {
        let cut: String = compact.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}...")
    }
}

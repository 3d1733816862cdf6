//! Maxtemp engine: source page fetching and parsing, dataset stores and the
//! single-run pipeline that ties them to the reconciler.
mod csv_store;
mod decode;
mod fetch;
mod persist;
mod run;
mod sheet_store;
mod store;
mod table;
mod types;

pub use csv_store::{CsvFileStore, FileStoreSettings, DEFAULT_CSV_PATH};
pub use decode::{decode_page, DecodeError, DecodedPage};
pub use fetch::{FetchSettings, Fetcher, ReqwestFetcher, DEFAULT_SOURCE_URL};
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use run::{Pipeline, RunError, RunReport};
pub use sheet_store::{
    SheetSettings, SheetStore, DEFAULT_SPREADSHEET_NAME, DEFAULT_WORKSHEET, DRIVE_API_BASE,
    SHEETS_API_BASE,
};
pub use store::{DatasetStore, StoreError};
pub use table::{MaxTempTableParser, ParseError, ParsedTable, RowSkipped, TableParser};
pub use types::{FailureKind, FetchError, FetchMetadata, FetchOutput};

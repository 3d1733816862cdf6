use std::fs;
use std::io;
use std::path::PathBuf;

use maxtemp_core::Dataset;
use maxtemp_logging::{mt_debug, mt_info};

use crate::persist::AtomicFileWriter;
use crate::store::{DatasetStore, StoreError};

pub const DEFAULT_CSV_PATH: &str = "weather_data.csv";

#[derive(Debug, Clone)]
pub struct FileStoreSettings {
    pub path: PathBuf,
    pub delimiter: u8,
}

impl Default for FileStoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CSV_PATH),
            delimiter: b',',
        }
    }
}

/// Keeps the dataset as a delimited text file, header row first.
#[derive(Debug, Clone)]
pub struct CsvFileStore {
    settings: FileStoreSettings,
}

impl CsvFileStore {
    pub fn new(settings: FileStoreSettings) -> Self {
        Self { settings }
    }

    fn unavailable(&self, message: impl ToString) -> StoreError {
        StoreError::Unavailable {
            target: self.describe(),
            message: message.to_string(),
        }
    }

    fn malformed(&self, message: impl ToString) -> StoreError {
        StoreError::Malformed {
            target: self.describe(),
            message: message.to_string(),
        }
    }

    fn read_table(&self, text: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.settings.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut table = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|err| self.malformed(err))?;
            table.push(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    fn write_table(&self, dataset: &Dataset) -> Result<Vec<u8>, StoreError> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.settings.delimiter)
            .from_writer(Vec::new());
        for line in dataset.to_table() {
            writer
                .write_record(&line)
                .map_err(|err| self.unavailable(err))?;
        }
        writer
            .into_inner()
            .map_err(|err| self.unavailable(err.error()))
    }
}

#[async_trait::async_trait]
impl DatasetStore for CsvFileStore {
    async fn load(&self) -> Result<Dataset, StoreError> {
        let text = match fs::read(&self.settings.path) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|err| self.malformed(err))?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                mt_info!("{} does not exist yet, starting empty", self.describe());
                return Ok(Dataset::new());
            }
            Err(err) => return Err(self.unavailable(err)),
        };

        let table = self.read_table(&text)?;
        let dataset = Dataset::from_table(table).map_err(|source| StoreError::InvalidLayout {
            target: self.describe(),
            source,
        })?;
        mt_debug!(
            "Loaded {} stations x {} dates from {}",
            dataset.len(),
            dataset.dates().len(),
            self.describe()
        );
        Ok(dataset)
    }

    async fn save(&self, dataset: &Dataset) -> Result<(), StoreError> {
        let content = self.write_table(dataset)?;
        AtomicFileWriter::new(self.settings.path.clone())
            .write(&content)
            .map_err(|err| self.unavailable(err))
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.settings.path.display())
    }
}

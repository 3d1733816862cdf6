//! Run configuration: an optional `maxtemp.ron` file overlaid by CLI flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::ValueEnum;
use log::LevelFilter;
use maxtemp_engine::{
    FetchSettings, FileStoreSettings, SheetSettings, DEFAULT_CSV_PATH, DEFAULT_SOURCE_URL,
    DEFAULT_SPREADSHEET_NAME, DEFAULT_WORKSHEET, DRIVE_API_BASE, SHEETS_API_BASE,
};
use maxtemp_logging::LogDestination;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILENAME: &str = "maxtemp.ron";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum Backend {
    /// Delimited text file on disk.
    #[default]
    Csv,
    /// Worksheet in a Google spreadsheet.
    Sheet,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogTarget {
    #[default]
    Terminal,
    File,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source_url: String,
    pub backend: Backend,
    pub fetch: FetchConfig,
    pub csv: CsvConfig,
    pub sheet: SheetConfig,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            backend: Backend::default(),
            fetch: FetchConfig::default(),
            csv: CsvConfig::default(),
            sheet: SheetConfig::default(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchSettings::default();
        Self {
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            request_timeout_secs: defaults.request_timeout.as_secs(),
            max_bytes: defaults.max_bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvConfig {
    pub path: PathBuf,
    pub delimiter: char,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CSV_PATH),
            delimiter: ',',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetConfig {
    pub spreadsheet_name: String,
    pub worksheet: String,
    pub share_with: Vec<String>,
    pub access_token: Option<String>,
    pub sheets_api_base: String,
    pub drive_api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            spreadsheet_name: DEFAULT_SPREADSHEET_NAME.to_string(),
            worksheet: DEFAULT_WORKSHEET.to_string(),
            share_with: Vec::new(),
            access_token: None,
            sheets_api_base: SHEETS_API_BASE.to_string(),
            drive_api_base: DRIVE_API_BASE.to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub target: LogTarget,
    pub level: String,
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            target: LogTarget::default(),
            level: "info".to_string(),
            file: PathBuf::from("maxtemp.log"),
        }
    }
}

impl LogConfig {
    pub fn destination(&self) -> LogDestination {
        match self.target {
            LogTarget::Terminal => LogDestination::Terminal,
            LogTarget::File => LogDestination::File(self.file.clone()),
            LogTarget::Both => LogDestination::Both(self.file.clone()),
        }
    }

    pub fn level_filter(&self) -> anyhow::Result<LevelFilter> {
        LevelFilter::from_str(&self.level)
            .map_err(|_| anyhow!("unknown log level {:?}", self.level))
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub backend: Option<Backend>,
    pub source_url: Option<String>,
    pub sheets_token: Option<String>,
}

impl AppConfig {
    /// Reads `path`, or `maxtemp.ron` in the working directory when no path
    /// is given. Only the implicit default file may be absent.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILENAME), false),
        };
        let content = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read config {:?}", path));
            }
        };
        ron::from_str(&content).with_context(|| format!("failed to parse config {:?}", path))
    }

    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(url) = overrides.source_url {
            self.source_url = url;
        }
        if let Some(token) = overrides.sheets_token {
            self.sheet.access_token = Some(token);
        }
        if let Some(target) = overrides.target {
            match self.backend {
                Backend::Csv => self.csv.path = PathBuf::from(target),
                Backend::Sheet => self.sheet.spreadsheet_name = target,
            }
        }
        self
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            connect_timeout: Duration::from_secs(self.fetch.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.fetch.request_timeout_secs),
            max_bytes: self.fetch.max_bytes,
            ..FetchSettings::default()
        }
    }

    pub fn file_store_settings(&self) -> anyhow::Result<FileStoreSettings> {
        let delimiter = self.csv.delimiter;
        if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' {
            bail!("csv delimiter {delimiter:?} must be a single ASCII character other than a quote or newline");
        }
        Ok(FileStoreSettings {
            path: self.csv.path.clone(),
            delimiter: delimiter as u8,
        })
    }

    pub fn sheet_settings(&self) -> anyhow::Result<SheetSettings> {
        let Some(token) = self.sheet.access_token.clone().filter(|t| !t.trim().is_empty()) else {
            bail!("the sheet backend needs an access token (MAXTEMP_SHEETS_TOKEN or sheet.access_token)");
        };
        Ok(SheetSettings {
            spreadsheet_name: self.sheet.spreadsheet_name.clone(),
            worksheet: self.sheet.worksheet.clone(),
            share_with: self.sheet.share_with.clone(),
            sheets_api_base: self.sheet.sheets_api_base.clone(),
            drive_api_base: self.sheet.drive_api_base.clone(),
            request_timeout: Duration::from_secs(self.sheet.request_timeout_secs),
            ..SheetSettings::new(token)
        })
    }
}

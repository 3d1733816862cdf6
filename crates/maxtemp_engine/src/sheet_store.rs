//! Google Sheets backend.
//!
//! The spreadsheet is located by name through the Drive API; the dataset
//! lives in a single worksheet using the same layout as the CSV file.
//! Credentials are passed in through [`SheetSettings`]; nothing is read
//! from the environment here.

use std::time::Duration;

use maxtemp_core::Dataset;
use maxtemp_logging::{mt_debug, mt_info};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::store::{DatasetStore, StoreError};

pub const DEFAULT_SPREADSHEET_NAME: &str = "Weather Data";
pub const DEFAULT_WORKSHEET: &str = "Daily Data";
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

#[derive(Debug, Clone)]
pub struct SheetSettings {
    pub spreadsheet_name: String,
    pub worksheet: String,
    /// OAuth bearer token with Sheets and Drive scopes.
    pub access_token: String,
    /// Accounts granted writer access when the spreadsheet is created.
    pub share_with: Vec<String>,
    pub sheets_api_base: String,
    pub drive_api_base: String,
    pub request_timeout: Duration,
    /// Grid size for a new worksheet; it is grown on demand afterwards.
    pub initial_rows: u32,
    pub initial_columns: u32,
}

impl SheetSettings {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_name: DEFAULT_SPREADSHEET_NAME.to_string(),
            worksheet: DEFAULT_WORKSHEET.to_string(),
            access_token: access_token.into(),
            share_with: Vec::new(),
            sheets_api_base: SHEETS_API_BASE.to_string(),
            drive_api_base: DRIVE_API_BASE.to_string(),
            request_timeout: Duration::from_secs(30),
            initial_rows: 1000,
            initial_columns: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSpreadsheet {
    spreadsheet_id: String,
}

/// Keeps the dataset in a worksheet of a named Google spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetStore {
    settings: SheetSettings,
    http: reqwest::Client,
}

impl SheetStore {
    pub fn new(settings: SheetSettings) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| StoreError::Unavailable {
                target: describe(&settings),
                message: err.to_string(),
            })?;
        Ok(Self { settings, http })
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

    fn endpoint(&self, base: &str, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(base).map_err(|err| self.unavailable(err))?;
        url.path_segments_mut()
            .map_err(|_| self.unavailable(format!("{base} cannot be a base url")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.settings.access_token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(|err| self.unavailable(err))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.unavailable(format!("http status {status}: {}", body.trim())))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|err| self.malformed(err))
    }

    /// A1 range covering the whole worksheet.
    fn sheet_range(&self) -> String {
        format!("'{}'", self.settings.worksheet.replace('\'', "''"))
    }

    async fn find_spreadsheet(&self) -> Result<Option<String>, StoreError> {
        let mut url = self.endpoint(&self.settings.drive_api_base, &["files"])?;
        let name = self
            .settings
            .spreadsheet_name
            .replace('\\', "\\\\")
            .replace('\'', "\\'");
        url.query_pairs_mut()
            .append_pair(
                "q",
                &format!("name = '{name}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false"),
            )
            .append_pair("fields", "files(id)");

        let list: DriveFileList = self.send_json(self.request(Method::GET, url)).await?;
        Ok(list.files.into_iter().next().map(|file| file.id))
    }

    async fn find_worksheet(&self, spreadsheet_id: &str) -> Result<Option<SheetProperties>, StoreError> {
        let mut url = self.endpoint(&self.settings.sheets_api_base, &["spreadsheets", spreadsheet_id])?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");

        let meta: SpreadsheetMeta = self.send_json(self.request(Method::GET, url)).await?;
        Ok(meta
            .sheets
            .into_iter()
            .map(|entry| entry.properties)
            .find(|props| props.title == self.settings.worksheet))
    }

    async fn read_values(&self, spreadsheet_id: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let range = self.sheet_range();
        let url = self.endpoint(
            &self.settings.sheets_api_base,
            &["spreadsheets", spreadsheet_id, "values", &range],
        )?;
        let values: ValueRange = self.send_json(self.request(Method::GET, url)).await?;
        Ok(values
            .values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }

    fn grid_json(&self, rows: u32, columns: u32) -> Value {
        json!({
            "rowCount": rows.max(self.settings.initial_rows),
            "columnCount": columns.max(self.settings.initial_columns),
        })
    }

    async fn create_spreadsheet(&self, rows: u32, columns: u32) -> Result<String, StoreError> {
        let url = self.endpoint(&self.settings.sheets_api_base, &["spreadsheets"])?;
        let body = json!({
            "properties": { "title": self.settings.spreadsheet_name },
            "sheets": [{
                "properties": {
                    "title": self.settings.worksheet,
                    "gridProperties": self.grid_json(rows, columns),
                }
            }],
        });
        let created: CreatedSpreadsheet = self
            .send_json(self.request(Method::POST, url).json(&body))
            .await?;
        mt_info!(
            "Created spreadsheet {:?} ({})",
            self.settings.spreadsheet_name,
            created.spreadsheet_id
        );

        for email in &self.settings.share_with {
            self.share(&created.spreadsheet_id, email).await?;
        }
        Ok(created.spreadsheet_id)
    }

    async fn share(&self, spreadsheet_id: &str, email: &str) -> Result<(), StoreError> {
        let mut url = self.endpoint(
            &self.settings.drive_api_base,
            &["files", spreadsheet_id, "permissions"],
        )?;
        url.query_pairs_mut().append_pair("sendNotificationEmail", "false");
        let body = json!({ "type": "user", "role": "writer", "emailAddress": email });
        self.send(self.request(Method::POST, url).json(&body)).await?;
        mt_info!("Shared spreadsheet {} with {}", spreadsheet_id, email);
        Ok(())
    }

    async fn batch_update(&self, spreadsheet_id: &str, request: Value) -> Result<(), StoreError> {
        let target = format!("{spreadsheet_id}:batchUpdate");
        let url = self.endpoint(&self.settings.sheets_api_base, &["spreadsheets", &target])?;
        let body = json!({ "requests": [request] });
        self.send(self.request(Method::POST, url).json(&body)).await?;
        Ok(())
    }

    /// Makes sure the worksheet exists and can hold `rows` x `columns`.
    /// Returns true when the worksheet was already there.
    async fn prepare_worksheet(
        &self,
        spreadsheet_id: &str,
        rows: u32,
        columns: u32,
    ) -> Result<bool, StoreError> {
        match self.find_worksheet(spreadsheet_id).await? {
            None => {
                mt_info!("Adding worksheet {:?}", self.settings.worksheet);
                let request = json!({
                    "addSheet": {
                        "properties": {
                            "title": self.settings.worksheet,
                            "gridProperties": self.grid_json(rows, columns),
                        }
                    }
                });
                self.batch_update(spreadsheet_id, request).await?;
                Ok(false)
            }
            Some(props) => {
                let grid = props.grid_properties;
                if grid.row_count >= rows && grid.column_count >= columns {
                    return Ok(true);
                }
                mt_debug!(
                    "Growing worksheet grid from {}x{} to fit {}x{}",
                    grid.row_count,
                    grid.column_count,
                    rows,
                    columns
                );
                let request = json!({
                    "updateSheetProperties": {
                        "properties": {
                            "sheetId": props.sheet_id,
                            "gridProperties": {
                                "rowCount": rows.max(grid.row_count),
                                "columnCount": columns.max(grid.column_count),
                            },
                        },
                        "fields": "gridProperties(rowCount,columnCount)",
                    }
                });
                self.batch_update(spreadsheet_id, request).await?;
                Ok(true)
            }
        }
    }

    async fn write_values(&self, spreadsheet_id: &str, table: Vec<Vec<String>>) -> Result<(), StoreError> {
        let range = format!("{}!A1", self.sheet_range());
        let mut url = self.endpoint(
            &self.settings.sheets_api_base,
            &["spreadsheets", spreadsheet_id, "values", &range],
        )?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": table,
        });
        self.send(self.request(Method::PUT, url).json(&body)).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DatasetStore for SheetStore {
    async fn load(&self) -> Result<Dataset, StoreError> {
        let Some(spreadsheet_id) = self.find_spreadsheet().await? else {
            mt_info!("{} does not exist yet, starting empty", self.describe());
            return Ok(Dataset::new());
        };
        if self.find_worksheet(&spreadsheet_id).await?.is_none() {
            mt_info!("{} has no worksheet yet, starting empty", self.describe());
            return Ok(Dataset::new());
        }

        let table = self.read_values(&spreadsheet_id).await?;
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
        let mut table = dataset.to_table();
        let rows = u32::try_from(table.len()).map_err(|err| self.unavailable(err))?;
        let columns =
            u32::try_from(dataset.dates().len() + 2).map_err(|err| self.unavailable(err))?;

        let spreadsheet_id = match self.find_spreadsheet().await? {
            Some(id) => {
                if self.prepare_worksheet(&id, rows, columns).await? {
                    let previous = self.read_values(&id).await?;
                    cover_previous(&mut table, &previous);
                }
                id
            }
            None => self.create_spreadsheet(rows, columns).await?,
        };

        self.write_values(&spreadsheet_id, table).await
    }

    fn describe(&self) -> String {
        describe(&self.settings)
    }
}

fn describe(settings: &SheetSettings) -> String {
    format!(
        "spreadsheet {:?} worksheet {:?}",
        settings.spreadsheet_name, settings.worksheet
    )
}

/// Pads `table` with empty cells so that writing it from A1 overwrites every
/// cell of `previous`. Blank rows dropped on load would otherwise leave stale
/// rows below the new table.
fn cover_previous(table: &mut Vec<Vec<String>>, previous: &[Vec<String>]) {
    let width = table
        .iter()
        .chain(previous)
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let height = table.len().max(previous.len());
    table.resize_with(height, Vec::new);
    for row in table.iter_mut() {
        row.resize(width, String::new());
    }
}

fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

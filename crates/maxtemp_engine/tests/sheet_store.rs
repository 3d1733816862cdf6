use std::time::Duration;

use chrono::NaiveDate;
use maxtemp_core::{reconcile, Dataset, StationKey, StationReading};
use maxtemp_engine::{DatasetStore, SheetSettings, SheetStore, StoreError};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "token-123";

fn store_for(server: &MockServer) -> SheetStore {
    let settings = SheetSettings {
        share_with: vec!["owner@example.com".to_string()],
        sheets_api_base: format!("{}/v4", server.uri()),
        drive_api_base: format!("{}/drive/v3", server.uri()),
        request_timeout: Duration::from_secs(5),
        ..SheetSettings::new(TOKEN)
    };
    SheetStore::new(settings).expect("client")
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

async fn mount_drive_lookup(server: &MockServer, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", "Bearer token-123"))
        .and(query_param("fields", "files(id)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "files": files })))
        .mount(server)
        .await;
}

async fn mount_metadata(server: &MockServer, sheets: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v4/spreadsheets/sheet-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "sheets": sheets })))
        .mount(server)
        .await;
}

fn daily_data_sheet(rows: u32, columns: u32) -> serde_json::Value {
    json!([{
        "properties": {
            "sheetId": 7,
            "title": "Daily Data",
            "gridProperties": { "rowCount": rows, "columnCount": columns }
        }
    }])
}

#[tokio::test]
async fn load_without_spreadsheet_is_empty() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([])).await;

    let dataset = store_for(&server).load().await.expect("load");
    assert!(dataset.is_empty());
}

#[tokio::test]
async fn load_without_worksheet_is_empty() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([{ "id": "sheet-1" }])).await;
    mount_metadata(
        &server,
        json!([{ "properties": { "sheetId": 0, "title": "Sheet1" } }]),
    )
    .await;

    let dataset = store_for(&server).load().await.expect("load");
    assert!(dataset.is_empty());
}

#[tokio::test]
async fn load_reads_worksheet_values() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([{ "id": "sheet-1" }])).await;
    mount_metadata(&server, daily_data_sheet(1000, 100)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "range": "'Daily Data'!A1:D3",
            "majorDimension": "ROWS",
            "values": [
                ["station_code", "station_name", "2024-06-01", "2024-06-02"],
                ["41780", "Karachi", "34"],
                ["41571", "Islamabad", 31, "30"]
            ]
        })))
        .mount(&server)
        .await;

    let dataset = store_for(&server).load().await.expect("load");

    assert_eq!(dataset.dates(), &[date(1), date(2)]);
    let karachi = StationKey::Code("41780".to_string());
    let islamabad = StationKey::Code("41571".to_string());
    assert_eq!(dataset.value(&karachi, date(2)), Some("(-)"));
    assert_eq!(dataset.value(&islamabad, date(1)), Some("31"));
}

#[tokio::test]
async fn save_creates_and_shares_missing_spreadsheet() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([])).await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets"))
        .and(body_partial_json(json!({
            "properties": { "title": "Weather Data" },
            "sheets": [{ "properties": { "title": "Daily Data" } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "spreadsheetId": "sheet-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files/sheet-1/permissions"))
        .and(body_partial_json(json!({
            "type": "user",
            "role": "writer",
            "emailAddress": "owner@example.com"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "perm-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .and(query_param("valueInputOption", "RAW"))
        .and(body_partial_json(json!({
            "majorDimension": "ROWS",
            "values": [
                ["station_code", "station_name", "2024-06-01"],
                ["41780", "Karachi", "34"]
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "updatedCells": 6 })))
        .expect(1)
        .mount(&server)
        .await;

    let (dataset, _) = reconcile(
        Dataset::new(),
        &[StationReading::new("41780", "Karachi", "34", date(1))],
    );
    store_for(&server).save(&dataset).await.expect("save");
}

#[tokio::test]
async fn save_adds_missing_worksheet_before_writing() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([{ "id": "sheet-1" }])).await;
    mount_metadata(
        &server,
        json!([{ "properties": { "sheetId": 0, "title": "Sheet1" } }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-1:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{ "addSheet": { "properties": { "title": "Daily Data" } } }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "replies": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (dataset, _) = reconcile(
        Dataset::new(),
        &[StationReading::new("41780", "Karachi", "34", date(1))],
    );
    store_for(&server).save(&dataset).await.expect("save");
}

#[tokio::test]
async fn save_grows_a_grid_that_is_too_small() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([{ "id": "sheet-1" }])).await;
    mount_metadata(&server, daily_data_sheet(1, 2)).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "range": "'Daily Data'!A1:Z1000" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/spreadsheets/sheet-1:batchUpdate"))
        .and(body_partial_json(json!({
            "requests": [{
                "updateSheetProperties": {
                    "properties": {
                        "sheetId": 7,
                        "gridProperties": { "rowCount": 2, "columnCount": 3 }
                    }
                }
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "replies": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let (dataset, _) = reconcile(
        Dataset::new(),
        &[StationReading::new("41780", "Karachi", "34", date(1))],
    );
    store_for(&server).save(&dataset).await.expect("save");
}

#[tokio::test]
async fn save_blanks_rows_left_over_from_the_previous_table() {
    let server = MockServer::start().await;
    mount_drive_lookup(&server, json!([{ "id": "sheet-1" }])).await;
    mount_metadata(&server, daily_data_sheet(1000, 100)).await;
    // A row cleared by hand sits between the two stations.
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [
                ["station_code", "station_name", "2024-06-01"],
                ["41780", "Karachi", "34"],
                [],
                ["41571", "Islamabad", "30"]
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/sheet-1/values/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_for(&server);
    let existing = store.load().await.expect("load");
    assert_eq!(existing.len(), 2);
    let (dataset, _) = reconcile(
        existing,
        &[
            StationReading::new("41780", "Karachi", "35", date(2)),
            StationReading::new("41571", "Islamabad", "31", date(2)),
        ],
    );
    store.save(&dataset).await.expect("save");

    let requests = server.received_requests().await.expect("recording enabled");
    let put = requests
        .iter()
        .find(|request| request.method.as_str() == "PUT")
        .expect("values written");
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    assert_eq!(
        body["values"],
        json!([
            ["station_code", "station_name", "2024-06-01", "2024-06-02"],
            ["41780", "Karachi", "34", "35"],
            ["41571", "Islamabad", "30", "31"],
            ["", "", "", ""]
        ])
    );
}

#[tokio::test]
async fn server_errors_surface_as_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
        .mount(&server)
        .await;

    let err = store_for(&server).load().await.unwrap_err();
    match err {
        StoreError::Unavailable { message, .. } => {
            assert!(message.contains("503"), "unexpected message: {message}");
            assert!(message.contains("backend down"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

use std::fs;
use std::sync::Once;

use chrono::NaiveDate;
use maxtemp_core::{Dataset, MergeOutcome};
use maxtemp_engine::{
    CsvFileStore, DatasetStore, FailureKind, FetchSettings, FileStoreSettings, MaxTempTableParser,
    Pipeline, ReqwestFetcher, RunError, StoreError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Loads through the file store but refuses every save.
struct RejectingSaves<'a>(&'a CsvFileStore);

#[async_trait::async_trait]
impl<'a> DatasetStore for RejectingSaves<'a> {
    async fn load(&self) -> Result<Dataset, StoreError> {
        self.0.load().await
    }

    async fn save(&self, _dataset: &Dataset) -> Result<(), StoreError> {
        Err(StoreError::Unavailable {
            target: self.describe(),
            message: "disk full".to_string(),
        })
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(maxtemp_logging::initialize_for_tests);
}

fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn page(rows: &[(&str, &str, &str)]) -> String {
    let mut html = String::from(
        "<html><body><table><tr><th>#</th><th>Code</th><th>Station</th><th>Max</th></tr>",
    );
    for (index, (code, name, temp)) in rows.iter().enumerate() {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{code}</td><td>{name}</td><td>{temp}</td></tr>",
            index + 1
        ));
    }
    html.push_str("<tr><td>Source: PMD</td></tr></table></body></html>");
    html
}

async fn serve(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/Max-Temp.php"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/html; charset=utf-8"))
        .mount(server)
        .await;
}

struct Harness {
    server: MockServer,
    _temp: TempDir,
    csv_path: std::path::PathBuf,
    fetcher: ReqwestFetcher,
    store: CsvFileStore,
}

impl Harness {
    async fn new() -> Self {
        init_logging();
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        let csv_path = temp.path().join("weather_data.csv");
        let store = CsvFileStore::new(FileStoreSettings {
            path: csv_path.clone(),
            ..FileStoreSettings::default()
        });
        Self {
            server,
            _temp: temp,
            csv_path,
            fetcher: ReqwestFetcher::new(FetchSettings::default()),
            store,
        }
    }

    fn url(&self) -> String {
        format!("{}/Max-Temp.php", self.server.uri())
    }

    async fn run(&self, day: NaiveDate) -> Result<maxtemp_engine::RunReport, RunError> {
        self.run_with(&self.store, day).await
    }

    async fn run_with(
        &self,
        store: &dyn DatasetStore,
        day: NaiveDate,
    ) -> Result<maxtemp_engine::RunReport, RunError> {
        let pipeline = Pipeline {
            fetcher: &self.fetcher,
            parser: &MaxTempTableParser,
            store,
        };
        pipeline.run_once(&self.url(), day).await
    }

    fn csv(&self) -> String {
        fs::read_to_string(&self.csv_path).unwrap()
    }
}

#[tokio::test]
async fn first_run_initializes_file_and_reports_skipped_rows() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;

    let report = harness.run(date(1)).await.expect("run");

    assert!(matches!(report.outcome, MergeOutcome::Merged(ref s) if s.bootstrapped));
    assert_eq!(report.readings, 1);
    assert_eq!(report.skipped_rows.len(), 1);
    assert_eq!((report.stations_total, report.dates_total), (1, 1));
    assert_eq!(
        harness.csv(),
        "station_code,station_name,2024-06-01\n41780,Karachi,34\n"
    );
}

#[tokio::test]
async fn second_run_for_same_date_changes_nothing() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;

    harness.run(date(1)).await.expect("first run");
    let after_first = harness.csv();

    let report = harness.run(date(1)).await.expect("second run");
    assert_eq!(
        report.outcome,
        MergeOutcome::SkippedDuplicateDate { date: date(1) }
    );
    assert_eq!(harness.csv(), after_first);
}

#[tokio::test]
async fn later_runs_append_columns_and_new_stations() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;
    harness.run(date(1)).await.expect("day 1");

    serve(
        &harness.server,
        page(&[("41780", "Karachi", "-"), ("41571", "Islamabad", "38")]),
    )
    .await;
    harness.run(date(2)).await.expect("day 2");

    serve(&harness.server, page(&[("41571", "Islamabad", "37")])).await;
    let report = harness.run(date(3)).await.expect("day 3");

    assert_eq!((report.stations_total, report.dates_total), (2, 3));
    assert_eq!(
        harness.csv(),
        "station_code,station_name,2024-06-01,2024-06-02,2024-06-03\n\
         41780,Karachi,34,(-),(-)\n\
         41571,Islamabad,(-),38,37\n"
    );
}

#[tokio::test]
async fn empty_table_is_not_saved() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[])).await;

    let report = harness.run(date(1)).await.expect("run");

    assert_eq!(report.outcome, MergeOutcome::NoInput);
    assert!(!harness.csv_path.exists());
}

#[tokio::test]
async fn fetch_failure_leaves_file_untouched() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;
    harness.run(date(1)).await.expect("day 1");
    let before = harness.csv();

    harness.server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&harness.server)
        .await;

    let err = harness.run(date(2)).await.unwrap_err();
    assert!(matches!(err, RunError::Fetch(ref e) if e.kind == FailureKind::HttpStatus(500)));
    assert_eq!(harness.csv(), before);
}

#[tokio::test]
async fn page_without_table_aborts_before_load() {
    let harness = Harness::new().await;
    serve(
        &harness.server,
        "<html><body>maintenance</body></html>".to_string(),
    )
    .await;
    fs::write(&harness.csv_path, "not,a,valid\nlayout\n").unwrap();

    let err = harness.run(date(1)).await.unwrap_err();
    assert!(matches!(err, RunError::Parse(_)));
    assert_eq!(harness.csv(), "not,a,valid\nlayout\n");
}

#[tokio::test]
async fn corrupt_store_aborts_without_saving() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;
    fs::write(&harness.csv_path, "code,name\n1,a\n").unwrap();

    let err = harness.run(date(1)).await.unwrap_err();
    assert!(matches!(err, RunError::Store(_)));
    assert_eq!(harness.csv(), "code,name\n1,a\n");
}

#[tokio::test]
async fn failed_save_reports_store_error_and_keeps_previous_file() {
    let harness = Harness::new().await;
    serve(&harness.server, page(&[("41780", "Karachi", "34")])).await;
    harness.run(date(1)).await.expect("day 1");
    let before = harness.csv();

    serve(&harness.server, page(&[("41780", "Karachi", "35")])).await;
    let store = RejectingSaves(&harness.store);
    let err = harness.run_with(&store, date(2)).await.unwrap_err();

    assert!(matches!(
        err,
        RunError::Store(StoreError::Unavailable { ref message, .. }) if message == "disk full"
    ));
    assert_eq!(harness.csv(), before);
}

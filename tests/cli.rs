//! Integration tests for the cuaca CLI

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REGIONS: &str = "\
kode,nama,lat,lon
35,JAWA TIMUR,,
35.15,KAB. SIDOARJO,-7.4726,112.6675
35.15.02,Prambon,,
35.15.02.2001,Kedungkembar,-7.4701,112.5763
35.15.02.2018,Simogirang,,
35.73,KOTA MALANG,,
35.07,KAB. MALANG,-8.0833,112.6167
";

struct Fixture {
    dir: TempDir,
    regions: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let regions = dir.path().join("kode_wilayah.csv");
        std::fs::write(&regions, REGIONS).unwrap();
        Self { dir, regions }
    }

    fn config(&self) -> PathBuf {
        // Absent file: built-in defaults only
        self.dir.path().join("missing.toml")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cuaca"));
        cmd.arg("--config")
            .arg(self.config())
            .arg("--regions")
            .arg(&self.regions)
            .arg("--no-cache")
            .env_remove("RUST_LOG");
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.command().args(args).output().expect("Failed to run cuaca")
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_cuaca"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Indonesian regions"));
    assert!(text.contains("forecast"));
}

#[test]
fn test_search_with_hint() {
    let fixture = Fixture::new();
    let output = fixture.run(&["search", "simogirang, prambon"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("35.15.02.2018"));
    assert!(text.contains("Simogirang, Prambon, KAB. SIDOARJO, JAWA TIMUR"));
}

#[test]
fn test_search_ambiguous_json() {
    let fixture = Fixture::new();
    let output = fixture.run(&["search", "malang", "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let candidates: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let codes: Vec<&str> = candidates
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["record"]["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["35.73", "35.07"]);
}

#[test]
fn test_search_not_found_fails() {
    let fixture = Fixture::new();
    let output = fixture.run(&["search", "atlantis", "--strategy", "substring"]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("No region matches 'atlantis'"));
    assert!(!stderr(&output).contains("No region matches"));
}

#[test]
fn test_regions_lists_children() {
    let fixture = Fixture::new();
    let output = fixture.run(&["regions", "--under", "35.15.02"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("35.15.02.2001  Kedungkembar"));
    assert!(text.contains("35.15.02.2018  Simogirang"));
}

#[test]
fn test_missing_region_file() {
    let fixture = Fixture::new();
    let output = Command::new(env!("CARGO_BIN_EXE_cuaca"))
        .arg("--config")
        .arg(fixture.config())
        .args(["--no-cache", "--regions", "/nonexistent/regions.csv", "regions"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Region table problem"));
}

#[test]
fn test_invalid_station_code() {
    let fixture = Fixture::new();
    let output = fixture.run(&["metar", "JUANDA"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Invalid input"));
}

fn hourly_body() -> serde_json::Value {
    serde_json::json!({
        "hourly": {
            "time": ["2025-01-01T07:00", "2025-01-01T08:00"],
            "temperature_2m": [26.1, 27.4],
            "relativehumidity_2m": [88, 84],
            "cloudcover": [75, 60],
            "precipitation": [0.4, 0.0],
            "precipitation_probability": [45, 20],
            "windspeed_10m": [7.2, 9.0],
            "winddirection_10m": [90, 135],
            "weathercode": [61, 3]
        }
    })
}

async fn open_meteo_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast"))
        .and(query_param("timezone", "Asia/Jakarta"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
        .mount(&server)
        .await;
    server
}

fn forecast_output(fixture: &Fixture, server: &MockServer, args: &[&str]) -> Output {
    fixture
        .command()
        .env("CUACA_WEATHER__OPEN_METEO_BASE_URL", server.uri())
        .args(args)
        .output()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forecast_json_for_region() {
    let server = open_meteo_server().await;
    let fixture = Fixture::new();
    let output = forecast_output(
        &fixture,
        &server,
        &["forecast", "kedungkembar", "--source", "open-meteo", "--no-metar", "--format", "json"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["code"], "35.15.02.2001");
    assert_eq!(report["forecast"]["source"], "OpenMeteo");
    assert_eq!(report["forecast"]["samples"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forecast_report_for_coordinates() {
    let server = open_meteo_server().await;
    let fixture = Fixture::new();
    let output = forecast_output(
        &fixture,
        &server,
        &["forecast", "--lat", "-7.25", "--lon", "112.75", "-s", "open-meteo", "--no-metar"],
    );
    assert!(output.status.success(), "{}", stderr(&output));

    let text = stdout(&output);
    assert!(text.contains("Koordinat: -7.25000, 112.75000"));
    assert!(text.contains("Sumber prakiraan: Open-Meteo"));
    assert!(text.contains("- Pagi (06-12):"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_forecast_map_output() {
    let server = open_meteo_server().await;
    let fixture = Fixture::new();
    let output = forecast_output(
        &fixture,
        &server,
        &["forecast", "sidoarjo", "-s", "open-meteo", "--no-metar", "-f", "map"],
    );
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).starts_with("https://www.openstreetmap.org/?mlat=-7.47260&mlon=112.66750"));
}

#[test]
fn test_enrich_offline_keeps_existing_rows() {
    let fixture = Fixture::new();
    let out = fixture.dir.path().join("enriched.csv");
    // Every lookup fails fast against a closed port
    let output = fixture
        .command()
        .env("CUACA_GEOCODING__NOMINATIM_BASE_URL", "http://127.0.0.1:9")
        .env("CUACA_WEATHER__MAX_RETRIES", "0")
        .env("CUACA_GEOCODING__NOMINATIM_INTERVAL_MS", "0")
        .args(["enrich", "-o"])
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Already present: 3"));

    let written = std::fs::read_to_string(Path::new(&out)).unwrap();
    assert!(written.starts_with("kode,nama,lat,lon\n"));
    assert!(written.contains("35.15,KAB. SIDOARJO,-7.4726,112.6675"));
    assert_eq!(written.lines().count(), 8);
}

//! API Integration Tests for the LSF exporter
//!
//! Drives the HTTP front end end to end, against canned command output and
//! against real child processes standing in for the LSF commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use lsf_exporter::collector::CollectorRegistry;
use lsf_exporter::command::{CommandSource, ExecutionError, command_line};
use lsf_exporter::scrape::Scraper;
use lsf_exporter::server::{AppState, create_router};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::ServiceExt;

const BHOSTS: &str = include_str!("../testdata/bhosts.out");
const BQUEUES: &str = include_str!("../testdata/bqueues.out");
const LSHOSTS: &str = include_str!("../testdata/lshosts.out");
const LSLOAD: &str = include_str!("../testdata/lsload.out");
const LSID: &str = include_str!("../testdata/lsid.out");
const BJOBS: &str = include_str!("../testdata/bjobs.out");

// =============================================================================
// Test Helpers
// =============================================================================

/// Command source answering from a fixed table of outputs.
struct CannedCommands {
    outputs: HashMap<&'static str, &'static str>,
    calls: AtomicUsize,
}

impl CannedCommands {
    fn cluster() -> Self {
        Self {
            outputs: HashMap::from([
                ("bhosts", BHOSTS),
                ("bqueues", BQUEUES),
                ("lshosts", LSHOSTS),
                ("lsload", LSLOAD),
                ("lsid", LSID),
                ("bjobs", BJOBS),
            ]),
            calls: AtomicUsize::new(0),
        }
    }

    fn without(mut self, program: &str) -> Self {
        self.outputs.remove(program);
        self
    }
}

#[async_trait::async_trait]
impl CommandSource for CannedCommands {
    async fn output(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outputs
            .get(program)
            .map(|out| out.as_bytes().to_vec())
            .ok_or_else(|| ExecutionError::Status {
                command: command_line(program, args),
                code: Some(1),
                stderr: "LSF is down. Please wait ...".to_string(),
            })
    }
}

fn create_test_state(source: Arc<dyn CommandSource>, registry: CollectorRegistry) -> AppState {
    AppState::new(Arc::new(Scraper::new(registry, source)), "/metrics", 4)
}

/// Start test server and return base URL.
async fn start_test_server(state: AppState) -> String {
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

/// Value of the series line starting with `series`, if present.
fn series_value(body: &str, series: &str) -> Option<f64> {
    body.lines()
        .find_map(|line| line.strip_prefix(series))
        .and_then(|rest| rest.trim().parse().ok())
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probe() {
    let state = create_test_state(Arc::new(CannedCommands::cluster()), CollectorRegistry::new());
    let base_url = start_test_server(state).await;

    let resp = reqwest::get(format!("{}/healthz", base_url))
        .await
        .expect("Failed to send healthz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse healthz response");
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Metrics Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_full_scrape() {
    let state = create_test_state(Arc::new(CannedCommands::cluster()), CollectorRegistry::new());
    let base_url = start_test_server(state).await;

    let resp = reqwest::get(format!("{}/metrics", base_url))
        .await
        .expect("Failed to fetch metrics");
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
    let body = resp.text().await.unwrap();

    assert_eq!(
        series_value(&body, "lsf_bhost_maxjob_count{host_name=\"master01\"}"),
        Some(-1.0)
    );
    assert_eq!(
        series_value(&body, "lsf_bqueues_status{queues_name=\"night\"}"),
        Some(2.0)
    );
    assert_eq!(
        series_value(&body, "lsf_lsload_host_status{host_name=\"node005\"}"),
        Some(6.0)
    );
    assert!(body.contains(
        "lsf_cluster_info{clustername=\"cluster1\",mastername=\"master01\",version=\"10.1.0.13\"} 1"
    ));
    assert!(body.contains("resource_type=\"mg docker\""));

    for collector in ["bhosts", "bqueues", "lshosts", "lsload", "lsf_information"] {
        let series = format!("lsf_scrape_collector_success{{collector=\"{collector}\"}}");
        assert_eq!(series_value(&body, &series), Some(1.0), "{collector}");
    }
    // lsfjob is opt-in.
    assert!(!body.contains("lsf_bjobs_status"));
    assert!(!body.contains("collector=\"lsfjob\""));
}

#[tokio::test]
async fn test_partial_failure_still_returns_metrics() {
    let source = Arc::new(CannedCommands::cluster().without("bqueues"));
    let base_url = start_test_server(create_test_state(source, CollectorRegistry::new())).await;

    let resp = reqwest::get(format!("{}/metrics", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();

    assert_eq!(
        series_value(&body, "lsf_scrape_collector_success{collector=\"bqueues\"}"),
        Some(0.0)
    );
    assert_eq!(body.matches("lsf_scrape_collector_success{").count(), 5);
    assert!(!body.contains("lsf_bqueues_status{"));
    assert!(body.contains("lsf_bhost_host_status{"));
}

#[tokio::test]
async fn test_collect_filter() {
    let source = Arc::new(CannedCommands::cluster());
    let mut registry = CollectorRegistry::new();
    registry.set_enabled("lsfjob", true).unwrap();
    let base_url = start_test_server(create_test_state(source.clone(), registry)).await;

    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/metrics", base_url))
        .query(&[("collect[]", "lsfjob"), ("collect[]", "lsf_information")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();

    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        series_value(&body, "lsf_bjobs_count{queue=\"normal\",status=\"RUN\"}"),
        Some(2.0)
    );
    assert!(body.contains("job_name=\"train --epochs 10\""));
    assert!(!body.contains("lsf_bhost_"));
}

#[tokio::test]
async fn test_unknown_collector_is_client_error() {
    let source = Arc::new(CannedCommands::cluster());
    let base_url =
        start_test_server(create_test_state(source.clone(), CollectorRegistry::new())).await;

    let resp = reqwest::Client::new()
        .get(format!("{}/metrics", base_url))
        .query(&[("collect[]", "bhosts"), ("collect[]", "nvidia")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST.as_u16());
    assert!(resp.text().await.unwrap().contains("unknown collector: 'nvidia'"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_router_oneshot_disabled_defaults() {
    let mut registry = CollectorRegistry::new();
    registry.set_enabled("lsload", true).unwrap();
    registry.disable_defaults();
    let app = create_router(create_test_state(Arc::new(CannedCommands::cluster()), registry));

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8_lossy(&bytes);
    assert_eq!(body.matches("lsf_scrape_collector_success{").count(), 1);
    assert!(body.contains("lsf_lsload_mem{host_name=\"master01\"}"));
}

// =============================================================================
// Process-backed Tests
// =============================================================================

#[cfg(unix)]
mod process {
    use super::*;
    use lsf_exporter::command::{CommandRunner, LsfEnvironment};
    use lsf_exporter::config::LsfConfig;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Install a shell script named `program` printing `fixture`.
    fn install(bindir: &Path, program: &str, fixture: &Path) {
        let script = bindir.join(program);
        std::fs::write(
            &script,
            format!("#!/bin/sh\ncat '{}'\n", fixture.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_scrape_through_child_processes() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["conf", "bin", "etc"] {
            std::fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let testdata = Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata");
        let bindir = dir.path().join("bin");
        install(&bindir, "bhosts", &testdata.join("bhosts.out"));
        install(&bindir, "lsid", &testdata.join("lsid.out"));

        let config = LsfConfig {
            envdir: dir.path().join("conf").display().to_string(),
            bindir: bindir.display().to_string(),
            serverdir: dir.path().join("etc").display().to_string(),
            libdir: None,
            command_timeout: Some(std::time::Duration::from_secs(10)),
        };
        let runner = CommandRunner::new(LsfEnvironment::new(&config).unwrap())
            .with_timeout(config.command_timeout);

        let mut registry = CollectorRegistry::new();
        registry.disable_defaults();
        registry.set_enabled("bhosts", true).unwrap();
        registry.set_enabled("lsf_information", true).unwrap();

        let base_url = start_test_server(create_test_state(Arc::new(runner), registry)).await;
        let body = reqwest::get(format!("{}/metrics", base_url))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(
            series_value(&body, "lsf_bhost_njobs_count{host_name=\"node001\"}"),
            Some(16.0)
        );
        assert!(body.contains("clustername=\"cluster1\""));
        assert_eq!(
            series_value(&body, "lsf_scrape_collector_success{collector=\"bhosts\"}"),
            Some(1.0)
        );
    }
}

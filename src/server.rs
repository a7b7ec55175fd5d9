//! HTTP front end.
//!
//! Serves a landing page, a liveness probe and the metrics endpoint. The
//! metrics endpoint accepts repeated `collect[]` query parameters to run a
//! subset of collectors, and appends the exporter's own process and request
//! metrics unless they are disabled.

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::config::ServerConfig;
use crate::metrics::{CONTENT_TYPE, ExporterMetrics};
use crate::scrape::Scraper;

/// Query key selecting collectors.
const COLLECT_PARAM: &str = "collect[]";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<Scraper>,
    pub metrics_path: String,
    /// `None` when the number of parallel scrapes is unlimited.
    pub limiter: Option<Arc<Semaphore>>,
    /// `None` when metrics about the exporter itself are disabled.
    pub exporter_metrics: Option<Arc<ExporterMetrics>>,
}

impl AppState {
    /// Build state allowing at most `max_requests` parallel scrapes; 0 disables the limit.
    pub fn new(scraper: Arc<Scraper>, metrics_path: impl Into<String>, max_requests: usize) -> Self {
        Self {
            scraper,
            metrics_path: metrics_path.into(),
            limiter: (max_requests > 0).then(|| Arc::new(Semaphore::new(max_requests))),
            exporter_metrics: None,
        }
    }

    /// Build state from server settings, with exporter metrics unless disabled.
    ///
    /// # Errors
    /// Returns `prometheus::Error` if the exporter metrics cannot be registered.
    pub fn from_config(
        scraper: Arc<Scraper>,
        config: &ServerConfig,
    ) -> Result<Self, prometheus::Error> {
        let state = Self::new(scraper, config.metrics_path.clone(), config.max_requests);
        if config.disable_exporter_metrics {
            return Ok(state);
        }
        Ok(state.with_exporter_metrics(Arc::new(ExporterMetrics::new()?)))
    }

    pub fn with_exporter_metrics(mut self, metrics: Arc<ExporterMetrics>) -> Self {
        self.exporter_metrics = Some(metrics);
        self
    }
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    let app_state = Arc::new(state);

    Router::new()
        .route("/", get(landing_handler))
        .route("/healthz", get(healthz_handler))
        .route(&metrics_path, get(metrics_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .with_state(app_state)
}

/// Landing page linking to the metrics endpoint.
async fn landing_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>LSF Exporter</title></head>\n\
         <body>\n\
         <h1>LSF Exporter</h1>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        path = state.metrics_path
    ))
}

/// Liveness probe.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Scrape the selected collectors and render the exposition text.
async fn metrics_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let Some(exporter) = state.exporter_metrics.clone() else {
        return scrape_response(&state, params).await;
    };

    exporter.request_started();
    let response = scrape_response(&state, params).await;
    exporter.request_finished(response.status().as_u16());
    response
}

async fn scrape_response(state: &AppState, params: Vec<(String, String)>) -> Response {
    let _permit = match &state.limiter {
        Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!("Rejecting scrape, too many parallel requests");
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "too many parallel scrape requests\n",
                )
                    .into_response();
            }
        },
        None => None,
    };

    let filters: Vec<String> = params
        .into_iter()
        .filter(|(key, _)| key == COLLECT_PARAM)
        .map(|(_, value)| value)
        .collect();

    let report = match state.scraper.scrape(&filters).await {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting scrape request");
            return (StatusCode::BAD_REQUEST, format!("{e}\n")).into_response();
        }
    };

    match report.render_with(state.exporter_metrics.as_deref()) {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorRegistry;
    use crate::command::testing::FakeCommands;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    const BHOSTS: &str = include_str!("../testdata/bhosts.out");
    const LSID: &str = include_str!("../testdata/lsid.out");

    fn create_test_state(max_requests: usize) -> (AppState, Arc<FakeCommands>) {
        let commands = Arc::new(
            FakeCommands::new()
                .with_output("bhosts", BHOSTS)
                .with_output("lsid", LSID),
        );
        let scraper = Scraper::new(CollectorRegistry::new(), commands.clone());
        (
            AppState::new(Arc::new(scraper), "/metrics", max_requests),
            commands,
        )
    }

    async fn send(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_healthz() {
        let (state, _) = create_test_state(1);
        let (status, _, body) = send(create_router(state), "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics() {
        let (state, _) = create_test_state(1);
        let (status, _, body) = send(create_router(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("href=\"/metrics\""));
    }

    #[tokio::test]
    async fn test_metrics_with_filters() {
        let (state, commands) = create_test_state(1);
        let (status, content_type, body) = send(
            create_router(state),
            "/metrics?collect%5B%5D=bhosts&collect%5B%5D=lsf_information",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(CONTENT_TYPE));
        assert!(body.contains("lsf_bhost_host_status{host_name=\"node001\"} 1"));
        assert!(body.contains("lsf_cluster_info{clustername=\"cluster1\""));
        assert!(body.contains("lsf_scrape_collector_success{collector=\"bhosts\"} 1"));
        assert_eq!(commands.calls(), 2);
    }

    #[tokio::test]
    async fn test_metrics_reports_failed_collectors() {
        let (state, _) = create_test_state(0);
        let (status, _, body) = send(create_router(state), "/metrics").await;

        // bqueues, lshosts and lsload have no canned output.
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("lsf_scrape_collector_success{collector=\"bhosts\"} 1"));
        assert!(body.contains("lsf_scrape_collector_success{collector=\"lsload\"} 0"));
    }

    #[tokio::test]
    async fn test_metrics_unknown_collector() {
        let (state, commands) = create_test_state(1);
        let (status, _, body) = send(create_router(state), "/metrics?collect%5B%5D=slurm").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("unknown collector: 'slurm'"));
        assert_eq!(commands.calls(), 0);
    }

    #[tokio::test]
    async fn test_metrics_disabled_collector() {
        let (state, _) = create_test_state(1);
        let (status, _, body) = send(create_router(state), "/metrics?collect%5B%5D=lsfjob").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("disabled collector: 'lsfjob'"));
    }

    #[tokio::test]
    async fn test_metrics_rejects_over_limit() {
        let (state, commands) = create_test_state(1);
        let limiter = state.limiter.clone().unwrap();
        let _held = limiter.try_acquire_owned().unwrap();

        let (status, _, _) = send(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(commands.calls(), 0);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let (mut state, _) = create_test_state(1);
        state.metrics_path = "/lsf/metrics".to_string();
        let app = create_router(state);

        let (status, _, _) = send(app.clone(), "/lsf/metrics?collect%5B%5D=bhosts").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _, _) = send(app, "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_exporter_metrics_enabled_by_default() {
        let (state, _) = create_test_state(1);
        let state = AppState::from_config(state.scraper, &ServerConfig::default()).unwrap();
        let app = create_router(state);

        let (status, _, body) = send(app.clone(), "/metrics?collect%5B%5D=bhosts").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("promhttp_metric_handler_requests_total{code=\"200\"} 0"));
        assert!(body.contains("promhttp_metric_handler_requests_in_flight 1"));
        #[cfg(target_os = "linux")]
        assert!(body.lines().any(|l| l.starts_with("process_")));

        let (_, _, body) = send(app, "/metrics?collect%5B%5D=bhosts").await;
        assert!(body.contains("promhttp_metric_handler_requests_total{code=\"200\"} 1"));
    }

    #[tokio::test]
    async fn test_exporter_metrics_count_rejected_requests() {
        let (state, _) = create_test_state(1);
        let state = AppState::from_config(state.scraper, &ServerConfig::default()).unwrap();
        let app = create_router(state);

        let (status, _, _) = send(app.clone(), "/metrics?collect%5B%5D=slurm").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, _, body) = send(app, "/metrics?collect%5B%5D=bhosts").await;
        assert!(body.contains("promhttp_metric_handler_requests_total{code=\"400\"} 1"));
    }

    #[tokio::test]
    async fn test_exporter_metrics_disabled() {
        let (state, _) = create_test_state(1);
        let config = ServerConfig {
            disable_exporter_metrics: true,
            ..ServerConfig::default()
        };
        let state = AppState::from_config(state.scraper, &config).unwrap();
        assert!(state.exporter_metrics.is_none());

        let (status, _, body) = send(create_router(state), "/metrics?collect%5B%5D=bhosts").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("lsf_bhost_host_status{"));
        assert!(!body.contains("promhttp_"));
        assert!(!body.lines().any(|l| l.starts_with("process_")));
    }
}

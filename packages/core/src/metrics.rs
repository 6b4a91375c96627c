//! Prometheus metrics registry for the ombruk backend.
//!
//! [`AppMetrics`] owns all registered metrics and the [`Registry`] they
//! belong to. Construct it once at startup, wrap in `Arc`, and hand it to
//! the router (HTTP middleware) and to the services that count domain events.
//!
//! Exposed at `GET /metrics` in Prometheus text exposition format
//! (`text/plain; version=0.0.4`), outside bearer-token auth.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// All application-level Prometheus metrics.
pub struct AppMetrics {
    /// HTTP request count, labelled by method, matched path, and status code.
    pub http_requests_total: CounterVec,
    /// HTTP request latency histogram in seconds.
    pub http_request_duration: Histogram,
    /// Keycloak admin API calls, labelled by operation and outcome.
    pub keycloak_requests_total: CounterVec,
    /// Accepted utlysninger (partner sign-ups).
    pub utlysning_pameldinger_total: Counter,
    /// Sum of registered weight in kilograms.
    pub vekt_registrert_kg_total: Counter,
    pub registry: Registry,
}

impl AppMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new(
                "ombruk_http_requests_total",
                "HTTP requests by method, path, and status",
            ),
            &["method", "path", "status"],
        )?;

        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ombruk_http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;

        let keycloak_requests_total = CounterVec::new(
            Opts::new(
                "ombruk_keycloak_requests_total",
                "Keycloak admin API calls by operation and outcome",
            ),
            &["operation", "outcome"],
        )?;

        let utlysning_pameldinger_total = Counter::with_opts(Opts::new(
            "ombruk_utlysning_pameldinger_total",
            "Utlysninger accepted by a partner",
        ))?;

        let vekt_registrert_kg_total = Counter::with_opts(Opts::new(
            "ombruk_vekt_registrert_kg_total",
            "Registered pickup weight in kilograms",
        ))?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(keycloak_requests_total.clone()))?;
        registry.register(Box::new(utlysning_pameldinger_total.clone()))?;
        registry.register(Box::new(vekt_registrert_kg_total.clone()))?;

        Ok(Self {
            http_requests_total,
            http_request_duration,
            keycloak_requests_total,
            utlysning_pameldinger_total,
            vekt_registrert_kg_total,
            registry,
        })
    }

    /// Render all metrics as Prometheus text format (for the `/metrics` endpoint).
    pub fn render(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf)?;
        Ok(String::from_utf8(buf).unwrap_or_default())
    }
}

/// Axum middleware recording request count and latency.
///
/// Labels use the route template (`/partnere/:id`), never the raw URI.
pub async fn track_http(
    State(metrics): State<Arc<AppMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    metrics
        .http_request_duration
        .observe(started.elapsed().as_secs_f64());
    metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), response.status().as_str()])
        .inc();

    response
}

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::oneshot;

use super::MetricSink;
use crate::error::MetricsError;
use crate::pipeline::context::LabelMap;

pub const METRIC_NAME: &str = "logs_total";
pub const METRIC_HELP: &str = "Total number of logs received";

/// Counter server settings; `labels` is the fixed label schema.
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub port: u16,
    pub labels: Vec<String>,
}

/// Serves `logs_total` on `0.0.0.0:<port>/metrics` from a private registry.
///
/// The label schema is fixed when the config is loaded, so every increment
/// reports a value for every label, with "" for fields the line lacked.
pub struct PrometheusSink {
    config: PrometheusConfig,
    registry: Registry,
    logs_total: IntCounterVec,
    shutdown: Option<oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl PrometheusSink {
    pub fn new(config: PrometheusConfig) -> Result<Self, MetricsError> {
        let registry = Registry::new();
        let label_names: Vec<&str> = config.labels.iter().map(String::as_str).collect();
        let logs_total = IntCounterVec::new(Opts::new(METRIC_NAME, METRIC_HELP), &label_names)?;
        registry.register(Box::new(logs_total.clone()))?;

        Ok(PrometheusSink {
            config,
            registry,
            logs_total,
            shutdown: None,
            local_addr: None,
        })
    }

    /// Address actually bound, known once started (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Current exposition text, as served to scrapers.
    pub fn render(&self) -> Result<String, MetricsError> {
        encode(&self.registry)
    }

    fn label_values<'a>(&'a self, labels: &'a LabelMap) -> Vec<&'a str> {
        self.config
            .labels
            .iter()
            .map(|name| labels.get(name).map_or("", String::as_str))
            .collect()
    }
}

impl MetricSink for PrometheusSink {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn start(&mut self) -> Result<(), MetricsError> {
        if self.shutdown.is_some() {
            return Ok(());
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = std::net::TcpListener::bind(addr).map_err(|source| MetricsError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(listener)?;
        self.local_addr = listener.local_addr().ok();

        let app = Router::new()
            .route("/metrics", get(scrape))
            .with_state(self.registry.clone());

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::warn!(error = %e, "prometheus server failed");
            }
        });
        self.shutdown = Some(tx);
        tracing::debug!(addr = ?self.local_addr, "serving prometheus metrics");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
            tracing::debug!("prometheus server stopped");
        }
    }

    fn increment(&self, labels: &LabelMap) {
        let values = self.label_values(labels);
        match self.logs_total.get_metric_with_label_values(&values) {
            Ok(counter) => counter.inc(),
            Err(e) => tracing::debug!(error = %e, "counter rejected label values"),
        }
    }
}

async fn scrape(State(registry): State<Registry>) -> impl IntoResponse {
    match encode(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain".to_string())],
                e.to_string(),
            )
        }
    }
}

fn encode(registry: &Registry) -> Result<String, MetricsError> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

use std::sync::Arc;
use tracing::{error, info};

use axum::{Router, routing::get};
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, MeterProvider};
use opentelemetry_sdk::metrics::{MetricError, SdkMeterProvider};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<prometheus::Registry>,
    _provider: SdkMeterProvider,
    pub network_name: String,

    // API metrics
    pub api_requests: Counter<u64>,
    pub api_errors: Counter<u64>,
    pub api_latency: Histogram<f64>,

    // Sync metrics
    pub events_stored: Counter<u64>,
    pub sync_failures: Counter<u64>,
    pub last_synced_block: Gauge<u64>,
}

impl Metrics {
    pub fn new(network_name: String) -> Result<Self, MetricError> {
        let registry = prometheus::Registry::new();

        // Configure OpenTelemetry to use this registry
        let exporter = opentelemetry_prometheus::exporter()
            .with_registry(registry.clone())
            .build()?;

        let provider = SdkMeterProvider::builder().with_reader(exporter).build();
        let meter = provider.meter("address_indexer_metrics");

        let api_requests = meter
            .u64_counter("indexer_api_requests")
            .with_description("Number of requests made to the indexing API")
            .build();

        let api_errors = meter
            .u64_counter("indexer_api_errors")
            .with_description("Number of failed requests to the indexing API")
            .build();

        let api_latency = meter
            .f64_histogram("indexer_api_latency")
            .with_description("Indexing API request latency")
            .with_boundaries(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
            .with_unit("s")
            .build();

        let events_stored = meter
            .u64_counter("indexer_events_stored")
            .with_description("Number of events appended to the local store")
            .build();

        let sync_failures = meter
            .u64_counter("indexer_sync_failures")
            .with_description("Number of failed per-kind syncs")
            .build();

        let last_synced_block = meter
            .u64_gauge("indexer_last_synced_block_number")
            .with_description("Highest block number stored per event kind")
            .build();

        Ok(Self {
            registry: Arc::new(registry),
            _provider: provider,
            network_name,
            api_requests,
            api_errors,
            api_latency,
            events_stored,
            sync_failures,
            last_synced_block,
        })
    }

    pub fn labels(&self, key: &'static str, value: impl Into<String>) -> [KeyValue; 2] {
        [
            KeyValue::new("network", self.network_name.clone()),
            KeyValue::new(key, value.into()),
        ]
    }

    pub async fn start_metrics_server(&self, addr: &str, port: u16) -> std::io::Result<()> {
        let addr = format!("{addr}:{port}")
            .parse::<SocketAddr>()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        let registry = self.registry.clone();

        let app = Router::new().route("/metrics", get(move || metrics_handler(registry.clone())));

        // Only used for logging
        let access_url = if addr.ip().is_unspecified() {
            format!("http://localhost:{port}/metrics")
        } else {
            format!("http://{}:{port}/metrics", addr.ip())
        };

        info!(
            "Starting metrics server - binding to {} (accessible at {})",
            addr, access_url
        );

        let listener = tokio::net::TcpListener::bind(addr).await?;

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!("Metrics server stopped: {}", e);
            }
        });

        Ok(())
    }

    pub fn render(&self) -> String {
        encode_registry(&self.registry)
    }
}

fn encode_registry(registry: &prometheus::Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

async fn metrics_handler(registry: Arc<prometheus::Registry>) -> String {
    encode_registry(&registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_are_exported() {
        let metrics = Metrics::new("ethereum_main".to_string()).unwrap();
        metrics
            .api_requests
            .add(1, &metrics.labels("kind", "erc20"));
        metrics
            .last_synced_block
            .record(42, &metrics.labels("kind", "normal"));

        let rendered = metrics.render();
        assert!(rendered.contains("indexer_api_requests"));
        assert!(rendered.contains("indexer_last_synced_block_number"));
        assert!(rendered.contains("ethereum_main"));
    }
}

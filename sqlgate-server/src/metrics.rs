//! Prometheus metrics for the gateway.

use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::Arc;

/// Single-label set `{<name>="<value>"}`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Label(pub &'static str, pub String);

impl prometheus_client::encoding::EncodeLabelSet for Label {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        (self.0, self.1.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct GatewayMetrics {
    pub queries: Family<Label, Counter>,
    pub rows_streamed: Counter,
    pub imports: Family<Label, Counter>,
    pub active_queries: Gauge,
    pub live_connectors: Gauge,
    pub registry: Arc<Registry>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let queries = Family::<Label, Counter>::default();
        registry.register(
            "sqlgate_queries",
            "Queries finished by outcome",
            queries.clone(),
        );

        let rows_streamed = Counter::default();
        registry.register(
            "sqlgate_rows_streamed",
            "Rows forwarded to query consumers",
            rows_streamed.clone(),
        );

        let imports = Family::<Label, Counter>::default();
        registry.register("sqlgate_imports", "Imports by result", imports.clone());

        let active_queries = Gauge::default();
        registry.register(
            "sqlgate_active_queries",
            "Queries currently streaming",
            active_queries.clone(),
        );

        let live_connectors = Gauge::default();
        registry.register(
            "sqlgate_live_connectors",
            "Profiles with an open driver",
            live_connectors.clone(),
        );

        Self {
            queries,
            rows_streamed,
            imports,
            active_queries,
            live_connectors,
            registry: Arc::new(registry),
        }
    }

    pub fn query_finished(&self, outcome: &'static str) {
        self.queries
            .get_or_create(&Label("outcome", outcome.to_string()))
            .inc();
    }

    pub fn import_finished(&self, ok: bool) {
        let result = if ok { "success" } else { "failure" };
        self.imports
            .get_or_create(&Label("result", result.to_string()))
            .inc();
    }

    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buf = String::new();
        if let Err(e) = encode(&mut buf, &self.registry) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        buf
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

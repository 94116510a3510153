use std::sync::Arc;
use std::time::Duration;

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::sync::OutcomeKind;

// ---------------------------------------------------------------------------
// Label types
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PassLabels {
    pub result: PassResult,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum PassResult {
    Completed,
    ListingFailed,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: OutcomeKind,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct GitRequestLabels {
    pub service: GitService,
    pub status: u16,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum GitService {
    InfoRefs,
    UploadPack,
    ReceivePack,
}

// ---------------------------------------------------------------------------
// Metrics struct
// ---------------------------------------------------------------------------

/// Every Prometheus metric exposed by the service.
pub struct Metrics {
    // -- sync --
    pub sync_passes_total: Family<PassLabels, Counter>,
    pub sync_outcomes_total: Family<OutcomeLabels, Counter>,
    pub sync_pass_duration_seconds: Histogram,

    // -- git protocol --
    pub git_requests_total: Family<GitRequestLabels, Counter>,
}

impl Metrics {
    /// Create a new [`Metrics`] instance and register every metric with the
    /// supplied `registry`.
    pub fn new(registry: &mut Registry) -> Self {
        let sync_passes_total = Family::<PassLabels, Counter>::default();
        registry.register(
            "repobridge_sync_passes",
            "Sync passes by result",
            sync_passes_total.clone(),
        );

        let sync_outcomes_total = Family::<OutcomeLabels, Counter>::default();
        registry.register(
            "repobridge_sync_outcomes",
            "Per-repository sync outcomes",
            sync_outcomes_total.clone(),
        );

        let sync_pass_duration_seconds = Histogram::new(exponential_buckets(0.05, 2.0, 14));
        registry.register(
            "repobridge_sync_pass_duration_seconds",
            "Duration of completed sync passes in seconds",
            sync_pass_duration_seconds.clone(),
        );

        let git_requests_total = Family::<GitRequestLabels, Counter>::default();
        registry.register(
            "repobridge_git_requests",
            "Smart-HTTP requests by service and response status",
            git_requests_total.clone(),
        );

        Self {
            sync_passes_total,
            sync_outcomes_total,
            sync_pass_duration_seconds,
            git_requests_total,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Thread-safe wrapper for the metrics registry, used in `AppState` and by
/// the sync orchestrator.
#[derive(Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub metrics: Arc<Metrics>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    /// Build a fresh registry with every metric pre-registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        Self {
            registry: Arc::new(registry),
            metrics: Arc::new(metrics),
        }
    }

    /// Count a finished host pass.  `duration` is only observed for passes
    /// that got past listing.
    pub fn record_pass(&self, completed: bool, duration: Option<Duration>) {
        let result = if completed {
            PassResult::Completed
        } else {
            PassResult::ListingFailed
        };
        self.metrics
            .sync_passes_total
            .get_or_create(&PassLabels { result })
            .inc();
        if let Some(duration) = duration {
            self.metrics
                .sync_pass_duration_seconds
                .observe(duration.as_secs_f64());
        }
    }

    pub fn record_outcome(&self, outcome: OutcomeKind) {
        self.metrics
            .sync_outcomes_total
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
    }

    pub fn record_git_request(&self, service: GitService, status: u16) {
        self.metrics
            .git_requests_total
            .get_or_create(&GitRequestLabels { service, status })
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::encoding::text::encode;

    use super::*;

    fn render(metrics: &MetricsRegistry) -> String {
        let mut buf = String::new();
        encode(&mut buf, &metrics.registry).unwrap();
        buf
    }

    #[test]
    fn sync_counters_render_with_labels() {
        let metrics = MetricsRegistry::new();
        metrics.record_pass(true, Some(Duration::from_millis(120)));
        metrics.record_pass(false, None);
        metrics.record_outcome(OutcomeKind::CloneTriggered);
        metrics.record_outcome(OutcomeKind::CloneTriggered);

        let text = render(&metrics);
        assert!(text.contains(r#"repobridge_sync_passes_total{result="Completed"} 1"#));
        assert!(text.contains(r#"repobridge_sync_passes_total{result="ListingFailed"} 1"#));
        assert!(text.contains(r#"repobridge_sync_outcomes_total{outcome="CloneTriggered"} 2"#));
        assert!(text.contains("repobridge_sync_pass_duration_seconds_count 1"));
    }

    #[test]
    fn git_requests_are_labelled_by_service_and_status() {
        let metrics = MetricsRegistry::new();
        metrics.record_git_request(GitService::InfoRefs, 200);
        metrics.record_git_request(GitService::ReceivePack, 403);

        let text = render(&metrics);
        assert!(text.contains(r#"service="InfoRefs",status="200""#));
        assert!(text.contains(r#"service="ReceivePack",status="403""#));
    }
}

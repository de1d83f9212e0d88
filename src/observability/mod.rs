//! Ambient observability stack (spec.md section 6): structured log lines
//! keyed by operation and agent-kind, plus counters for retries, breaker
//! transitions, and token usage. Grounded in the teacher's
//! `observability` module, trimmed to what a substrate with no wire
//! protocol of its own needs (no distributed tracing, no
//! Jaeger/Prometheus exporters).

pub mod metrics;
pub mod telemetry;
pub mod tracing;

pub use metrics::{AgentKindMetrics, MetricsCollector};
pub use telemetry::{ConsoleExporter, JsonLinesFileExporter, NullExporter, TelemetryExporter};
pub use tracing::{AgentTracer, TraceEvent, TraceStatus};

/// Process-wide observability handle bundling the tracer and metrics
/// collector so agent construction takes one `Arc` instead of two.
pub struct Observability {
    pub tracer: AgentTracer,
    pub metrics: MetricsCollector,
}

impl Observability {
    pub fn new(exporter: Box<dyn TelemetryExporter>) -> Self {
        Self {
            tracer: AgentTracer::new(exporter),
            metrics: MetricsCollector::new(),
        }
    }
}

impl Default for Observability {
    fn default() -> Self {
        Self::new(Box::new(NullExporter))
    }
}

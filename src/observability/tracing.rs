use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::telemetry::TelemetryExporter;

/// Outcome of a traced operation. Trimmed from the teacher's much larger
/// gRPC-style `TraceStatus` enum (`src/observability/tracing.rs`) down to
/// the three outcomes this substrate actually distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceStatus {
    Ok,
    Retried,
    Error,
}

/// One structured log line: an operation on an agent-kind, with outcome,
/// duration, and free-form fields. Spec.md section 6 asks for "structured
/// log lines keyed by operation and agent-kind" -- this is that line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub operation: String,
    pub agent_kind: String,
    pub status: TraceStatus,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub fields: HashMap<String, String>,
}

/// Collects trace events in memory (bounded ring buffer) and forwards
/// each one to a [`TelemetryExporter`] sink as it's recorded. Grounded in
/// the teacher's `AgentTracer`, stripped of distributed span/parent-child
/// tracking -- this crate has no cross-process call chain to stitch
/// together, only single-hop operations worth logging.
pub struct AgentTracer {
    events: RwLock<Vec<TraceEvent>>,
    capacity: usize,
    exporter: Box<dyn TelemetryExporter>,
}

impl AgentTracer {
    pub fn new(exporter: Box<dyn TelemetryExporter>) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            capacity: 1024,
            exporter,
        }
    }

    pub fn record(
        &self,
        operation: impl Into<String>,
        agent_kind: impl Into<String>,
        status: TraceStatus,
        duration: Duration,
        fields: HashMap<String, String>,
    ) {
        let event = TraceEvent {
            operation: operation.into(),
            agent_kind: agent_kind.into(),
            status,
            started_at: Utc::now(),
            duration,
            fields,
        };

        self.exporter.export(&event);

        let mut events = self.events.write().unwrap();
        if events.len() >= self.capacity {
            events.remove(0);
        }
        events.push(event);
    }

    pub fn recent(&self, limit: usize) -> Vec<TraceEvent> {
        let events = self.events.read().unwrap();
        events.iter().rev().take(limit).cloned().collect()
    }
}

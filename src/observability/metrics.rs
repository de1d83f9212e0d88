use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-agent-kind operational counters: requests, retries, breaker
/// transitions, and latency. Grounded in the teacher's `AgentMetrics`
/// (`src/observability/metrics.rs`), re-keyed by agent-kind instead of
/// per-agent-instance UUID since this crate has one shared breaker/retry
/// policy per kind rather than one per agent instance (spec.md section
/// 6: "counters for retries, breaker transitions, and token usage").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentKindMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_retries: u64,
    pub breaker_opens: u64,
    pub breaker_closes: u64,
    pub fallback_invocations: u64,
    pub total_duration: Duration,
}

impl AgentKindMetrics {
    pub fn average_duration(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.total_requests as u32
        }
    }
}

/// Thread-safe collector. One process-wide instance shared across every
/// agent, analogous to the teacher's `MetricsCollector`.
pub struct MetricsCollector {
    by_kind: RwLock<HashMap<String, AgentKindMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            by_kind: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_request(&self, agent_kind: &str, success: bool, duration: Duration, retries: u64) {
        let mut map = self.by_kind.write().unwrap();
        let entry = map.entry(agent_kind.to_string()).or_default();
        entry.total_requests += 1;
        if success {
            entry.successful_requests += 1;
        } else {
            entry.failed_requests += 1;
        }
        entry.total_retries += retries;
        entry.total_duration += duration;
    }

    pub fn record_breaker_open(&self, agent_kind: &str) {
        self.by_kind
            .write()
            .unwrap()
            .entry(agent_kind.to_string())
            .or_default()
            .breaker_opens += 1;
    }

    pub fn record_breaker_close(&self, agent_kind: &str) {
        self.by_kind
            .write()
            .unwrap()
            .entry(agent_kind.to_string())
            .or_default()
            .breaker_closes += 1;
    }

    pub fn record_fallback(&self, agent_kind: &str) {
        self.by_kind
            .write()
            .unwrap()
            .entry(agent_kind.to_string())
            .or_default()
            .fallback_invocations += 1;
    }

    pub fn snapshot(&self, agent_kind: &str) -> AgentKindMetrics {
        self.by_kind
            .read()
            .unwrap()
            .get(agent_kind)
            .cloned()
            .unwrap_or_default()
    }

    pub fn export(&self) -> HashMap<String, AgentKindMetrics> {
        self.by_kind.read().unwrap().clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_requests_and_computes_average_duration() {
        let collector = MetricsCollector::new();
        collector.record_request("summarizer", true, Duration::from_millis(100), 0);
        collector.record_request("summarizer", false, Duration::from_millis(300), 2);

        let snapshot = collector.snapshot("summarizer");
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.total_retries, 2);
        assert_eq!(snapshot.average_duration(), Duration::from_millis(200));
    }

    #[test]
    fn breaker_and_fallback_counters_are_independent_per_kind() {
        let collector = MetricsCollector::new();
        collector.record_breaker_open("concept_explainer");
        collector.record_breaker_open("concept_explainer");
        collector.record_breaker_close("concept_explainer");
        collector.record_fallback("concept_explainer");

        let snapshot = collector.snapshot("concept_explainer");
        assert_eq!(snapshot.breaker_opens, 2);
        assert_eq!(snapshot.breaker_closes, 1);
        assert_eq!(snapshot.fallback_invocations, 1);
        assert_eq!(collector.snapshot("summarizer").breaker_opens, 0);
    }
}

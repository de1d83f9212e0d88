use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::config::ProviderConfig;
use crate::config::ProviderKind;

/// One usage observation, the unit recorded after a completed provider call.
#[derive(Debug, Clone, Copy)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_micro_cents: i64,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_micro_cents: AtomicI64,
}

impl Counters {
    fn record(&self, record: UsageRecord) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.input_tokens
            .fetch_add(record.input_tokens, Ordering::SeqCst);
        self.output_tokens
            .fetch_add(record.output_tokens, Ordering::SeqCst);
        self.cost_micro_cents
            .fetch_add(record.cost_micro_cents, Ordering::SeqCst);
    }

    fn snapshot(&self) -> UsageBreakdown {
        UsageBreakdown {
            calls: self.calls.load(Ordering::SeqCst),
            input_tokens: self.input_tokens.load(Ordering::SeqCst),
            output_tokens: self.output_tokens.load(Ordering::SeqCst),
            cost_micro_cents: self.cost_micro_cents.load(Ordering::SeqCst),
        }
    }

    fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
        self.input_tokens.store(0, Ordering::SeqCst);
        self.output_tokens.store(0, Ordering::SeqCst);
        self.cost_micro_cents.store(0, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UsageBreakdown {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_micro_cents: i64,
}

/// Rendered report for one `(agent_kind, provider)` pair plus the
/// process-wide total (spec.md section 4.5's two metering tiers).
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub by_agent_kind: HashMap<String, UsageBreakdown>,
    pub by_provider: HashMap<&'static str, UsageBreakdown>,
    pub total: UsageBreakdown,
}

/// Exact integer cost formula from spec.md section 4.5: rates are stored
/// per-1,000,000 tokens in micro-cents, so `tokens * rate / 1_000_000`
/// reproduces the spec's worked fractional examples without floating
/// point drift.
pub fn cost_micro_cents(input_tokens: u64, output_tokens: u64, config: &ProviderConfig) -> i64 {
    let in_cost = (input_tokens as i64) * config.cost_in_per_1m_micro_cents / 1_000_000;
    let out_cost = (output_tokens as i64) * config.cost_out_per_1m_micro_cents / 1_000_000;
    in_cost + out_cost
}

/// Token/cost meter (C5). Maintains a per-instance tier (reset between
/// logical runs, e.g. a batch job) and a process-wide tier (never reset,
/// grounded in the teacher's distinction between a request-scoped tracker
/// and its global singleton in `src/observability/cost_tracker.rs`).
pub struct Meter {
    process_wide: Mutex<HashMap<(String, ProviderKind), Counters>>,
    instance: Mutex<HashMap<(String, ProviderKind), Counters>>,
}

impl Meter {
    pub fn new() -> Self {
        Self {
            process_wide: Mutex::new(HashMap::new()),
            instance: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(
        &self,
        agent_kind: &str,
        provider: ProviderKind,
        input_tokens: u64,
        output_tokens: u64,
        config: &ProviderConfig,
    ) -> UsageRecord {
        let record = UsageRecord {
            input_tokens,
            output_tokens,
            cost_micro_cents: cost_micro_cents(input_tokens, output_tokens, config),
        };
        let key = (agent_kind.to_string(), provider);

        self.process_wide
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .record(record);
        self.instance.lock().unwrap().entry(key).or_default().record(record);

        record
    }

    /// Zero the per-instance tier only; the process-wide tier is
    /// cumulative for the life of the substrate.
    pub fn reset(&self) {
        for counters in self.instance.lock().unwrap().values() {
            counters.reset();
        }
    }

    pub fn report(&self) -> UsageReport {
        let instance = self.instance.lock().unwrap();

        let mut by_agent_kind: HashMap<String, UsageBreakdown> = HashMap::new();
        let mut by_provider: HashMap<&'static str, UsageBreakdown> = HashMap::new();
        let mut total = UsageBreakdown::default();

        for ((agent_kind, provider), counters) in instance.iter() {
            let snapshot = counters.snapshot();

            let entry = by_agent_kind.entry(agent_kind.clone()).or_default();
            merge(entry, &snapshot);

            let entry = by_provider.entry(provider.as_str()).or_default();
            merge(entry, &snapshot);

            merge(&mut total, &snapshot);
        }

        UsageReport {
            by_agent_kind,
            by_provider,
            total,
        }
    }

    pub fn process_wide_total(&self) -> UsageBreakdown {
        let process_wide = self.process_wide.lock().unwrap();
        let mut total = UsageBreakdown::default();
        for counters in process_wide.values() {
            merge(&mut total, &counters.snapshot());
        }
        total
    }
}

fn merge(into: &mut UsageBreakdown, from: &UsageBreakdown) {
    into.calls += from.calls;
    into.input_tokens += from.input_tokens;
    into.output_tokens += from.output_tokens;
    into.cost_micro_cents += from.cost_micro_cents;
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_formula_matches_the_worked_example() {
        let config = ProviderConfig::openai_defaults(None);
        // 1000 input tokens * 2.5 + 500 output tokens * 10.0 = 7500 micro-cents
        assert_eq!(cost_micro_cents(1000, 500, &config), 7500);
    }

    #[test]
    fn local_provider_is_free() {
        let config = ProviderConfig::local_defaults();
        assert_eq!(cost_micro_cents(10_000, 10_000, &config), 0);
    }

    #[test]
    fn instance_reset_does_not_touch_process_wide_total() {
        let meter = Meter::new();
        let config = ProviderConfig::openai_defaults(None);
        meter.record("summarizer", ProviderKind::OpenAi, 1000, 500, &config);
        meter.reset();

        assert_eq!(meter.report().total.calls, 0);
        assert_eq!(meter.process_wide_total().calls, 1);
        assert_eq!(meter.process_wide_total().cost_micro_cents, 7500);
    }

    #[test]
    fn report_breaks_down_by_agent_kind_and_provider() {
        let meter = Meter::new();
        let openai = ProviderConfig::openai_defaults(None);
        let anthropic = ProviderConfig::anthropic_defaults(None);

        meter.record("summarizer", ProviderKind::OpenAi, 1000, 500, &openai);
        meter.record("summarizer", ProviderKind::Anthropic, 200, 100, &anthropic);
        meter.record("concept_explainer", ProviderKind::OpenAi, 300, 150, &openai);

        let report = meter.report();
        assert_eq!(report.total.calls, 3);
        assert_eq!(report.by_agent_kind["summarizer"].calls, 2);
        assert_eq!(report.by_agent_kind["concept_explainer"].calls, 1);
        assert_eq!(report.by_provider["openai"].calls, 2);
        assert_eq!(report.by_provider["anthropic"].calls, 1);
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use rand::Rng;

use crate::config::{BreakerConfig, RetryConfig};
use crate::error::{classify, AgentError};

use super::circuit_breaker::CircuitBreakerRegistry;

/// Per-agent-kind retry statistics (spec.md section 3, `RetryStatistics`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryStatistics {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
}

impl RetryStatistics {
    pub fn success_ratio(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

/// Combines the retry loop and the per-agent-kind circuit breaker into the
/// single algorithm spec.md section 4.3 describes. One `RetryPolicy` is
/// shared process-wide; callers key every invocation by agent-kind.
pub struct RetryPolicy {
    config: RetryConfig,
    breakers: CircuitBreakerRegistry,
    stats: Mutex<HashMap<String, RetryStatistics>>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, breaker_config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: CircuitBreakerRegistry::new(breaker_config),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn statistics(&self, agent_kind: &str) -> RetryStatistics {
        self.stats
            .lock()
            .unwrap()
            .get(agent_kind)
            .copied()
            .unwrap_or_default()
    }

    pub fn circuit_state(&self, agent_kind: &str) -> super::circuit_breaker::CircuitState {
        self.breakers.get_or_create(agent_kind).state()
    }

    /// Execute `work` under retry + circuit breaker protection for
    /// `agent_kind`. `work` is re-invoked from scratch on every attempt, so
    /// callers must make it idempotent to retry (it is an `FnMut` producing
    /// a fresh future each time, matching the teacher's `RetryExecutor`).
    pub async fn execute<F, Fut, T>(&self, agent_kind: &str, mut work: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        let breaker = self.breakers.get_or_create(agent_kind);
        breaker.try_admit()?;

        self.record_call(agent_kind);

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.record_attempt(agent_kind);

            match work().await {
                Ok(value) => {
                    breaker.record_success();
                    self.record_success(agent_kind);
                    return Ok(value);
                }
                Err(err) => {
                    let kind = classify(&err);
                    if !kind.is_retryable() || attempt >= self.config.max_attempts {
                        breaker.record_failure();
                        return Err(err);
                    }
                    self.record_retry(agent_kind);
                    let delay = self.backoff_delay(attempt);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let base_millis = self.config.base_delay.as_millis() as u64;
        let scaled = base_millis.saturating_mul(1u64 << exponent.min(32));
        let capped = scaled.min(self.config.max_delay.as_millis() as u64);

        let jitter_ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        let mut rng = rand::thread_rng();
        let factor = 1.0 + rng.gen_range(-jitter_ratio..=jitter_ratio);
        let jittered = ((capped as f64) * factor).max(0.0) as u64;

        Duration::from_millis(jittered.min(self.config.max_delay.as_millis() as u64))
    }

    fn record_call(&self, agent_kind: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats.entry(agent_kind.to_string()).or_default().total_calls += 1;
    }

    fn record_attempt(&self, agent_kind: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats
            .entry(agent_kind.to_string())
            .or_default()
            .total_attempts += 1;
    }

    fn record_retry(&self, agent_kind: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats
            .entry(agent_kind.to_string())
            .or_default()
            .total_retries += 1;
    }

    fn record_success(&self, agent_kind: &str) {
        let mut stats = self.stats.lock().unwrap();
        stats
            .entry(agent_kind.to_string())
            .or_default()
            .successful_calls += 1;
    }
}

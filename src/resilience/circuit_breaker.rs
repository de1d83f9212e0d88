use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::BreakerConfig;
use crate::error::AgentError;

/// Per-agent-kind circuit breaker state, per spec.md section 3 /
/// `CircuitState`. Unlike the teacher's percentage-based breaker, this one
/// follows spec.md section 4.3 literally: a rolling failure *count* against
/// a threshold, a single half-open probe, and state transitions gated by a
/// mutex taken only for the transition itself (spec.md section 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    state_changed_at: Instant,
}

/// Breaker for a single agent-kind.
pub struct CircuitBreaker {
    agent_kind: String,
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(agent_kind: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            agent_kind: agent_kind.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                probe_in_flight: false,
                state_changed_at: Instant::now(),
            }),
        }
    }

    /// Step 1/7 of spec.md section 4.3: decide whether a call may proceed.
    /// `OPEN` rejects outright until the cool-down elapses; on elapsing it
    /// transitions to `HALF_OPEN` and admits exactly one probe.
    pub fn try_admit(&self) -> Result<(), AgentError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                if opened_at.elapsed() >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.state_changed_at = Instant::now();
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(AgentError::CircuitOpen {
                        agent_kind: self.agent_kind.clone(),
                        retry_after: self.config.open_duration - opened_at.elapsed(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(AgentError::CircuitOpen {
                        agent_kind: self.agent_kind.clone(),
                        retry_after: self.config.open_duration,
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Step 3: on success, close from half-open and reset the failure count.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.state_changed_at = Instant::now();
            inner.opened_at = None;
            inner.probe_in_flight = false;
        }
        inner.failure_count = 0;
    }

    /// Steps 4/6: on failure, bump the rolling count and open the breaker
    /// once the threshold is reached. A half-open probe failure reopens
    /// unconditionally regardless of threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.state_changed_at = Instant::now();
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.state_changed_at = Instant::now();
                inner.opened_at = Some(Instant::now());
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().unwrap().failure_count
    }

    /// Manually force the breaker closed. Used by tests and by operators
    /// recovering from a known-good provider incident.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
        inner.probe_in_flight = false;
        inner.state_changed_at = Instant::now();
    }
}

/// Keyed registry of breakers, one per agent-kind, lazily created. Grounded
/// in the teacher's `CircuitBreakerRegistry` (`src/error.rs`).
pub struct CircuitBreakerRegistry {
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: BreakerConfig,
}

impl CircuitBreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: Mutex::new(HashMap::new()),
            default_config,
        }
    }

    pub fn get_or_create(&self, agent_kind: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(agent_kind.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(agent_kind, self.default_config.clone()))
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(threshold: u32, open_duration: Duration) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: threshold,
            open_duration,
            half_open_probe: 1,
        }
    }

    #[test]
    fn single_failure_does_not_open() {
        let breaker = CircuitBreaker::new("summarizer", config(5, Duration::from_secs(60)));
        breaker.try_admit().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 1);
    }

    #[test]
    fn threshold_failures_open_the_breaker() {
        let breaker = CircuitBreaker::new("concept_explainer", config(5, Duration::from_secs(60)));
        for _ in 0..5 {
            breaker.try_admit().unwrap();
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_admit().is_err());
    }

    #[test]
    fn half_open_admits_a_single_probe() {
        let breaker = CircuitBreaker::new("citation_verifier", config(1, Duration::from_millis(0)));
        breaker.try_admit().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        // cool-down of 0ms has already elapsed
        breaker.try_admit().unwrap();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        // a second concurrent caller is rejected while the probe is in flight
        assert!(breaker.try_admit().is_err());
    }

    #[test]
    fn successful_probe_closes_the_breaker() {
        let breaker = CircuitBreaker::new("metadata_enhancer", config(1, Duration::from_millis(0)));
        breaker.try_admit().unwrap();
        breaker.record_failure();
        breaker.try_admit().unwrap();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new("metadata_enhancer", config(1, Duration::from_millis(0)));
        breaker.try_admit().unwrap();
        breaker.record_failure();
        breaker.try_admit().unwrap();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn registry_reuses_breaker_per_agent_kind() {
        let registry = CircuitBreakerRegistry::new(BreakerConfig::default());
        let a = registry.get_or_create("summarizer");
        let b = registry.get_or_create("summarizer");
        assert!(Arc::ptr_eq(&a, &b));
    }
}

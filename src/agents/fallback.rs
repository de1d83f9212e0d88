//! Fallback dispatcher (C9). On a primary agent's terminal failure, looks
//! up a local-provider twin agent of the same kind and replays the task
//! against it (spec.md section 4.9).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AgentError;
use crate::observability::Observability;

use super::{Agent, AgentKind, AgentResult, AgentTask};

/// Routes a task to its primary agent, and on primary failure (the retry
/// policy exhausted retries, classified the error fatal, or the breaker
/// was open) replays it against the registered fallback twin. Fallback
/// agents never carry a retry policy -- they execute directly and never
/// re-enter C3 (spec.md section 4.9) -- so a fallback failure is never
/// itself retried or counted against the primary's breaker (spec.md
/// section 9's Open Question, resolved here as "no").
pub struct FallbackDispatcher {
    primaries: HashMap<AgentKind, Arc<dyn Agent>>,
    fallbacks: HashMap<AgentKind, Arc<dyn Agent>>,
    local_provider_enabled: bool,
    observability: Option<Arc<Observability>>,
}

impl FallbackDispatcher {
    pub fn new(local_provider_enabled: bool) -> Self {
        Self {
            primaries: HashMap::new(),
            fallbacks: HashMap::new(),
            local_provider_enabled,
            observability: None,
        }
    }

    /// Attaches the shared observability handle so every fallback
    /// invocation is counted alongside the per-agent-kind request/retry/
    /// breaker metrics `AgentBase` records directly (spec.md section 6:
    /// "exposes counters for retries, breaker transitions, and token
    /// usage" -- fallback invocations are the remaining per-kind signal
    /// worth counting the same way).
    pub fn with_observability(mut self, observability: Arc<Observability>) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn register_primary(&mut self, agent: Arc<dyn Agent>) {
        self.primaries.insert(agent.agent_kind(), agent);
    }

    /// Registers a local-provider twin. Panics if the agent still carries
    /// a retry policy -- a fallback that re-entered C3 would defeat the
    /// point of falling over to it.
    pub fn register_fallback(&mut self, agent: Arc<dyn Agent>) {
        assert!(
            !agent.has_retry_policy(),
            "fallback agent for {:?} must not carry a retry policy",
            agent.agent_kind()
        );
        self.fallbacks.insert(agent.agent_kind(), agent);
    }

    /// Dispatch a task end to end. Always returns an `AgentResult` --
    /// never raises -- per spec.md section 7's uniform-envelope contract.
    pub async fn submit(&self, task: AgentTask) -> AgentResult {
        let kind = task.agent_kind;

        let Some(primary) = self.primaries.get(&kind).cloned() else {
            return AgentResult::invalid_input(
                task.id.clone(),
                format!("no primary agent registered for {kind:?}"),
            );
        };

        let primary_result = primary.process(task.clone()).await;
        if primary_result.success {
            return primary_result;
        }

        if !self.local_provider_enabled {
            return primary_result;
        }

        let Some(fallback) = self.fallbacks.get(&kind).cloned() else {
            return primary_result;
        };

        if let Some(observability) = &self.observability {
            observability.metrics.record_fallback(kind.as_str());
        }

        let primary_failure_reason = primary_result
            .error_message
            .clone()
            .unwrap_or_else(|| "unknown primary failure".to_string());

        let fallback_result = fallback.process(task.clone()).await;

        if fallback_result.success {
            AgentResult {
                used_fallback: true,
                primary_failure_reason: Some(primary_failure_reason),
                ..fallback_result
            }
        } else {
            let fallback_cause = fallback_result
                .error_message
                .clone()
                .unwrap_or_else(|| "unknown fallback failure".to_string());
            let combined = AgentError::FallbackFailed {
                agent_kind: kind.as_str().to_string(),
                primary_cause: primary_failure_reason.clone(),
                fallback_cause,
            };
            AgentResult {
                task_id: task.id,
                success: false,
                result: None,
                error_message: Some(combined.to_string()),
                duration: primary_result.duration + fallback_result.duration,
                metrics: fallback_result.metrics.or(primary_result.metrics),
                used_fallback: true,
                primary_failure_reason: Some(primary_failure_reason),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::resilience::LoadStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct ScriptedAgent {
        kind: AgentKind,
        provider: ProviderKind,
        has_retry: bool,
        calls: AtomicUsize,
        succeed_after: usize,
        failure_message: &'static str,
    }

    impl ScriptedAgent {
        fn always_fails(kind: AgentKind, provider: ProviderKind, has_retry: bool, message: &'static str) -> Self {
            Self {
                kind,
                provider,
                has_retry,
                calls: AtomicUsize::new(0),
                succeed_after: usize::MAX,
                failure_message: message,
            }
        }

        fn always_succeeds(kind: AgentKind, provider: ProviderKind, has_retry: bool) -> Self {
            Self {
                kind,
                provider,
                has_retry,
                calls: AtomicUsize::new(0),
                succeed_after: 0,
                failure_message: "",
            }
        }
    }

    #[async_trait]
    impl Agent for ScriptedAgent {
        fn agent_kind(&self) -> AgentKind {
            self.kind
        }

        fn provider(&self) -> ProviderKind {
            self.provider
        }

        fn can_handle(&self, _task: &AgentTask) -> bool {
            true
        }

        fn estimate_processing_time(&self, _task: &AgentTask) -> Duration {
            Duration::from_millis(1)
        }

        fn load_status(&self) -> LoadStatus {
            LoadStatus::Low
        }

        fn has_retry_policy(&self) -> bool {
            self.has_retry
        }

        async fn process(&self, task: AgentTask) -> AgentResult {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call >= self.succeed_after {
                AgentResult {
                    task_id: task.id,
                    success: true,
                    result: Some(serde_json::json!({ "ok": true })),
                    error_message: None,
                    duration: Duration::from_millis(1),
                    metrics: None,
                    used_fallback: false,
                    primary_failure_reason: None,
                }
            } else {
                AgentResult {
                    task_id: task.id,
                    success: false,
                    result: None,
                    error_message: Some(self.failure_message.to_string()),
                    duration: Duration::from_millis(1),
                    metrics: None,
                    used_fallback: false,
                    primary_failure_reason: None,
                }
            }
        }
    }

    fn task() -> AgentTask {
        AgentTask::new(AgentKind::ConceptExplainer, serde_json::json!({}))
    }

    #[tokio::test]
    async fn successful_primary_never_touches_fallback() {
        let mut dispatcher = FallbackDispatcher::new(true);
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_succeeds(
            AgentKind::ConceptExplainer,
            ProviderKind::OpenAi,
            true,
        )));
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::Local,
            false,
            "should not be called",
        )));

        let result = dispatcher.submit(task()).await;
        assert!(result.success);
        assert!(!result.used_fallback);
    }

    #[tokio::test]
    async fn primary_failure_falls_over_to_local_twin() {
        let mut dispatcher = FallbackDispatcher::new(true);
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::OpenAi,
            true,
            "circuit breaker open for agent kind concept_explainer",
        )));
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_succeeds(
            AgentKind::ConceptExplainer,
            ProviderKind::Local,
            false,
        )));

        let result = dispatcher.submit(task()).await;
        assert!(result.success);
        assert!(result.used_fallback);
        assert!(result
            .primary_failure_reason
            .as_deref()
            .unwrap()
            .contains("circuit"));
    }

    #[tokio::test]
    async fn fallback_invocation_is_counted_in_observability_metrics() {
        let observability = Arc::new(crate::observability::Observability::default());
        let mut dispatcher = FallbackDispatcher::new(true).with_observability(observability.clone());
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::OpenAi,
            true,
            "circuit breaker open for agent kind concept_explainer",
        )));
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_succeeds(
            AgentKind::ConceptExplainer,
            ProviderKind::Local,
            false,
        )));

        dispatcher.submit(task()).await;

        assert_eq!(
            observability
                .metrics
                .snapshot(AgentKind::ConceptExplainer.as_str())
                .fallback_invocations,
            1
        );
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_combined_cause() {
        let mut dispatcher = FallbackDispatcher::new(true);
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::OpenAi,
            true,
            "rate limit exceeded",
        )));
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::Local,
            false,
            "local provider unreachable",
        )));

        let result = dispatcher.submit(task()).await;
        assert!(!result.success);
        assert!(result.used_fallback);
        let message = result.error_message.unwrap();
        assert!(message.contains("rate limit exceeded"));
        assert!(message.contains("local provider unreachable"));
    }

    #[tokio::test]
    async fn disabled_local_provider_skips_fallback_entirely() {
        let mut dispatcher = FallbackDispatcher::new(false);
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_fails(
            AgentKind::ConceptExplainer,
            ProviderKind::OpenAi,
            true,
            "unauthorized",
        )));
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_succeeds(
            AgentKind::ConceptExplainer,
            ProviderKind::Local,
            false,
        )));

        let result = dispatcher.submit(task()).await;
        assert!(!result.success);
        assert!(!result.used_fallback);
    }

    #[tokio::test]
    async fn missing_fallback_registration_surfaces_primary_failure() {
        let mut dispatcher = FallbackDispatcher::new(true);
        dispatcher.register_primary(Arc::new(ScriptedAgent::always_fails(
            AgentKind::Summarizer,
            ProviderKind::OpenAi,
            true,
            "invalid_api_key",
        )));

        let result = dispatcher
            .submit(AgentTask::new(AgentKind::Summarizer, serde_json::json!({})))
            .await;
        assert!(!result.success);
        assert!(!result.used_fallback);
    }

    #[test]
    #[should_panic(expected = "must not carry a retry policy")]
    fn registering_a_retrying_fallback_panics() {
        let mut dispatcher = FallbackDispatcher::new(true);
        dispatcher.register_fallback(Arc::new(ScriptedAgent::always_succeeds(
            AgentKind::Summarizer,
            ProviderKind::Local,
            true,
        )));
    }
}

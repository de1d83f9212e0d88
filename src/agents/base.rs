use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;

use crate::config::{ProviderConfig, ProviderKind};
use crate::error::{classify, AgentError, Result};
use crate::external::{ExternalSearch, NullExternalSearch, Persistence};
use crate::meter::Meter;
use crate::observability::{Observability, TraceStatus};
use crate::providers::{ChatClient, ChatPrompt, ChatResponse};
use crate::resilience::{LoadStatus, RateLimiter, RetryPolicy, WorkerPool};

use super::{AgentKind, AgentResult, AgentTask, LoadStatusLabel, ProcessingMetrics};

/// Builds a client for a provider binding. Boxed so each agent can supply
/// its own construction logic (reading credentials, choosing a base url)
/// without `AgentBase` knowing about any concrete provider type.
pub type ClientFactory = Box<dyn Fn() -> Result<Arc<dyn ChatClient>> + Send + Sync>;

/// Shared machinery every concrete agent composes rather than inherits
/// (spec.md section 9). One `AgentBase` per agent instance; the retry
/// policy, rate limiter, meter, and pool it holds are themselves
/// process-wide `Arc`s shared across every agent in the substrate.
pub struct AgentBase {
    pub agent_kind: AgentKind,
    pub provider_kind: ProviderKind,
    pub provider_config: ProviderConfig,
    client: AsyncMutex<Option<Arc<dyn ChatClient>>>,
    client_factory: ClientFactory,
    /// `None` for fallback agents -- they never re-enter C3.
    pub retry: Option<Arc<RetryPolicy>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub meter: Arc<Meter>,
    pub pool: Arc<WorkerPool>,
    pub external: Arc<dyn ExternalSearch>,
    pub persistence: Arc<dyn Persistence>,
    pub observability: Arc<Observability>,
}

impl AgentBase {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_kind: AgentKind,
        provider_config: ProviderConfig,
        client_factory: ClientFactory,
        retry: Option<Arc<RetryPolicy>>,
        rate_limiter: Arc<RateLimiter>,
        meter: Arc<Meter>,
        pool: Arc<WorkerPool>,
        observability: Arc<Observability>,
    ) -> Self {
        Self::with_external(
            agent_kind,
            provider_config,
            client_factory,
            retry,
            rate_limiter,
            meter,
            pool,
            observability,
            Arc::new(NullExternalSearch),
            Arc::new(crate::external::InMemoryPersistence::new()),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_external(
        agent_kind: AgentKind,
        provider_config: ProviderConfig,
        client_factory: ClientFactory,
        retry: Option<Arc<RetryPolicy>>,
        rate_limiter: Arc<RateLimiter>,
        meter: Arc<Meter>,
        pool: Arc<WorkerPool>,
        observability: Arc<Observability>,
        external: Arc<dyn ExternalSearch>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let provider_kind = provider_config.kind;
        Self {
            agent_kind,
            provider_kind,
            provider_config,
            client: AsyncMutex::new(None),
            client_factory,
            retry,
            rate_limiter,
            meter,
            pool,
            external,
            persistence,
            observability,
        }
    }

    /// Persist a derived artifact. Per spec.md section 4.9, persistence
    /// failures are logged and swallowed -- they must never fail the
    /// primary task.
    pub async fn save_artifact(&self, paper: crate::external::DiscoveredPaper) {
        if let Err(e) = self.persistence.save(paper).await {
            eprintln!(
                "[{}] persistence warning (swallowed): {e}",
                self.agent_kind.as_str()
            );
        }
    }

    pub fn load_status(&self) -> LoadStatus {
        self.pool.load_status()
    }

    /// Lazy client binding (spec.md section 4.1 / 9): construction never
    /// fails if the provider is momentarily unreachable. The first call
    /// that actually needs the client re-attempts the bind.
    async fn bind_client(&self) -> Result<Arc<dyn ChatClient>> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = (self.client_factory)()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    /// Helper used by concrete agents to issue one provider call: binds
    /// the client, acquires a rate-limit permit, calls, and feeds the
    /// meter. Any failure is logged with an operator-facing description
    /// before being re-raised untouched, so C3 still sees the original
    /// typed error to classify.
    pub async fn execute_prompt(&self, operation: &str, mut prompt: ChatPrompt) -> Result<ChatResponse> {
        let started = Instant::now();
        let client = self.bind_client().await?;
        let _permit = self.rate_limiter.acquire(self.provider_kind).await;

        if let Some(system) = prompt
            .messages
            .iter_mut()
            .find(|m| m.role == crate::providers::Role::System)
        {
            system.content = crate::providers::shape_instruction(self.provider_kind, &system.content);
        }

        match client.call(prompt).await {
            Ok(response) => {
                self.meter.record(
                    self.agent_kind.as_str(),
                    self.provider_kind,
                    response.usage.input_tokens,
                    response.usage.output_tokens,
                    &self.provider_config,
                );
                self.rate_limiter
                    .record_tokens(self.provider_kind, response.usage.total_tokens());
                self.observability.tracer.record(
                    operation,
                    self.agent_kind.as_str(),
                    TraceStatus::Ok,
                    started.elapsed(),
                    std::collections::HashMap::from([(
                        "provider".to_string(),
                        self.provider_kind.as_str().to_string(),
                    )]),
                );
                Ok(response)
            }
            Err(err) => {
                eprintln!("{}", describe_error(operation, self.agent_kind, &err));
                let kind = classify(&err);
                let status = if kind.is_retryable() {
                    TraceStatus::Retried
                } else {
                    TraceStatus::Error
                };
                self.observability.tracer.record(
                    operation,
                    self.agent_kind.as_str(),
                    status,
                    started.elapsed(),
                    std::collections::HashMap::from([("error".to_string(), err.to_string())]),
                );
                Err(err)
            }
        }
    }

    /// The C6 dispatch algorithm. `process_fn` is the agent's own task
    /// logic (`process_with_config` in spec.md's vocabulary); it is
    /// re-invoked from scratch on every retry attempt, so it must be safe
    /// to call more than once for the same task.
    pub async fn dispatch<F, Fut>(&self, task: AgentTask, can_handle: bool, process_fn: F) -> AgentResult
    where
        F: Fn(AgentTask) -> Fut + Send + Sync,
        Fut: Future<Output = Result<serde_json::Value>> + Send,
    {
        if !can_handle {
            return AgentResult::invalid_input(
                task.id.clone(),
                format!(
                    "agent {:?} cannot handle task of kind {:?}",
                    self.agent_kind, task.agent_kind
                ),
            );
        }

        let started = Instant::now();
        let started_at = Utc::now();
        let agent_kind_str = self.agent_kind.as_str();
        let retries_before = self
            .retry
            .as_ref()
            .map(|r| r.statistics(agent_kind_str).total_retries)
            .unwrap_or(0);
        let breaker_before = self.retry.as_ref().map(|r| r.circuit_state(agent_kind_str));

        let outcome: Result<serde_json::Value> = if let Some(retry) = &self.retry {
            let task_clone = task.clone();
            self.pool
                .submit(|| async { retry.execute(agent_kind_str, || process_fn(task_clone.clone())).await })
                .await
                .unwrap_or_else(Err)
        } else {
            let task_clone = task.clone();
            self.pool
                .submit(|| process_fn(task_clone))
                .await
                .unwrap_or_else(Err)
        };

        let ended_at = Utc::now();
        let duration = started.elapsed();

        if let Some(retry) = &self.retry {
            let retries_after = retry.statistics(agent_kind_str).total_retries;
            self.observability.metrics.record_request(
                agent_kind_str,
                outcome.is_ok(),
                duration,
                retries_after.saturating_sub(retries_before),
            );

            let breaker_after = retry.circuit_state(agent_kind_str);
            if breaker_before != Some(breaker_after) {
                use crate::resilience::CircuitState;
                if breaker_after == CircuitState::Open {
                    self.observability.metrics.record_breaker_open(agent_kind_str);
                } else if breaker_after == CircuitState::Closed {
                    self.observability.metrics.record_breaker_close(agent_kind_str);
                }
            }
        } else {
            self.observability
                .metrics
                .record_request(agent_kind_str, outcome.is_ok(), duration, 0);
        }

        self.observability.tracer.record(
            "process",
            agent_kind_str,
            if outcome.is_ok() { TraceStatus::Ok } else { TraceStatus::Error },
            duration,
            std::collections::HashMap::from([("task_id".to_string(), task.id.clone())]),
        );

        let metrics = Some(ProcessingMetrics {
            agent_kind: self.agent_kind,
            provider: self.provider_kind.as_str(),
            started_at,
            ended_at,
            load_status: LoadStatusLabel::from(self.load_status()),
        });

        match outcome {
            Ok(value) => AgentResult {
                task_id: task.id,
                success: true,
                result: Some(value),
                error_message: None,
                duration,
                metrics,
                used_fallback: false,
                primary_failure_reason: None,
            },
            Err(err) => AgentResult {
                task_id: task.id,
                success: false,
                result: None,
                error_message: Some(err.to_string()),
                duration,
                metrics,
                used_fallback: false,
                primary_failure_reason: None,
            },
        }
    }
}

/// Root-cause-first, operator-facing description: names the operation,
/// the agent kind, the error's classified kind, and a retry hint.
/// Logged, not surfaced -- callers still get the original typed error.
fn describe_error(operation: &str, agent_kind: AgentKind, err: &AgentError) -> String {
    let kind = classify(err);
    let hint = if kind.is_retryable() {
        "retryable"
    } else {
        "not retryable"
    };
    format!(
        "[{}] operation={operation} kind={kind:?} hint={hint} cause={err}",
        agent_kind.as_str()
    )
}

/// Converts a task-validation failure's message into an `AgentError` for
/// callers that want to run validation through the normal `Result` path
/// (e.g. inside `process_with_config`) instead of short-circuiting in
/// `dispatch`.
pub fn require_non_blank(field_name: &str, value: Option<&str>) -> Result<String> {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(AgentError::invalid_input(format!(
            "{field_name} is missing or blank"
        ))),
    }
}

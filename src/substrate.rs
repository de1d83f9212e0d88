//! Wires C1-C9 into the single inbound operation spec.md section 6
//! names: `submit(task) -> future<AgentResult>`. This is the only part
//! of the crate an embedding application needs to construct directly;
//! everything else (agents, resilience primitives, providers) is an
//! implementation detail reachable through it.

use std::sync::Arc;

use crate::agents::base::{AgentBase, ClientFactory};
use crate::agents::citation_verifier::CitationVerifierAgent;
use crate::agents::concept_explainer::ConceptExplainerAgent;
use crate::agents::fallback::FallbackDispatcher;
use crate::agents::metadata_enhancer::MetadataEnhancerAgent;
use crate::agents::paper_structure::PaperStructureAgent;
use crate::agents::summarizer::SummarizerAgent;
use crate::agents::{Agent, AgentKind, AgentResult, AgentTask};
use crate::config::{ProviderConfig, ProviderKind, SubstrateConfig};
use crate::error::AgentError;
use crate::meter::{Meter, UsageReport};
use crate::observability::Observability;
use crate::providers::anthropic::AnthropicClient;
use crate::providers::local::LocalClient;
use crate::providers::openai::OpenAiClient;
use crate::providers::perplexity::PerplexityClient;
use crate::providers::ChatClient;
use crate::resilience::{RateLimiter, RetryPolicy, WorkerPool};

/// The constructed substrate. Holds only the fallback dispatcher --
/// every shared resource it closes over (rate limiter, retry policy,
/// meter, pool, observability) lives inside the agents it dispatches to.
pub struct Substrate {
    dispatcher: FallbackDispatcher,
    meter: Arc<Meter>,
}

impl Substrate {
    pub fn builder() -> SubstrateBuilder {
        SubstrateBuilder::new()
    }

    /// The crate's entire inbound library API (spec.md section 6). Never
    /// raises -- always resolves to an `AgentResult` envelope, success or
    /// failure, per spec.md section 7.
    pub async fn submit(&self, task: AgentTask) -> AgentResult {
        self.dispatcher.submit(task).await
    }

    /// Per-instance token/cost report (spec.md section 8): broken down by
    /// agent-kind and by provider, plus the running total across every
    /// agent this substrate dispatched to.
    pub fn token_usage_stats(&self) -> UsageReport {
        self.meter.report()
    }

    /// Zeroes the per-instance tier only (spec.md section 4.5 / 8). The
    /// process-wide counters a fresh `Substrate` would report are
    /// unaffected -- they live in a separate tier of the same `Meter`.
    pub fn reset_instance_counters(&self) {
        self.meter.reset()
    }
}

/// Builds a client for whichever provider a [`ProviderConfig`] names.
/// Boxed as a [`ClientFactory`] so binding stays lazy (spec.md section
/// 4.1): an unreachable or uncredentialed provider doesn't fail
/// construction, only the first call that actually needs it.
fn build_client_factory(config: ProviderConfig) -> ClientFactory {
    Box::new(move || -> crate::error::Result<Arc<dyn ChatClient>> {
        match config.kind {
            ProviderKind::OpenAi => {
                let key = config.api_key.clone().ok_or(AgentError::InvalidApiKey {
                    provider: "openai".to_string(),
                })?;
                Ok(Arc::new(OpenAiClient::new(
                    key,
                    config.base_url.clone(),
                    config.model_name.clone(),
                )))
            }
            ProviderKind::Anthropic => {
                let key = config.api_key.clone().ok_or(AgentError::InvalidApiKey {
                    provider: "anthropic".to_string(),
                })?;
                Ok(Arc::new(AnthropicClient::new(
                    key,
                    config.base_url.clone(),
                    config.model_name.clone(),
                )))
            }
            ProviderKind::Perplexity => {
                let key = config.api_key.clone().ok_or(AgentError::InvalidApiKey {
                    provider: "perplexity".to_string(),
                })?;
                Ok(Arc::new(PerplexityClient::new(
                    key,
                    config.base_url.clone(),
                    config.model_name.clone(),
                )))
            }
            ProviderKind::Local => Ok(Arc::new(LocalClient::new(
                config.base_url.clone(),
                config.model_name.clone(),
            ))),
        }
    })
}

/// Shared process-wide resources every agent (primary and fallback)
/// closes over. One instance lives for the life of the [`Substrate`].
struct SharedResources {
    rate_limiter: Arc<RateLimiter>,
    retry: Arc<RetryPolicy>,
    meter: Arc<Meter>,
    pool: Arc<WorkerPool>,
    observability: Arc<Observability>,
}

fn primary_base(shared: &SharedResources, agent_kind: AgentKind, provider_config: ProviderConfig) -> AgentBase {
    let factory = build_client_factory(provider_config.clone());
    AgentBase::new(
        agent_kind,
        provider_config,
        factory,
        Some(shared.retry.clone()),
        shared.rate_limiter.clone(),
        shared.meter.clone(),
        shared.pool.clone(),
        shared.observability.clone(),
    )
}

fn fallback_base(shared: &SharedResources, agent_kind: AgentKind, provider_config: ProviderConfig) -> AgentBase {
    let factory = build_client_factory(provider_config.clone());
    AgentBase::new(
        agent_kind,
        provider_config,
        factory,
        None,
        shared.rate_limiter.clone(),
        shared.meter.clone(),
        shared.pool.clone(),
        shared.observability.clone(),
    )
}

/// Assembles a [`Substrate`] from per-provider configuration. Defaults to
/// one cloud provider per agent kind chosen for fit with that agent's
/// prompt-shaping strengths (spec.md section 4.7): Anthropic's analysis
/// framing for structure extraction and summarization, OpenAI's
/// JSON-output framing for concept extraction and metadata synthesis,
/// Perplexity's fact-check framing for citation verification. Every
/// primary agent gets a same-kind local-provider fallback twin
/// registered automatically.
pub struct SubstrateBuilder {
    config: SubstrateConfig,
    openai: Option<ProviderConfig>,
    anthropic: Option<ProviderConfig>,
    perplexity: Option<ProviderConfig>,
    local: ProviderConfig,
}

impl SubstrateBuilder {
    pub fn new() -> Self {
        Self {
            config: SubstrateConfig::builder().build(),
            openai: None,
            anthropic: None,
            perplexity: None,
            local: ProviderConfig::local_defaults(),
        }
    }

    pub fn config(mut self, config: SubstrateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn openai(mut self, config: ProviderConfig) -> Self {
        self.openai = Some(config);
        self
    }

    pub fn anthropic(mut self, config: ProviderConfig) -> Self {
        self.anthropic = Some(config);
        self
    }

    pub fn perplexity(mut self, config: ProviderConfig) -> Self {
        self.perplexity = Some(config);
        self
    }

    pub fn local(mut self, config: ProviderConfig) -> Self {
        self.local = config;
        self
    }

    pub fn build(self) -> Substrate {
        let rate_limiter = Arc::new(RateLimiter::new());
        let openai_cfg = self.openai.unwrap_or_else(|| ProviderConfig::openai_defaults(None));
        let anthropic_cfg = self
            .anthropic
            .unwrap_or_else(|| ProviderConfig::anthropic_defaults(None));
        let perplexity_cfg = self
            .perplexity
            .unwrap_or_else(|| ProviderConfig::perplexity_defaults(None));
        let local_cfg = self.local;

        for cfg in [&openai_cfg, &anthropic_cfg, &perplexity_cfg, &local_cfg] {
            rate_limiter.configure(cfg);
        }

        let shared = SharedResources {
            rate_limiter,
            retry: Arc::new(RetryPolicy::new(self.config.retry.clone(), self.config.breaker.clone())),
            meter: Arc::new(Meter::new()),
            pool: Arc::new(WorkerPool::new(self.config.pool.clone())),
            observability: Arc::new(Observability::default()),
        };

        let mut dispatcher = FallbackDispatcher::new(self.config.local_provider_enabled)
            .with_observability(shared.observability.clone());

        dispatcher.register_primary(Arc::new(PaperStructureAgent::new(primary_base(
            &shared,
            AgentKind::PaperStructureExtractor,
            anthropic_cfg.clone(),
        ))));
        dispatcher.register_fallback(Arc::new(PaperStructureAgent::new(fallback_base(
            &shared,
            AgentKind::PaperStructureExtractor,
            local_cfg.clone(),
        ))));

        dispatcher.register_primary(Arc::new(ConceptExplainerAgent::new(primary_base(
            &shared,
            AgentKind::ConceptExplainer,
            openai_cfg.clone(),
        ))));
        dispatcher.register_fallback(Arc::new(ConceptExplainerAgent::new(fallback_base(
            &shared,
            AgentKind::ConceptExplainer,
            local_cfg.clone(),
        ))));

        dispatcher.register_primary(Arc::new(CitationVerifierAgent::new(primary_base(
            &shared,
            AgentKind::CitationVerifier,
            perplexity_cfg.clone(),
        ))));
        dispatcher.register_fallback(Arc::new(CitationVerifierAgent::new(fallback_base(
            &shared,
            AgentKind::CitationVerifier,
            local_cfg.clone(),
        ))));

        dispatcher.register_primary(Arc::new(MetadataEnhancerAgent::new(primary_base(
            &shared,
            AgentKind::MetadataEnhancer,
            openai_cfg.clone(),
        ))));
        dispatcher.register_fallback(Arc::new(MetadataEnhancerAgent::new(fallback_base(
            &shared,
            AgentKind::MetadataEnhancer,
            local_cfg.clone(),
        ))));

        dispatcher.register_primary(Arc::new(SummarizerAgent::new(primary_base(
            &shared,
            AgentKind::Summarizer,
            anthropic_cfg.clone(),
        ))));
        dispatcher.register_fallback(Arc::new(SummarizerAgent::new(fallback_base(
            &shared,
            AgentKind::Summarizer,
            local_cfg.clone(),
        ))));

        Substrate {
            dispatcher,
            meter: shared.meter,
        }
    }
}

impl Default for SubstrateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn invalid_summarizer_task_yields_invalid_input_without_calling_any_provider() {
        let substrate = Substrate::builder().build();
        let task = AgentTask::new(
            AgentKind::Summarizer,
            json!({ "paperId": "P1", "textContent": "   ", "summaryType": "standard" }),
        );
        let result = substrate.submit(task).await;
        assert!(!result.success);
        assert!(!result.used_fallback);
        assert!(result.error_message.unwrap().contains("cannot handle"));
    }

    #[tokio::test]
    async fn missing_credentials_fall_over_to_the_local_twin() {
        let substrate = Substrate::builder().build();
        let task = AgentTask::new(
            AgentKind::Summarizer,
            json!({
                "paperId": "P1",
                "textContent": "This paper studies a method with significant experimental findings and data.",
                "summaryType": "standard",
            }),
        );
        let result = substrate.submit(task).await;
        // No API key configured for Anthropic -> primary fails fatally on
        // first bind attempt; local has no credentials requirement so the
        // fallback succeeds against a (for this unit test) unreachable
        // endpoint, which itself fails fast as a connection error -- both
        // legs fail in this offline test, which is still the right shape
        // to assert on: the dispatcher attempted fallback at all.
        assert!(result.used_fallback);
    }
}

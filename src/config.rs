use std::time::Duration;

/// Which provider kind a [`ProviderConfig`] binds to. Mirrors the provider
/// specializations in `crate::providers` (spec.md section 4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Perplexity,
    Local,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Perplexity => "perplexity",
            ProviderKind::Local => "local",
        }
    }
}

/// One provider entry from the configuration surface (spec.md section 6).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model_name: String,
    pub max_concurrent: usize,
    pub requests_per_minute: u32,
    pub tokens_per_minute: u32,
    pub cost_in_per_1m_micro_cents: i64,
    pub cost_out_per_1m_micro_cents: i64,
    pub request_timeout: Duration,
}

impl ProviderConfig {
    /// Illustrative defaults lifted straight from spec.md section 4.5's cost
    /// table: primary-cloud-A = 2.5 / 10.0, primary-cloud-B = 3.0 / 15.0,
    /// research-cloud = 1.0 / 1.0, local = 0 / 0 (all per-1k-token rates in
    /// the spec; this crate stores the equivalent per-1M-token micro-cent
    /// rate so `meter::cost_micro_cents` never needs floating point).
    pub fn openai_defaults(api_key: Option<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            max_concurrent: 10,
            requests_per_minute: 500,
            tokens_per_minute: 200_000,
            cost_in_per_1m_micro_cents: 2_500_000,
            cost_out_per_1m_micro_cents: 10_000_000,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn anthropic_defaults(api_key: Option<String>) -> Self {
        Self {
            kind: ProviderKind::Anthropic,
            api_key,
            base_url: "https://api.anthropic.com/v1".to_string(),
            model_name: "claude-3-5-sonnet-20241022".to_string(),
            max_concurrent: 10,
            requests_per_minute: 500,
            tokens_per_minute: 200_000,
            cost_in_per_1m_micro_cents: 3_000_000,
            cost_out_per_1m_micro_cents: 15_000_000,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn perplexity_defaults(api_key: Option<String>) -> Self {
        Self {
            kind: ProviderKind::Perplexity,
            api_key,
            base_url: "https://api.perplexity.ai".to_string(),
            model_name: "sonar".to_string(),
            max_concurrent: 5,
            requests_per_minute: 50,
            tokens_per_minute: 50_000,
            cost_in_per_1m_micro_cents: 1_000_000,
            cost_out_per_1m_micro_cents: 1_000_000,
            request_timeout: Duration::from_secs(60),
        }
    }

    pub fn local_defaults() -> Self {
        Self {
            kind: ProviderKind::Local,
            api_key: None,
            base_url: "http://localhost:11434".to_string(),
            model_name: "llama3".to_string(),
            max_concurrent: 2,
            requests_per_minute: 1_000,
            tokens_per_minute: 1_000_000,
            cost_in_per_1m_micro_cents: 0,
            cost_out_per_1m_micro_cents: 0,
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Retry configuration (spec.md section 4.3). Defaults match the spec
/// exactly: 3 attempts, 1s base delay, 30s cap, +/-20% jitter.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.2,
        }
    }
}

pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.config.jitter_ratio = ratio;
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Circuit breaker configuration (spec.md section 4.3). Defaults: 5
/// failures opens the breaker, 60s cool-down, one half-open probe.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
    pub half_open_probe: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(60),
            half_open_probe: 1,
        }
    }
}

pub struct BreakerConfigBuilder {
    config: BreakerConfig,
}

impl BreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BreakerConfig::default(),
        }
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    pub fn open_duration(mut self, duration: Duration) -> Self {
        self.config.open_duration = duration;
        self
    }

    pub fn build(self) -> BreakerConfig {
        self.config
    }
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Worker pool configuration (spec.md section 6).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub core_size: usize,
    pub max_size: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 4,
            max_size: 16,
            queue_capacity: 256,
        }
    }
}

/// Top-level configuration bag threaded through the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct SubstrateConfig {
    pub retry: RetryConfig,
    pub breaker: BreakerConfig,
    pub pool: PoolConfig,
    pub local_provider_enabled: bool,
}

impl SubstrateConfig {
    pub fn builder() -> SubstrateConfigBuilder {
        SubstrateConfigBuilder::new()
    }
}

pub struct SubstrateConfigBuilder {
    config: SubstrateConfig,
}

impl SubstrateConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SubstrateConfig {
                local_provider_enabled: true,
                ..Default::default()
            },
        }
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.config.breaker = breaker;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn local_provider_enabled(mut self, enabled: bool) -> Self {
        self.config.local_provider_enabled = enabled;
        self
    }

    pub fn build(self) -> SubstrateConfig {
        self.config
    }
}

impl Default for SubstrateConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

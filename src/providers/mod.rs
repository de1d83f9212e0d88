//! ChatClient capability (C1) and provider specializations (C7).
//!
//! Grounded in the teacher's `CompletionProvider` trait
//! (`src/traits.rs`), trimmed to the single call shape spec.md section 4.1
//! requires: one prompt in, one completed response out. No streaming, no
//! tool-calling, no multi-choice responses -- those are explicit
//! Non-goals.

pub mod anthropic;
pub mod local;
pub mod openai;
pub mod perplexity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderKind;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single request to a [`ChatClient`]: a message list plus the handful
/// of generation knobs every provider specialization needs.
#[derive(Debug, Clone)]
pub struct ChatPrompt {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl ChatPrompt {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_output_tokens: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub usage: Usage,
}

/// Applies the provider-appropriate prompt-shaping helper from spec.md
/// section 4.7 to a base instruction. Each provider module's framing
/// function is pure decoration -- no behavioral logic lives here beyond
/// picking which one to call.
pub fn shape_instruction(provider: ProviderKind, instruction: &str) -> String {
    match provider {
        ProviderKind::OpenAi => openai::frame_json_output(instruction),
        ProviderKind::Anthropic => anthropic::frame_analysis(instruction),
        ProviderKind::Perplexity => perplexity::frame_research(instruction),
        ProviderKind::Local => local::frame_step_by_step(instruction),
    }
}

/// The capability every agent depends on (C1). Providers bind to it
/// behind `Arc<dyn ChatClient>` so the worker pool and retry policy never
/// need to know which concrete provider backs a call.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn call(&self, prompt: ChatPrompt) -> Result<ChatResponse>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

use super::{ChatClient, ChatPrompt, ChatResponse, Role, Usage};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Prompt-shaping helper for Anthropic's strength per spec.md section
/// 4.7: analysis framing -- asks for reasoning before a conclusion.
pub fn frame_analysis(instruction: &str) -> String {
    format!(
        "{instruction}\n\nThink through the relevant evidence first, then state \
         your conclusion clearly in a final paragraph."
    )
}

/// Grounded in the teacher's `AnthropicProvider`. Anthropic's Messages API
/// takes the system prompt out-of-band and requires `max_tokens`, unlike
/// OpenAI -- both quirks are preserved here rather than hidden, matching
/// how the teacher kept each provider's request shape distinct.
pub struct AnthropicClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct Response {
    content: Vec<ContentBlock>,
    usage: ResponseUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl ChatClient for AnthropicClient {
    async fn call(&self, prompt: ChatPrompt) -> Result<ChatResponse> {
        let mut system = None;
        let mut messages = Vec::new();
        for message in prompt.messages {
            match message.role {
                Role::System => system = Some(message.content),
                Role::User => messages.push(Message {
                    role: "user",
                    content: message.content,
                }),
                Role::Assistant => messages.push(Message {
                    role: "assistant",
                    content: message.content,
                }),
            }
        }

        let request = Request {
            model: &self.model,
            messages,
            max_tokens: prompt.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: prompt.temperature,
            system,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::ProviderHttp {
                provider: "anthropic".into(),
                status,
                message,
            });
        }

        let body: Response = response.json().await.map_err(|e| AgentError::MalformedResponse {
            provider: "anthropic".into(),
            message: e.to_string(),
        })?;

        let text = body
            .content
            .into_iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            text,
            usage: Usage {
                input_tokens: body.usage.input_tokens,
                output_tokens: body.usage.output_tokens,
            },
        })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

use super::{ChatClient, ChatPrompt, ChatResponse, Role, Usage};

/// Prompt-shaping helper for the local provider's strength per spec.md
/// section 4.7: step-by-step framing, which tends to compensate for a
/// smaller local model's weaker one-shot reasoning.
pub fn frame_step_by_step(instruction: &str) -> String {
    format!("{instruction}\n\nWork through this step by step before giving your final answer.")
}

/// Grounded in the teacher's `OllamaProvider` (`src/providers/ollama.rs`):
/// a local, unauthenticated, OpenAI-incompatible chat endpoint. Spec.md
/// section 4.7 keeps this as the "free" provider used when the substrate
/// is configured without any cloud credentials.
pub struct LocalClient {
    client: Client,
    base_url: String,
    model: String,
}

impl LocalClient {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            model,
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    options: Options,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize)]
struct Response {
    message: ResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[async_trait]
impl ChatClient for LocalClient {
    async fn call(&self, prompt: ChatPrompt) -> Result<ChatResponse> {
        let request = Request {
            model: &self.model,
            messages: prompt
                .messages
                .into_iter()
                .map(|m| Message {
                    role: match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    content: m.content,
                })
                .collect(),
            stream: false,
            options: Options {
                temperature: prompt.temperature,
                num_predict: prompt.max_output_tokens.map(|t| t as i32),
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::ProviderHttp {
                provider: "local".into(),
                status,
                message,
            });
        }

        let body: Response = response.json().await.map_err(|e| AgentError::MalformedResponse {
            provider: "local".into(),
            message: e.to_string(),
        })?;

        Ok(ChatResponse {
            text: body.message.content,
            usage: Usage {
                input_tokens: body.prompt_eval_count.unwrap_or(0),
                output_tokens: body.eval_count.unwrap_or(0),
            },
        })
    }

    fn provider_name(&self) -> &'static str {
        "local"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod framing_tests {
    use super::frame_step_by_step;

    #[test]
    fn step_by_step_framing_asks_for_a_worked_process() {
        let framed = frame_step_by_step("Summarize this paper.");
        assert!(framed.contains("step by step"));
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

use super::{ChatClient, ChatPrompt, ChatResponse, Role, Usage};

/// Prompt-shaping helper for OpenAI's strength per spec.md section 4.7:
/// JSON-output framing. No behavioral logic beyond decorating the
/// instruction text -- the agent still parses whatever comes back.
pub fn frame_json_output(instruction: &str) -> String {
    format!(
        "{instruction}\n\nRespond with a single well-formed JSON object and no \
         surrounding prose."
    )
}

/// Grounded in the teacher's `OpenAIProvider` (`src/providers/openai.rs`),
/// trimmed to the single-shot chat-completions call -- no streaming, no
/// tool schemas, no response-format negotiation.
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiClient {
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
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct Response {
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ResponseUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn call(&self, prompt: ChatPrompt) -> Result<ChatResponse> {
        let request = Request {
            model: &self.model,
            messages: prompt
                .messages
                .into_iter()
                .map(|m| Message {
                    role: role_str(m.role),
                    content: m.content,
                })
                .collect(),
            temperature: prompt.temperature,
            max_tokens: prompt.max_output_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::ProviderHttp {
                provider: "openai".into(),
                status,
                message,
            });
        }

        let body: Response = response.json().await.map_err(|e| AgentError::MalformedResponse {
            provider: "openai".into(),
            message: e.to_string(),
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::MalformedResponse {
                provider: "openai".into(),
                message: "response contained no choices".into(),
            })?;

        let usage = body
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(ChatResponse {
            text: choice.message.content,
            usage,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod framing_tests {
    use super::frame_json_output;

    #[test]
    fn json_output_framing_appends_the_constraint() {
        let framed = frame_json_output("Extract the paper's sections.");
        assert!(framed.starts_with("Extract the paper's sections."));
        assert!(framed.contains("JSON object"));
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

use super::{ChatClient, ChatPrompt, ChatResponse, Role, Usage};

/// Prompt-shaping helper for Perplexity's fact-checking strength (spec.md
/// section 4.7).
pub fn frame_fact_check(instruction: &str) -> String {
    format!(
        "{instruction}\n\nCite the specific source you checked against and state your \
         confidence as a single decimal between 0.0 and 1.0."
    )
}

/// Prompt-shaping helper for Perplexity's research strength (spec.md
/// section 4.7).
pub fn frame_research(instruction: &str) -> String {
    format!(
        "{instruction}\n\nDraw on current, citable sources rather than prior \
         knowledge alone."
    )
}

/// Perplexity's API is OpenAI-compatible at the wire level, so this
/// mirrors `providers::openai` rather than the teacher's own
/// `OpenRouterProvider` (also OpenAI-shaped) -- kept as a distinct type so
/// its rate limits and cost table stay independent of the OpenAI binding,
/// per spec.md section 4.7's "citation/research" provider slot.
pub struct PerplexityClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl PerplexityClient {
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

#[async_trait]
impl ChatClient for PerplexityClient {
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
                provider: "perplexity".into(),
                status,
                message,
            });
        }

        let body: Response = response.json().await.map_err(|e| AgentError::MalformedResponse {
            provider: "perplexity".into(),
            message: e.to_string(),
        })?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::MalformedResponse {
                provider: "perplexity".into(),
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
        "perplexity"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod framing_tests {
    use super::{frame_fact_check, frame_research};

    #[test]
    fn fact_check_framing_asks_for_a_confidence_number() {
        let framed = frame_fact_check("Does this citation match the candidate paper?");
        assert!(framed.contains("confidence"));
    }

    #[test]
    fn research_framing_asks_for_citable_sources() {
        let framed = frame_research("Find related work on this topic.");
        assert!(framed.contains("citable"));
    }
}

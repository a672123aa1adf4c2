
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Generator;
use crate::config::Config;
use crate::http::HttpClient;
use crate::{Result, SupportError};

const SERVICE: &str = "generation";

/// Client for an OpenAI-compatible `/chat/completions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: HttpClient,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    #[inline]
    pub fn new(client: HttpClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = HttpClient::from_config(SERVICE, config)?;
        Ok(Self::new(client, config.generation.chat_model.clone()))
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Generator for OpenAiGenerator {
    #[inline]
    fn generate(&self, system_prompt: &str, user_prompt: &str, temperature: f32) -> Result<String> {
        if user_prompt.trim().is_empty() {
            return Err(SupportError::InvalidArgument(
                "user prompt is empty".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
        };
        debug!(
            "Requesting completion from {} (prompt length: {}, temperature: {})",
            self.model,
            user_prompt.len(),
            temperature
        );

        let response: ChatResponse = self.client.post_json("chat/completions", &request)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SupportError::ExternalService {
                service: SERVICE,
                message: "response contained no message content".to_string(),
                retryable: false,
            })
    }
}

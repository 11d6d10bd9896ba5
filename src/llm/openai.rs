//! OpenAI chat-completions oracle.
//!
//! Asks the model for a JSON object `{prediction, confidence, reasoning}`
//! using the `json_object` response format. Transport failures are retried
//! with exponential backoff on 429/5xx before giving up.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{application_id, PredictionOracle};
use crate::types::PredictionResponse;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4.1";
const DEFAULT_MAX_TOKENS: u32 = 1024;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenAiPredictor {
    http: Client,
    api_key: Secret<String>,
    url: String,
    model: String,
    max_tokens: u32,
    total_calls: AtomicU64,
}

impl OpenAiPredictor {
    pub fn new(api_key: String, model: Option<String>, max_tokens: Option<u32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to build OpenAI HTTP client")?;

        Ok(Self {
            http,
            api_key: Secret::new(api_key),
            url: OPENAI_API_URL.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            total_calls: AtomicU64::new(0),
        })
    }

    /// Point the client at an OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn build_prompt(question: &str) -> String {
        let reference = application_id(question)
            .map(|id| format!("**Application ID:** {id}\n"))
            .unwrap_or_default();
        format!(
            r#"Please act as an expert venture capital analyst. Your task is to predict the answer to a prediction market question.

**Market Question:** "{question}"
{reference}
**Request:**
Provide a JSON-formatted response with your prediction. The JSON object should include:
1.  `prediction`: Your prediction, either "Yes" or "No".
2.  `confidence`: Your confidence in the prediction, as a float between 0.0 and 1.0.
3.  `reasoning`: A brief explanation for your decision.

Example JSON response:
{{
  "prediction": "Yes",
  "confidence": 0.85,
  "reasoning": "The project shows strong alignment with the program goals."
}}
"#
        )
    }

    /// Parse the model's reply, tolerating surrounding text or code fences.
    pub fn parse_response(text: &str) -> Result<PredictionResponse> {
        let start = text.find('{').context("No JSON object in oracle response")?;
        let end = text.rfind('}').context("Unterminated JSON object in oracle response")?;
        if end < start {
            anyhow::bail!("Malformed JSON object in oracle response");
        }
        serde_json::from_str(&text[start..=end]).context("Failed to parse oracle prediction")
    }

    async fn call_api(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenAI response")?;
                        self.total_calls.fetch_add(1, Ordering::Relaxed);

                        return body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message)
                            .map(|m| m.content)
                            .context("OpenAI response had no message");
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, "Retryable OpenAI error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("OpenAI API error {status}: {error_text}");
                }
                Err(e) => {
                    last_error = Some(format!("Request error: {e}"));
                    continue;
                }
            }
        }

        anyhow::bail!(
            "OpenAI API failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl PredictionOracle for OpenAiPredictor {
    async fn predict(&self, question: &str) -> Result<PredictionResponse> {
        debug!(model = %self.model, question, "Requesting prediction");
        let prompt = Self::build_prompt(question);
        match self.call_api(&prompt).await {
            Ok(text) => Self::parse_response(&text),
            Err(e) => {
                warn!(error = %e, "Oracle call failed");
                Ok(PredictionResponse::error(e.to_string()))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

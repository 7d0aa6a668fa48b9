//! OpenAI-compatible streaming chat completions
//!
//! The request runs on a blocking task with `ureq`; server-sent event lines
//! are decoded there and forwarded through a token channel.

use std::io::{BufRead, BufReader};
use std::time::Duration;

use async_trait::async_trait;
use avatar_core::ChatMessage;
use serde::Deserialize;

use crate::streaming::{token_channel, TokenSender, TokenStream};
use crate::{ChatSource, LlmError};

const STREAM_BUFFER: usize = 256;

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// One decoded SSE line
#[derive(Debug, PartialEq, Eq)]
enum SseLine {
    Token(String),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine, LlmError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseLine::Skip);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseLine::Done);
    }
    if data.is_empty() {
        return Ok(SseLine::Skip);
    }

    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| LlmError::Decode(e.to_string()))?;
    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());

    Ok(content.map_or(SseLine::Skip, SseLine::Token))
}

/// Chat source for any endpoint speaking the OpenAI chat completions API
pub struct OpenAiChatSource {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: Option<f32>,
}

impl OpenAiChatSource {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let api_key = api_key.ok_or(LlmError::MissingApiKey)?;
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            agent,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            api_key,
            temperature: None,
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    fn payload(&self, history: &[ChatMessage]) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "model": self.model,
            "messages": history,
            "stream": true,
        });
        if let Some(temperature) = self.temperature {
            payload["temperature"] = serde_json::json!(temperature);
        }
        payload
    }
}

/// Blocking request + SSE read loop. Stops early when the consumer is gone.
fn run_request(
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    payload: serde_json::Value,
    tx: TokenSender,
) {
    let response = agent
        .post(&endpoint)
        .header("Authorization", &format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .send_json(&payload);

    let response = match response {
        Ok(response) => response,
        Err(ureq::Error::StatusCode(code)) => {
            let _ = tx.blocking_send(Err(LlmError::Status(code)));
            return;
        }
        Err(e) => {
            let _ = tx.blocking_send(Err(LlmError::Request(e.to_string())));
            return;
        }
    };

    let reader = BufReader::new(response.into_body().into_reader());
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                let _ = tx.blocking_send(Err(LlmError::Request(e.to_string())));
                return;
            }
        };

        match parse_sse_line(&line) {
            Ok(SseLine::Token(token)) => {
                if tx.blocking_send(Ok(token)).is_err() {
                    tracing::debug!("Reply consumer dropped, abandoning stream");
                    return;
                }
            }
            Ok(SseLine::Done) => return,
            Ok(SseLine::Skip) => {}
            Err(e) => {
                // A single bad chunk is not worth failing the reply over
                tracing::warn!("Skipping undecodable stream chunk: {}", e);
            }
        }
    }
}

#[async_trait]
impl ChatSource for OpenAiChatSource {
    async fn stream_reply(&self, history: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let (tx, stream) = token_channel(STREAM_BUFFER);

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let api_key = self.api_key.clone();
        let payload = self.payload(history);

        tracing::debug!(endpoint = %endpoint, messages = history.len(), "Requesting chat reply");
        tokio::task::spawn_blocking(move || run_request(agent, endpoint, api_key, payload, tx));

        Ok(stream)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

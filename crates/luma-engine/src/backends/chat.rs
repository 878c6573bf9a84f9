use anyhow::{Context, Result};
use luma_contracts::{BackendConfig, VisionError};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

const ERROR_BODY_MAX_CHARS: usize = 512;

/// Text and token usage pulled out of a chat-completions response.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub total_tokens: Option<u64>,
}

/// OpenAI-style `/chat/completions` transport shared by every provider.
/// Providers add their own fields to the payload from [`Self::base_payload`].
#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    config: BackendConfig,
    endpoint: String,
    http: HttpClient,
}

impl ChatCompletionsClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.provider.timeout)
            .build()
            .with_context(|| format!("failed to build HTTP client for {}", config.tag()))?;
        Ok(Self {
            config: config.clone(),
            endpoint: config.endpoint(),
            http,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn label(&self) -> &str {
        &self.config.provider.label
    }

    pub fn display_name(&self) -> String {
        format!("{} ({})", self.label(), self.config.model)
    }

    /// Thinking is on only when the process enables it and the call did not
    /// opt out.
    pub fn thinking_requested(&self, enable_thinking: Option<bool>) -> bool {
        self.config.thinking_enabled && enable_thinking != Some(false)
    }

    pub fn base_payload(&self, image_url: &str, prompt: &str) -> Map<String, Value> {
        map_object(json!({
            "model": self.config.model,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": image_url}},
                    {"type": "text", "text": prompt},
                ],
            }],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        }))
    }

    pub fn complete(&self, payload: &Map<String, Value>) -> Result<String, VisionError> {
        log::info!(
            "calling {} model={} endpoint={}",
            self.label(),
            self.config.model,
            self.endpoint
        );
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .map_err(|err| self.transport_error(err))?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| self.transport_error(err))?;

        let completion = parse_completion(self.label(), status, &body)?;
        match completion.total_tokens {
            Some(tokens) => log::info!("{} call finished, total_tokens={tokens}", self.label()),
            None => log::info!("{} call finished", self.label()),
        }
        Ok(completion.content)
    }

    fn transport_error(&self, err: reqwest::Error) -> VisionError {
        VisionError::BackendCallFailed {
            provider: self.label().to_string(),
            status: err.status().map(|status| status.as_u16()),
            message: if err.is_timeout() {
                format!("request timed out after {}s", self.config.provider.timeout.as_secs())
            } else {
                err.to_string()
            },
        }
    }
}

pub fn parse_completion(provider: &str, status: u16, body: &str) -> Result<Completion, VisionError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| error_message(&value))
            .unwrap_or_else(|| truncate_text(body.trim(), ERROR_BODY_MAX_CHARS));
        return Err(VisionError::BackendCallFailed {
            provider: provider.to_string(),
            status: Some(status),
            message,
        });
    }

    let parsed: Value = serde_json::from_str(body).map_err(|err| VisionError::BackendCallFailed {
        provider: provider.to_string(),
        status: Some(status),
        message: format!("invalid JSON payload: {err}"),
    })?;

    let content = parsed
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| VisionError::InvalidResponseShape {
            provider: provider.to_string(),
            message: "missing choices[0].message.content".to_string(),
        })?;

    Ok(Completion {
        content: content.to_string(),
        total_tokens: parsed
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(Value::as_u64),
    })
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error");
    error
        .and_then(|error| error.get("message"))
        .or_else(|| error.filter(|error| error.is_string()))
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

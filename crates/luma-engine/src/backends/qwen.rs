use anyhow::Result;
use luma_contracts::{BackendConfig, VisionError};
use serde_json::{json, Map, Value};

use super::chat::ChatCompletionsClient;
use super::VisionBackend;

const THINKING_BUDGET: u32 = 81920;

/// Qwen-VL through DashScope's OpenAI-compatible mode.
#[derive(Debug, Clone)]
pub struct QwenBackend {
    client: ChatCompletionsClient,
}

impl QwenBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: ChatCompletionsClient::new(config)?,
        })
    }

    fn payload(&self, image_url: &str, prompt: &str, thinking: bool) -> Map<String, Value> {
        let mut payload = self.client.base_payload(image_url, prompt);
        payload.insert("stream".to_string(), Value::Bool(false));
        payload.insert("enable_thinking".to_string(), Value::Bool(thinking));
        if thinking {
            payload.insert("thinking_budget".to_string(), json!(THINKING_BUDGET));
        }
        payload
    }
}

impl VisionBackend for QwenBackend {
    fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        enable_thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        let thinking = self.client.thinking_requested(enable_thinking);
        log::debug!("Qwen enable_thinking={thinking}");
        self.client.complete(&self.payload(image_url, prompt, thinking))
    }

    fn display_name(&self) -> String {
        self.client.display_name()
    }
}

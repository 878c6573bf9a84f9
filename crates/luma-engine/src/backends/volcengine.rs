use anyhow::Result;
use luma_contracts::{BackendConfig, VisionError};
use serde_json::{json, Map, Value};

use super::chat::ChatCompletionsClient;
use super::VisionBackend;

/// Doubao seed models on Volcengine Ark.
#[derive(Debug, Clone)]
pub struct VolcengineBackend {
    client: ChatCompletionsClient,
}

impl VolcengineBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: ChatCompletionsClient::new(config)?,
        })
    }

    fn payload(&self, image_url: &str, prompt: &str, thinking: bool) -> Map<String, Value> {
        let mut payload = self.client.base_payload(image_url, prompt);
        payload.insert("stream".to_string(), Value::Bool(false));
        payload.insert(
            "thinking".to_string(),
            json!({"type": if thinking { "enabled" } else { "disabled" }}),
        );
        payload
    }
}

impl VisionBackend for VolcengineBackend {
    fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        enable_thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        let thinking = self.client.thinking_requested(enable_thinking);
        log::debug!("Doubao thinking={thinking}");
        self.client.complete(&self.payload(image_url, prompt, thinking))
    }

    fn display_name(&self) -> String {
        self.client.display_name()
    }
}

use anyhow::Result;
use luma_contracts::{BackendConfig, VisionError};
use serde_json::{Map, Value};

use super::chat::ChatCompletionsClient;
use super::VisionBackend;

/// DeepSeek-OCR hosted on SiliconFlow. The model has no reasoning switch.
#[derive(Debug, Clone)]
pub struct SiliconFlowBackend {
    client: ChatCompletionsClient,
}

impl SiliconFlowBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: ChatCompletionsClient::new(config)?,
        })
    }

    fn payload(&self, image_url: &str, prompt: &str) -> Map<String, Value> {
        let mut payload = self.client.base_payload(image_url, prompt);
        payload.insert("stream".to_string(), Value::Bool(false));
        payload
    }
}

impl VisionBackend for SiliconFlowBackend {
    fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        enable_thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        if self.client.thinking_requested(enable_thinking) {
            log::debug!("DeepSeek-OCR ignores the thinking flag");
        }
        self.client.complete(&self.payload(image_url, prompt))
    }

    fn display_name(&self) -> String {
        self.client.display_name()
    }
}

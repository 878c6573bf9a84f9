use anyhow::Result;
use luma_contracts::{BackendConfig, VisionError};
use serde_json::{json, Map, Value};

use super::chat::ChatCompletionsClient;
use super::VisionBackend;

/// Tencent Hunyuan vision models. Reasoning is decided by the model itself.
#[derive(Debug, Clone)]
pub struct HunyuanBackend {
    client: ChatCompletionsClient,
}

impl HunyuanBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            client: ChatCompletionsClient::new(config)?,
        })
    }

    fn payload(&self, image_url: &str, prompt: &str) -> Map<String, Value> {
        let mut payload = self.client.base_payload(image_url, prompt);
        payload.insert("top_p".to_string(), json!(self.client.config().top_p));
        payload
    }
}

impl VisionBackend for HunyuanBackend {
    fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        _enable_thinking: Option<bool>,
    ) -> Result<String, VisionError> {
        self.client.complete(&self.payload(image_url, prompt))
    }

    fn display_name(&self) -> String {
        self.client.display_name()
    }
}

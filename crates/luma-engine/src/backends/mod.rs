//! One backend type per vision provider. All of them speak the same
//! chat-completions dialect through [`chat::ChatCompletionsClient`] and
//! differ only in sampling and reasoning fields.

pub mod chat;
mod hunyuan;
mod qwen;
mod siliconflow;
mod volcengine;
mod zhipu;

use anyhow::Result;
use luma_contracts::providers::ProviderTag;
use luma_contracts::{BackendConfig, VisionError};

pub use hunyuan::HunyuanBackend;
pub use qwen::QwenBackend;
pub use siliconflow::SiliconFlowBackend;
pub use volcengine::VolcengineBackend;
pub use zhipu::ZhipuBackend;

pub trait VisionBackend: Send + Sync {
    /// `image_url` is a data URI or a remote URL. `enable_thinking` of
    /// `Some(false)` turns reasoning off for this call.
    fn analyze(
        &self,
        image_url: &str,
        prompt: &str,
        enable_thinking: Option<bool>,
    ) -> Result<String, VisionError>;

    fn display_name(&self) -> String;
}

/// Picks the backend for the configured provider. Called once at startup.
pub fn backend_for(config: &BackendConfig) -> Result<Box<dyn VisionBackend>> {
    let backend: Box<dyn VisionBackend> = match config.tag() {
        ProviderTag::Zhipu => Box::new(ZhipuBackend::new(config)?),
        ProviderTag::SiliconFlow => Box::new(SiliconFlowBackend::new(config)?),
        ProviderTag::Qwen => Box::new(QwenBackend::new(config)?),
        ProviderTag::Volcengine => Box::new(VolcengineBackend::new(config)?),
        ProviderTag::Hunyuan => Box::new(HunyuanBackend::new(config)?),
    };
    log::info!(
        "vision backend: {} via {}",
        backend.display_name(),
        config.endpoint()
    );
    Ok(backend)
}

#[cfg(test)]
pub(crate) fn test_config(tag: ProviderTag, thinking_enabled: bool) -> BackendConfig {
    let registry = luma_contracts::providers::ProviderRegistry::default();
    let provider = registry
        .get(tag)
        .cloned()
        .unwrap_or_else(|| panic!("{tag} is registered"));
    BackendConfig {
        model: provider.default_model.clone(),
        provider,
        api_key: "sk-test".to_string(),
        max_tokens: 16384,
        temperature: 0.7,
        top_p: 0.7,
        thinking_enabled,
        api_base: None,
    }
}

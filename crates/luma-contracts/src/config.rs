use std::env;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use crate::prompts::DEFAULT_BASE_VISION_PROMPT;
use crate::providers::{ProviderSelector, ProviderSpec, ProviderTag};

const DEFAULT_MAX_TOKENS: u32 = 16384;
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_TOP_P: f64 = 0.7;
const DEFAULT_MULTI_CROP_MAX_TILES: usize = 5;
const DEFAULT_MAX_IMAGE_SIZE_MB: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub provider: ProviderSpec,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub thinking_enabled: bool,
    /// Overrides the catalog endpoint with `<api_base>/chat/completions`.
    pub api_base: Option<String>,
}

impl BackendConfig {
    pub fn tag(&self) -> ProviderTag {
        self.provider.tag
    }

    pub fn endpoint(&self) -> String {
        match self.api_base.as_deref() {
            Some(base) => format!("{}/chat/completions", base.trim_end_matches('/')),
            None => self.provider.endpoint.clone(),
        }
    }
}

/// Process-wide settings, built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct VisionConfig {
    pub backend: BackendConfig,
    pub multi_crop_enabled: bool,
    pub multi_crop_max_tiles: usize,
    pub base_vision_prompt: Option<String>,
    pub max_image_size_mb: u64,
}

impl VisionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        let selection = ProviderSelector::new(None)
            .select(value("MODEL_PROVIDER").as_deref())
            .map_err(|err| anyhow!(err))?;
        if let (Some(requested), Some(reason)) = (&selection.requested, &selection.fallback_reason) {
            log::warn!("MODEL_PROVIDER={requested}: {reason}");
        }
        let provider = selection.spec;

        let Some(api_key) = value(&provider.api_key_env) else {
            bail!(
                "{} environment variable is required for provider '{}'",
                provider.api_key_env,
                provider.tag
            );
        };

        let model = value("MODEL_NAME").unwrap_or_else(|| provider.default_model.clone());
        let backend = BackendConfig {
            api_key,
            model,
            max_tokens: parse_or(value("MAX_TOKENS"), "MAX_TOKENS", DEFAULT_MAX_TOKENS)?,
            temperature: parse_or(value("TEMPERATURE"), "TEMPERATURE", DEFAULT_TEMPERATURE)?,
            top_p: parse_or(value("TOP_P"), "TOP_P", DEFAULT_TOP_P)?,
            thinking_enabled: flag_enabled(value("ENABLE_THINKING")),
            api_base: value("LUMA_API_BASE"),
            provider,
        };

        Ok(Self {
            backend,
            multi_crop_enabled: flag_enabled(value("MULTI_CROP")),
            multi_crop_max_tiles: parse_or(
                value("MULTI_CROP_MAX_TILES"),
                "MULTI_CROP_MAX_TILES",
                DEFAULT_MULTI_CROP_MAX_TILES,
            )?
            .max(1),
            base_vision_prompt: value("BASE_VISION_PROMPT"),
            max_image_size_mb: parse_or(
                value("MAX_IMAGE_SIZE_MB"),
                "MAX_IMAGE_SIZE_MB",
                DEFAULT_MAX_IMAGE_SIZE_MB,
            )?,
        })
    }

    pub fn base_prompt(&self) -> &str {
        self.base_vision_prompt
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_BASE_VISION_PROMPT)
    }
}

// Only an explicit "false" disables a flag.
fn flag_enabled(raw: Option<String>) -> bool {
    raw.map(|value| value != "false").unwrap_or(true)
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(text) => text
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{text}'")),
        None => Ok(default),
    }
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderTag {
    Zhipu,
    SiliconFlow,
    Qwen,
    Volcengine,
    Hunyuan,
}

impl ProviderTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zhipu => "zhipu",
            Self::SiliconFlow => "siliconflow",
            Self::Qwen => "qwen",
            Self::Volcengine => "volcengine",
            Self::Hunyuan => "hunyuan",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderTag {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zhipu" => Ok(Self::Zhipu),
            "siliconflow" => Ok(Self::SiliconFlow),
            "qwen" => Ok(Self::Qwen),
            "volcengine" => Ok(Self::Volcengine),
            "hunyuan" => Ok(Self::Hunyuan),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderSpec {
    pub tag: ProviderTag,
    /// Short vendor label used in display names and error messages.
    pub label: String,
    pub default_model: String,
    pub api_key_env: String,
    pub endpoint: String,
    #[serde(serialize_with = "serialize_secs")]
    pub timeout: Duration,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    providers: IndexMap<ProviderTag, ProviderSpec>,
}

impl ProviderRegistry {
    pub fn new(providers: Option<IndexMap<ProviderTag, ProviderSpec>>) -> Self {
        Self {
            providers: providers.unwrap_or_else(default_providers),
        }
    }

    pub fn get(&self, tag: ProviderTag) -> Option<&ProviderSpec> {
        self.providers.get(&tag)
    }

    pub fn list(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.providers.values()
    }

    /// The first registered provider is the default.
    pub fn default_spec(&self) -> Option<&ProviderSpec> {
        self.providers.values().next()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

fn default_providers() -> IndexMap<ProviderTag, ProviderSpec> {
    let mut map = IndexMap::new();

    let mut insert = |tag: ProviderTag,
                      label: &str,
                      default_model: &str,
                      api_key_env: &str,
                      endpoint: &str,
                      timeout_secs: u64| {
        map.insert(
            tag,
            ProviderSpec {
                tag,
                label: label.to_string(),
                default_model: default_model.to_string(),
                api_key_env: api_key_env.to_string(),
                endpoint: endpoint.to_string(),
                timeout: Duration::from_secs(timeout_secs),
            },
        );
    };

    insert(
        ProviderTag::Zhipu,
        "GLM",
        "glm-4.6v",
        "ZHIPU_API_KEY",
        "https://open.bigmodel.cn/api/paas/v4/chat/completions",
        60,
    );
    insert(
        ProviderTag::SiliconFlow,
        "DeepSeek",
        "deepseek-ai/DeepSeek-OCR",
        "SILICONFLOW_API_KEY",
        "https://api.siliconflow.cn/v1/chat/completions",
        60,
    );
    insert(
        ProviderTag::Qwen,
        "Qwen",
        "qwen3-vl-flash",
        "DASHSCOPE_API_KEY",
        "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions",
        180,
    );
    insert(
        ProviderTag::Volcengine,
        "Doubao",
        "doubao-seed-1-6-flash-250828",
        "VOLCENGINE_API_KEY",
        "https://ark.cn-beijing.volces.com/api/v3/chat/completions",
        120,
    );
    insert(
        ProviderTag::Hunyuan,
        "Hunyuan",
        "hunyuan-t1-vision-20250916",
        "HUNYUAN_API_KEY",
        "https://api.hunyuan.cloud.tencent.com/v1/chat/completions",
        180,
    );

    map
}

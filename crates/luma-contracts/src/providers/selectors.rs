use super::registry::{ProviderRegistry, ProviderSpec, ProviderTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSelection {
    pub spec: ProviderSpec,
    pub requested: Option<String>,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderSelector {
    pub registry: ProviderRegistry,
}

impl ProviderSelector {
    pub fn new(registry: Option<ProviderRegistry>) -> Self {
        Self {
            registry: registry.unwrap_or_default(),
        }
    }

    pub fn select(&self, requested: Option<&str>) -> Result<ProviderSelection, String> {
        let requested = requested.map(str::trim).filter(|value| !value.is_empty());
        let fallback_reason = match requested {
            Some(requested_value) => {
                if let Some(spec) = requested_value
                    .parse::<ProviderTag>()
                    .ok()
                    .and_then(|tag| self.registry.get(tag))
                {
                    return Ok(ProviderSelection {
                        spec: spec.clone(),
                        requested: Some(requested_value.to_string()),
                        fallback_reason: None,
                    });
                }
                format!("Requested provider '{requested_value}' unavailable; using default.")
            }
            None => "No provider specified; using default.".to_string(),
        };

        let Some(spec) = self.registry.default_spec().cloned() else {
            return Err("No vision providers registered.".to_string());
        };
        Ok(ProviderSelection {
            spec,
            requested: requested.map(str::to_string),
            fallback_reason: Some(fallback_reason),
        })
    }
}

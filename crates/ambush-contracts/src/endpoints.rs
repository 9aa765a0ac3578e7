use std::env;
use std::fmt;

use indexmap::IndexMap;

const HF_ROUTER_BASE: &str = "https://router.huggingface.co/models";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    Vision,
    TextGeneration,
    ImageGeneration,
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 3] = [Self::Vision, Self::TextGeneration, Self::ImageGeneration];

    pub fn env_key(self) -> &'static str {
        match self {
            Self::Vision => "AMBUSH_VISION_URL",
            Self::TextGeneration => "AMBUSH_TEXT_URL",
            Self::ImageGeneration => "AMBUSH_IMAGE_URL",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Vision => "meta-llama/Llama-3.2-11B-Vision-Instruct",
            Self::TextGeneration => "meta-llama/Meta-Llama-3-8B-Instruct",
            Self::ImageGeneration => "runwayml/stable-diffusion-v1-5",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Vision => "vision",
            Self::TextGeneration => "text-generation",
            Self::ImageGeneration => "image-generation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSpec {
    pub kind: EndpointKind,
    pub url: String,
}

/// Endpoint URLs for the three hosted services.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    endpoints: IndexMap<EndpointKind, EndpointSpec>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
        }
    }
}

impl EndpointConfig {
    /// Defaults overridden by `AMBUSH_*_URL` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for kind in EndpointKind::ALL {
            if let Some(url) = first_non_empty_env(&[kind.env_key()]) {
                config.set(kind, &url);
            }
        }
        config
    }

    /// Ignores blank overrides.
    pub fn set(&mut self, kind: EndpointKind, url: &str) {
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return;
        }
        self.endpoints.insert(
            kind,
            EndpointSpec {
                kind,
                url: url.to_string(),
            },
        );
    }

    pub fn with_override(mut self, kind: EndpointKind, url: Option<&str>) -> Self {
        if let Some(url) = url {
            self.set(kind, url);
        }
        self
    }

    pub fn url(&self, kind: EndpointKind) -> &str {
        self.endpoints
            .get(&kind)
            .map(|spec| spec.url.as_str())
            .unwrap_or_default()
    }

    pub fn list(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.endpoints.values()
    }
}

fn default_endpoints() -> IndexMap<EndpointKind, EndpointSpec> {
    EndpointKind::ALL
        .into_iter()
        .map(|kind| {
            (
                kind,
                EndpointSpec {
                    kind,
                    url: format!("{HF_ROUTER_BASE}/{}", kind.default_model()),
                },
            )
        })
        .collect()
}

pub fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{EndpointConfig, EndpointKind};

    #[test]
    fn defaults_point_at_hosted_models() {
        let config = EndpointConfig::default();
        assert_eq!(
            config.url(EndpointKind::Vision),
            "https://router.huggingface.co/models/meta-llama/Llama-3.2-11B-Vision-Instruct"
        );
        assert_eq!(
            config.url(EndpointKind::ImageGeneration),
            "https://router.huggingface.co/models/runwayml/stable-diffusion-v1-5"
        );
        assert_eq!(config.list().count(), 3);
    }

    #[test]
    fn overrides_trim_and_ignore_blank_values() {
        let config = EndpointConfig::default()
            .with_override(EndpointKind::TextGeneration, Some(" http://localhost:9000/text/ "))
            .with_override(EndpointKind::Vision, Some("   "))
            .with_override(EndpointKind::ImageGeneration, None);
        assert_eq!(
            config.url(EndpointKind::TextGeneration),
            "http://localhost:9000/text"
        );
        assert!(config.url(EndpointKind::Vision).starts_with("https://router"));
    }

    #[test]
    fn endpoint_order_is_stable() {
        let kinds: Vec<EndpointKind> = EndpointConfig::default()
            .list()
            .map(|spec| spec.kind)
            .collect();
        assert_eq!(kinds, EndpointKind::ALL.to_vec());
    }
}

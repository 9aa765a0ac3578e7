use std::fmt;
use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;

use crate::endpoints::first_non_empty_env;

/// Secret key holding the hosted-inference token.
pub const CREDENTIAL_KEY: &str = "HF_TOKEN";

/// Bearer token forwarded to the inference endpoints. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for empty or whitespace-only input.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Secret,
    Interactive,
}

impl CredentialSource {
    pub fn key(self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Interactive => "interactive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
}

/// Flat string secrets read from a TOML file (`KEY = "value"`).
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    values: IndexMap<String, String>,
}

impl SecretStore {
    pub fn empty() -> Self {
        Self::default()
    }

    /// A missing file yields an empty store.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::empty());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read secrets file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid secrets file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let table: toml::Table = raw.parse()?;
        let values = table
            .into_iter()
            .filter_map(|(key, value)| match value {
                toml::Value::String(text) => Some((key, text)),
                _ => None,
            })
            .collect();
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Pre-provisioned credential: the `HF_TOKEN` environment variable wins
    /// over the file entry.
    pub fn provisioned_credential(&self) -> Option<Credential> {
        first_non_empty_env(&[CREDENTIAL_KEY])
            .and_then(|value| Credential::new(&value))
            .or_else(|| self.get(CREDENTIAL_KEY).and_then(Credential::new))
    }
}

/// Secret first, then whatever the user typed.
pub fn resolve_credential(
    provisioned: Option<&Credential>,
    interactive: Option<&str>,
) -> Option<ResolvedCredential> {
    if let Some(credential) = provisioned {
        return Some(ResolvedCredential {
            credential: credential.clone(),
            source: CredentialSource::Secret,
        });
    }
    interactive
        .and_then(Credential::new)
        .map(|credential| ResolvedCredential {
            credential,
            source: CredentialSource::Interactive,
        })
}

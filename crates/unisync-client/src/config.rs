use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Bearer tokens keyed by credentials reference.
    #[serde(default)]
    pub credentials: HashMap<String, String>,
}

fn default_base_url() -> String {
    "https://api.cloudflare.com/client/v4".into()
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            credentials: HashMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, reference: impl Into<String>, token: impl Into<String>) -> Self {
        self.credentials.insert(reference.into(), token.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut references: Vec<&String> = self.credentials.keys().collect();
        references.sort();
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("credentials", &references)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_tokens() {
        let config = ClientConfig::default().with_credentials("default", "s3cr3t");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("default"));
        assert!(!rendered.contains("s3cr3t"));
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.credentials.is_empty());
    }
}

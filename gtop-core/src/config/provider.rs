//! G2Bulk API settings.

use std::time::Duration;
use url::Url;

#[derive(Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API root; always ends with `/` so relative endpoints join under it.
    pub base_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(mut base_url: Url, api_key: String, timeout: Duration) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            api_key,
            timeout,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let config = ProviderConfig::new(
            Url::parse("https://api.example.com/v1").unwrap(),
            "key".to_string(),
            ProviderConfig::DEFAULT_TIMEOUT,
        );
        assert_eq!(config.base_url.as_str(), "https://api.example.com/v1/");
        assert_eq!(
            config.base_url.join("orders").unwrap().as_str(),
            "https://api.example.com/v1/orders"
        );
    }
}

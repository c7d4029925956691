use std::time::Duration;
use crate::client::consts::{BACKEND_URL, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS};

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    connect_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.config.connect_timeout = connect_timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            // The backend address may be overridden from the environment.
            base_url: std::env::var(BACKEND_URL)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_strips_trailing_slash() {
        let config = Config::builder()
            .with_base_url("http://127.0.0.1:9000/")
            .with_connect_timeout(Duration::from_secs(3))
            .build();
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }
}

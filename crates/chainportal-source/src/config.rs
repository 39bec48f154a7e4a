//! Source configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use chainportal_core::error::PortalError;

use crate::retry::RetryConfig;

/// Configuration for a [`PortalSource`](crate::source::PortalSource).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSourceConfig {
    /// Dataset URL, e.g. `https://portal.sqd.dev/datasets/ethereum-mainnet`.
    pub url: String,
    /// First block to stream.
    #[serde(default)]
    pub from_block: u64,
    /// Optional last block. `None` = follow the chain forever.
    #[serde(default)]
    pub to_block: Option<u64>,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-request timeout (milliseconds).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Wait before asking again when the portal has nothing new (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Number of recent cursors kept in memory for fork resolution.
    #[serde(default = "default_rollback_window")]
    pub rollback_window: usize,
    /// Minimum gap between progress log lines (milliseconds).
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Stream only finalized blocks.
    #[serde(default)]
    pub finalized_only: bool,
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_rollback_window() -> usize {
    256
}

fn default_progress_interval_ms() -> u64 {
    5_000
}

impl Default for PortalSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            from_block: 0,
            to_block: None,
            retry: RetryConfig::default(),
            request_timeout_ms: default_request_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            rollback_window: default_rollback_window(),
            progress_interval_ms: default_progress_interval_ms(),
            finalized_only: false,
        }
    }
}

impl PortalSourceConfig {
    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<Url, PortalError> {
        let url = Url::parse(&self.url)
            .map_err(|e| PortalError::Config(format!("invalid portal url '{}': {e}", self.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(PortalError::Config(format!(
                "portal url must be http(s), got '{}'",
                url.scheme()
            )));
        }
        self.retry.validate()?;
        if let Some(to) = self.to_block {
            if to < self.from_block {
                return Err(PortalError::Config(format!(
                    "to_block {to} is below from_block {}",
                    self.from_block
                )));
            }
        }
        if self.rollback_window == 0 {
            return Err(PortalError::Config("rollback_window must be positive".into()));
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_gets_defaults() {
        let cfg: PortalSourceConfig =
            serde_json::from_str(r#"{"url": "https://portal.test/datasets/eth", "from_block": 5}"#)
                .unwrap();
        assert_eq!(cfg.from_block, 5);
        assert_eq!(cfg.to_block, None);
        assert_eq!(cfg.poll_interval_ms, 1_000);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validation_errors() {
        let base = PortalSourceConfig {
            url: "https://portal.test/datasets/eth".into(),
            ..Default::default()
        };

        let bad_url = PortalSourceConfig {
            url: "not a url".into(),
            ..base.clone()
        };
        assert!(matches!(bad_url.validate(), Err(PortalError::Config(_))));

        let ftp = PortalSourceConfig {
            url: "ftp://portal.test".into(),
            ..base.clone()
        };
        assert!(ftp.validate().is_err());

        let inverted = PortalSourceConfig {
            from_block: 10,
            to_block: Some(9),
            ..base.clone()
        };
        assert!(inverted.validate().unwrap_err().to_string().contains("below"));

        let no_window = PortalSourceConfig {
            rollback_window: 0,
            ..base.clone()
        };
        assert!(no_window.validate().is_err());

        let mut no_retries = base;
        no_retries.retry.max_retries = 0;
        assert!(no_retries.validate().is_err());
    }
}

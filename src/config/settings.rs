//! Engine settings.

use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::state::{STATE_DIR, STATE_FILE};

/// Environment variable overriding the state file path.
pub const STATE_PATH_ENV: &str = "BUNDLE_DEPLOY_STATE_PATH";

/// Environment variable overriding the worker pool size.
pub const PARALLELISM_ENV: &str = "BUNDLE_DEPLOY_PARALLELISM";

/// Default number of concurrent node operations.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Runtime settings for a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploySettings {
    /// Path to the state document.
    pub state_path: PathBuf,
    /// Maximum concurrent node operations during plan and apply.
    pub parallelism: usize,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(STATE_DIR).join(STATE_FILE),
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl DeploySettings {
    /// Reads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for an unparsable or zero
    /// parallelism, or an empty state path.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = lookup(STATE_PATH_ENV) {
            if path.trim().is_empty() {
                return Err(ConfigError::InvalidSetting {
                    name: STATE_PATH_ENV.into(),
                    message: "must not be empty".into(),
                }
                .into());
            }
            settings.state_path = PathBuf::from(path);
        }

        if let Some(raw) = lookup(PARALLELISM_ENV) {
            settings.parallelism = match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidSetting {
                        name: PARALLELISM_ENV.into(),
                        message: format!("expected a positive integer, got '{raw}'"),
                    }
                    .into());
                }
            };
        }

        Ok(settings)
    }

    /// Overrides the state path.
    #[must_use]
    pub fn with_state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Overrides the worker pool size.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

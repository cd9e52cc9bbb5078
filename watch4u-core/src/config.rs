//! Configuration for the desk agent, loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Path segment appended to the base URL before every endpoint.
pub const API_VERSION: &str = "api/v1";

const DEV_BASE_URL: &str = "http://127.0.0.1:8000";
const STAGING_BASE_URL: &str = "https://staging.watch4u.app";
const PROD_BASE_URL: &str = "https://watch4u.app";

/// Default wait for a verification or submission round-trip, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Runtime configuration shared by the CLI and the check-in flow.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the exam service, without the API version segment.
    pub base_url: String,
    /// Directory holding the saved session and the check-in history database.
    pub state_dir: PathBuf,
    /// How long to wait for a tag verification or selfie submission round-trip.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// `WATCH4U_ENV` selects a preset base URL (`dev`, `staging`, `prod`;
    /// defaults to `dev`), and `WATCH4U_API_URL` overrides the preset
    /// entirely. `WATCH4U_STATE_DIR` overrides the per-user data directory,
    /// and `WATCH4U_TIMEOUT_SECS` overrides the round-trip timeout.
    pub fn from_env() -> Result<Self> {
        let env_name = env::var("WATCH4U_ENV").unwrap_or_else(|_| "dev".to_string());
        let override_url = env::var("WATCH4U_API_URL").ok();
        let base_url = resolve_base_url(&env_name, override_url.as_deref())?;

        let state_dir = match env::var("WATCH4U_STATE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_state_dir()
                .context("could not determine a data directory; set WATCH4U_STATE_DIR")?,
        };

        let request_timeout = match env::var("WATCH4U_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw.parse().with_context(|| {
                    format!("WATCH4U_TIMEOUT_SECS must be an integer, got '{}'", raw)
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            base_url,
            state_dir,
            request_timeout,
        })
    }

    /// Full URL for an API path, e.g. `api_endpoint("exam")`.
    pub fn api_endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_VERSION, path)
    }

    /// Where the signed-in session is persisted.
    pub fn session_path(&self) -> PathBuf {
        self.state_dir.join("session.json")
    }

    /// Where completed check-ins are recorded locally.
    pub fn history_db_path(&self) -> PathBuf {
        self.state_dir.join("checkins.db")
    }
}

/// Resolve the base URL from the environment name and an optional override.
///
/// Trailing slashes are stripped so endpoint paths join with a single `/`.
fn resolve_base_url(env_name: &str, override_url: Option<&str>) -> Result<String> {
    if let Some(url) = override_url {
        let trimmed = url.trim_end_matches('/');
        if trimmed.is_empty() {
            bail!("WATCH4U_API_URL must not be empty");
        }
        return Ok(trimmed.to_string());
    }

    let url = match env_name {
        "dev" => DEV_BASE_URL,
        "staging" => STAGING_BASE_URL,
        "prod" => PROD_BASE_URL,
        other => bail!(
            "unknown WATCH4U_ENV '{}' (expected dev, staging, or prod)",
            other
        ),
    };
    Ok(url.to_string())
}

fn default_state_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("watch4u"))
}

//! Layered configuration for tfscan.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults.
//! 2. A TOML file: the path given explicitly, or `tfscan/config.toml` in the
//!    platform's configuration directory (which may be absent).
//! 3. Environment variables prefixed with `TFSCAN_`, nesting with `__`
//!    (`TFSCAN_SERVER__BASE_URL`, `TFSCAN_POLLING__INTERVAL_MS`, ...).
//!
//! ```toml
//! [server]
//! base_url = "https://scanner.internal"
//! api_token = "..."
//!
//! [stream]
//! enabled = false
//!
//! [polling]
//! interval_ms = 1000
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TFSCAN_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub base_url: String,
    pub stream_path: String,
    pub start_path: String,
    pub status_path: String,
    pub connect_timeout_ms: u64,
    /// Applies to start and status requests. Zero disables it.
    pub request_timeout_ms: u64,
    /// Sent as a bearer token when present.
    pub api_token: Option<String>,
}
impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            stream_path: "/api/scan/stream".to_string(),
            start_path: "/api/scan".to_string(),
            status_path: "/api/scan/status".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            api_token: None,
        }
    }
}
impl ServerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    pub enabled: bool,
}
impl Default for StreamSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub interval_ms: u64,
}
impl Default for PollingSettings {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}
impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub stream: StreamSettings,
    pub polling: PollingSettings,
}

impl Settings {
    /// Where the configuration file is looked for when none is given.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tfscan").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// The merged sources, before extraction.
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Settings::default()));
        let figment = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(file) => figment.merge(Toml::file(file)),
            None => figment,
        };
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load and validate settings.
    ///
    /// A missing file is only an error when `path` was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path
            && !path.is_file()
        {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let settings: Settings = Self::figment(path).extract().or_raise(|| ErrorKind::Load)?;
        settings.validate()?;
        tracing::debug!(base_url = %settings.server.base_url, streaming = settings.stream.enabled, "Configuration loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.server.base_url.trim();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            exn::bail!(ErrorKind::Invalid(format!("server.base_url must be an http(s) URL, got {base_url:?}")));
        }
        for (key, path) in [
            ("server.stream_path", &self.server.stream_path),
            ("server.start_path", &self.server.start_path),
            ("server.status_path", &self.server.status_path),
        ] {
            if path.trim().is_empty() {
                exn::bail!(ErrorKind::Invalid(format!("{key} must not be empty")));
            }
        }
        if self.server.connect_timeout_ms == 0 {
            exn::bail!(ErrorKind::Invalid("server.connect_timeout_ms must be greater than zero".to_string()));
        }
        if self.polling.interval_ms == 0 {
            exn::bail!(ErrorKind::Invalid("polling.interval_ms must be greater than zero".to_string()));
        }
        Ok(())
    }
}

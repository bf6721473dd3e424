//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with no configuration
//! for local use.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:13378`
    pub http_addr: SocketAddr,

    /// Root of all server-owned state (database, cache, logs).
    /// Env: `METADATA_PATH`
    /// Default: `./metadata`
    pub metadata_path: PathBuf,

    /// Prefix for accelerated redirects. When set, cached images are handed
    /// to the reverse proxy via `X-Accel-Redirect` instead of being streamed.
    /// Env: `X_ACCEL`
    pub x_accel: Option<String>,

    /// Env: `FFMPEG_PATH`
    /// Default: `ffmpeg`
    pub ffmpeg_path: PathBuf,

    /// Username of the bootstrap root account.
    /// Env: `ROOT_USERNAME`
    /// Default: `root`
    pub root_username: String,

    /// Token given to the root account when it is first created. A random
    /// token is generated when unset.
    /// Env: `ROOT_TOKEN`
    pub root_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 13378).into(),
            metadata_path: PathBuf::from("./metadata"),
            x_accel: None,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            root_username: "root".to_string(),
            root_token: None,
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("metadata_path", &self.metadata_path)
            .field("x_accel", &self.x_accel)
            .field("ffmpeg_path", &self.ffmpeg_path)
            .field("root_username", &self.root_username)
            .field("root_token", &self.root_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("METADATA_PATH").filter(|p| !p.is_empty()) {
            config.metadata_path = PathBuf::from(path);
        }

        config.x_accel = lookup("X_ACCEL").filter(|p| !p.is_empty());

        if let Some(path) = lookup("FFMPEG_PATH").filter(|p| !p.is_empty()) {
            config.ffmpeg_path = PathBuf::from(path);
        }

        if let Some(name) = lookup("ROOT_USERNAME").filter(|n| !n.trim().is_empty()) {
            config.root_username = name.trim().to_string();
        }

        config.root_token = lookup("ROOT_TOKEN").filter(|t| !t.is_empty());

        config
    }

    pub fn cache_path(&self) -> PathBuf {
        self.metadata_path.join("cache")
    }

    pub fn scan_log_path(&self) -> PathBuf {
        self.metadata_path.join("logs").join("scans")
    }

    pub fn database_path(&self) -> PathBuf {
        self.metadata_path.join("lectern.sqlite")
    }
}

//! Layered CLI configuration: defaults, TOML file, environment, flags.
//!
//! Environment variables and flags are both resolved by clap (flags win), so
//! this module only merges the file layer underneath them.

use std::path::{Path, PathBuf};

use anichat_notify::NotifyConfig;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::cli::Args;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:5000";
const APP_DIR: &str = "anichat-notify";
const PUSH_PATH: &str = "notifications";

/// Contents of `config.toml`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_url: Option<String>,
    pub ws_url: Option<String>,
    pub token_file: Option<PathBuf>,
    pub notify: NotifyConfig,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Values that come from clap (flag or environment).
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub server: Option<String>,
    pub ws_url: Option<String>,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
}

impl From<&Args> for Overrides {
    fn from(args: &Args) -> Self {
        Self {
            server: args.server.clone(),
            ws_url: args.ws_url.clone(),
            token: args.token.clone(),
            token_file: args.token_file.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_url: String,
    pub ws_url: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub notify: NotifyConfig,
}

impl AppConfig {
    /// `<config_dir>/anichat-notify/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    /// `<config_dir>/anichat-notify/token`
    pub fn default_token_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("token"))
    }

    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            // An explicit path must exist.
            Some(path) => FileConfig::read(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => FileConfig::read(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, Overrides::from(args))
    }

    pub fn resolve(file: FileConfig, overrides: Overrides) -> Result<Self> {
        let server_url = overrides
            .server
            .or(file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let ws_url = match overrides.ws_url.or(file.ws_url) {
            Some(url) => url,
            None => derive_ws_url(&server_url)?,
        };
        let token_file = overrides.token_file.or(file.token_file).or_else(|| {
            Self::default_token_path().filter(|path| path.exists())
        });

        file.notify
            .validate()
            .context("Invalid [notify] configuration")?;

        Ok(Self {
            server_url,
            ws_url,
            token: overrides.token.filter(|token| !token.trim().is_empty()),
            token_file,
            notify: file.notify,
        })
    }
}

/// `http(s)://host/base` → `ws(s)://host/base/notifications`
pub fn derive_ws_url(server_url: &str) -> Result<String> {
    let mut url =
        Url::parse(server_url).with_context(|| format!("Invalid server URL {server_url}"))?;
    let scheme = match url.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => bail!("Unsupported server URL scheme {other}"),
    };
    if url.set_scheme(scheme).is_err() {
        bail!("Cannot derive push channel URL from {server_url}");
    }
    let path = format!("{}/{PUSH_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url.to_string())
}

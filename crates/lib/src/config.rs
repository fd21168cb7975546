//! Configuration types and loading.
//!
//! Config is loaded from a file (e.g. `~/.pagehook/config.json`, or a `.yml`/`.yaml`
//! file) and environment. Secrets can be kept out of the file with the
//! `PAGEHOOK_APP_SECRET`, `PAGEHOOK_VERIFY_TOKEN` and `PAGEHOOK_PAGE_TOKEN` variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Path reserved for the health probe; the webhook may not use it.
pub const HEALTH_PATH: &str = "/health";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Webhook endpoint: path, handshake token, signature verification.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Page credentials for the send API.
    #[serde(default)]
    pub page: PageConfig,
}

/// Bind address and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Path the platform calls (default "/").
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Token entered when subscribing the webhook; compared against `hub.verify_token`.
    /// Overridden by PAGEHOOK_VERIFY_TOKEN.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// When true, POST bodies must carry a valid X-Hub-Signature.
    #[serde(default)]
    pub verify_signature: bool,

    /// App secret used for X-Hub-Signature. Overridden by PAGEHOOK_APP_SECRET.
    #[serde(default)]
    pub app_secret: Option<String>,
}

fn default_webhook_path() -> String {
    "/".to_string()
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            path: default_webhook_path(),
            verify_token: None,
            verify_signature: false,
            app_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    /// Page access token passed to every reply context. Overridden by PAGEHOOK_PAGE_TOKEN.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Send API base URL (default https://graph.facebook.com/v11.0).
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Env var (trimmed, non-empty) or else the trimmed, non-empty config value.
fn env_or(var: &str, configured: Option<&String>) -> Option<String> {
    std::env::var(var)
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the app secret: env PAGEHOOK_APP_SECRET overrides config.
pub fn resolve_app_secret(config: &Config) -> Option<String> {
    env_or("PAGEHOOK_APP_SECRET", config.webhook.app_secret.as_ref())
}

/// Resolve the handshake verify token: env PAGEHOOK_VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_or("PAGEHOOK_VERIFY_TOKEN", config.webhook.verify_token.as_ref())
}

/// Resolve the page access token: env PAGEHOOK_PAGE_TOKEN overrides config.
pub fn resolve_page_token(config: &Config) -> Option<String> {
    env_or("PAGEHOOK_PAGE_TOKEN", config.page.access_token.as_ref())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Check settings the server cannot start with.
pub fn validate(config: &Config) -> Result<()> {
    let path = config.webhook.path.trim();
    if !path.starts_with('/') {
        anyhow::bail!("webhook.path must start with '/' (got {:?})", path);
    }
    if path == HEALTH_PATH {
        anyhow::bail!("webhook.path may not be {} (reserved for the health probe)", HEALTH_PATH);
    }
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        anyhow::bail!(
            "webhook.path may not contain ':' or '*' route segments (got {:?})",
            path
        );
    }
    Ok(())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PAGEHOOK_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".pagehook").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// Load config from the given path (or the default path). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        if is_yaml(&path) {
            serde_yaml::from_str(&s)
                .with_context(|| format!("parsing config from {}", path.display()))?
        } else {
            serde_json::from_str(&s)
                .with_context(|| format!("parsing config from {}", path.display()))?
        }
    };
    Ok((config, path))
}

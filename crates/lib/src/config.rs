//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.hookrelay/config.json`) or a YAML file
//! (`.yaml` / `.yml`), with a few environment overrides. The `relay` section is validated
//! into an immutable [`RelaySettings`] snapshot that the trigger policy and delivery
//! pipeline read; the `channels` section configures the chat connection.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Trigger policy and workflow webhook.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Chat channel settings (e.g. Matrix).
    #[serde(default)]
    pub channels: ChannelsConfig,
}

/// Relay settings as written in the config file. Validate with [`RelayConfig::validate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Workflow webhook URL (http or https). Overridden by HOOKRELAY_WEBHOOK_URL env.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// HTTP method for the webhook call. "post" (default) or "get" (JSON body on a GET).
    #[serde(default)]
    pub webhook_method: WebhookMethod,

    /// Sender allow-list.
    #[serde(default)]
    pub whitelist: WhitelistConfig,

    /// Activate when the message body contains the bot's own user id.
    #[serde(default = "default_true")]
    pub trigger_on_mention: bool,

    /// Activate on any message in a room with exactly two joined members.
    #[serde(default = "default_true")]
    pub trigger_on_dm: bool,

    /// Activate when the body starts with this string; the prefix is stripped before forwarding.
    #[serde(default)]
    pub trigger_prefix: Option<String>,

    /// Show a typing indicator while the webhook call is outstanding.
    #[serde(default = "default_true")]
    pub send_typing: bool,

    /// Message that gets the static status reply (default "!status"). Empty disables it.
    #[serde(default = "default_status_command")]
    pub status_command: String,
}

/// Whitelist gate: when enabled, only listed senders can activate the workflow.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookMethod {
    #[default]
    Post,

    /// GET with a JSON body. Some workflow endpoints were set up this way; prefer POST.
    Get,
}

fn default_true() -> bool {
    true
}

fn default_status_command() -> String {
    "!status".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_method: WebhookMethod::default(),
            whitelist: WhitelistConfig::default(),
            trigger_on_mention: default_true(),
            trigger_on_dm: default_true(),
            trigger_prefix: None,
            send_typing: default_true(),
            status_command: default_status_command(),
        }
    }
}

/// Why the relay section could not be turned into [`RelaySettings`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("relay.webhookUrl is not set")]
    MissingWebhookUrl,
    #[error("relay.webhookUrl {url:?} is not a valid URL: {reason}")]
    InvalidWebhookUrl { url: String, reason: String },
    #[error("relay.webhookUrl must use http or https, got {0:?}")]
    UnsupportedScheme(String),
}

/// Validated, read-only relay settings. One snapshot is used for the whole handling of a message.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub webhook_url: reqwest::Url,
    pub webhook_method: WebhookMethod,
    pub whitelist_enabled: bool,
    pub whitelist_members: HashSet<String>,
    pub trigger_on_mention: bool,
    pub trigger_on_direct_message: bool,
    /// Never `Some("")`: an empty prefix is normalized to `None`.
    pub trigger_prefix: Option<String>,
    pub signal_typing: bool,
    /// `None` when the status command is disabled.
    pub status_command: Option<String>,
}

impl RelayConfig {
    /// Validate the webhook URL and normalize optional strings into a [`RelaySettings`] snapshot.
    pub fn validate(&self) -> std::result::Result<RelaySettings, ConfigError> {
        let raw = self
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingWebhookUrl)?;
        let webhook_url =
            reqwest::Url::parse(raw).map_err(|e| ConfigError::InvalidWebhookUrl {
                url: raw.to_string(),
                reason: e.to_string(),
            })?;
        if webhook_url.scheme() != "http" && webhook_url.scheme() != "https" {
            return Err(ConfigError::UnsupportedScheme(webhook_url.scheme().to_string()));
        }
        Ok(RelaySettings {
            webhook_url,
            webhook_method: self.webhook_method,
            whitelist_enabled: self.whitelist.enabled,
            whitelist_members: self.whitelist.users.iter().cloned().collect(),
            trigger_on_mention: self.trigger_on_mention,
            trigger_on_direct_message: self.trigger_on_dm,
            trigger_prefix: self.trigger_prefix.clone().filter(|p| !p.is_empty()),
            signal_typing: self.send_typing,
            status_command: Some(self.status_command.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub matrix: MatrixChannelConfig,
}

/// Matrix account the relay logs in as.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixChannelConfig {
    /// Homeserver base URL (e.g. "https://matrix.example.org").
    pub homeserver: Option<String>,
    /// Full user id or localpart of the bot account.
    pub user_id: Option<String>,
    /// Account password. Overridden by HOOKRELAY_MATRIX_PASSWORD env when set.
    pub password: Option<String>,
    /// Device display name used on first login (default "hookrelay").
    pub device_name: Option<String>,
    /// Directory for the sqlite state store and saved session (default ~/.hookrelay/matrix).
    pub store_path: Option<PathBuf>,
}

fn env_trimmed(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the webhook URL: env HOOKRELAY_WEBHOOK_URL overrides config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    env_trimmed("HOOKRELAY_WEBHOOK_URL").or_else(|| {
        config
            .relay
            .webhook_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Matrix password: env HOOKRELAY_MATRIX_PASSWORD overrides config.
pub fn resolve_matrix_password(config: &Config) -> Option<String> {
    env_trimmed("HOOKRELAY_MATRIX_PASSWORD").or_else(|| {
        config
            .channels
            .matrix
            .password
            .as_ref()
            .filter(|s| !s.is_empty())
            .cloned()
    })
}

/// Resolve the Matrix store directory: config value or `matrix` next to the config file.
pub fn resolve_matrix_store_dir(config: &Config, config_path: &Path) -> PathBuf {
    let config_parent = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    match &config.channels.matrix.store_path {
        Some(d) if !d.as_os_str().is_empty() => {
            if d.is_absolute() {
                d.clone()
            } else {
                config_parent.join(d)
            }
        }
        _ => config_parent.join("matrix"),
    }
}

/// Build relay settings from config with env overrides applied.
pub fn relay_settings(config: &Config) -> std::result::Result<RelaySettings, ConfigError> {
    let mut relay = config.relay.clone();
    relay.webhook_url = resolve_webhook_url(config);
    relay.validate()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("HOOKRELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".hookrelay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

pub(crate) fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Load config from the given path, or the default path (HOOKRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config: Config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        if is_yaml_path(&path) {
            serde_yaml::from_str(&s)
                .with_context(|| format!("parsing config from {}", path.display()))?
        } else {
            serde_json::from_str(&s)
                .with_context(|| format!("parsing config from {}", path.display()))?
        }
    };
    Ok((config, path))
}

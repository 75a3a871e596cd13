use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use capebot_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use super::{CommandResult, EXIT_CONFIG_INVALID};

/// One rendered key: dotted path, display value, and the env vars that can set it.
struct ConfigEntry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                EXIT_CONFIG_INVALID,
            );
        }
    };

    let file_path = resolve_config_path(None);
    let file_doc = load_config_file_doc(file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(entry.key, entry.env_keys, file_doc.as_ref(), file_path.clone());
        lines.push(render_line(entry.key, &entry.value, source));
    }

    CommandResult::report(0, lines.join("\n"))
}

fn entries(config: &AppConfig) -> Vec<ConfigEntry> {
    vec![
        ConfigEntry {
            key: "slack.bot_token",
            value: redact_token(config.slack.bot_token.expose_secret()),
            env_keys: &["CAPEBOT_SLACK_BOT_TOKEN"],
        },
        ConfigEntry {
            key: "slack.bot_id",
            value: config.slack.bot_id.clone(),
            env_keys: &["CAPEBOT_SLACK_BOT_ID"],
        },
        ConfigEntry {
            key: "slack.api_base_url",
            value: config.slack.api_base_url.clone(),
            env_keys: &["CAPEBOT_SLACK_API_BASE_URL"],
        },
        ConfigEntry {
            key: "slack.read_timeout_ms",
            value: config.slack.read_timeout_ms.to_string(),
            env_keys: &["CAPEBOT_SLACK_READ_TIMEOUT_MS"],
        },
        ConfigEntry {
            key: "slack.timeout_secs",
            value: config.slack.timeout_secs.to_string(),
            env_keys: &["CAPEBOT_SLACK_TIMEOUT_SECS"],
        },
        ConfigEntry {
            key: "cape.user_token",
            value: redact_token(config.cape.user_token.expose_secret()),
            env_keys: &["CAPEBOT_CAPE_USER_TOKEN"],
        },
        ConfigEntry {
            key: "cape.admin_token",
            value: redact_token(config.cape.admin_token.expose_secret()),
            env_keys: &["CAPEBOT_CAPE_ADMIN_TOKEN"],
        },
        ConfigEntry {
            key: "cape.base_url",
            value: config.cape.base_url.clone(),
            env_keys: &["CAPEBOT_CAPE_BASE_URL"],
        },
        ConfigEntry {
            key: "cape.threshold",
            value: config.cape.threshold.as_str().to_string(),
            env_keys: &["CAPEBOT_CAPE_THRESHOLD"],
        },
        ConfigEntry {
            key: "cape.number_of_items",
            value: config.cape.number_of_items.to_string(),
            env_keys: &["CAPEBOT_CAPE_NUMBER_OF_ITEMS"],
        },
        ConfigEntry {
            key: "cape.timeout_secs",
            value: config.cape.timeout_secs.to_string(),
            env_keys: &["CAPEBOT_CAPE_TIMEOUT_SECS"],
        },
        ConfigEntry {
            key: "router.poll_delay_secs",
            value: config.router.poll_delay_secs.to_string(),
            env_keys: &["CAPEBOT_ROUTER_POLL_DELAY_SECS"],
        },
        ConfigEntry {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["CAPEBOT_LOGGING_LEVEL", "CAPEBOT_LOG_LEVEL"],
        },
        ConfigEntry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_lowercase(),
            env_keys: &["CAPEBOT_LOGGING_FORMAT", "CAPEBOT_LOG_FORMAT"],
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<PathBuf>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = file_doc {
        if contains_path(doc, key_path) {
            let file_path = file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps the Slack-style prefix (`xoxb-`) so operators can tell token kinds apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) => format!("{prefix}-***"),
        None => "<redacted>".to_string(),
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub cape: CapeConfig,
    pub router: RouterConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub bot_id: String,
    pub api_base_url: String,
    pub read_timeout_ms: u64,
    /// Bounds every Web API call and the socket handshake.
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CapeConfig {
    pub user_token: SecretString,
    pub admin_token: SecretString,
    pub base_url: String,
    pub threshold: AnswerThreshold,
    pub number_of_items: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RouterConfig {
    pub poll_delay_secs: u64,
}

impl RouterConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_secs(self.poll_delay_secs)
    }
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Minimum confidence the backend requires before it returns an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerThreshold {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl AnswerThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VeryLow => "verylow",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "veryhigh",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_bot_id: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub cape_user_token: Option<String>,
    pub cape_admin_token: Option<String>,
    pub cape_base_url: Option<String>,
    pub poll_delay_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["capebot.toml", "config/capebot.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: String::new().into(),
                bot_id: String::new(),
                api_base_url: "https://slack.com/api".to_string(),
                read_timeout_ms: 500,
                timeout_secs: 30,
            },
            cape: CapeConfig {
                user_token: String::new().into(),
                admin_token: String::new().into(),
                base_url: "https://responder.thecape.ai/api/0.1".to_string(),
                threshold: AnswerThreshold::VeryLow,
                number_of_items: 1,
                timeout_secs: 30,
            },
            router: RouterConfig { poll_delay_secs: 1 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for AnswerThreshold {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "verylow" => Ok(Self::VeryLow),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "veryhigh" => Ok(Self::VeryHigh),
            other => Err(ConfigError::Validation(format!(
                "unsupported answer threshold `{other}` (expected verylow|low|medium|high|veryhigh)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATHS[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// The substring that marks a message as addressed to the bot.
    pub fn mention_marker(&self) -> String {
        format!("<@{}>", self.slack.bot_id)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(bot_id) = slack.bot_id {
                self.slack.bot_id = bot_id;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
            if let Some(read_timeout_ms) = slack.read_timeout_ms {
                self.slack.read_timeout_ms = read_timeout_ms;
            }
            if let Some(timeout_secs) = slack.timeout_secs {
                self.slack.timeout_secs = timeout_secs;
            }
        }

        if let Some(cape) = patch.cape {
            if let Some(user_token) = cape.user_token {
                self.cape.user_token = secret_value(user_token);
            }
            if let Some(admin_token) = cape.admin_token {
                self.cape.admin_token = secret_value(admin_token);
            }
            if let Some(base_url) = cape.base_url {
                self.cape.base_url = base_url;
            }
            if let Some(threshold) = cape.threshold {
                self.cape.threshold = threshold;
            }
            if let Some(number_of_items) = cape.number_of_items {
                self.cape.number_of_items = number_of_items;
            }
            if let Some(timeout_secs) = cape.timeout_secs {
                self.cape.timeout_secs = timeout_secs;
            }
        }

        if let Some(router) = patch.router {
            if let Some(poll_delay_secs) = router.poll_delay_secs {
                self.router.poll_delay_secs = poll_delay_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("CAPEBOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("CAPEBOT_SLACK_BOT_ID") {
            self.slack.bot_id = value;
        }
        if let Some(value) = read_env("CAPEBOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }
        if let Some(value) = read_env("CAPEBOT_SLACK_READ_TIMEOUT_MS") {
            self.slack.read_timeout_ms = parse_u64("CAPEBOT_SLACK_READ_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("CAPEBOT_SLACK_TIMEOUT_SECS") {
            self.slack.timeout_secs = parse_u64("CAPEBOT_SLACK_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CAPEBOT_CAPE_USER_TOKEN") {
            self.cape.user_token = secret_value(value);
        }
        if let Some(value) = read_env("CAPEBOT_CAPE_ADMIN_TOKEN") {
            self.cape.admin_token = secret_value(value);
        }
        if let Some(value) = read_env("CAPEBOT_CAPE_BASE_URL") {
            self.cape.base_url = value;
        }
        if let Some(value) = read_env("CAPEBOT_CAPE_THRESHOLD") {
            self.cape.threshold = value.parse()?;
        }
        if let Some(value) = read_env("CAPEBOT_CAPE_NUMBER_OF_ITEMS") {
            self.cape.number_of_items = parse_u32("CAPEBOT_CAPE_NUMBER_OF_ITEMS", &value)?;
        }
        if let Some(value) = read_env("CAPEBOT_CAPE_TIMEOUT_SECS") {
            self.cape.timeout_secs = parse_u64("CAPEBOT_CAPE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CAPEBOT_ROUTER_POLL_DELAY_SECS") {
            self.router.poll_delay_secs = parse_u64("CAPEBOT_ROUTER_POLL_DELAY_SECS", &value)?;
        }

        let log_level =
            read_env("CAPEBOT_LOGGING_LEVEL").or_else(|| read_env("CAPEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CAPEBOT_LOGGING_FORMAT").or_else(|| read_env("CAPEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(bot_id) = overrides.slack_bot_id {
            self.slack.bot_id = bot_id;
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(user_token) = overrides.cape_user_token {
            self.cape.user_token = secret_value(user_token);
        }
        if let Some(admin_token) = overrides.cape_admin_token {
            self.cape.admin_token = secret_value(admin_token);
        }
        if let Some(base_url) = overrides.cape_base_url {
            self.cape.base_url = base_url;
        }
        if let Some(poll_delay_secs) = overrides.poll_delay_secs {
            self.router.poll_delay_secs = poll_delay_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_cape(&self.cape)?;
        validate_router(&self.router)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_PATHS.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app-level token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let bot_id = slack.bot_id.trim();
    if bot_id.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_id is required; it is the bot user's member id (e.g. `U012ABCDEF`)"
                .to_string(),
        ));
    }
    if bot_id.contains(['<', '>', '@']) {
        return Err(ConfigError::Validation(
            "slack.bot_id must be the bare member id, without `<@` and `>`".to_string(),
        ));
    }

    if !is_http_url(&slack.api_base_url) {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if slack.read_timeout_ms == 0 || slack.read_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "slack.read_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }

    if slack.timeout_secs == 0 || slack.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "slack.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_cape(cape: &CapeConfig) -> Result<(), ConfigError> {
    if cape.user_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "cape.user_token is required to answer questions".to_string(),
        ));
    }
    if cape.admin_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "cape.admin_token is required to add saved replies".to_string(),
        ));
    }

    if !is_http_url(&cape.base_url) {
        return Err(ConfigError::Validation(
            "cape.base_url must start with http:// or https://".to_string(),
        ));
    }

    if cape.number_of_items == 0 {
        return Err(ConfigError::Validation(
            "cape.number_of_items must be greater than zero".to_string(),
        ));
    }

    if cape.timeout_secs == 0 || cape.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "cape.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_router(router: &RouterConfig) -> Result<(), ConfigError> {
    if router.poll_delay_secs == 0 {
        return Err(ConfigError::Validation(
            "router.poll_delay_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    cape: Option<CapePatch>,
    router: Option<RouterPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    bot_id: Option<String>,
    api_base_url: Option<String>,
    read_timeout_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CapePatch {
    user_token: Option<String>,
    admin_token: Option<String>,
    base_url: Option<String>,
    threshold: Option<AnswerThreshold>,
    number_of_items: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RouterPatch {
    poll_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

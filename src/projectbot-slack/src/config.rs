//! Configuration for the bot.
//!
//! Supports loading configuration from:
//! - Environment variables (tokens, organization, endpoint)
//! - An optional TOML file (defaults, limits and the channel table)
//!
//! The channel table can be re-read from the file on an interval so
//! channels can be mapped without a restart.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use projectbot_github::{
    ChannelDirectory, ChannelProjectMapping, GITHUB_GRAPHQL_ENDPOINT, RateLimitConfig,
    StatusFilter,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SlackError, SlackResult};
use crate::messages::PageLimits;

/// Default time budget for one command invocation.
pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(20);

/// Configuration for the bot.
#[derive(Clone)]
pub struct BotConfig {
    /// Bot OAuth token (xoxb-...).
    bot_token: SecretString,
    /// App-level token for Socket Mode (xapp-...).
    app_token: SecretString,
    /// GitHub token forwarded as a bearer credential.
    github_token: SecretString,
    /// Organization owning the projects.
    pub org: String,
    /// GraphQL endpoint.
    pub graphql_url: String,
    /// Status applied when a command names none.
    pub default_status: Option<StatusFilter>,
    /// Time budget for one command invocation.
    pub invocation_timeout: Duration,
    /// How often to re-read the channel table, if at all.
    pub channel_refresh: Option<Duration>,
    /// Upstream request budget.
    pub rate_limit: RateLimitConfig,
    /// Message page limits.
    pub page_limits: PageLimits,
    /// Channel id to project number.
    pub channels: BTreeMap<String, i64>,
    /// File the configuration was read from.
    pub config_path: Option<PathBuf>,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .field("github_token", &"[REDACTED]")
            .field("org", &self.org)
            .field("graphql_url", &self.graphql_url)
            .field("default_status", &self.default_status)
            .field("invocation_timeout", &self.invocation_timeout)
            .field("channel_refresh", &self.channel_refresh)
            .field("rate_limit", &self.rate_limit)
            .field("page_limits", &self.page_limits)
            .field("channels", &self.channels.len())
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl BotConfig {
    /// Create a configuration with required credentials and defaults.
    pub fn new(
        bot_token: impl Into<String>,
        app_token: impl Into<String>,
        github_token: impl Into<String>,
        org: impl Into<String>,
    ) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into().into()),
            app_token: SecretString::new(app_token.into().into()),
            github_token: SecretString::new(github_token.into().into()),
            org: org.into(),
            graphql_url: GITHUB_GRAPHQL_ENDPOINT.to_string(),
            default_status: None,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            channel_refresh: None,
            rate_limit: RateLimitConfig::default(),
            page_limits: PageLimits::default(),
            channels: BTreeMap::new(),
            config_path: None,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Required variables:
    /// - `SLACK_BOT_TOKEN`
    /// - `SLACK_APP_TOKEN`
    /// - `GITHUB_TOKEN`
    /// - `GITHUB_ORG` (unless the config file sets `org`)
    ///
    /// Optional variables:
    /// - `GITHUB_GRAPHQL_URL`
    /// - `PROJECTBOT_CONFIG` (TOML file, overridden by `config_path`)
    pub fn from_env(config_path: Option<PathBuf>) -> SlackResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok(), config_path)
    }

    /// Load configuration using `lookup` in place of the environment.
    pub fn from_vars<F>(lookup: F, config_path: Option<PathBuf>) -> SlackResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| SlackError::Config(format!("{} not set", name)))
        };

        let bot_token = require("SLACK_BOT_TOKEN")?;
        let app_token = require("SLACK_APP_TOKEN")?;
        let github_token = require("GITHUB_TOKEN")?;

        let config_path = config_path.or_else(|| lookup("PROJECTBOT_CONFIG").map(PathBuf::from));
        let file = match &config_path {
            Some(path) => Some(FileConfig::load(path)?),
            None => None,
        };

        let org = lookup("GITHUB_ORG")
            .filter(|v| !v.trim().is_empty())
            .or_else(|| file.as_ref().and_then(|f| f.org.clone()))
            .ok_or_else(|| {
                SlackError::Config("GITHUB_ORG not set and no org in config file".to_string())
            })?;

        let mut config = Self::new(bot_token, app_token, github_token, org.trim());
        if let Some(url) = lookup("GITHUB_GRAPHQL_URL") {
            config.graphql_url = url;
        }
        if let Some(file) = file {
            file.apply(&mut config);
        }
        config.config_path = config_path;

        config.validate()?;
        debug!(?config, "Loaded configuration");
        Ok(config)
    }

    /// Get the bot token.
    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    /// Get the app token for Socket Mode.
    pub fn app_token(&self) -> &str {
        self.app_token.expose_secret()
    }

    /// Get the GitHub token.
    pub fn github_token(&self) -> &str {
        self.github_token.expose_secret()
    }

    /// Build the channel table for the configured organization.
    pub fn channel_mapping(&self) -> SlackResult<ChannelProjectMapping> {
        Ok(ChannelProjectMapping::from_entries(
            self.org.clone(),
            self.channels.iter().map(|(channel, number)| (channel.clone(), *number)),
        )?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SlackResult<()> {
        if !self.bot_token.expose_secret().starts_with("xoxb-") {
            return Err(SlackError::Config(
                "Bot token must start with 'xoxb-'".to_string(),
            ));
        }
        if !self.app_token.expose_secret().starts_with("xapp-") {
            return Err(SlackError::Config(
                "App token must start with 'xapp-'".to_string(),
            ));
        }
        if self.github_token.expose_secret().trim().is_empty() {
            return Err(SlackError::Config("GitHub token is empty".to_string()));
        }
        if self.org.is_empty() {
            return Err(SlackError::Config("Organization is empty".to_string()));
        }
        if self.invocation_timeout.is_zero() {
            return Err(SlackError::Config(
                "invocation_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.rate_limit.validate()?;
        self.page_limits.validate()?;
        self.channel_mapping()?;

        if self.channels.is_empty() {
            warn!("No channels are mapped; only /project_tasks will work");
        }
        Ok(())
    }
}

/// The TOML configuration file.
///
/// ```toml
/// org = "acme"
/// default_status = "todo"
/// invocation_timeout_secs = 20
/// channel_refresh_secs = 300
///
/// [rate_limit]
/// max_requests = 5000
/// window_secs = 3600
/// max_wait_ms = 2000
///
/// [pages]
/// max_records = 25
/// max_chars = 2900
///
/// [channels]
/// "C0123ABC" = 7
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Organization login.
    #[serde(default)]
    pub org: Option<String>,
    /// Status applied when a command names none.
    #[serde(default)]
    pub default_status: Option<StatusFilter>,
    /// Invocation time budget in seconds.
    #[serde(default)]
    pub invocation_timeout_secs: Option<u64>,
    /// Channel table refresh interval in seconds.
    #[serde(default)]
    pub channel_refresh_secs: Option<u64>,
    /// Upstream request budget.
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,
    /// Message page limits.
    #[serde(default)]
    pub pages: Option<PagesSection>,
    /// Channel id to project number.
    #[serde(default)]
    pub channels: BTreeMap<String, i64>,
}

/// `[rate_limit]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    pub max_requests: Option<u32>,
    pub window_secs: Option<u64>,
    pub max_wait_ms: Option<u64>,
}

/// `[pages]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PagesSection {
    pub max_records: Option<usize>,
    pub max_chars: Option<usize>,
}

impl FileConfig {
    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> SlackResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SlackError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| SlackError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Overlay the file's settings onto `config`.
    pub fn apply(self, config: &mut BotConfig) {
        if self.default_status.is_some() {
            config.default_status = self.default_status;
        }
        if let Some(secs) = self.invocation_timeout_secs {
            config.invocation_timeout = Duration::from_secs(secs);
        }
        config.channel_refresh = self
            .channel_refresh_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        if let Some(rate_limit) = self.rate_limit {
            if let Some(max_requests) = rate_limit.max_requests {
                config.rate_limit.max_requests = max_requests;
            }
            if let Some(window_secs) = rate_limit.window_secs {
                config.rate_limit.window = Duration::from_secs(window_secs);
            }
            if let Some(max_wait_ms) = rate_limit.max_wait_ms {
                config.rate_limit.max_wait = Duration::from_millis(max_wait_ms);
            }
        }
        if let Some(pages) = self.pages {
            if let Some(max_records) = pages.max_records {
                config.page_limits.max_records = max_records;
            }
            if let Some(max_chars) = pages.max_chars {
                config.page_limits.max_chars = max_chars;
            }
        }
        config.channels = self.channels;
    }
}

/// Re-read the channel table from `path` and swap it into `directory`.
///
/// On failure the current table stays in place.
pub fn reload_channels(directory: &ChannelDirectory, path: &Path, org: &str) -> SlackResult<usize> {
    let file = FileConfig::load(path)?;
    let mapping = ChannelProjectMapping::from_entries(org.to_string(), file.channels)?;
    let count = mapping.len();
    directory.replace(mapping);
    Ok(count)
}

/// Periodically reload the channel table until the task is aborted.
pub fn spawn_channel_refresh(
    directory: Arc<ChannelDirectory>,
    path: PathBuf,
    org: String,
    every: Duration,
) -> JoinHandle<()> {
    info!("Refreshing channel mapping from {} every {:?}", path.display(), every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately and the table was just loaded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match reload_channels(&directory, &path, &org) {
                Ok(count) => debug!(channels = count, "Reloaded channel mapping"),
                Err(e) => warn!("Keeping previous channel mapping: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const BASE: [(&str, &str); 4] = [
        ("SLACK_BOT_TOKEN", "xoxb-test"),
        ("SLACK_APP_TOKEN", "xapp-test"),
        ("GITHUB_TOKEN", "ghp_test"),
        ("GITHUB_ORG", "acme"),
    ];

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = BotConfig::from_vars(vars(&BASE), None).unwrap();
        assert_eq!(config.org, "acme");
        assert_eq!(config.graphql_url, GITHUB_GRAPHQL_ENDPOINT);
        assert_eq!(config.invocation_timeout, DEFAULT_INVOCATION_TIMEOUT);
        assert_eq!(config.default_status, None);
        assert!(config.channel_mapping().unwrap().is_empty());
        assert_eq!(config.github_token(), "ghp_test");
    }

    #[test]
    fn test_missing_required_variable() {
        let err = BotConfig::from_vars(vars(&BASE[..2]), None).unwrap_err();
        assert!(matches!(err, SlackError::Config(ref msg) if msg.contains("GITHUB_TOKEN")));
    }

    #[test]
    fn test_invalid_token_prefix() {
        let err = BotConfig::from_vars(
            vars(&[
                ("SLACK_BOT_TOKEN", "not-a-bot-token"),
                ("SLACK_APP_TOKEN", "xapp-test"),
                ("GITHUB_TOKEN", "ghp_test"),
                ("GITHUB_ORG", "acme"),
            ]),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, SlackError::Config(_)));
    }

    #[test]
    fn test_file_overlay() {
        let file = write_config(
            r#"
org = "fallback-org"
default_status = "in progress"
invocation_timeout_secs = 5
channel_refresh_secs = 60

[rate_limit]
max_requests = 100
max_wait_ms = 250

[pages]
max_records = 10

[channels]
"C_AGENTS" = 2
"C_MAPS" = 9
"#,
        );

        let config = BotConfig::from_vars(vars(&BASE), Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.org, "acme");
        assert_eq!(config.default_status, Some(StatusFilter::InProgress));
        assert_eq!(config.invocation_timeout, Duration::from_secs(5));
        assert_eq!(config.channel_refresh, Some(Duration::from_secs(60)));
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(3600));
        assert_eq!(config.rate_limit.max_wait, Duration::from_millis(250));
        assert_eq!(config.page_limits.max_records, 10);

        let mapping = config.channel_mapping().unwrap();
        assert_eq!(mapping.resolve("C_MAPS").unwrap().number(), 9);
    }

    #[test]
    fn test_rejects_oversized_rate_limit_window() {
        let file = write_config("[rate_limit]\nwindow_secs = 9223372036854775807\n");
        let err = BotConfig::from_vars(vars(&BASE), Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, SlackError::Config(ref msg) if msg.contains("window")));
    }

    #[test]
    fn test_org_from_file_when_env_missing() {
        let file = write_config("org = \"from-file\"\n");
        let config =
            BotConfig::from_vars(vars(&BASE[..3]), Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.org, "from-file");
    }

    #[test]
    fn test_config_path_from_env() {
        let file = write_config("[channels]\n\"C1\" = 4\n");
        let path = file.path().to_string_lossy().to_string();
        let mut pairs: Vec<(&str, &str)> = BASE.to_vec();
        pairs.push(("PROJECTBOT_CONFIG", &path));

        let config = BotConfig::from_vars(vars(&pairs), None).unwrap();
        assert_eq!(config.channels.get("C1"), Some(&4));
        assert_eq!(config.config_path.as_deref(), Some(file.path()));
    }

    #[test]
    fn test_rejects_project_zero_in_channels() {
        let file = write_config("[channels]\n\"C1\" = 0\n");
        let err = BotConfig::from_vars(vars(&BASE), Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, SlackError::Config(ref msg) if msg.contains("C1")));
    }

    #[test]
    fn test_rejects_unknown_status_and_keys() {
        assert!(FileConfig::parse("default_status = \"blocked\"\n").is_err());
        assert!(FileConfig::parse("colour = \"blue\"\n").is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = BotConfig::new("xoxb-secret", "xapp-secret", "ghp_secret", "acme");
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("xoxb-secret"));
        assert!(!debug_str.contains("xapp-secret"));
        assert!(!debug_str.contains("ghp_secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_reload_channels_keeps_old_mapping_on_error() {
        let directory = ChannelDirectory::new(
            ChannelProjectMapping::from_entries("acme", vec![("C1", 3)]).unwrap(),
        );

        let good = write_config("[channels]\n\"C1\" = 5\n\"C2\" = 6\n");
        assert_eq!(reload_channels(&directory, good.path(), "acme").unwrap(), 2);
        assert_eq!(directory.resolve("C1").unwrap().number(), 5);

        let bad = write_config("[channels]\n\"C1\" = -1\n");
        assert!(reload_channels(&directory, bad.path(), "acme").is_err());
        assert_eq!(directory.resolve("C1").unwrap().number(), 5);

        assert!(reload_channels(&directory, Path::new("/nonexistent/projectbot.toml"), "acme").is_err());
        assert_eq!(directory.resolve("C2").unwrap().number(), 6);
    }

    #[tokio::test]
    async fn test_channel_refresh_picks_up_file_changes() {
        let directory = Arc::new(ChannelDirectory::new(
            ChannelProjectMapping::from_entries("acme", vec![("C1", 3)]).unwrap(),
        ));
        let file = write_config("[channels]\n\"C1\" = 8\n");

        let handle = spawn_channel_refresh(
            directory.clone(),
            file.path().to_path_buf(),
            "acme".to_string(),
            Duration::from_millis(20),
        );
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert_eq!(directory.resolve("C1").unwrap().number(), 8);
    }
}

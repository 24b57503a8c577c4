//! Configuration for ~/.config/reposter/config.toml plus environment overrides.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Environment variables (optionally loaded from `.env`) override the file,
//! and command-line flags override both. Credentials normally come from the
//! environment; they are held as [`SecretString`] and never printed.
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::cycle::{CycleOptions, MarkPolicy};
use crate::format::{MessageFormat, DEFAULT_MAX_LENGTH};
use crate::publish::bluesky::{DEFAULT_CARD_SERVICE, DEFAULT_SERVICE};
use crate::publish::{BlueskyConfig, MastodonConfig};
use crate::retry::RetryPolicy;
use crate::util::{validate_api_base, validate_feed_url, UrlValidationError};

pub const DEFAULT_FEED_URL: &str = "https://developer.salesforce.com/blogs/feed";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid {field}: {source}")]
    InvalidUrl {
        field: &'static str,
        source: UrlValidationError,
    },
}

/// A publish target is enabled but some of its credentials are absent.
///
/// Reported, not fatal: the caller decides whether to run without the target.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing {target} credentials: {}", missing.join(", "))]
pub struct MissingCredentials {
    pub target: &'static str,
    /// Environment variable names that would supply them
    pub missing: Vec<&'static str>,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RSS feed to poll.
    pub feed_url: String,

    /// SQLite file holding posted records. Defaults to the config directory.
    pub database_path: Option<PathBuf>,

    /// Fetch and check only; never publish.
    pub dry_run: bool,

    /// Record posts as announced during a dry run.
    pub dry_run_records: bool,

    /// Maximum message length in characters.
    pub max_length: usize,

    /// Seconds to wait between consecutive new posts.
    pub post_delay_secs: u64,

    /// Minutes between cycles in watch mode. 0 = run one cycle and exit.
    pub interval_minutes: u64,

    pub mark_policy: MarkPolicy,
    pub retry: RetryPolicy,
    pub message: MessageFormat,
    pub bluesky: BlueskySettings,
    pub mastodon: MastodonSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            database_path: None,
            dry_run: false,
            dry_run_records: true,
            max_length: DEFAULT_MAX_LENGTH,
            post_delay_secs: 2,
            interval_minutes: 0,
            mark_policy: MarkPolicy::default(),
            retry: RetryPolicy::default(),
            message: MessageFormat::default(),
            bluesky: BlueskySettings::default(),
            mastodon: MastodonSettings::default(),
        }
    }
}

/// SEC-015: `Debug` on [`SecretString`] prints `[REDACTED]`, so deriving is safe.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlueskySettings {
    pub enabled: bool,
    pub service: String,
    pub card_service: String,
    pub identifier: Option<String>,
    #[serde(deserialize_with = "secret_opt")]
    pub app_password: Option<SecretString>,
}

impl Default for BlueskySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            service: DEFAULT_SERVICE.to_string(),
            card_service: DEFAULT_CARD_SERVICE.to_string(),
            identifier: None,
            app_password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MastodonSettings {
    pub enabled: bool,
    pub url: Option<String>,
    #[serde(deserialize_with = "secret_opt")]
    pub access_token: Option<SecretString>,
}

impl Default for MastodonSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            access_token: None,
        }
    }
}

fn invalid(field: &'static str) -> impl FnOnce(UrlValidationError) -> ConfigError {
    move |source| ConfigError::InvalidUrl { field, source }
}

fn secret_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SecretString>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.is_empty())
        .map(SecretString::from))
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 12] = [
        "feed_url",
        "database_path",
        "dry_run",
        "dry_run_records",
        "max_length",
        "post_delay_secs",
        "interval_minutes",
        "mark_policy",
        "retry",
        "message",
        "bluesky",
        "mastodon",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown top-level keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), feed = %config.feed_url, "Loaded configuration");
        Ok(config)
    }

    /// Applies environment overrides through `lookup` (usually
    /// `std::env::var`). Empty values are treated as unset.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `FEED_URL`, `SF_BLOG_RSS_URL` | `feed_url` |
    /// | `REPOSTER_DB` | `database_path` |
    /// | `REPOSTER_DRY_RUN`, `ENV=development`, `DENO_ENV=development` | `dry_run` |
    /// | `BLUESKY_IDENTIFIER`, `BLUESKY_APP_PASSWORD`, `BLUESKY_SERVICE` | `bluesky.*` |
    /// | `MASTODON_URL`, `MASTODON_ACCESS_TOKEN` | `mastodon.*` |
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("FEED_URL").or_else(|| get("SF_BLOG_RSS_URL")) {
            self.feed_url = url;
        }
        if let Some(path) = get("REPOSTER_DB") {
            self.database_path = Some(PathBuf::from(path));
        }

        let truthy = |v: String| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes");
        let development = |v: String| v.eq_ignore_ascii_case("development");
        if get("REPOSTER_DRY_RUN").is_some_and(truthy)
            || get("ENV").is_some_and(development)
            || get("DENO_ENV").is_some_and(development)
        {
            self.dry_run = true;
        }

        if let Some(identifier) = get("BLUESKY_IDENTIFIER") {
            self.bluesky.identifier = Some(identifier);
        }
        if let Some(password) = get("BLUESKY_APP_PASSWORD") {
            self.bluesky.app_password = Some(SecretString::from(password));
        }
        if let Some(service) = get("BLUESKY_SERVICE") {
            self.bluesky.service = service;
        }
        if let Some(url) = get("MASTODON_URL") {
            self.mastodon.url = Some(url);
        }
        if let Some(token) = get("MASTODON_ACCESS_TOKEN") {
            self.mastodon.access_token = Some(SecretString::from(token));
        }
    }

    /// Checks every URL the process will contact.
    pub fn validate_urls(&self) -> Result<(), ConfigError> {
        validate_feed_url(&self.feed_url).map_err(invalid("feed_url"))?;
        if self.bluesky.enabled {
            validate_api_base(&self.bluesky.service).map_err(invalid("bluesky.service"))?;
            validate_feed_url(&self.bluesky.card_service)
                .map_err(invalid("bluesky.card_service"))?;
        }
        if let Some(url) = self.mastodon.url.as_deref().filter(|_| self.mastodon.enabled) {
            validate_api_base(url).map_err(invalid("mastodon.url"))?;
        }
        Ok(())
    }

    /// Bluesky connection settings, `None` if disabled.
    pub fn bluesky(&self) -> Result<Option<BlueskyConfig>, MissingCredentials> {
        if !self.bluesky.enabled {
            return Ok(None);
        }
        match (&self.bluesky.identifier, &self.bluesky.app_password) {
            (Some(identifier), Some(password)) => Ok(Some(BlueskyConfig {
                service: self.bluesky.service.clone(),
                card_service: self.bluesky.card_service.clone(),
                identifier: identifier.clone(),
                app_password: password.clone(),
            })),
            (identifier, password) => Err(MissingCredentials {
                target: "bluesky",
                missing: [
                    identifier.is_none().then_some("BLUESKY_IDENTIFIER"),
                    password.is_none().then_some("BLUESKY_APP_PASSWORD"),
                ]
                .into_iter()
                .flatten()
                .collect(),
            }),
        }
    }

    /// Mastodon connection settings, `None` if disabled.
    pub fn mastodon(&self) -> Result<Option<MastodonConfig>, MissingCredentials> {
        if !self.mastodon.enabled {
            return Ok(None);
        }
        match (&self.mastodon.url, &self.mastodon.access_token) {
            (Some(url), Some(token)) => Ok(Some(MastodonConfig {
                url: url.clone(),
                access_token: token.clone(),
            })),
            (url, token) => Err(MissingCredentials {
                target: "mastodon",
                missing: [
                    url.is_none().then_some("MASTODON_URL"),
                    token.is_none().then_some("MASTODON_ACCESS_TOKEN"),
                ]
                .into_iter()
                .flatten()
                .collect(),
            }),
        }
    }

    /// Every enabled target whose credentials are incomplete.
    pub fn validate_credentials(&self) -> Vec<MissingCredentials> {
        [self.bluesky().err(), self.mastodon().err()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn cycle_options(&self) -> CycleOptions {
        CycleOptions {
            feed_url: self.feed_url.clone(),
            dry_run: self.dry_run,
            dry_run_records: self.dry_run_records,
            max_length: self.max_length,
            post_delay: Duration::from_secs(self.post_delay_secs),
            retry: self.retry,
            mark_policy: self.mark_policy,
            message: self.message.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn temp_config(name: &str, content: &str) -> (PathBuf, PathBuf) {
        let dir = std::env::temp_dir().join(format!("reposter_config_test_{name}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
        assert_eq!(config.max_length, 280);
        assert_eq!(config.post_delay_secs, 2);
        assert_eq!(config.interval_minutes, 0);
        assert_eq!(config.mark_policy, MarkPolicy::AfterAttempt);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.dry_run);
        assert!(config.dry_run_records);
        assert!(config.bluesky.enabled && config.mastodon.enabled);
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/reposter_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.feed_url, DEFAULT_FEED_URL);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let (dir, path) = temp_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_length, 280);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_full_config() {
        let (dir, path) = temp_config(
            "full",
            r##"
feed_url = "https://blog.example.com/rss"
dry_run = true
dry_run_records = false
max_length = 300
post_delay_secs = 5
interval_minutes = 60
mark_policy = "require_success"

[retry]
max_attempts = 4
initial_delay_ms = 500

[message]
marker = "🚀"
hashtags = "#rust"

[bluesky]
identifier = "me.bsky.social"
app_password = "from-file"

[mastodon]
enabled = false
"##,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feed_url, "https://blog.example.com/rss");
        assert!(config.dry_run);
        assert_eq!(config.max_length, 300);
        assert_eq!(config.interval_minutes, 60);
        assert_eq!(config.mark_policy, MarkPolicy::RequireSuccess);
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(500));
        assert_eq!(config.message.marker, "🚀");
        assert_eq!(config.message.hashtags, "#rust");
        assert_eq!(config.bluesky.identifier.as_deref(), Some("me.bsky.social"));
        assert!(!config.mastodon.enabled);

        let options = config.cycle_options();
        assert_eq!(options.post_delay, Duration::from_secs(5));
        assert!(options.dry_run);
        assert!(!options.dry_run_records);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (dir, path) = temp_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (dir, path) = temp_config("unknown", "max_length = 200\ntotally_fake_key = 1\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_length, 200);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_bad_mark_policy_rejected() {
        let (dir, path) = temp_config("bad_policy", "mark_policy = \"sometimes\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (dir, path) = temp_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::default();
        config.bluesky.identifier = Some("file-id".into());
        config.apply_env(env(&[
            ("SF_BLOG_RSS_URL", "https://legacy.example.com/feed"),
            ("BLUESKY_IDENTIFIER", "env-id"),
            ("BLUESKY_APP_PASSWORD", "env-pass"),
            ("MASTODON_URL", "https://mastodon.example"),
            ("MASTODON_ACCESS_TOKEN", ""),
        ]));

        assert_eq!(config.feed_url, "https://legacy.example.com/feed");
        assert_eq!(config.bluesky.identifier.as_deref(), Some("env-id"));
        assert_eq!(
            config.bluesky.app_password.as_ref().map(|s| s.expose_secret().to_string()),
            Some("env-pass".to_string())
        );
        // Empty value counts as unset
        assert!(config.mastodon.access_token.is_none());
    }

    #[test]
    fn test_feed_url_prefers_primary_variable() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("FEED_URL", "https://primary.example/feed"),
            ("SF_BLOG_RSS_URL", "https://legacy.example/feed"),
        ]));
        assert_eq!(config.feed_url, "https://primary.example/feed");
    }

    #[test]
    fn test_dry_run_aliases() {
        for pairs in [
            vec![("REPOSTER_DRY_RUN", "true")],
            vec![("ENV", "development")],
            vec![("DENO_ENV", "Development")],
        ] {
            let mut config = Config::default();
            config.apply_env(env(&pairs));
            assert!(config.dry_run, "{pairs:?} should enable dry run");
        }

        let mut config = Config::default();
        config.apply_env(env(&[("REPOSTER_DRY_RUN", "0"), ("ENV", "production")]));
        assert!(!config.dry_run);
    }

    #[test]
    fn test_validate_credentials_reports_each_target() {
        let mut config = Config::default();
        config.apply_env(env(&[("BLUESKY_IDENTIFIER", "me")]));

        let missing = config.validate_credentials();
        assert_eq!(
            missing,
            vec![
                MissingCredentials {
                    target: "bluesky",
                    missing: vec!["BLUESKY_APP_PASSWORD"],
                },
                MissingCredentials {
                    target: "mastodon",
                    missing: vec!["MASTODON_URL", "MASTODON_ACCESS_TOKEN"],
                },
            ]
        );
        assert_eq!(
            missing[1].to_string(),
            "Missing mastodon credentials: MASTODON_URL, MASTODON_ACCESS_TOKEN"
        );
    }

    #[test]
    fn test_disabled_target_needs_no_credentials() {
        let mut config = Config::default();
        config.mastodon.enabled = false;
        config.apply_env(env(&[
            ("BLUESKY_IDENTIFIER", "me"),
            ("BLUESKY_APP_PASSWORD", "pw"),
        ]));

        assert!(config.validate_credentials().is_empty());
        assert!(config.mastodon().unwrap().is_none());
        let bluesky = config.bluesky().unwrap().unwrap();
        assert_eq!(bluesky.identifier, "me");
        assert_eq!(bluesky.service, DEFAULT_SERVICE);
    }

    #[test]
    fn test_validate_urls() {
        let mut config = Config::default();
        assert!(config.validate_urls().is_ok());

        config.mastodon.url = Some("http://mastodon.example".into());
        assert!(matches!(
            config.validate_urls(),
            Err(ConfigError::InvalidUrl { field: "mastodon.url", .. })
        ));

        config.mastodon.url = None;
        config.feed_url = "ftp://example.com/feed".into();
        assert!(matches!(
            config.validate_urls(),
            Err(ConfigError::InvalidUrl { field: "feed_url", .. })
        ));
    }

    // SEC-015: secrets never appear in Debug output
    #[test]
    fn test_debug_masks_secrets() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("BLUESKY_APP_PASSWORD", "super-secret-pass"),
            ("MASTODON_ACCESS_TOKEN", "super-secret-token"),
        ]));

        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-pass"));
        assert!(!debug_output.contains("super-secret-token"));
    }
}

//! Environment-sourced configuration.
//!
//! Recognized variables:
//! - `BOT_TOKEN` (required): Telegram Bot API token
//! - `PORT`: webhook listen port (default 8080)
//! - `WEBHOOK_HOST`: public host name used to register the webhook URL;
//!   when unset the webhook must be registered out of band
//! - `STAGING_ROOT`: root directory for per-request workspaces (default ./staging)
//! - `CUSTOM_APPENDIX`: caption suffix override
//! - `CUSTOM_DEVLINK`: maintainer-contact link override
//! - `RUST_LOG`: tracing filter (handled by the subscriber in main)
//!
//! The staging root is carried inside the config and handed to the workspace
//! manager at construction; there is no process-wide implicit path.

use std::path::PathBuf;

use anyhow::{Context, Result};

/// Caption suffix appended to every delivered audio file unless overridden.
pub const DEFAULT_APPENDIX: &str = "<a href=\"https://github.com/tunebot-dev/tunebot\">tunebot</a>";

/// Maintainer-contact link shown in failure responses unless overridden.
pub const DEFAULT_DEVLINK: &str = "https://github.com/tunebot-dev/tunebot/issues";

/// Resolved bot configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram Bot API token
    pub bot_token: String,

    /// Webhook listen port
    pub port: u16,

    /// Public host name for the webhook URL (e.g. "example.fly.dev")
    pub webhook_host: Option<String>,

    /// Root directory for per-request staging workspaces
    pub staging_root: PathBuf,

    /// Caption suffix for delivered files
    pub appendix: String,

    /// Maintainer-contact link for failure responses
    pub devlink: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bot_token = get("BOT_TOKEN").context("BOT_TOKEN is required")?;

        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT must be a number, got: {raw}"))?,
            None => 8080,
        };

        Ok(Self {
            bot_token,
            port,
            webhook_host: get("WEBHOOK_HOST"),
            staging_root: get("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./staging")),
            appendix: get("CUSTOM_APPENDIX").unwrap_or_else(|| DEFAULT_APPENDIX.to_string()),
            devlink: get("CUSTOM_DEVLINK").unwrap_or_else(|| DEFAULT_DEVLINK.to_string()),
        })
    }

    /// Full public webhook URL, if a host is configured.
    ///
    /// The bot token is used as the URL path so that only Telegram can hit
    /// the update endpoint.
    pub fn webhook_url(&self) -> Option<String> {
        self.webhook_host
            .as_ref()
            .map(|host| format!("https://{}/webhook/{}", host, self.bot_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_token_required() {
        let result = Config::from_lookup(lookup(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("BOT_TOKEN", "123:abc")])).unwrap();

        assert_eq!(config.bot_token, "123:abc");
        assert_eq!(config.port, 8080);
        assert_eq!(config.webhook_host, None);
        assert_eq!(config.staging_root, PathBuf::from("./staging"));
        assert_eq!(config.appendix, DEFAULT_APPENDIX);
        assert_eq!(config.devlink, DEFAULT_DEVLINK);
        assert_eq!(config.webhook_url(), None);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BOT_TOKEN", "123:abc"),
            ("PORT", "9090"),
            ("WEBHOOK_HOST", "bot.example.org"),
            ("STAGING_ROOT", "/var/lib/tunebot"),
            ("CUSTOM_APPENDIX", "my channel"),
            ("CUSTOM_DEVLINK", "https://example.org/dev"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.staging_root, PathBuf::from("/var/lib/tunebot"));
        assert_eq!(config.appendix, "my channel");
        assert_eq!(config.devlink, "https://example.org/dev");
        assert_eq!(
            config.webhook_url().unwrap(),
            "https://bot.example.org/webhook/123:abc"
        );
    }

    #[test]
    fn test_invalid_port() {
        let result = Config::from_lookup(lookup(&[("BOT_TOKEN", "t"), ("PORT", "not-a-port")]));
        assert!(result.is_err());
    }
}

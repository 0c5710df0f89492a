use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Path to the schedule document; `SCHEDULES_FILE` overrides it
    #[serde(default = "default_schedules_file")]
    pub schedules_file: PathBuf,
    /// Fallback cron expression used when no schedule document exists;
    /// `CRON_EXPRESSION` overrides it
    #[serde(default = "default_cron_expression")]
    pub cron_expression: String,
    /// Process-default timezone for cron evaluation
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Target of the synthesized fallback job
    #[serde(default = "default_target")]
    pub default_target: String,
}

/// How spider processes are launched and where they write output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// Program invoked for every job run
    #[serde(default = "default_command")]
    pub command: String,
    /// Arguments placed before the target name
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    /// Root of the dated output tree written by spiders
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Canonical job targets registered at startup
    #[serde(default = "default_spiders")]
    pub spiders: Vec<String>,
    /// Alternate name -> canonical target
    #[serde(default = "default_aliases")]
    pub aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Telegram bot token; `TELEGRAM_BOT_TOKEN` overrides it
    pub telegram_bot_token: Option<String>,
    /// Telegram chat id; `TELEGRAM_CHAT_ID` overrides it
    pub telegram_chat_id: Option<String>,
}

// Web defaults
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

// Scheduler defaults
fn default_schedules_file() -> PathBuf {
    PathBuf::from("schedules.toml")
}

fn default_cron_expression() -> String {
    "0 20 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_target() -> String {
    "bullseye_press".to_string()
}

// Scraper defaults
fn default_command() -> String {
    "scrapy".to_string()
}

fn default_args() -> Vec<String> {
    vec!["crawl".to_string()]
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_spiders() -> Vec<String> {
    [
        "bullseye_press",
        "holy_cow",
        "radiant_comics",
        "raj_comics_shop",
        "yali_dream_creations",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_aliases() -> HashMap<String, String> {
    HashMap::from([("bullseye".to_string(), "bullseye_press".to_string())])
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            schedules_file: default_schedules_file(),
            cron_expression: default_cron_expression(),
            timezone: default_timezone(),
            default_target: default_target(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
            data_dir: default_data_dir(),
            spiders: default_spiders(),
            aliases: default_aliases(),
        }
    }
}

impl SchedulerConfig {
    /// Schedule document path, honoring the `SCHEDULES_FILE` override
    pub fn effective_schedules_file(&self) -> PathBuf {
        std::env::var("SCHEDULES_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.schedules_file.clone())
    }

    /// Fallback cron expression, honoring the `CRON_EXPRESSION` override
    pub fn effective_cron_expression(&self) -> String {
        std::env::var("CRON_EXPRESSION").unwrap_or_else(|_| self.cron_expression.clone())
    }

    /// Process-default timezone, honoring the `TZ` override
    pub fn effective_timezone(&self) -> String {
        std::env::var("TZ").unwrap_or_else(|_| self.timezone.clone())
    }
}

impl NotifyConfig {
    pub fn effective_bot_token(&self) -> Option<String> {
        std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .or_else(|| self.telegram_bot_token.clone())
    }

    pub fn effective_chat_id(&self) -> Option<String> {
        std::env::var("TELEGRAM_CHAT_ID")
            .ok()
            .or_else(|| self.telegram_chat_id.clone())
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = Config::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed.web.port, 8000);
        assert_eq!(parsed.scheduler.cron_expression, "0 20 * * *");
        assert_eq!(parsed.scraper.command, "scrapy");
        assert!(parsed.scraper.spiders.contains(&"bullseye_press".to_string()));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scheduler.default_target, "bullseye_press");
        assert_eq!(
            config.scraper.aliases.get("bullseye"),
            Some(&"bullseye_press".to_string())
        );
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
            [web]
            port = 9100

            [scraper]
            command = "python3"
            args = ["-m", "scrapy", "crawl"]
            "#,
        )
        .unwrap();

        assert_eq!(config.web.port, 9100);
        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.scraper.command, "python3");
        assert_eq!(config.scraper.args, vec!["-m", "scrapy", "crawl"]);
    }
}

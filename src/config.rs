use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

use crate::clock::DEFAULT_TIMEZONE;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Absent means no provider: every generation attempt fails.
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clock: ClockConfig,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    pub provider: String,
    /// Base URL for the API. Optional; each provider has a default.
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    8192
}

#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_bind")]
    pub bind: String,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            api_key: None,
        }
    }
}

fn default_api_bind() -> String {
    "127.0.0.1:3100".to_string()
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_base_dir", deserialize_with = "deserialize_path")]
    pub base_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> PathBuf {
        self.base_dir.join("data.json")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.base_dir.join("settings.json")
    }

    pub fn persona_path(&self) -> PathBuf {
        self.base_dir.join("persona.md")
    }

    pub fn holidays_path(&self) -> PathBuf {
        self.base_dir.join("holidays.toml")
    }
}

#[derive(Debug, Deserialize)]
pub struct ClockConfig {
    /// IANA zone name such as `Europe/Berlin`.
    #[serde(default = "default_timezone", deserialize_with = "deserialize_tz")]
    pub timezone: Tz,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> Tz {
    DEFAULT_TIMEZONE
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".life-scheduler")
}

fn deserialize_path<'de, D: Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
    let s = String::deserialize(d)?;
    Ok(expand_tilde(&s))
}

fn deserialize_tz<'de, D: Deserializer<'de>>(d: D) -> Result<Tz, D::Error> {
    let s = String::deserialize(d)?;
    s.parse::<Tz>()
        .map_err(|e| serde::de::Error::custom(format!("unknown time zone {s:?}: {e}")))
}

pub fn load(path: &str) -> Result<Config> {
    let path = expand_tilde(path);
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
    Ok(config)
}

pub async fn init_config_dir() -> Result<PathBuf> {
    let base = default_base_dir();
    tokio::fs::create_dir_all(base.join("sessions")).await?;

    let persona = base.join("persona.md");
    if !persona.exists() {
        tokio::fs::write(
            &persona,
            "A cheerful, curious companion who enjoys small everyday adventures.\n",
        )
        .await?;
    }

    let holidays = base.join("holidays.toml");
    if !holidays.exists() {
        tokio::fs::write(
            &holidays,
            r#"# "MM-DD" applies every year, "YYYY-MM-DD" a single date.
# "12-25" = "Christmas"
# "2026-10-01" = "National Day"
"#,
        )
        .await?;
    }

    let config_path = base.join("config.toml");
    if !config_path.exists() {
        tokio::fs::write(
            &config_path,
            r#"[llm]
provider = "openai"
# base_url = "https://api.openai.com/v1"  # optional, uses provider default
model = "gpt-4o-mini"
api_key = "YOUR_API_KEY"
max_tokens = 2048

# Other provider examples:
# provider = "openrouter"
# model = "anthropic/claude-sonnet-4"
#
# provider = "anthropic"
# model = "claude-sonnet-4-5-20250929"
#
# provider = "deepseek"
# model = "deepseek-chat"

[api]
bind = "127.0.0.1:3100"
# api_key = "change-me"  # required for non-localhost binds

[storage]
# base_dir = "~/.life-scheduler"

[clock]
# timezone = "Asia/Shanghai"  # IANA zone name
"#,
        )
        .await?;
    }

    Ok(base)
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::persist;

/// Wall-clock trigger time, `HH:MM` in 24-hour form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleTimeError {
    #[error("expected HH:MM, got {0:?}")]
    Format(String),
    #[error("{0} is not a valid time of day")]
    Range(String),
}

impl FromStr for ScheduleTime {
    type Err = ScheduleTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        let well_formed = bytes.len() == 5
            && bytes[2] == b':'
            && [0, 1, 3, 4].iter().all(|&i| bytes[i].is_ascii_digit());
        if !well_formed {
            return Err(ScheduleTimeError::Format(s.to_string()));
        }
        let hour: u32 = s[..2].parse().map_err(|_| ScheduleTimeError::Format(s.to_string()))?;
        let minute: u32 = s[3..].parse().map_err(|_| ScheduleTimeError::Format(s.to_string()))?;
        if hour > 23 || minute > 59 {
            return Err(ScheduleTimeError::Range(s.to_string()));
        }
        Ok(Self { hour, minute })
    }
}

impl fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Default for ScheduleTime {
    fn default() -> Self {
        Self { hour: 7, minute: 0 }
    }
}

impl Serialize for ScheduleTime {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScheduleTime {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A conversation to sample for context, and how many recent turns to take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReference {
    #[serde(alias = "umo")]
    pub conversation_ref: String,
    #[serde(default = "default_chat_count")]
    pub count: usize,
}

fn default_chat_count() -> usize {
    20
}

/// Runtime settings, changed by commands and persisted to `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub schedule_time: ScheduleTime,
    pub reference_history_days: u32,
    pub reference_chats: Vec<ChatReference>,
    pub prompt_template: String,
    pub outfit_desc: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            schedule_time: ScheduleTime::default(),
            reference_history_days: 3,
            reference_chats: Vec::new(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            outfit_desc: DEFAULT_OUTFIT_DESC.to_string(),
        }
    }
}

pub const DEFAULT_OUTFIT_DESC: &str =
    "Be specific about colours, cut, fabric and accessories so the outfit is easy to picture.";

pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"# Role: Life Scheduler
Plan your own day using the information below. Stay in character; the plan should feel lived-in and personal, not like a checklist.

## Context
- Date: {date_str} {weekday} {holiday}
- Persona: {persona_desc}

## Today's creative constraints
- Theme: [{daily_theme}] - build the day's main activities around it
- Mood colour: [{mood_color}] - the emotional tone of the day
- Outfit style: [{outfit_style}] - lean the outfit towards this style
- Day type: [{schedule_type}] - shape the schedule like this kind of day

## Avoid repeating recent days
The last few days are listed below. Today must differ clearly in outfit and activities:
{history_schedules}

## Recent conversations (for inspiration)
{recent_chats}

## Tasks
1. outfit: design today's outfit. {outfit_desc}
2. schedule: plan today from morning to night, with at least one small highlight.

## Output Format
Reply with JSON only. No markdown code fences, no explanation.
{{
    "outfit": "today's outfit with colours, cut and accessories",
    "schedule": "a vivid paragraph describing today's plan"
}}
"#;

/// Settings behind a lock, written through to disk on change.
pub struct SettingsHandle {
    path: PathBuf,
    inner: RwLock<SchedulerSettings>,
}

impl SettingsHandle {
    pub fn load(path: PathBuf) -> Self {
        let settings: SchedulerSettings = persist::load_or_default(&path);
        Self {
            path,
            inner: RwLock::new(settings),
        }
    }

    pub async fn get(&self) -> SchedulerSettings {
        self.inner.read().await.clone()
    }

    pub async fn schedule_time(&self) -> ScheduleTime {
        self.inner.read().await.schedule_time
    }

    /// Returns `false` (and writes nothing) when `time` is already set.
    pub async fn set_schedule_time(&self, time: ScheduleTime) -> bool {
        let mut settings = self.inner.write().await;
        if settings.schedule_time == time {
            return false;
        }
        settings.schedule_time = time;
        if let Err(e) = persist::write_json_atomic(&self.path, &*settings).await {
            tracing::error!("Failed to save settings: {e:#}");
        }
        true
    }
}

use std::sync::Arc;

use chrono::NaiveDate;

use crate::calendar::{self, HolidayCalendar};
use crate::persona::{FALLBACK_PERSONA, PersonaSource};
use crate::session::{ConversationSource, Turn};
use crate::settings::{ChatReference, SchedulerSettings};
use crate::store::SharedStore;
use crate::variety::Variety;

const HISTORY_EXCERPT_CHARS: usize = 100;
const NO_HISTORY: &str = "no history";
const NO_RECENT_CHATS: &str = "no recent conversation";

/// Everything the prompt template can reference.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub date_str: String,
    pub weekday: String,
    pub holiday: String,
    pub persona_desc: String,
    pub history_schedules: String,
    pub recent_chats: String,
    pub outfit_desc: String,
    pub variety: Variety,
}

/// Optional collaborators. Anything left as `None` gets its fallback value.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub conversations: Option<Arc<dyn ConversationSource>>,
    pub persona: Option<Arc<dyn PersonaSource>>,
    pub calendar: Option<Arc<dyn HolidayCalendar>>,
}

pub struct ContextAssembler {
    store: Arc<SharedStore>,
    collab: Collaborators,
}

impl ContextAssembler {
    pub fn new(store: Arc<SharedStore>, collab: Collaborators) -> Self {
        Self { store, collab }
    }

    pub async fn assemble(&self, today: NaiveDate, settings: &SchedulerSettings) -> GenerationContext {
        GenerationContext {
            date_str: today.format("%B %-d, %Y").to_string(),
            weekday: calendar::weekday_name(today).to_string(),
            holiday: self.holiday_label(today),
            persona_desc: self.persona().await,
            history_schedules: self.history(today, settings.reference_history_days).await,
            recent_chats: self.recent_chats(&settings.reference_chats).await,
            outfit_desc: settings.outfit_desc.clone(),
            variety: Variety::pick(),
        }
    }

    async fn history(&self, today: NaiveDate, days: u32) -> String {
        let lines: Vec<String> = self
            .store
            .history(today, days)
            .await
            .into_iter()
            .map(|(day, rec)| {
                let excerpt: String = rec.schedule.chars().take(HISTORY_EXCERPT_CHARS).collect();
                format!("[{day}]: {excerpt}...")
            })
            .collect();
        if lines.is_empty() {
            NO_HISTORY.to_string()
        } else {
            lines.join("\n")
        }
    }

    async fn recent_chats(&self, refs: &[ChatReference]) -> String {
        let Some(source) = &self.collab.conversations else {
            return NO_RECENT_CHATS.to_string();
        };
        let mut blocks = Vec::new();
        for r in refs {
            match source.recent_turns(&r.conversation_ref, r.count).await {
                Ok(turns) => {
                    let text = format_turns(&turns);
                    if !text.is_empty() {
                        blocks.push(format!("--- Conversation {} ---\n{text}", r.conversation_ref));
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to get recent chats for {}: {e:#}", r.conversation_ref);
                }
            }
        }
        if blocks.is_empty() {
            NO_RECENT_CHATS.to_string()
        } else {
            blocks.join("\n")
        }
    }

    async fn persona(&self) -> String {
        let Some(source) = &self.collab.persona else {
            return FALLBACK_PERSONA.to_string();
        };
        match source.default_persona().await {
            Ok(Some(p)) if !p.trim().is_empty() => p,
            Ok(_) => FALLBACK_PERSONA.to_string(),
            Err(e) => {
                tracing::warn!("Failed to get persona: {e:#}");
                FALLBACK_PERSONA.to_string()
            }
        }
    }

    fn holiday_label(&self, today: NaiveDate) -> String {
        self.collab
            .calendar
            .as_ref()
            .and_then(|c| c.holiday(today))
            .map(|name| format!("(holiday: {name})"))
            .unwrap_or_default()
    }
}

/// `User:` / `Me:` lines; other roles are dropped.
fn format_turns(turns: &[Turn]) -> String {
    turns
        .iter()
        .filter_map(|t| match t.speaker.as_str() {
            "user" => Some(format!("User: {}", t.content)),
            "assistant" => Some(format!("Me: {}", t.content)),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::llm::Message;

/// One line of a conversation as seen by the context assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub speaker: String,
    pub content: String,
}

/// Read access to past conversations.
#[async_trait::async_trait]
pub trait ConversationSource: Send + Sync {
    /// Up to `count` most recent turns, oldest first.
    async fn recent_turns(&self, conversation: &str, count: usize) -> Result<Vec<Turn>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: String,
    pub messages: Vec<Message>,
    pub updated_at: DateTime<Local>,
}

/// File-backed conversation histories, one JSON file per session key.
pub struct SessionStore {
    base_dir: PathBuf,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let sessions_dir = base_dir.join("sessions");
        std::fs::create_dir_all(&sessions_dir)?;

        let mut sessions = HashMap::new();
        let mut misnamed = Vec::new();
        for entry in std::fs::read_dir(&sessions_dir)?.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                let content = std::fs::read_to_string(&path)?;
                match serde_json::from_str::<Session>(&content) {
                    Ok(session) => {
                        let expected = Self::session_filename(&session.key);
                        if path.file_stem().and_then(|s| s.to_str()) != Some(expected.as_str()) {
                            misnamed.push((session.key.clone(), path.clone()));
                        }
                        sessions
                            .entry(session.key.clone())
                            .and_modify(|existing: &mut Session| {
                                if session.updated_at > existing.updated_at {
                                    *existing = session.clone();
                                }
                            })
                            .or_insert(session);
                    }
                    Err(e) => tracing::warn!("Skipping unreadable session {}: {e}", path.display()),
                }
            }
        }

        let store = Self {
            base_dir,
            sessions: Mutex::new(sessions),
        };
        store.rename_misnamed(misnamed)?;
        Ok(store)
    }

    /// Rewrites sessions found under a file name other than their key's
    /// digest (older releases hashed keys differently), then removes the
    /// old files so `delete` reaches every copy.
    fn rename_misnamed(&self, misnamed: Vec<(String, PathBuf)>) -> Result<()> {
        if misnamed.is_empty() {
            return Ok(());
        }
        let sessions = self.sessions.lock().expect("session lock poisoned");
        for (key, old_path) in &misnamed {
            if let Some(session) = sessions.get(key) {
                self.save_to_disk(key, session)?;
            }
            std::fs::remove_file(old_path)
                .with_context(|| format!("Failed to remove {}", old_path.display()))?;
        }
        tracing::info!("Renamed {} session files", misnamed.len());
        Ok(())
    }

    pub fn messages(&self, key: &str) -> Vec<Message> {
        let sessions = self.sessions.lock().expect("session lock poisoned");
        sessions
            .get(key)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    pub fn append(&self, key: &str, messages: Vec<Message>) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let session = sessions.entry(key.to_string()).or_insert_with(|| Session {
            key: key.to_string(),
            messages: Vec::new(),
            updated_at: Local::now(),
        });
        session.messages.extend(messages);
        session.updated_at = Local::now();
        self.save_to_disk(key, session)
    }

    /// Drops a session from memory and disk. Returns whether it existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let existed = sessions.remove(key).is_some();
        let path = self.session_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(existed)
    }

    fn save_to_disk(&self, key: &str, session: &Session) -> Result<()> {
        let dir = self.base_dir.join("sessions");
        std::fs::create_dir_all(&dir)?;

        let path = self.session_path(key);
        let tmp = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.base_dir
            .join("sessions")
            .join(format!("{}.json", Self::session_filename(key)))
    }

    fn session_filename(key: &str) -> String {
        format!("{:x}", Sha256::digest(key.as_bytes()))
    }
}

#[async_trait::async_trait]
impl ConversationSource for SessionStore {
    async fn recent_turns(&self, conversation: &str, count: usize) -> Result<Vec<Turn>> {
        let messages = self.messages(conversation);
        let skip = messages.len().saturating_sub(count);
        Ok(messages
            .into_iter()
            .skip(skip)
            .map(|m| Turn {
                speaker: m.role,
                content: m.content,
            })
            .collect())
    }
}

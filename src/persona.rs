use std::path::PathBuf;

use anyhow::{Context, Result};

/// Used whenever no persona source is configured or it fails.
pub const FALLBACK_PERSONA: &str =
    "A lively, warm-hearted AI companion who loves everyday life and feels things deeply.";

#[async_trait::async_trait]
pub trait PersonaSource: Send + Sync {
    /// The default persona prompt, or `None` if none is set.
    async fn default_persona(&self) -> Result<Option<String>>;
}

/// Reads `persona.md` from the data directory.
pub struct FilePersona {
    path: PathBuf,
}

impl FilePersona {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait::async_trait]
impl PersonaSource for FilePersona {
    async fn default_persona(&self) -> Result<Option<String>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read persona: {}", self.path.display()))?;
        let content = content.trim();
        Ok((!content.is_empty()).then(|| content.to_string()))
    }
}

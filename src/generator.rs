use std::sync::Arc;

use anyhow::Result;

use crate::error::GenerationError;
use crate::llm::{LlmClient, Message};
use crate::session::SessionStore;

/// Session key reserved for generation requests. Never a real user session.
pub const GENERATION_SESSION: &str = "life_scheduler_gen";

/// The external text generator plus its session-history side channel.
#[async_trait::async_trait]
pub trait Generator: Send + Sync {
    async fn invoke(&self, prompt: &str, session_id: &str) -> Result<String>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// LLM-backed generator that keeps per-session history in the session store.
pub struct LlmGenerator {
    llm: Arc<dyn LlmClient>,
    sessions: Arc<SessionStore>,
}

impl LlmGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, sessions: Arc<SessionStore>) -> Self {
        Self { llm, sessions }
    }
}

#[async_trait::async_trait]
impl Generator for LlmGenerator {
    async fn invoke(&self, prompt: &str, session_id: &str) -> Result<String> {
        let mut messages = self.sessions.messages(session_id);
        messages.push(Message::user(prompt));
        let reply = self.llm.chat(messages).await?;
        if let Err(e) = self.sessions.append(
            session_id,
            vec![Message::user(prompt), Message::assistant(reply.clone())],
        ) {
            tracing::warn!("Failed to record history for session {session_id}: {e:#}");
        }
        Ok(reply)
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.delete(session_id)?;
        Ok(())
    }
}

/// Runs prompts under [`GENERATION_SESSION`] and always clears that session
/// afterwards.
pub struct GeneratorClient {
    inner: Option<Arc<dyn Generator>>,
}

impl GeneratorClient {
    /// `None` means no provider is configured; every call fails.
    pub fn new(inner: Option<Arc<dyn Generator>>) -> Self {
        Self { inner }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let generator = self.inner.as_ref().ok_or(GenerationError::NoProvider)?;

        let result = generator.invoke(prompt, GENERATION_SESSION).await;

        match generator.delete_session(GENERATION_SESSION).await {
            Ok(()) => tracing::debug!("Cleaned up temporary session: {GENERATION_SESSION}"),
            Err(e) => tracing::warn!("Failed to cleanup temporary session: {e:#}"),
        }

        let text = result.map_err(|e| GenerationError::Generator(format!("{e:#}")))?;
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        reply: Option<String>,
        fail_cleanup: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Generator for Recorder {
        async fn invoke(&self, _prompt: &str, session_id: &str) -> Result<String> {
            self.calls.lock().unwrap().push(format!("invoke:{session_id}"));
            self.reply.clone().ok_or_else(|| anyhow::anyhow!("provider exploded"))
        }

        async fn delete_session(&self, session_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("delete:{session_id}"));
            if self.fail_cleanup {
                anyhow::bail!("store unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_cleanup_runs_on_success_and_failure() {
        let ok = Arc::new(Recorder {
            reply: Some("text".into()),
            ..Default::default()
        });
        let client = GeneratorClient::new(Some(ok.clone() as Arc<dyn Generator>));
        assert_eq!(client.generate("p").await.unwrap(), "text");
        assert_eq!(
            *ok.calls.lock().unwrap(),
            ["invoke:life_scheduler_gen", "delete:life_scheduler_gen"]
        );

        let failing = Arc::new(Recorder::default());
        let client = GeneratorClient::new(Some(failing.clone() as Arc<dyn Generator>));
        assert!(matches!(client.generate("p").await, Err(GenerationError::Generator(_))));
        assert_eq!(failing.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cleanup_failure_does_not_change_result() {
        let generator = Arc::new(Recorder {
            reply: Some("text".into()),
            fail_cleanup: true,
            ..Default::default()
        });
        let client = GeneratorClient::new(Some(generator as Arc<dyn Generator>));
        assert_eq!(client.generate("p").await.unwrap(), "text");
    }

    #[tokio::test]
    async fn test_no_provider_and_empty_reply() {
        let client = GeneratorClient::new(None);
        assert!(matches!(client.generate("p").await, Err(GenerationError::NoProvider)));

        let blank = Arc::new(Recorder {
            reply: Some("  \n".into()),
            ..Default::default()
        });
        let client = GeneratorClient::new(Some(blank as Arc<dyn Generator>));
        assert!(matches!(client.generate("p").await, Err(GenerationError::EmptyResponse)));
    }

    struct Echo;

    #[async_trait::async_trait]
    impl LlmClient for Echo {
        async fn chat(&self, messages: Vec<Message>) -> Result<String> {
            Ok(format!("{} messages", messages.len()))
        }
    }

    #[tokio::test]
    async fn test_llm_generator_session_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::new(dir.path().to_path_buf()).unwrap());
        let llm_gen: Arc<dyn Generator> = Arc::new(LlmGenerator::new(Arc::new(Echo), sessions.clone()));

        assert_eq!(llm_gen.invoke("p", GENERATION_SESSION).await.unwrap(), "1 messages");
        assert_eq!(sessions.messages(GENERATION_SESSION).len(), 2);

        let client = GeneratorClient::new(Some(llm_gen));
        assert_eq!(client.generate("p").await.unwrap(), "3 messages");
        assert!(sessions.messages(GENERATION_SESSION).is_empty());
    }

    struct Canned(&'static str);

    #[async_trait::async_trait]
    impl LlmClient for Canned {
        async fn chat(&self, _messages: Vec<Message>) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_history_write_failure_keeps_reply() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = Arc::new(SessionStore::new(dir.path().to_path_buf()).unwrap());
        let sessions_dir = dir.path().join("sessions");
        std::fs::remove_dir_all(&sessions_dir).unwrap();
        std::fs::write(&sessions_dir, "not a directory").unwrap();

        let reply = r#"{"outfit":"a","schedule":"b"}"#;
        let llm_gen = Arc::new(LlmGenerator::new(Arc::new(Canned(reply)), sessions));
        let client = GeneratorClient::new(Some(llm_gen as Arc<dyn Generator>));
        assert_eq!(client.generate("p").await.unwrap(), reply);
    }
}

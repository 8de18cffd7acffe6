//! Session management with `.ctx` file persistence (§6 "Session store").
//!
//! A `Session` holds the durable side of a task: the transcript and
//! metadata that outlive one `Executor::process_task` call. It is the
//! concrete (optional) persistence backing the spec names in §6 — `create`,
//! `get`, `save` map onto `get_or_create`/`create_with_ctx`, `get`, and the
//! implicit on-append persistence to the `.ctx` file respectively.

use crate::ctx_file;
use agentic_core::{Message, ToolCall};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::info;

pub use agentic_core::SessionKey;

pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Arc<Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Create a session with `.ctx` persistence. Discovers SOUL.md/AGENTS.md
    /// in the workspace and folds them into the system prompt.
    pub fn create_with_ctx(
        &self,
        key: &SessionKey,
        system_prompt: Option<&str>,
        workspace: &Path,
    ) -> Arc<Session> {
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| {
                let session_id = key.as_str().to_string();
                let ctx_path = ctx_file::session_ctx_path(workspace, &session_id);
                let timestamp = ctx_file::now_timestamp();

                let preload = ctx_file::discover_preload_files(workspace);

                let combined_system = if preload.is_empty() {
                    system_prompt.map(String::from)
                } else {
                    let mut sys = preload.join("\n\n");
                    if let Some(extra) = system_prompt {
                        sys.push_str("\n\n");
                        sys.push_str(extra);
                    }
                    Some(sys)
                };

                if let Err(e) = ctx_file::create(
                    &ctx_path,
                    &session_id,
                    &timestamp,
                    Some(&workspace.to_string_lossy()),
                    &preload,
                ) {
                    tracing::error!("Failed to create .ctx file: {}", e);
                }

                info!(
                    "Session {} created: {} ({} preload files)",
                    session_id,
                    ctx_path.display(),
                    preload.len()
                );

                Arc::new(Session::new_with_ctx(key.clone(), combined_system.as_deref(), Some(ctx_path)))
            })
            .clone()
    }

    /// Resume a session from an existing `.ctx` file, hydrating its
    /// transcript from the parsed user/assistant turns.
    pub fn resume_from_ctx(&self, resumed: &ctx_file::ResumedSession) -> Arc<Session> {
        let key = SessionKey::new(&resumed.session_id);
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| {
                let session = Session::new_with_ctx(
                    key.clone(),
                    resumed.system_prompt.as_deref(),
                    Some(resumed.ctx_path.clone()),
                );

                let mut transcript = Vec::with_capacity(resumed.messages.len());
                for (role, content) in &resumed.messages {
                    let message = match role.as_str() {
                        "assistant" => Message::assistant(content.clone()),
                        _ => Message::user(content.clone()),
                    };
                    transcript.push(message);
                }

                let session = Arc::new(session);
                let s = session.clone();
                let count = transcript.len();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.block_on(async {
                        let mut lock = s.transcript_mut().await;
                        *lock = transcript;
                    });
                }

                info!(
                    "Resumed session {} from {} ({} messages)",
                    resumed.session_id,
                    resumed.ctx_path.display(),
                    count
                );
                session
            })
            .clone()
    }

    pub fn get_or_create(&self, key: &SessionKey, system_prompt: Option<&str>) -> Arc<Session> {
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Session::new(key.clone(), system_prompt)))
            .clone()
    }

    pub fn get(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.get(key).map(|s| s.clone())
    }

    pub fn list(&self) -> Vec<SessionKey> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn remove(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.sessions.remove(key).map(|(_, s)| s)
    }
}

/// A persisted session: the transcript (`agentic_core::Message`s, the same
/// shape a `TaskExecutionContext` carries) plus the metadata an outer driver
/// needs between turns.
pub struct Session {
    pub key: SessionKey,
    system_prompt: RwLock<Option<String>>,
    transcript: RwLock<Vec<Message>>,
    model: RwLock<Option<String>>,
    ctx_path: Option<PathBuf>,
    abort_tx: mpsc::Sender<()>,
    abort_rx: RwLock<Option<mpsc::Receiver<()>>>,
}

impl Session {
    pub fn new(key: SessionKey, system_prompt: Option<&str>) -> Self {
        Self::new_with_ctx(key, system_prompt, None)
    }

    pub fn new_with_ctx(key: SessionKey, system_prompt: Option<&str>, ctx_path: Option<PathBuf>) -> Self {
        let (abort_tx, abort_rx) = mpsc::channel(1);
        Self {
            key,
            system_prompt: RwLock::new(system_prompt.map(String::from)),
            transcript: RwLock::new(Vec::new()),
            model: RwLock::new(None),
            ctx_path,
            abort_tx,
            abort_rx: RwLock::new(Some(abort_rx)),
        }
    }

    /// The `.ctx` file path, if this session is persisted to disk.
    pub fn ctx_path(&self) -> Option<&Path> {
        self.ctx_path.as_deref()
    }

    /// Read the full `.ctx` file contents from disk.
    pub fn read_ctx(&self) -> Option<String> {
        self.ctx_path.as_ref().and_then(|p| ctx_file::read(p).ok())
    }

    pub async fn system_prompt(&self) -> Option<String> {
        self.system_prompt.read().await.clone()
    }

    pub async fn set_system_prompt(&self, prompt: &str) {
        *self.system_prompt.write().await = Some(prompt.to_string());
    }

    pub async fn add_user_message(&self, content: &str) {
        self.transcript.write().await.push(Message::user(content));
        if let Some(ref path) = self.ctx_path {
            let _ = ctx_file::append_user_message(path, &ctx_file::now_timestamp(), content);
        }
    }

    pub async fn add_assistant_text(&self, content: &str) {
        self.transcript.write().await.push(Message::assistant(content));
        if let Some(ref path) = self.ctx_path {
            let _ = ctx_file::append_assistant_text(path, &ctx_file::now_timestamp(), content);
        }
    }

    pub async fn add_assistant_with_tool_calls(&self, content: &str, tool_calls: Vec<ToolCall>) {
        self.transcript
            .write()
            .await
            .push(Message::assistant_with_tool_calls(content, tool_calls.clone()));

        if let Some(ref path) = self.ctx_path {
            let ts = ctx_file::now_timestamp();
            let mut ctx_content = String::new();
            if !content.is_empty() {
                ctx_content.push_str(content);
                ctx_content.push('\n');
            }
            for call in &tool_calls {
                let summary = serde_json::from_str::<serde_json::Value>(&call.arguments)
                    .ok()
                    .and_then(|v| v.as_object().and_then(|o| o.iter().next().map(|(k, v)| format!("{k}={v}"))))
                    .unwrap_or_default();
                ctx_content.push_str(&format!("[tool:{}] {}\n", call.name, summary));
            }
            let _ = ctx_file::append_assistant_text(path, &ts, ctx_content.trim());
        }
    }

    pub async fn add_tool_result(&self, call_id: &str, tool_name: &str, content: &str, is_error: bool) {
        self.transcript
            .write()
            .await
            .push(Message::tool_result(call_id, tool_name, content));

        if let Some(ref path) = self.ctx_path {
            let _ =
                ctx_file::append_tool_result(path, &ctx_file::now_timestamp(), tool_name, content, is_error);
        }
    }

    pub async fn get_transcript(&self) -> Vec<Message> {
        self.transcript.read().await.clone()
    }

    pub async fn transcript_mut(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<Message>> {
        self.transcript.write().await
    }

    pub async fn message_count(&self) -> usize {
        self.transcript.read().await.len()
    }

    pub async fn token_count(&self) -> usize {
        crate::context::total_tokens(&self.transcript.read().await)
    }

    pub async fn model(&self) -> Option<String> {
        self.model.read().await.clone()
    }

    pub async fn set_model(&self, model: &str) {
        *self.model.write().await = Some(model.to_string());
    }

    pub async fn abort(&self) {
        let _ = self.abort_tx.send(()).await;
    }

    pub async fn take_abort_rx(&self) -> Option<mpsc::Receiver<()>> {
        self.abort_rx.write().await.take()
    }

    pub async fn clear(&self) {
        self.transcript.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appended_messages_are_visible_in_the_transcript() {
        let session = Session::new(SessionKey::new("s1"), None);
        session.add_user_message("hello").await;
        session.add_assistant_text("hi there").await;

        let transcript = session.get_transcript().await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(session.message_count().await, 2);
    }

    #[tokio::test]
    async fn registry_get_or_create_is_idempotent() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new("s1");
        let a = registry.get_or_create(&key, None);
        let b = registry.get_or_create(&key, None);
        assert!(Arc::ptr_eq(&a, &b));
    }
}

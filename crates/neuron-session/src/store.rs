use async_trait::async_trait;
use neuron_core::{Message, NeuronError, NeuronResult};
use parking_lot::Mutex;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Append-only sink for finished messages.
///
/// Callers treat `append` as fire-and-forget: a failure is logged by the
/// caller and never blocks or fails the response path.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Appends one message to its session's history.
    async fn append(&self, message: Message) -> NeuronResult<()>;
}

// ---------------------------------------------------------------------------
// FileMessageStore
// ---------------------------------------------------------------------------

/// JSON-lines store, one file per session.
pub struct FileMessageStore {
    dir: PathBuf,
}

impl FileMessageStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub async fn new(dir: PathBuf) -> NeuronResult<Self> {
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        // Session ids are opaque client strings. Hex keeps them out of path
        // syntax and maps distinct ids to distinct files.
        self.dir
            .join(format!("{}.messages.jsonl", hex::encode(session_id)))
    }

    /// Reads back every message appended for a session, in append order.
    pub async fn read(&self, session_id: &str) -> NeuronResult<Vec<Message>> {
        let path = self.session_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        data.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str::<Message>(l)
                    .map_err(|e| NeuronError::Session(format!("Failed to parse message: {e}")))
            })
            .filter(|m| !matches!(m, Ok(m) if m.session_id != session_id))
            .collect()
    }
}

#[async_trait]
impl PersistenceStore for FileMessageStore {
    async fn append(&self, message: Message) -> NeuronResult<()> {
        if message.session_id.is_empty() {
            return Err(NeuronError::Session(
                "cannot persist a message without a session".to_string(),
            ));
        }
        let path = self.session_path(&message.session_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryMessageStore
// ---------------------------------------------------------------------------

/// In-process store, used when no data directory is configured and in tests.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<Message>>,
}

impl MemoryMessageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything appended so far.
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Number of messages appended so far.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// True when nothing has been appended.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl PersistenceStore for MemoryMessageStore {
    async fn append(&self, message: Message) -> NeuronResult<()> {
        self.messages.lock().push(message);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use neuron_core::AgentType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_appends_in_order() {
        let store = MemoryMessageStore::new();
        assert!(store.is_empty());
        store.append(Message::new("s", "u", "one")).await.unwrap();
        store
            .append(Message::new("s", "u", "two").with_agent(AgentType::Writer))
            .await
            .unwrap();
        let all = store.messages();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].content, "one");
        assert_eq!(all[1].agent_type, Some(AgentType::Writer));
    }

    #[tokio::test]
    async fn test_file_store_path_is_sanitized() {
        let tmp = TempDir::new().unwrap();
        let store = FileMessageStore::new(tmp.path().to_path_buf()).await.unwrap();
        let path = store.session_path("../../etc/passwd");
        assert_eq!(path.parent().unwrap(), tmp.path());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .ends_with(".messages.jsonl"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_sessionless_message() {
        let tmp = TempDir::new().unwrap();
        let store = FileMessageStore::new(tmp.path().to_path_buf()).await.unwrap();
        let err = store.append(Message::new("", "u", "x")).await.unwrap_err();
        assert_eq!(err.code(), "session_error");
    }
}

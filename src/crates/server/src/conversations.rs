//! File-backed conversation store
//!
//! Conversations and their messages are ordinary relational CRUD in
//! spirit; here they live as one JSON file per conversation with
//! atomic-rename writes, which is all a single-user host needs. The store
//! also implements the stream manager's persistence seam: it receives the
//! finalized assistant message and derives the conversation title.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;
use willow_stream::{StreamError, StreamSink, ToolCallRecord};

/// Auto-titles take this many characters of the first user message
pub const TITLE_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Listing row without the message bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
}

/// One JSON file per conversation under a directory
pub struct ConversationStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles on conversation files.
    write_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(dir: &Path) -> std::io::Result<ConversationStore> {
        std::fs::create_dir_all(dir)?;
        Ok(ConversationStore {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn path_of(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn save(&self, conversation: &Conversation) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(conversation)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.flush()?;
        tmp.persist(self.path_of(&conversation.id))
            .map_err(|e| e.error)?;
        Ok(())
    }

    pub fn create(&self) -> std::io::Result<Conversation> {
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: None,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        };
        let _guard = self.write_lock.lock();
        self.save(&conversation)?;
        tracing::debug!(conversation = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    pub fn get(&self, id: &str) -> std::io::Result<Option<Conversation>> {
        let path = self.path_of(id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Summaries of every conversation, most recently updated first.
    pub fn list(&self) -> std::io::Result<Vec<ConversationSummary>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(entry.path())?;
            if let Ok(conversation) = serde_json::from_str::<Conversation>(&raw) {
                out.push(ConversationSummary {
                    id: conversation.id,
                    title: conversation.title,
                    created_at: conversation.created_at,
                    updated_at: conversation.updated_at,
                    message_count: conversation.messages.len(),
                });
            }
        }
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(out)
    }

    /// Append the user's message; errors when the conversation is unknown.
    pub fn append_user_message(&self, id: &str, content: &str) -> std::io::Result<Option<Conversation>> {
        let _guard = self.write_lock.lock();
        let mut conversation = match self.get(id)? {
            Some(conversation) => conversation,
            None => return Ok(None),
        };
        conversation.messages.push(Message {
            role: MessageRole::User,
            content: content.to_string(),
            tool_calls: Vec::new(),
            created_at: Utc::now(),
        });
        conversation.updated_at = Utc::now();
        self.save(&conversation)?;
        Ok(Some(conversation))
    }

    fn derive_title(conversation: &Conversation) -> Option<String> {
        conversation
            .messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(|m| {
                let title: String = m.content.chars().take(TITLE_LIMIT).collect();
                title.trim().to_string()
            })
            .filter(|t| !t.is_empty())
    }
}

#[async_trait::async_trait]
impl StreamSink for ConversationStore {
    /// Persist the finalized assistant turn and update conversation
    /// metadata. Returns the title when this turn produced one.
    async fn persist_turn(
        &self,
        conversation_id: &str,
        content: &str,
        tool_calls: &[ToolCallRecord],
    ) -> willow_stream::Result<Option<String>> {
        let _guard = self.write_lock.lock();
        let mut conversation = self
            .get(conversation_id)
            .map_err(|e| StreamError::Persist(e.to_string()))?
            .ok_or_else(|| {
                StreamError::Persist(format!("conversation '{conversation_id}' not found"))
            })?;

        conversation.messages.push(Message {
            role: MessageRole::Assistant,
            content: content.to_string(),
            tool_calls: tool_calls.to_vec(),
            created_at: Utc::now(),
        });
        conversation.updated_at = Utc::now();

        let announced = if conversation.title.is_none() {
            let derived = Self::derive_title(&conversation);
            conversation.title = derived.clone();
            derived
        } else {
            None
        };

        self.save(&conversation)
            .map_err(|e| StreamError::Persist(e.to_string()))?;
        tracing::debug!(conversation = conversation_id, "Assistant turn persisted");
        Ok(announced)
    }
}

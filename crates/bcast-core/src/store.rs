use async_trait::async_trait;

use crate::{domain::ChatId, Result};

/// The three record collections recipients are drawn from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RecordSource {
    /// User records keyed by `user_id`.
    Users,
    /// Group records kept by the assistant side, keyed by `chat_id`.
    Groups,
    /// Other chat records, keyed by `chat_id`. Overlaps with `Groups`.
    Chats,
}

impl RecordSource {
    pub const ALL: [RecordSource; 3] = [Self::Users, Self::Groups, Self::Chats];

    /// Field holding the chat id in records of this source.
    pub fn key_field(self) -> &'static str {
        match self {
            Self::Users => "user_id",
            Self::Groups | Self::Chats => "chat_id",
        }
    }
}

/// Collection names for each record source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collections {
    pub users: String,
    pub groups: String,
    pub chats: String,
}

impl Collections {
    pub fn name(&self, source: RecordSource) -> &str {
        match source {
            RecordSource::Users => &self.users,
            RecordSource::Groups => &self.groups,
            RecordSource::Chats => &self.chats,
        }
    }
}

impl Default for Collections {
    fn default() -> Self {
        Self {
            users: "tgusersdb".to_string(),
            groups: "assistants".to_string(),
            chats: "chats".to_string(),
        }
    }
}

/// Document store port.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every id found under the source's key field. Records without the field are skipped.
    async fn ids(&self, source: RecordSource) -> Result<Vec<ChatId>>;

    async fn count(&self, source: RecordSource) -> Result<u64>;

    /// Delete the chat's records from every `chat_id`-keyed collection.
    /// Returns the number of deleted records.
    async fn delete_chat(&self, chat: ChatId) -> Result<u64>;
}

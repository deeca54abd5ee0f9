use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ChatId, MessageRef, UserId};

/// Failure signals raised by the chat platform.
///
/// The delivery and removal loops classify on these variants instead of on
/// adapter-specific error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("throttled, retry after {0:?}")]
    Throttled(Duration),

    #[error("recipient blocked the bot")]
    RecipientBlocked,

    #[error("writing to this chat is forbidden")]
    WriteForbidden,

    #[error("chat not found")]
    ChatUnavailable,

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Permanent rejections accumulate on the denylist.
    pub fn is_permanent_rejection(&self) -> bool {
        matches!(self, Self::RecipientBlocked | Self::WriteForbidden)
    }

    /// The platform refused access to the chat itself, as opposed to a
    /// transient failure that says nothing about the bot's standing there.
    pub fn denies_chat_access(&self) -> bool {
        matches!(self, Self::WriteForbidden | Self::ChatUnavailable)
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Membership status of a user (or the bot itself) inside a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Administrator { can_restrict_members: bool },
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberRole {
    /// Whether a holder of this role may ban other members.
    pub fn can_remove_members(self) -> bool {
        match self {
            Self::Owner => true,
            Self::Administrator {
                can_restrict_members,
            } => can_restrict_members,
            _ => false,
        }
    }

    pub fn is_privileged(self) -> bool {
        matches!(self, Self::Owner | Self::Administrator { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMember {
    pub user_id: UserId,
    pub role: MemberRole,
}

/// The chat platform operations consumed by the delivery and removal loops.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Copy `message` verbatim (text, media, captions, buttons) into `to`.
    async fn copy_message(&self, to: ChatId, message: MessageRef) -> PlatformResult<()>;

    /// The bot's own user id.
    async fn bot_id(&self) -> PlatformResult<UserId>;

    /// The bot's own membership in `chat`.
    async fn bot_role(&self, chat: ChatId) -> PlatformResult<MemberRole>;

    async fn chat_title(&self, chat: ChatId) -> PlatformResult<Option<String>>;

    /// One page of members; an empty page ends the listing.
    async fn chat_members(
        &self,
        chat: ChatId,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<ChatMember>>;

    async fn ban_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()>;

    async fn leave_chat(&self, chat: ChatId) -> PlatformResult<()>;
}

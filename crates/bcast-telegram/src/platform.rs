use std::sync::Arc;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, UserId as TgUserId},
    ApiError, RequestError,
};
use tokio::sync::OnceCell;
use tracing::debug;

use bcast_core::{
    domain::{ChatId, MessageRef, UserId},
    platform::{ChatMember, ChatPlatform, MemberRole, PlatformError, PlatformResult},
};

use crate::{registry::MemberRegistry, tg_chat, tg_msg_id};

/// `ChatPlatform` over the Bot API. Calls are issued once; throttle handling
/// belongs to the delivery and removal loops.
pub struct TelegramPlatform {
    bot: Bot,
    registry: Arc<MemberRegistry>,
    me: OnceCell<UserId>,
}

impl TelegramPlatform {
    pub fn new(bot: Bot, registry: Arc<MemberRegistry>) -> Self {
        Self {
            bot,
            registry,
            me: OnceCell::new(),
        }
    }

    fn tg_user(user: UserId) -> TgUserId {
        TgUserId(user.0 as u64)
    }
}

pub(crate) fn map_platform_err(e: RequestError) -> PlatformError {
    match e {
        RequestError::RetryAfter(d) => PlatformError::Throttled(d),
        RequestError::Api(api) => match api {
            ApiError::BotBlocked
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation => PlatformError::RecipientBlocked,
            ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::NotEnoughRightsToPostMessages => PlatformError::WriteForbidden,
            ApiError::Unknown(s) if s.contains("Forbidden") => PlatformError::WriteForbidden,
            ApiError::ChatNotFound => PlatformError::ChatUnavailable,
            other => PlatformError::Other(other.to_string()),
        },
        other => PlatformError::Other(other.to_string()),
    }
}

fn map_role(kind: &ChatMemberKind) -> MemberRole {
    match kind {
        ChatMemberKind::Owner(_) => MemberRole::Owner,
        ChatMemberKind::Administrator(a) => MemberRole::Administrator {
            can_restrict_members: a.can_restrict_members,
        },
        ChatMemberKind::Member => MemberRole::Member,
        ChatMemberKind::Restricted(_) => MemberRole::Restricted,
        ChatMemberKind::Left => MemberRole::Left,
        ChatMemberKind::Banned(_) => MemberRole::Banned,
    }
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn copy_message(&self, to: ChatId, message: MessageRef) -> PlatformResult<()> {
        self.bot
            .copy_message(
                tg_chat(to),
                tg_chat(message.chat_id),
                tg_msg_id(message.message_id),
            )
            .await
            .map(|_| ())
            .map_err(map_platform_err)
    }

    async fn bot_id(&self) -> PlatformResult<UserId> {
        self.me
            .get_or_try_init(|| async {
                let me = self.bot.get_me().await.map_err(map_platform_err)?;
                Ok::<_, PlatformError>(UserId(me.id.0 as i64))
            })
            .await
            .copied()
    }

    async fn bot_role(&self, chat: ChatId) -> PlatformResult<MemberRole> {
        let me = self.bot_id().await?;
        let member = self
            .bot
            .get_chat_member(tg_chat(chat), Self::tg_user(me))
            .await
            .map_err(map_platform_err)?;
        Ok(map_role(&member.kind))
    }

    async fn chat_title(&self, chat: ChatId) -> PlatformResult<Option<String>> {
        let info = self
            .bot
            .get_chat(tg_chat(chat))
            .await
            .map_err(map_platform_err)?;
        Ok(info.title().map(str::to_string))
    }

    async fn chat_members(
        &self,
        chat: ChatId,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<ChatMember>> {
        let admins = self
            .bot
            .get_chat_administrators(tg_chat(chat))
            .await
            .map_err(map_platform_err)?;

        let mut all: Vec<ChatMember> = admins
            .iter()
            .map(|m| ChatMember {
                user_id: UserId(m.user.id.0 as i64),
                role: map_role(&m.kind),
            })
            .collect();
        let known: Vec<u64> = admins.iter().map(|m| m.user.id.0).collect();

        all.extend(
            self.registry
                .members(chat.0)
                .into_iter()
                .filter(|id| !known.contains(id))
                .map(|id| ChatMember {
                    user_id: UserId(id as i64),
                    role: MemberRole::Member,
                }),
        );

        debug!(chat = %chat, total = all.len(), offset, "member page");
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn ban_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()> {
        self.bot
            .ban_chat_member(tg_chat(chat), Self::tg_user(user))
            .await
            .map_err(map_platform_err)?;
        self.registry.forget(chat.0, user.0 as u64);
        Ok(())
    }

    async fn leave_chat(&self, chat: ChatId) -> PlatformResult<()> {
        self.bot
            .leave_chat(tg_chat(chat))
            .await
            .map_err(map_platform_err)?;
        self.registry.drop_chat(chat.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn retry_after_maps_to_throttle() {
        let e = map_platform_err(RequestError::RetryAfter(Duration::from_secs(7)));
        assert_eq!(e, PlatformError::Throttled(Duration::from_secs(7)));
    }

    #[test]
    fn blocked_and_deactivated_are_recipient_rejections() {
        assert_eq!(
            map_platform_err(RequestError::Api(ApiError::BotBlocked)),
            PlatformError::RecipientBlocked
        );
        assert_eq!(
            map_platform_err(RequestError::Api(ApiError::UserDeactivated)),
            PlatformError::RecipientBlocked
        );
    }

    #[test]
    fn kicked_and_unknown_forbidden_are_write_forbidden() {
        assert_eq!(
            map_platform_err(RequestError::Api(ApiError::BotKicked)),
            PlatformError::WriteForbidden
        );
        assert_eq!(
            map_platform_err(RequestError::Api(ApiError::Unknown(
                "Forbidden: CHAT_WRITE_FORBIDDEN".to_string()
            ))),
            PlatformError::WriteForbidden
        );
    }

    #[test]
    fn missing_chat_denies_access_but_is_not_a_rejection() {
        let e = map_platform_err(RequestError::Api(ApiError::ChatNotFound));
        assert_eq!(e, PlatformError::ChatUnavailable);
        assert!(e.denies_chat_access());
        assert!(!e.is_permanent_rejection());
    }

    #[test]
    fn anything_else_is_other() {
        let e = map_platform_err(RequestError::Api(ApiError::Unknown(
            "Bad Request: message to copy not found".to_string(),
        )));
        assert!(matches!(e, PlatformError::Other(_)));
        assert!(!e.is_permanent_rejection());
        assert!(!e.denies_chat_access());
    }
}

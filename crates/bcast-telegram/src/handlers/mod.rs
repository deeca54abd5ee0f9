//! Telegram update handlers.
//!
//! - private messages from admins become broadcast requests (with confirmation)
//! - commands are routed to `commands`
//! - group traffic feeds the member registry; admins may reply with `/broadcast`

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};
use tracing::debug;

use bcast_core::domain::{ChatId, MessageId, MessageRef};

use crate::router::AppState;

mod commands;
mod confirm;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    confirm::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(user) = msg.from() else {
        return Ok(());
    };

    if msg.chat.is_group() || msg.chat.is_supergroup() {
        record_members(&msg, &state);
    } else if !msg.chat.is_private() {
        return Ok(());
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg.clone(), state).await;
        }
    }

    // Groups only feed the registry; broadcasts there go through `/broadcast`.
    if !msg.chat.is_private() {
        return Ok(());
    }

    if !state.cfg.is_admin(user.id.0 as i64) {
        send(&state, chat_id, "❌ Only admins can broadcast messages!").await;
        return Ok(());
    }

    if state.confirmations.is_pending(chat_id) {
        if let Some(text) = msg.text() {
            return confirm::resolve_typed(&state, chat_id, text, message_ref(&msg)).await;
        }
    }

    confirm::request_broadcast(&state, chat_id, message_ref(&msg)).await
}

fn record_members(msg: &Message, state: &AppState) {
    let chat = msg.chat.id.0;
    if let Some(user) = msg.from().filter(|u| !u.is_bot) {
        state.registry.record(chat, user.id.0);
    }
    if let Some(joined) = msg.new_chat_members() {
        let ids: Vec<u64> = joined.iter().filter(|u| !u.is_bot).map(|u| u.id.0).collect();
        debug!(chat, joined = ids.len(), "new members");
        state.registry.record_many(chat, ids);
    }
}

pub(crate) fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

/// Best-effort HTML reply; failures are only logged.
pub(crate) async fn send(state: &AppState, chat_id: i64, html: &str) -> Option<MessageRef> {
    match state.messenger.send_html(ChatId(chat_id), html).await {
        Ok(m) => Some(m),
        Err(e) => {
            debug!(chat = chat_id, error = %e, "send failed");
            None
        }
    }
}

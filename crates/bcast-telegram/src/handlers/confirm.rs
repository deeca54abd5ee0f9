use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::{debug, info, warn};

use bcast_core::{
    broadcast::BroadcastOutcome,
    confirm::{is_affirmative, PendingAction, PendingConfirmation},
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
    purge::PurgeOutcome,
    report::{self, StatusMessage},
};

use crate::router::AppState;

use super::send;

/// `confirm:{token}:{yes|no}`
fn parse_callback_data(data: &str) -> Option<(u64, bool)> {
    let mut parts = data.split(':');
    if parts.next()? != "confirm" {
        return None;
    }
    let token = parts.next()?.parse::<u64>().ok()?;
    let confirmed = match parts.next()? {
        "yes" => true,
        "no" => false,
        _ => return None,
    };
    if parts.next().is_some() {
        return None;
    }
    Some((token, confirmed))
}

pub(super) async fn request_broadcast(
    state: &Arc<AppState>,
    chat_id: i64,
    message: MessageRef,
) -> ResponseResult<()> {
    if state.broadcaster.is_running() {
        send(state, chat_id, &report::broadcast_busy()).await;
        return Ok(());
    }
    let total = state.broadcaster.directory().all_recipients().await.len();
    if total == 0 {
        send(state, chat_id, &report::no_recipients()).await;
        return Ok(());
    }
    let prompt = report::confirm_broadcast_prompt(total, state.cfg.confirm_timeout);
    open_prompt(state, chat_id, PendingAction::Broadcast { message }, &prompt).await;
    Ok(())
}

pub(super) async fn request_purge(state: &Arc<AppState>, chat_id: i64) -> ResponseResult<()> {
    if state.purge.is_running() {
        send(state, chat_id, &report::purge_busy()).await;
        return Ok(());
    }
    let groups = state.broadcaster.directory().groups().await.len();
    if groups == 0 {
        send(state, chat_id, &report::no_groups()).await;
        return Ok(());
    }
    let prompt = report::confirm_purge_prompt(groups, state.cfg.confirm_timeout);
    open_prompt(state, chat_id, PendingAction::Purge, &prompt).await;
    Ok(())
}

async fn open_prompt(state: &Arc<AppState>, chat_id: i64, action: PendingAction, html: &str) {
    let token = state.confirmations.next_token();
    let keyboard = InlineKeyboard::confirm_cancel(&token.to_string());
    let prompt = match state
        .messenger
        .send_inline_keyboard(ChatId(chat_id), html, keyboard)
        .await
    {
        Ok(m) => m,
        Err(e) => {
            warn!(chat = chat_id, error = %e, "failed to send confirmation prompt");
            return;
        }
    };

    state
        .confirmations
        .open(chat_id, PendingConfirmation::new(token, action, prompt));

    let messenger = state.messenger.clone();
    state.confirmations.arm_timeout(
        chat_id,
        token,
        state.cfg.confirm_timeout,
        move |expired| async move {
            if let Err(e) = messenger
                .edit_html(expired.prompt, &report::confirmation_expired())
                .await
            {
                debug!(error = %e, "failed to mark prompt expired");
            }
        },
    );
}

/// A typed reply while a confirmation is pending.
pub(super) async fn resolve_typed(
    state: &Arc<AppState>,
    chat_id: i64,
    text: &str,
    reply: MessageRef,
) -> ResponseResult<()> {
    let Some(pending) = state.confirmations.take(chat_id) else {
        return Ok(());
    };
    resolve(state, chat_id, pending, is_affirmative(text), Some(reply)).await;
    Ok(())
}

/// Returns false when nothing was pending.
pub(super) async fn cancel_pending(state: &Arc<AppState>, chat_id: i64) -> bool {
    match state.confirmations.take(chat_id) {
        Some(pending) => {
            resolve(state, chat_id, pending, false, None).await;
            true
        }
        None => false,
    }
}

async fn resolve(
    state: &Arc<AppState>,
    chat_id: i64,
    pending: PendingConfirmation,
    confirmed: bool,
    reply: Option<MessageRef>,
) {
    if !confirmed {
        let _ = state
            .messenger
            .edit_html(pending.prompt, &report::confirmation_cancelled())
            .await;
        return;
    }

    let _ = state.messenger.delete_message(pending.prompt).await;
    if let Some(reply) = reply {
        let _ = state.messenger.delete_message(reply).await;
    }

    match pending.action {
        PendingAction::Broadcast { message } => {
            start_broadcast(state.clone(), chat_id, message).await
        }
        PendingAction::Purge => start_purge(state.clone(), chat_id).await,
    }
}

/// Create the status message and run the broadcast in the background.
pub(super) async fn start_broadcast(state: Arc<AppState>, chat_id: i64, message: MessageRef) {
    if state.broadcaster.is_running() {
        send(&state, chat_id, &report::broadcast_busy()).await;
        return;
    }
    let Some(status) = send(&state, chat_id, "⏳ Starting broadcast...").await else {
        return;
    };

    info!(chat = chat_id, source = %message.chat_id, "broadcast confirmed");
    tokio::spawn(async move {
        let status = StatusMessage::new(state.messenger.clone(), status);
        let html = match state.broadcaster.run(message, &status).await {
            BroadcastOutcome::Busy => report::broadcast_busy(),
            BroadcastOutcome::NoRecipients => report::no_recipients(),
            BroadcastOutcome::Completed(r) => report::broadcast_report(&r),
        };
        status.set(&html).await;
    });
}

pub(super) async fn start_purge(state: Arc<AppState>, chat_id: i64) {
    if state.purge.is_running() {
        send(&state, chat_id, &report::purge_busy()).await;
        return;
    }
    let Some(status) = send(&state, chat_id, "⏳ Starting member purge...").await else {
        return;
    };

    info!(chat = chat_id, "member purge confirmed");
    tokio::spawn(async move {
        let status = StatusMessage::new(state.messenger.clone(), status);
        let html = match state.purge.run(&status).await {
            PurgeOutcome::Busy => report::purge_busy(),
            PurgeOutcome::NoGroups => report::no_groups(),
            PurgeOutcome::Completed(r) => report::purge_report(&r),
        };
        status.set(&html).await;
    });
}

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let chat_id = q.message.as_ref().map(|m| m.chat.id.0);
    let data = q.data.clone().unwrap_or_default();

    let answer = |text: &'static str| {
        let state = state.clone();
        let cb_id = cb_id.clone();
        async move {
            let _ = state.messenger.answer_callback_query(&cb_id, Some(text)).await;
        }
    };

    let Some(chat_id) = chat_id else {
        answer("Request expired").await;
        return Ok(());
    };

    if !state.cfg.is_admin(q.from.id.0 as i64) {
        answer("Only admins can do this").await;
        return Ok(());
    }

    let Some((token, confirmed)) = parse_callback_data(&data) else {
        answer("Invalid callback data").await;
        return Ok(());
    };

    let Some(pending) = state.confirmations.take_token(chat_id, token) else {
        answer("Request expired").await;
        return Ok(());
    };

    answer(if confirmed { "Confirmed" } else { "Cancelled" }).await;
    resolve(&state, chat_id, pending, confirmed, None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_confirm_and_cancel() {
        assert_eq!(parse_callback_data("confirm:12:yes"), Some((12, true)));
        assert_eq!(parse_callback_data("confirm:3:no"), Some((3, false)));
    }

    #[test]
    fn rejects_malformed_data() {
        for bad in [
            "",
            "confirm",
            "confirm:x:yes",
            "confirm:1:maybe",
            "confirm:1:yes:extra",
            "askuser:1:0",
        ] {
            assert_eq!(parse_callback_data(bad), None, "{bad}");
        }
    }

    #[test]
    fn callback_data_matches_keyboard_layout() {
        let kb = InlineKeyboard::confirm_cancel("41");
        let parsed: Vec<_> = kb
            .buttons
            .iter()
            .map(|b| parse_callback_data(&b.callback_data))
            .collect();
        assert_eq!(parsed, vec![Some((41, true)), Some((41, false))]);
    }
}

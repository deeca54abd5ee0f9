use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};

use bcast_core::report::{self, escape_html};

use crate::router::AppState;

use super::{confirm, message_ref, send};

/// Splits `/cmd@botname arg1 ...` into `(cmd, args)`. Returns `None` when the
/// command is addressed to a different bot.
pub(super) fn parse_command(text: &str, bot_username: &str) -> Option<(String, String)> {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim().trim_start_matches('/');
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = match first.split_once('@') {
        Some((cmd, target)) => {
            if !bot_username.is_empty() && !target.eq_ignore_ascii_case(bot_username) {
                return None;
            }
            cmd
        }
        None => first,
    };

    Some((cmd.to_lowercase(), rest))
}

const KNOWN: &[&str] = &[
    "start",
    "help",
    "stats",
    "broadcast_stats",
    "clear_failed",
    "purge",
    "cancel",
    "broadcast",
];

fn welcome(is_admin: bool) -> &'static str {
    if !is_admin {
        return "👋 Hello! I'm a broadcast bot. Only admins can use me.";
    }
    "👋 <b>Welcome Admin!</b>\n\n\
<b>🎯 Broadcast:</b>\n\
• Send or forward any message here to broadcast it\n\
• Text, media, captions, formatting and buttons are copied as-is\n\
• In a group, reply to a message with /broadcast\n\n\
<b>📋 Commands:</b>\n\
/stats - Database statistics\n\
/broadcast_stats - Broadcast statistics\n\
/clear_failed - Forget failed chats\n\
/purge - Remove members from all groups and leave them\n\
/cancel - Cancel a pending confirmation\n\n\
<b>⚡ Features:</b>\n\
✅ All message types\n\
✅ Automatic rate limiting\n\
✅ Failed chats tracking\n\
✅ Real-time progress updates"
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = user.id.0 as i64;
    let chat_id = msg.chat.id.0;
    let is_admin = state.cfg.is_admin(user_id);
    let Some((cmd, _arg)) = parse_command(text, &state.bot_username) else {
        return Ok(());
    };

    if !KNOWN.contains(&cmd.as_str()) {
        if msg.chat.is_private() && is_admin {
            send(&state, chat_id, "❓ Unknown command. Try /help.").await;
        }
        return Ok(());
    }

    if cmd == "start" || cmd == "help" {
        send(&state, chat_id, welcome(is_admin)).await;
        return Ok(());
    }

    if !is_admin {
        send(&state, chat_id, "❌ Only admins can use this command!").await;
        return Ok(());
    }

    info!(cmd = %cmd, user_id, chat_id, "admin command");

    match cmd.as_str() {
        "stats" => {
            let Some(status) = send(&state, chat_id, "⏳ Fetching statistics...").await else {
                return Ok(());
            };
            let dir = state.broadcaster.directory().stats().await;
            let counters = state.broadcaster.counters().await;
            let denylisted = state.broadcaster.denylist_len().await;
            let body = report::directory_stats(&dir, &counters, denylisted);
            if let Err(e) = state.messenger.edit_html(status, &body).await {
                warn!(error = %e, "failed to edit stats message");
            }
        }

        "broadcast_stats" => {
            let counters = state.broadcaster.counters().await;
            let denylisted = state.broadcaster.denylist_len().await;
            let purge = state.purge.stats().await;
            let body = report::broadcast_stats(
                &counters,
                state.broadcaster.is_running(),
                denylisted,
                &purge,
            );
            send(&state, chat_id, &body).await;
        }

        "clear_failed" => {
            let body = match state.broadcaster.clear_denylist().await {
                Ok(n) => format!("✅ {n} failed chats cleared!"),
                Err(e) => format!(
                    "⚠️ Failed chats cleared in memory but not saved: <code>{}</code>",
                    escape_html(&e.to_string())
                ),
            };
            send(&state, chat_id, &body).await;
        }

        "purge" => {
            confirm::request_purge(&state, chat_id).await?;
        }

        "cancel" => {
            if !confirm::cancel_pending(&state, chat_id).await {
                send(&state, chat_id, "Nothing to cancel.").await;
            }
        }

        "broadcast" => {
            if msg.chat.is_private() {
                send(
                    &state,
                    chat_id,
                    "Send or forward the message you want to broadcast.",
                )
                .await;
                return Ok(());
            }
            match msg.reply_to_message() {
                Some(target) => {
                    confirm::start_broadcast(state.clone(), chat_id, message_ref(target)).await
                }
                None => {
                    send(
                        &state,
                        chat_id,
                        "⚠️ Reply to a message with /broadcast to send it.",
                    )
                    .await;
                }
            }
        }

        _ => {}
    }

    Ok(())
}

//! HTML rendering for admin-facing status text.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::debug;

use crate::{
    broadcast::{BroadcastObserver, BroadcastProgress, BroadcastReport},
    delivery::DeliveryCounters,
    directory::DirectoryStats,
    domain::MessageRef,
    messaging::port::MessagingPort,
    purge::{PurgeObserver, PurgeProgress, PurgeReport, PurgeStats},
};

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// `1.5s`, `2m 05s`, `1h 02m`.
pub fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{:.1}s", d.as_secs_f64());
    }
    if secs < 3600 {
        return format!("{}m {:02}s", secs / 60, secs % 60);
    }
    format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
}

pub fn confirm_broadcast_prompt(total: usize, timeout: Duration) -> String {
    format!(
        "🔄 <b>Ready to Broadcast!</b>\n\n\
         📊 Recipients: {total}\n\n\
         Type <code>yes</code> to confirm or press a button below.\n\
         ⏳ Expires in {}s.",
        timeout.as_secs()
    )
}

pub fn confirm_purge_prompt(groups: usize, timeout: Duration) -> String {
    format!(
        "⚠️ <b>Remove members from all groups?</b>\n\n\
         👥 Groups: {groups}\n\
         Every non-admin member will be removed and the bot will leave each group.\n\n\
         Type <code>yes</code> to confirm or press a button below.\n\
         ⏳ Expires in {}s.",
        timeout.as_secs()
    )
}

pub fn confirmation_expired() -> String {
    "⏱️ Timeout! Request cancelled.".to_string()
}

pub fn confirmation_cancelled() -> String {
    "❌ Cancelled.".to_string()
}

pub fn broadcast_busy() -> String {
    "⚠️ A broadcast is already running. Please wait for it to finish.".to_string()
}

pub fn purge_busy() -> String {
    "⚠️ A member purge is already running.".to_string()
}

pub fn no_recipients() -> String {
    "❌ No chats found in the database.".to_string()
}

pub fn no_groups() -> String {
    "❌ No groups found in the database.".to_string()
}

pub fn broadcast_started(total: usize) -> String {
    format!("🚀 <b>Broadcast started!</b>\n\n📊 Total Chats: {total}\n⏳ Please wait...")
}

pub fn broadcast_progress(p: &BroadcastProgress) -> String {
    format!(
        "📤 <b>Broadcasting...</b>\n\n\
         Progress: {}/{} ({:.1}%)\n\
         ✅ Success: {}\n\
         ❌ Failed: {}\n\
         ⏭️ Skipped: {}",
        p.processed,
        p.total,
        p.percent(),
        p.delivered,
        p.failed,
        p.skipped
    )
}

fn format_started(at: &DateTime<Local>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn broadcast_report(r: &BroadcastReport) -> String {
    let mut out = format!(
        "✅ <b>Broadcast Complete!</b>\n\n\
         📊 <b>Statistics:</b>\n\
         • Total Chats: {}\n\
         • ✅ Delivered: {}\n\
         • ❌ Failed: {}\n\
         • 🚫 Blocked: {}\n\
         • ⏭️ Skipped: {}\n\
         • ⏳ Flood Waits: {}\n\
         • 🕐 Started: {}\n\
         • ⏱️ Time Taken: {}\n\n\
         Success Rate: {:.1}%",
        r.total,
        r.delivered,
        r.failed,
        r.blocked,
        r.skipped,
        r.throttle_events,
        format_started(&r.started_at),
        format_elapsed(r.elapsed),
        r.success_rate()
    );
    if !r.denylist_saved {
        out.push_str("\n\n⚠️ Failed chats could not be saved.");
    }
    out
}

pub fn purge_started(groups: usize) -> String {
    format!("🧹 <b>Member purge started</b>\n\n👥 Groups: {groups}\n⏳ Please wait...")
}

pub fn purge_progress(p: &PurgeProgress) -> String {
    format!(
        "🧹 <b>Purging:</b> {}\n\n\
         👤 Members seen: {}\n\
         🚫 Removed: {}\n\
         📊 Groups: {}/{}",
        escape_html(&p.group_title),
        p.members_seen,
        p.members_removed,
        p.groups_done,
        p.groups_total
    )
}

pub fn purge_report(r: &PurgeReport) -> String {
    format!(
        "✅ <b>Member Purge Complete!</b>\n\n\
         • Groups: {}\n\
         • 🧹 Purged: {}\n\
         • 🚫 Members removed: {}\n\
         • 🚪 Groups left: {}\n\
         • 🔒 No rights: {}\n\
         • ⚠️ Skipped (lookup failed): {}\n\
         • 🗑️ Records deleted: {}\n\
         • 🕐 Started: {}\n\
         • ⏱️ Time Taken: {}\n\n\
         Success Rate: {:.1}%",
        r.groups_total,
        r.groups_banned,
        r.members_removed,
        r.groups_left,
        r.groups_no_rights,
        r.groups_skipped,
        r.groups_purged,
        format_started(&r.started_at),
        format_elapsed(r.elapsed),
        r.success_rate()
    )
}

pub fn directory_stats(
    dir: &DirectoryStats,
    counters: &DeliveryCounters,
    denylisted: usize,
) -> String {
    format!(
        "📊 <b>Database Statistics</b>\n\n\
         👤 <b>Users:</b> {}\n\
         👥 <b>Groups:</b> {}\n\
         💬 <b>Other Chats:</b> {}\n\
         🔢 <b>Total Unique:</b> {}\n\n\
         📈 <b>Broadcast Stats:</b>\n\
         ✅ Total Sent: {}\n\
         ❌ Total Failed: {}\n\
         🚫 Blocked Users: {}\n\
         ⏳ Flood Waits: {}\n\n\
         🗑️ Failed Chats in DB: {}",
        dir.users,
        dir.groups,
        dir.chats,
        dir.total_unique,
        counters.sent,
        counters.failed,
        counters.blocked,
        counters.throttled,
        denylisted
    )
}

pub fn broadcast_stats(
    counters: &DeliveryCounters,
    running: bool,
    denylisted: usize,
    purge: &PurgeStats,
) -> String {
    format!(
        "📈 <b>Broadcast Statistics</b>\n\n\
         ✅ Total Sent: {}\n\
         ❌ Total Failed: {}\n\
         🚫 Blocked Users: {}\n\
         ⏳ Flood Waits: {}\n\
         📤 Last Run Delivered: {}\n\n\
         🔄 Broadcasting: {}\n\
         🗑️ Failed Chats: {}\n\n\
         🧹 <b>Member Purge:</b>\n\
         Groups processed: {}\n\
         Members removed: {}\n\
         Groups left: {}\n\
         No rights: {}",
        counters.sent,
        counters.failed,
        counters.blocked,
        counters.throttled,
        counters.current_run,
        if running { "Yes ⚡" } else { "No 💤" },
        denylisted,
        purge.groups_processed,
        purge.members_removed,
        purge.groups_left,
        purge.groups_no_rights
    )
}

/// Editable status message driven by the broadcast and purge loops.
pub struct StatusMessage {
    messenger: Arc<dyn MessagingPort>,
    msg: MessageRef,
}

impl StatusMessage {
    pub fn new(messenger: Arc<dyn MessagingPort>, msg: MessageRef) -> Self {
        Self { messenger, msg }
    }

    pub async fn set(&self, html: &str) {
        if let Err(e) = self.messenger.edit_html(self.msg, html).await {
            debug!(error = %e, "status edit failed");
        }
    }
}

#[async_trait]
impl BroadcastObserver for StatusMessage {
    async fn started(&self, total: usize) {
        self.set(&broadcast_started(total)).await;
    }

    async fn progress(&self, progress: &BroadcastProgress) {
        self.set(&broadcast_progress(progress)).await;
    }
}

#[async_trait]
impl PurgeObserver for StatusMessage {
    async fn started(&self, groups: usize) {
        self.set(&purge_started(groups)).await;
    }

    async fn progress(&self, progress: &PurgeProgress) {
        self.set(&purge_progress(progress)).await;
    }
}

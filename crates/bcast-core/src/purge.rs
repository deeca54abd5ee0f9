//! Bulk member removal across every group the bot is recorded in.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    broadcast::{percent_one_decimal, RunGuard},
    directory::RecipientDirectory,
    domain::{ChatId, UserId},
    platform::{ChatMember, ChatPlatform, MemberRole, PlatformError, PlatformResult},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PurgeSettings {
    /// Removals issued concurrently per batch.
    pub batch_size: usize,
    /// Members requested per listing page.
    pub page_size: usize,
    /// Throttle retries for a single removal before giving up on that member.
    pub max_throttle_retries: u32,
    /// Pause between finishing a group's removals and leaving it.
    pub leave_delay: Duration,
}

impl Default for PurgeSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            page_size: 200,
            max_throttle_retries: 5,
            leave_delay: Duration::from_secs(2),
        }
    }
}

/// Cumulative removal statistics across runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub groups_processed: u64,
    pub members_removed: u64,
    pub groups_left: u64,
    pub groups_no_rights: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PurgeProgress {
    pub group_title: String,
    pub members_seen: usize,
    pub members_removed: usize,
    pub groups_done: usize,
    pub groups_total: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PurgeReport {
    pub started_at: DateTime<Local>,
    pub groups_total: usize,
    pub groups_processed: usize,
    /// Groups where the bot held removal rights and ran the member pass.
    pub groups_banned: usize,
    pub members_removed: u64,
    pub groups_left: usize,
    pub groups_no_rights: usize,
    /// Groups whose membership lookup failed transiently; left untouched.
    pub groups_skipped: usize,
    pub groups_purged: usize,
    pub elapsed: Duration,
}

impl PurgeReport {
    /// `groups_banned / groups_total * 100`, rounded to one decimal.
    pub fn success_rate(&self) -> f64 {
        percent_one_decimal(self.groups_banned as u64, self.groups_total as u64)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PurgeOutcome {
    Busy,
    NoGroups,
    Completed(PurgeReport),
}

#[async_trait]
pub trait PurgeObserver: Send + Sync {
    async fn started(&self, _groups: usize) {}
    async fn progress(&self, _progress: &PurgeProgress) {}
}

pub struct MemberPurge {
    directory: RecipientDirectory,
    platform: Arc<dyn ChatPlatform>,
    settings: PurgeSettings,
    stats: Mutex<PurgeStats>,
    running: AtomicBool,
}

impl MemberPurge {
    pub fn new(
        directory: RecipientDirectory,
        platform: Arc<dyn ChatPlatform>,
        settings: PurgeSettings,
    ) -> Self {
        Self {
            directory,
            platform,
            settings,
            stats: Mutex::new(PurgeStats::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn stats(&self) -> PurgeStats {
        *self.stats.lock().await
    }

    pub async fn run(&self, observer: &dyn PurgeObserver) -> PurgeOutcome {
        let Some(_guard) = RunGuard::try_begin(&self.running) else {
            return PurgeOutcome::Busy;
        };

        let groups = self.directory.groups().await;
        if groups.is_empty() {
            info!("member purge requested but no groups found");
            return PurgeOutcome::NoGroups;
        }

        let groups_total = groups.len();
        info!(groups = groups_total, "member purge started");
        observer.started(groups_total).await;

        let bot_id = match self.platform.bot_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "could not resolve bot id; relying on member roles only");
                None
            }
        };

        let clock = Instant::now();
        let mut report = PurgeReport {
            started_at: Local::now(),
            groups_total,
            groups_processed: 0,
            groups_banned: 0,
            members_removed: 0,
            groups_left: 0,
            groups_no_rights: 0,
            groups_skipped: 0,
            groups_purged: 0,
            elapsed: Duration::ZERO,
        };

        // `groups()` is a set: each group is visited at most once per run.
        for group in groups {
            report.groups_processed += 1;

            let role = self
                .with_throttle_retry(|| self.platform.bot_role(group))
                .await;
            let permitted = match &role {
                Ok(r) => r.can_remove_members(),
                Err(e) if e.denies_chat_access() => false,
                Err(e) => {
                    warn!(chat = %group, error = %e, "membership lookup failed; skipping group");
                    report.groups_skipped += 1;
                    continue;
                }
            };
            if !permitted {
                debug!(chat = %group, ?role, "no removal rights; evicting");
                report.groups_no_rights += 1;
                if self.leave(group).await {
                    report.groups_left += 1;
                }
                match self.directory.store().delete_chat(group).await {
                    Ok(n) if n > 0 => report.groups_purged += 1,
                    Ok(_) => {}
                    Err(e) => warn!(chat = %group, error = %e, "failed to delete group records"),
                }
                continue;
            }

            let title = match self.platform.chat_title(group).await {
                Ok(Some(t)) => t,
                _ => group.to_string(),
            };

            let removed = self
                .purge_group(group, &title, bot_id, observer, &report)
                .await;
            report.members_removed += removed;
            report.groups_banned += 1;

            sleep(self.settings.leave_delay).await;
            if self.leave(group).await {
                report.groups_left += 1;
            }
        }

        report.elapsed = clock.elapsed();
        {
            let mut st = self.stats.lock().await;
            st.groups_processed += report.groups_processed as u64;
            st.members_removed += report.members_removed;
            st.groups_left += report.groups_left as u64;
            st.groups_no_rights += report.groups_no_rights as u64;
        }

        info!(
            groups = report.groups_total,
            banned = report.groups_banned,
            removed = report.members_removed,
            left = report.groups_left,
            no_rights = report.groups_no_rights,
            skipped = report.groups_skipped,
            purged = report.groups_purged,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "member purge complete"
        );

        PurgeOutcome::Completed(report)
    }

    async fn purge_group(
        &self,
        group: ChatId,
        title: &str,
        bot_id: Option<UserId>,
        observer: &dyn PurgeObserver,
        report: &PurgeReport,
    ) -> u64 {
        let members = self.list_members(group).await;
        let members_seen = members.len();
        let targets: Vec<UserId> = members
            .into_iter()
            .filter(|m| is_removable(m, bot_id))
            .map(|m| m.user_id)
            .collect();

        let mut removed = 0usize;
        for batch in targets.chunks(self.settings.batch_size) {
            let results = join_all(batch.iter().map(|&user| self.remove(group, user))).await;
            removed += results.into_iter().filter(|ok| *ok).count();

            observer
                .progress(&PurgeProgress {
                    group_title: title.to_string(),
                    members_seen,
                    members_removed: removed,
                    groups_done: report.groups_banned
                        + report.groups_no_rights
                        + report.groups_skipped,
                    groups_total: report.groups_total,
                })
                .await;
        }

        info!(chat = %group, title, members_seen, removed, "group purged");
        removed as u64
    }

    /// Collect every member page before any removal so bans cannot shift offsets.
    async fn list_members(&self, group: ChatId) -> Vec<ChatMember> {
        let limit = self.settings.page_size;
        let mut out = Vec::new();
        loop {
            let page = self
                .with_throttle_retry(|| self.platform.chat_members(group, out.len(), limit))
                .await;
            match page {
                Ok(page) => {
                    let n = page.len();
                    out.extend(page);
                    if n < limit {
                        break;
                    }
                }
                Err(e) => {
                    warn!(chat = %group, error = %e, "member listing stopped early");
                    break;
                }
            }
        }
        out
    }

    async fn remove(&self, group: ChatId, user: UserId) -> bool {
        match self
            .with_throttle_retry(|| self.platform.ban_member(group, user))
            .await
        {
            Ok(()) => true,
            Err(e) => {
                debug!(chat = %group, user = user.0, error = %e, "removal failed");
                false
            }
        }
    }

    /// Sleep out throttles and retry the same call, up to `max_throttle_retries` times.
    async fn with_throttle_retry<T, F, Fut>(&self, mut op: F) -> PlatformResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = PlatformResult<T>>,
    {
        let mut attempts = 0u32;
        loop {
            match op().await {
                Err(PlatformError::Throttled(wait)) if attempts < self.settings.max_throttle_retries => {
                    attempts += 1;
                    sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn leave(&self, group: ChatId) -> bool {
        match self.platform.leave_chat(group).await {
            Ok(()) => true,
            Err(e) => {
                debug!(chat = %group, error = %e, "failed to leave group");
                false
            }
        }
    }
}

fn is_removable(member: &ChatMember, bot_id: Option<UserId>) -> bool {
    if Some(member.user_id) == bot_id || member.role.is_privileged() {
        return false;
    }
    !matches!(member.role, MemberRole::Left | MemberRole::Banned)
}

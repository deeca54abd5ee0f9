//! In-memory fakes for the store and platform ports.

use std::{
    collections::{HashMap, HashSet},
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    broadcast::{BroadcastObserver, BroadcastProgress},
    domain::{ChatId, MessageRef, UserId},
    errors::Error,
    platform::{ChatMember, ChatPlatform, MemberRole, PlatformError, PlatformResult},
    purge::{PurgeObserver, PurgeProgress},
    store::{DocumentStore, RecordSource},
    Result,
};

pub(crate) fn tmp_path(prefix: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_nanos();
    let pid = std::process::id();
    PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
}

#[derive(Default)]
pub(crate) struct FakeStore {
    records: HashMap<RecordSource, Vec<i64>>,
    failing: HashSet<RecordSource>,
    deleted: Mutex<Vec<ChatId>>,
}

impl FakeStore {
    pub(crate) fn with(mut self, source: RecordSource, ids: &[i64]) -> Self {
        self.records.entry(source).or_default().extend_from_slice(ids);
        self
    }

    pub(crate) fn failing(mut self, source: RecordSource) -> Self {
        self.failing.insert(source);
        self
    }

    pub(crate) fn deleted(&self) -> Vec<ChatId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn ids(&self, source: RecordSource) -> Result<Vec<ChatId>> {
        if self.failing.contains(&source) {
            return Err(Error::Store(format!("{source:?} unavailable")));
        }
        Ok(self
            .records
            .get(&source)
            .map(|ids| ids.iter().copied().map(ChatId).collect())
            .unwrap_or_default())
    }

    async fn count(&self, source: RecordSource) -> Result<u64> {
        if self.failing.contains(&source) {
            return Err(Error::Store(format!("{source:?} unavailable")));
        }
        Ok(self.records.get(&source).map(|v| v.len() as u64).unwrap_or(0))
    }

    async fn delete_chat(&self, chat: ChatId) -> Result<u64> {
        let n = [RecordSource::Groups, RecordSource::Chats]
            .iter()
            .filter_map(|s| self.records.get(s))
            .map(|ids| ids.iter().filter(|id| **id == chat.0).count() as u64)
            .sum();
        self.deleted.lock().unwrap().push(chat);
        Ok(n)
    }
}

pub(crate) const BOT_ID: UserId = UserId(999);

#[derive(Default)]
pub(crate) struct FakePlatform {
    copy_failures: HashMap<ChatId, PlatformError>,
    copies: Mutex<Vec<(ChatId, MessageRef)>>,
    gate: Option<(Notify, Notify)>,

    roles: HashMap<ChatId, MemberRole>,
    role_failures: HashMap<ChatId, PlatformError>,
    role_throttles: Mutex<HashMap<ChatId, u32>>,
    role_lookups: AtomicUsize,
    titles: HashMap<ChatId, String>,
    members: HashMap<ChatId, Vec<ChatMember>>,
    ban_throttles: Mutex<HashMap<UserId, u32>>,
    ban_failures: HashSet<UserId>,
    bans: Mutex<Vec<(ChatId, UserId)>>,
    ban_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    left: Mutex<Vec<ChatId>>,
}

impl FakePlatform {
    pub(crate) fn copy_fails(mut self, chat: ChatId, err: PlatformError) -> Self {
        self.copy_failures.insert(chat, err);
        self
    }

    /// Every copy blocks until `release()` is called.
    pub(crate) fn gated(mut self) -> Self {
        self.gate = Some((Notify::new(), Notify::new()));
        self
    }

    pub(crate) async fn wait_entered(&self) {
        if let Some((entered, _)) = &self.gate {
            entered.notified().await;
        }
    }

    pub(crate) fn release(&self) {
        if let Some((_, release)) = &self.gate {
            release.notify_one();
        }
    }

    pub(crate) fn group(mut self, chat: ChatId, title: &str, role: MemberRole) -> Self {
        self.roles.insert(chat, role);
        self.titles.insert(chat, title.to_string());
        self
    }

    /// The bot's role lookup in `chat` fails with `err`.
    pub(crate) fn role_fails(mut self, chat: ChatId, err: PlatformError) -> Self {
        self.role_failures.insert(chat, err);
        self
    }

    pub(crate) fn role_throttled(self, chat: ChatId, times: u32) -> Self {
        self.role_throttles.lock().unwrap().insert(chat, times);
        self
    }

    pub(crate) fn role_lookups(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    pub(crate) fn members(mut self, chat: ChatId, members: Vec<ChatMember>) -> Self {
        self.members.insert(chat, members);
        self
    }

    pub(crate) fn ban_throttled(self, user: UserId, times: u32) -> Self {
        self.ban_throttles.lock().unwrap().insert(user, times);
        self
    }

    pub(crate) fn ban_fails(mut self, user: UserId) -> Self {
        self.ban_failures.insert(user);
        self
    }

    /// Every attempted copy, including failed ones.
    pub(crate) fn copied(&self) -> Vec<(ChatId, MessageRef)> {
        self.copies.lock().unwrap().clone()
    }

    pub(crate) fn bans(&self) -> Vec<(ChatId, UserId)> {
        self.bans.lock().unwrap().clone()
    }

    pub(crate) fn ban_attempts(&self) -> usize {
        self.ban_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn left(&self) -> Vec<ChatId> {
        self.left.lock().unwrap().clone()
    }
}

pub(crate) fn member(id: i64, role: MemberRole) -> ChatMember {
    ChatMember {
        user_id: UserId(id),
        role,
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn copy_message(&self, to: ChatId, message: MessageRef) -> PlatformResult<()> {
        self.copies.lock().unwrap().push((to, message));
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        match self.copy_failures.get(&to) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn bot_id(&self) -> PlatformResult<UserId> {
        Ok(BOT_ID)
    }

    async fn bot_role(&self, chat: ChatId) -> PlatformResult<MemberRole> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        {
            let mut throttles = self.role_throttles.lock().unwrap();
            if let Some(left) = throttles.get_mut(&chat) {
                if *left > 0 {
                    *left -= 1;
                    return Err(PlatformError::Throttled(Duration::from_secs(3)));
                }
            }
        }
        if let Some(e) = self.role_failures.get(&chat) {
            return Err(e.clone());
        }
        self.roles
            .get(&chat)
            .copied()
            .ok_or(PlatformError::ChatUnavailable)
    }

    async fn chat_title(&self, chat: ChatId) -> PlatformResult<Option<String>> {
        Ok(self.titles.get(&chat).cloned())
    }

    async fn chat_members(
        &self,
        chat: ChatId,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<ChatMember>> {
        Ok(self
            .members
            .get(&chat)
            .map(|m| m.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn ban_member(&self, chat: ChatId, user: UserId) -> PlatformResult<()> {
        self.ban_attempts.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        {
            let mut throttles = self.ban_throttles.lock().unwrap();
            if let Some(left) = throttles.get_mut(&user) {
                if *left > 0 {
                    *left -= 1;
                    return Err(PlatformError::Throttled(Duration::from_secs(5)));
                }
            }
        }
        if self.ban_failures.contains(&user) {
            return Err(PlatformError::Other("USER_ADMIN_INVALID".to_string()));
        }
        self.bans.lock().unwrap().push((chat, user));
        Ok(())
    }

    async fn leave_chat(&self, chat: ChatId) -> PlatformResult<()> {
        self.left.lock().unwrap().push(chat);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    started: Mutex<Vec<usize>>,
    progress: Mutex<Vec<BroadcastProgress>>,
    purge_progress: Mutex<Vec<PurgeProgress>>,
}

impl RecordingObserver {
    pub(crate) fn started_calls(&self) -> Vec<usize> {
        self.started.lock().unwrap().clone()
    }

    pub(crate) fn progress_calls(&self) -> Vec<BroadcastProgress> {
        self.progress.lock().unwrap().clone()
    }

    pub(crate) fn purge_progress_calls(&self) -> Vec<PurgeProgress> {
        self.purge_progress.lock().unwrap().clone()
    }
}

#[async_trait]
impl BroadcastObserver for RecordingObserver {
    async fn started(&self, total: usize) {
        self.started.lock().unwrap().push(total);
    }

    async fn progress(&self, progress: &BroadcastProgress) {
        self.progress.lock().unwrap().push(*progress);
    }
}

#[async_trait]
impl PurgeObserver for RecordingObserver {
    async fn started(&self, groups: usize) {
        self.started.lock().unwrap().push(groups);
    }

    async fn progress(&self, progress: &PurgeProgress) {
        self.purge_progress.lock().unwrap().push(progress.clone());
    }
}

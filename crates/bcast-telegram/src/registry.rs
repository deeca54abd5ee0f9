//! Group members observed by the bot.
//!
//! The Bot API has no "list all members" call, so member listing pages over
//! the users seen speaking or joining in each group, merged with the
//! administrator list at listing time.

use std::{
    collections::{BTreeSet, HashMap, VecDeque},
    sync::Mutex,
};

/// Members kept per chat; the oldest-seen are dropped first.
pub const DEFAULT_MAX_PER_CHAT: usize = 10_000;

#[derive(Default)]
struct ChatMembers {
    ids: BTreeSet<u64>,
    order: VecDeque<u64>,
}

impl ChatMembers {
    fn insert(&mut self, user: u64, cap: usize) {
        if !self.ids.insert(user) {
            return;
        }
        self.order.push_back(user);
        while self.order.len() > cap {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, user: u64) {
        if self.ids.remove(&user) {
            self.order.retain(|u| *u != user);
        }
    }
}

pub struct MemberRegistry {
    max_per_chat: usize,
    seen: Mutex<HashMap<i64, ChatMembers>>,
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_PER_CHAT)
    }
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_per_chat: usize) -> Self {
        Self {
            max_per_chat: max_per_chat.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, chat: i64, user: u64) {
        self.record_many(chat, [user]);
    }

    pub fn record_many(&self, chat: i64, users: impl IntoIterator<Item = u64>) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        let members = seen.entry(chat).or_default();
        for user in users {
            members.insert(user, self.max_per_chat);
        }
    }

    pub fn forget(&self, chat: i64, user: u64) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(members) = seen.get_mut(&chat) {
            members.remove(user);
        }
    }

    /// Ascending user ids seen in `chat`.
    pub fn members(&self, chat: i64) -> Vec<u64> {
        let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.get(&chat)
            .map(|m| m.ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn drop_chat(&self, chat: i64) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.remove(&chat);
    }
}

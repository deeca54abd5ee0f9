//! Pending admin confirmations for broadcast and purge requests.
//!
//! One pending request per chat. Opening a new one replaces (and cancels the
//! timeout of) the previous request in that chat.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::MessageRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingAction {
    Broadcast { message: MessageRef },
    Purge,
}

#[derive(Clone, Debug)]
pub struct PendingConfirmation {
    pub token: u64,
    pub action: PendingAction,
    /// The "ready to broadcast" prompt shown to the admin.
    pub prompt: MessageRef,
    cancel: CancellationToken,
}

impl PendingConfirmation {
    pub fn new(token: u64, action: PendingAction, prompt: MessageRef) -> Self {
        Self {
            token,
            action,
            prompt,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Default)]
pub struct Confirmations {
    pending: Mutex<HashMap<i64, PendingConfirmation>>,
    next: AtomicU64,
}

impl Confirmations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn open(&self, chat: i64, pending: PendingConfirmation) {
        let prev = self.lock().insert(chat, pending);
        if let Some(prev) = prev {
            debug!(chat, token = prev.token, "replacing pending confirmation");
            prev.cancel.cancel();
        }
    }

    pub fn is_pending(&self, chat: i64) -> bool {
        self.lock().contains_key(&chat)
    }

    /// Resolve whatever is pending in `chat` (typed replies).
    pub fn take(&self, chat: i64) -> Option<PendingConfirmation> {
        let taken = self.lock().remove(&chat);
        if let Some(p) = &taken {
            p.cancel.cancel();
        }
        taken
    }

    /// Resolve only if `token` is still the live request (button presses).
    pub fn take_token(&self, chat: i64, token: u64) -> Option<PendingConfirmation> {
        let taken = {
            let mut map = self.lock();
            match map.get(&chat) {
                Some(p) if p.token == token => map.remove(&chat),
                _ => None,
            }
        };
        if let Some(p) = &taken {
            p.cancel.cancel();
        }
        taken
    }

    /// Drop the request on timeout. Returns it only if it was still pending.
    pub fn expire(&self, chat: i64, token: u64) -> Option<PendingConfirmation> {
        let mut map = self.lock();
        match map.get(&chat) {
            Some(p) if p.token == token => map.remove(&chat),
            _ => None,
        }
    }

    /// Spawn the timeout for a freshly opened request.
    ///
    /// `on_expire` runs only when the request is still pending after `timeout`;
    /// resolving or replacing it first cancels the timer.
    pub fn arm_timeout<F, Fut>(
        self: &Arc<Self>,
        chat: i64,
        token: u64,
        timeout: Duration,
        on_expire: F,
    ) where
        F: FnOnce(PendingConfirmation) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = match self.lock().get(&chat) {
            Some(p) if p.token == token => p.cancel.clone(),
            _ => return,
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(expired) = this.expire(chat, token) {
                        debug!(chat, token, "confirmation timed out");
                        on_expire(expired).await;
                    }
                }
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<i64, PendingConfirmation>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Typed confirmation words (case-insensitive).
pub fn is_affirmative(text: &str) -> bool {
    matches!(
        text.trim().to_lowercase().as_str(),
        "yes" | "y" | "ha" | "haan"
    )
}

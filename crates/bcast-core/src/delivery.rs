use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{
    denylist::Denylist,
    domain::{ChatId, MessageRef},
    platform::{ChatPlatform, PlatformError},
};

/// Lifetime delivery counters. Only `current_run` resets between runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryCounters {
    pub sent: u64,
    pub failed: u64,
    pub blocked: u64,
    pub throttled: u64,
    pub current_run: u64,
}

/// Mutable delivery bookkeeping owned by the broadcast orchestrator.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    pub denylist: Denylist,
    pub counters: DeliveryCounters,
}

impl Ledger {
    pub fn new(denylist: Denylist) -> Self {
        Self {
            denylist,
            counters: DeliveryCounters::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The platform asked us to slow down; the pause was already honored.
    Throttled,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Denylisted; the transport was not invoked.
    Skipped,
    Blocked,
    Failed(FailureKind),
}

/// Sends one message to one recipient and classifies the result.
#[derive(Clone)]
pub struct DeliveryEngine {
    platform: Arc<dyn ChatPlatform>,
    denylist_threshold: u32,
}

impl DeliveryEngine {
    pub fn new(platform: Arc<dyn ChatPlatform>, denylist_threshold: u32) -> Self {
        Self {
            platform,
            denylist_threshold,
        }
    }

    pub async fn deliver(
        &self,
        recipient: ChatId,
        message: MessageRef,
        ledger: &Mutex<Ledger>,
    ) -> DeliveryOutcome {
        if ledger
            .lock()
            .await
            .denylist
            .is_denied(recipient, self.denylist_threshold)
        {
            return DeliveryOutcome::Skipped;
        }

        let result = self.platform.copy_message(recipient, message).await;

        let mut st = ledger.lock().await;
        match result {
            Ok(()) => {
                st.counters.sent += 1;
                st.counters.current_run += 1;
                st.denylist.clear(recipient);
                DeliveryOutcome::Delivered
            }
            Err(PlatformError::Throttled(wait)) => {
                st.counters.throttled += 1;
                drop(st);

                warn!(chat = %recipient, wait_secs = wait.as_secs(), "throttled; pausing delivery");
                sleep(wait).await;
                DeliveryOutcome::Failed(FailureKind::Throttled)
            }
            Err(e) if e.is_permanent_rejection() => {
                st.counters.blocked += 1;
                let failures = st.denylist.record_failure(recipient);
                debug!(chat = %recipient, failures, error = %e, "recipient rejected delivery");
                DeliveryOutcome::Blocked
            }
            Err(e) => {
                st.counters.failed += 1;
                let failures = st.denylist.record_failure(recipient);
                warn!(chat = %recipient, failures, error = %e, "delivery failed");
                DeliveryOutcome::Failed(FailureKind::Error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;
    use crate::testing::FakePlatform;
    use std::time::Duration;

    fn msg() -> MessageRef {
        MessageRef {
            chat_id: ChatId(1000),
            message_id: MessageId(7),
        }
    }

    #[tokio::test]
    async fn denylisted_recipient_is_skipped_without_transport() {
        let platform = Arc::new(FakePlatform::default());
        let engine = DeliveryEngine::new(platform.clone(), 3);
        let ledger = Mutex::new(Ledger::new([(ChatId(5), 3)].into_iter().collect()));

        let out = engine.deliver(ChatId(5), msg(), &ledger).await;

        assert_eq!(out, DeliveryOutcome::Skipped);
        assert!(platform.copied().is_empty());
        let st = ledger.lock().await;
        assert_eq!(st.denylist.count(ChatId(5)), 3);
        assert_eq!(st.counters, DeliveryCounters::default());
    }

    #[tokio::test]
    async fn success_clears_previous_failures() {
        let platform = Arc::new(FakePlatform::default());
        let engine = DeliveryEngine::new(platform.clone(), 3);
        let ledger = Mutex::new(Ledger::new([(ChatId(9), 2)].into_iter().collect()));

        let out = engine.deliver(ChatId(9), msg(), &ledger).await;

        assert_eq!(out, DeliveryOutcome::Delivered);
        assert_eq!(platform.copied(), vec![(ChatId(9), msg())]);
        let st = ledger.lock().await;
        assert_eq!(st.denylist.count(ChatId(9)), 0);
        assert!(st.denylist.is_empty());
        assert_eq!(st.counters.sent, 1);
        assert_eq!(st.counters.current_run, 1);
    }

    #[tokio::test]
    async fn blocked_and_forbidden_accumulate_on_denylist() {
        let platform = Arc::new(
            FakePlatform::default()
                .copy_fails(ChatId(2), PlatformError::RecipientBlocked)
                .copy_fails(ChatId(-3), PlatformError::WriteForbidden),
        );
        let engine = DeliveryEngine::new(platform, 3);
        let ledger = Mutex::new(Ledger::default());

        assert_eq!(
            engine.deliver(ChatId(2), msg(), &ledger).await,
            DeliveryOutcome::Blocked
        );
        assert_eq!(
            engine.deliver(ChatId(-3), msg(), &ledger).await,
            DeliveryOutcome::Blocked
        );
        assert_eq!(
            engine.deliver(ChatId(2), msg(), &ledger).await,
            DeliveryOutcome::Blocked
        );

        let st = ledger.lock().await;
        assert_eq!(st.counters.blocked, 3);
        assert_eq!(st.denylist.count(ChatId(2)), 2);
        assert_eq!(st.denylist.count(ChatId(-3)), 1);
    }

    #[tokio::test]
    async fn generic_error_counts_as_failure() {
        let platform = Arc::new(
            FakePlatform::default()
                .copy_fails(ChatId(4), PlatformError::Other("chat not found".to_string())),
        );
        let engine = DeliveryEngine::new(platform, 3);
        let ledger = Mutex::new(Ledger::default());

        assert_eq!(
            engine.deliver(ChatId(4), msg(), &ledger).await,
            DeliveryOutcome::Failed(FailureKind::Error)
        );
        let st = ledger.lock().await;
        assert_eq!(st.counters.failed, 1);
        assert_eq!(st.denylist.count(ChatId(4)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn throttle_pauses_without_penalizing_recipient() {
        let platform = Arc::new(
            FakePlatform::default()
                .copy_fails(ChatId(8), PlatformError::Throttled(Duration::from_secs(12))),
        );
        let engine = DeliveryEngine::new(platform.clone(), 3);
        let ledger = Mutex::new(Ledger::default());

        let started = tokio::time::Instant::now();
        let out = engine.deliver(ChatId(8), msg(), &ledger).await;

        assert_eq!(out, DeliveryOutcome::Failed(FailureKind::Throttled));
        assert!(started.elapsed() >= Duration::from_secs(12));
        assert_eq!(platform.copied().len(), 1);
        let st = ledger.lock().await;
        assert_eq!(st.counters.throttled, 1);
        assert_eq!(st.counters.failed, 0);
        assert!(st.denylist.is_empty());
    }
}

//! Broadcast orchestrator: one sequential delivery sweep over every known chat.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::{
    delivery::{DeliveryCounters, DeliveryEngine, DeliveryOutcome, FailureKind, Ledger},
    denylist::DenylistStore,
    directory::RecipientDirectory,
    domain::MessageRef,
    platform::ChatPlatform,
    Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Pause after every `pace_every` processed recipients.
    pub pace_every: u64,
    pub pace_pause: Duration,
    /// Emit progress after every `progress_every` processed recipients.
    pub progress_every: u64,
    /// Failure count at which a recipient is skipped.
    pub denylist_threshold: u32,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            pace_every: 30,
            pace_pause: Duration::from_secs(1),
            progress_every: 50,
            denylist_threshold: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BroadcastProgress {
    pub processed: usize,
    pub total: usize,
    pub delivered: u64,
    /// Failed + blocked so far.
    pub failed: u64,
    pub skipped: u64,
}

impl BroadcastProgress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.processed as f64 / self.total as f64 * 100.0
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BroadcastReport {
    pub started_at: DateTime<Local>,
    pub total: usize,
    pub delivered: u64,
    /// Generic failures plus throttled attempts.
    pub failed: u64,
    pub blocked: u64,
    pub skipped: u64,
    pub throttle_events: u64,
    pub pacing_pauses: u64,
    pub elapsed: Duration,
    /// Whether the end-of-run denylist write succeeded.
    pub denylist_saved: bool,
}

impl BroadcastReport {
    /// Recipients the transport was actually invoked for.
    pub fn attempted(&self) -> u64 {
        self.delivered + self.failed + self.blocked
    }

    /// `delivered / total * 100`, rounded to one decimal.
    pub fn success_rate(&self) -> f64 {
        percent_one_decimal(self.delivered, self.total as u64)
    }
}

pub(crate) fn percent_one_decimal(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = part as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

#[derive(Clone, Debug, PartialEq)]
pub enum BroadcastOutcome {
    /// Another run is active; nothing was touched.
    Busy,
    NoRecipients,
    Completed(BroadcastReport),
}

/// Receives run status updates (e.g. an editable status message).
#[async_trait]
pub trait BroadcastObserver: Send + Sync {
    async fn started(&self, _total: usize) {}
    async fn progress(&self, _progress: &BroadcastProgress) {}
}

/// Observer that ignores every update.
pub struct SilentObserver;

#[async_trait]
impl BroadcastObserver for SilentObserver {}

/// Idle/running flag holder; returns to idle when dropped.
pub(crate) struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    pub(crate) fn try_begin(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

pub struct Broadcaster {
    directory: RecipientDirectory,
    engine: DeliveryEngine,
    denylist_store: DenylistStore,
    settings: BroadcastSettings,
    ledger: Mutex<Ledger>,
    running: AtomicBool,
}

impl Broadcaster {
    /// Build the orchestrator, loading the persisted denylist.
    pub fn new(
        directory: RecipientDirectory,
        platform: Arc<dyn ChatPlatform>,
        denylist_store: DenylistStore,
        settings: BroadcastSettings,
    ) -> Self {
        let denylist = denylist_store.load();
        info!(
            entries = denylist.len(),
            path = %denylist_store.path().display(),
            "loaded denylist"
        );
        Self {
            directory,
            engine: DeliveryEngine::new(platform, settings.denylist_threshold),
            denylist_store,
            settings,
            ledger: Mutex::new(Ledger::new(denylist)),
            running: AtomicBool::new(false),
        }
    }

    pub fn directory(&self) -> &RecipientDirectory {
        &self.directory
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub async fn counters(&self) -> DeliveryCounters {
        self.ledger.lock().await.counters
    }

    pub async fn denylist_len(&self) -> usize {
        self.ledger.lock().await.denylist.len()
    }

    /// Drop every denylist entry and persist the empty list.
    /// Returns the number of cleared entries.
    pub async fn clear_denylist(&self) -> Result<usize> {
        let mut st = self.ledger.lock().await;
        let cleared = st.denylist.clear_all();
        self.denylist_store.save(&st.denylist)?;
        Ok(cleared)
    }

    pub async fn run(
        &self,
        message: MessageRef,
        observer: &dyn BroadcastObserver,
    ) -> BroadcastOutcome {
        let Some(_guard) = RunGuard::try_begin(&self.running) else {
            return BroadcastOutcome::Busy;
        };

        let recipients = self.directory.all_recipients().await;
        let total = recipients.len();
        if total == 0 {
            info!("broadcast requested but no recipients found");
            return BroadcastOutcome::NoRecipients;
        }

        self.ledger.lock().await.counters.current_run = 0;
        info!(total, "broadcast started");
        observer.started(total).await;

        let started_at = Local::now();
        let clock = Instant::now();
        let mut report = BroadcastReport {
            started_at,
            total,
            delivered: 0,
            failed: 0,
            blocked: 0,
            skipped: 0,
            throttle_events: 0,
            pacing_pauses: 0,
            elapsed: Duration::ZERO,
            denylist_saved: false,
        };

        for (idx, recipient) in recipients.into_iter().enumerate() {
            match self.engine.deliver(recipient, message, &self.ledger).await {
                DeliveryOutcome::Delivered => report.delivered += 1,
                DeliveryOutcome::Skipped => report.skipped += 1,
                DeliveryOutcome::Blocked => report.blocked += 1,
                DeliveryOutcome::Failed(kind) => {
                    report.failed += 1;
                    if kind == FailureKind::Throttled {
                        report.throttle_events += 1;
                    }
                }
            }

            let processed = idx as u64 + 1;
            if processed % self.settings.pace_every == 0 {
                report.pacing_pauses += 1;
                sleep(self.settings.pace_pause).await;
            }
            if processed % self.settings.progress_every == 0 {
                let progress = BroadcastProgress {
                    processed: processed as usize,
                    total,
                    delivered: report.delivered,
                    failed: report.failed + report.blocked,
                    skipped: report.skipped,
                };
                observer.progress(&progress).await;
            }
        }

        let snapshot = self.ledger.lock().await.denylist.clone();
        report.denylist_saved = match self.denylist_store.save(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist denylist; keeping in-memory copy");
                false
            }
        };
        report.elapsed = clock.elapsed();

        info!(
            total,
            delivered = report.delivered,
            failed = report.failed,
            blocked = report.blocked,
            skipped = report.skipped,
            throttled = report.throttle_events,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "broadcast complete"
        );

        BroadcastOutcome::Completed(report)
    }
}

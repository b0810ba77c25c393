//! Background reconciliation of cards against the error tracker.
//!
//! [`SyncWorker`] performs one pass over the active error registry.
//! [`SyncScheduler`] owns the single loop task that runs a pass every
//! interval, and [`SyncSupervisor`] serializes start/stop so that a
//! configuration reload cannot leave two loops running.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use snagbridge_bugsnag::ErrorBackend;
use snagbridge_chat::ChatPlatform;
use snagbridge_store::{ActiveError, CardStore};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::card;
use crate::error::EngineResult;

/// Outcome of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub synced: usize,
    pub failed: usize,
    /// The registry could not be read; nothing was attempted.
    pub skipped: bool,
}

/// Refreshes every registered card from the error tracker.
pub struct SyncWorker {
    store: CardStore,
    chat: Arc<dyn ChatPlatform>,
    backend: Arc<dyn ErrorBackend>,
}

impl SyncWorker {
    pub fn new(store: CardStore, chat: Arc<dyn ChatPlatform>, backend: Arc<dyn ErrorBackend>) -> Self {
        Self {
            store,
            chat,
            backend,
        }
    }

    /// One reconciliation pass. Entry failures are logged and skipped.
    pub async fn tick(&self) -> TickReport {
        let entries = match self.store.active_errors().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping sync tick, registry unavailable: {}", e);
                return TickReport {
                    skipped: true,
                    ..Default::default()
                };
            }
        };

        let mut report = TickReport::default();
        let mut synced = Vec::with_capacity(entries.len());
        for entry in &entries {
            match self.sync_entry(entry).await {
                Ok(()) => {
                    report.synced += 1;
                    synced.push((entry.project_id.clone(), entry.error_id.clone()));
                }
                Err(e) => {
                    warn!(
                        project_id = %entry.project_id,
                        error_id = %entry.error_id,
                        post_id = %entry.post_id,
                        "Sync failed: {}",
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        if let Err(e) = self.store.touch_active_errors(&synced, Utc::now()).await {
            warn!("Failed to record sync times: {}", e);
        }
        debug!(synced = report.synced, failed = report.failed, "Sync tick finished");
        report
    }

    async fn sync_entry(&self, entry: &ActiveError) -> EngineResult<()> {
        let details = self
            .backend
            .get_error(&entry.project_id, &entry.error_id)
            .await?;

        {
            let _guard = self
                .store
                .lock_card(&entry.project_id, &entry.error_id)
                .await;
            let mut post = self.chat.get_post(&entry.post_id).await?;
            post.message = card::with_sync_line(&post.message, &details, Utc::now());
            self.chat.update_post(post).await?;
        }

        self.chat
            .create_reply(&entry.channel_id, &entry.post_id, &card::sync_note(&details))
            .await?;
        Ok(())
    }
}

/// A running reconciliation loop.
///
/// Dropping the scheduler cancels the loop; [`SyncScheduler::stop`] also
/// waits for it to exit.
pub struct SyncScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl SyncScheduler {
    /// Spawn the loop. The first pass runs one `interval` after start.
    pub fn start(worker: Arc<SyncWorker>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(worker, interval, cancel.clone()));
        info!(interval_secs = interval.as_secs(), "Sync loop started");
        Self {
            cancel,
            handle: Some(handle),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and wait until it has exited.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Sync loop ended abnormally: {}", e);
            }
        }
        info!("Sync loop stopped");
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(worker: Arc<SyncWorker>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            result = tokio::time::timeout(interval, worker.tick()) => {
                if result.is_err() {
                    warn!(interval_secs = interval.as_secs(), "Sync tick exceeded the interval and was abandoned");
                }
            }
        }
    }
}

/// Owns at most one [`SyncScheduler`].
#[derive(Default)]
pub struct SyncSupervisor {
    current: Mutex<Option<SyncScheduler>>,
}

impl SyncSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop any running loop, then start a new one unless `interval` is
    /// zero. Returns whether a loop is running afterwards.
    pub async fn restart(&self, worker: Arc<SyncWorker>, interval: Duration) -> bool {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.stop().await;
        }
        if interval.is_zero() {
            info!("Sync loop disabled");
            return false;
        }
        *current = Some(SyncScheduler::start(worker, interval));
        true
    }

    /// Stop the loop if one is running. Safe to call repeatedly.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some(scheduler) = current.take() {
            scheduler.stop().await;
        }
    }

    pub async fn is_running(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(SyncScheduler::is_running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBackend, FakeChat};
    use pretty_assertions::assert_eq;
    use snagbridge_bugsnag::ErrorDetails;
    use snagbridge_chat::Post;

    struct Harness {
        worker: Arc<SyncWorker>,
        store: CardStore,
        chat: Arc<FakeChat>,
        backend: Arc<FakeBackend>,
    }

    fn details(status: &str) -> ErrorDetails {
        ErrorDetails {
            id: "e1".into(),
            status: status.into(),
            events: 12,
            events_last_24h: 3,
            last_seen: "2024-05-01T10:00:00Z".into(),
            ..Default::default()
        }
    }

    async fn harness() -> Harness {
        let store = CardStore::in_memory("test");
        let chat = Arc::new(FakeChat::new());
        let backend = Arc::new(FakeBackend::new());

        let mut post = Post::new("c1", ":rotating_light: **TypeError**: boom");
        post.id = "card1".into();
        chat.insert_post(post);
        backend.set_details("p1", "e1", details("open"));
        store
            .upsert_active_error(ActiveError {
                project_id: "p1".into(),
                error_id: "e1".into(),
                channel_id: "c1".into(),
                post_id: "card1".into(),
                last_synced_at: None,
            })
            .await
            .unwrap();

        let worker = Arc::new(SyncWorker::new(
            store.clone(),
            chat.clone(),
            backend.clone() as Arc<dyn ErrorBackend>,
        ));
        Harness {
            worker,
            store,
            chat,
            backend,
        }
    }

    #[tokio::test]
    async fn test_tick_writes_sync_line_and_note() {
        let h = harness().await;

        let report = h.worker.tick().await;
        assert_eq!(report, TickReport { synced: 1, failed: 0, skipped: false });

        let card = h.chat.post("card1").unwrap();
        assert!(card.message.starts_with(
            ":rotating_light: **TypeError**: boom\n\nStatus: open | Events (total/24h): 12/3 | \
             Last seen: 2024-05-01T10:00:00Z | Synced: "
        ));
        assert_eq!(
            h.chat.replies_to("card1"),
            vec![
                "[sync] Status: open, events (total/24h): 12/3, last seen: 2024-05-01T10:00:00Z"
                    .to_string()
            ]
        );

        let registry = h.store.active_errors().await.unwrap();
        assert!(registry[0].last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_repeated_ticks_replace_the_sync_line() {
        let h = harness().await;
        h.worker.tick().await;
        h.backend.set_details("p1", "e1", details("fixed"));
        h.worker.tick().await;

        let message = h.chat.post("card1").unwrap().message;
        assert_eq!(message.matches("Status: ").count(), 1);
        assert!(message.contains("Status: fixed"));
        assert_eq!(h.chat.replies_to("card1").len(), 2);
    }

    #[tokio::test]
    async fn test_failing_entry_does_not_abort_tick() {
        let h = harness().await;
        h.store
            .upsert_active_error(ActiveError {
                project_id: "p1".into(),
                error_id: "missing".into(),
                channel_id: "c1".into(),
                post_id: "gone".into(),
                last_synced_at: None,
            })
            .await
            .unwrap();

        let report = h.worker.tick().await;
        assert_eq!(report, TickReport { synced: 1, failed: 1, skipped: false });

        // entries are never removed
        let registry = h.store.active_errors().await.unwrap();
        assert_eq!(registry.len(), 2);
        let failed = registry.iter().find(|e| e.error_id == "missing").unwrap();
        assert!(failed.last_synced_at.is_none());
    }

    #[tokio::test]
    async fn test_backend_outage_leaves_cards_untouched() {
        let h = harness().await;
        h.backend.fail_all(true);

        let report = h.worker.tick().await;
        assert_eq!(report.failed, 1);
        assert_eq!(
            h.chat.post("card1").unwrap().message,
            ":rotating_light: **TypeError**: boom"
        );
        assert!(h.chat.replies_to("card1").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_ticks_on_interval_and_stops() {
        let h = harness().await;
        let scheduler = SyncScheduler::start(h.worker.clone(), Duration::from_secs(60));
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(h.backend.calls().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(h.backend.calls(), vec!["get_error p1/e1".to_string()]);

        scheduler.stop().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tick_is_abandoned() {
        let h = harness().await;
        h.backend.set_delay(Duration::from_secs(500));
        let scheduler = SyncScheduler::start(h.worker.clone(), Duration::from_secs(60));

        // each pass is cut off after one interval, so passes start at 60s and 120s
        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(h.backend.calls().len(), 2);
        assert!(h.chat.replies_to("card1").is_empty());

        scheduler.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_keeps_a_single_loop() {
        let h = harness().await;
        let supervisor = SyncSupervisor::new();

        assert!(supervisor.restart(h.worker.clone(), Duration::from_secs(60)).await);
        assert!(supervisor.restart(h.worker.clone(), Duration::from_secs(60)).await);
        assert!(supervisor.is_running().await);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.backend.calls().len(), 1);

        supervisor.stop().await;
        supervisor.stop().await;
        assert!(!supervisor.is_running().await);

        assert!(!supervisor.restart(h.worker.clone(), Duration::ZERO).await);
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_scheduler_cancels_loop() {
        let h = harness().await;
        drop(SyncScheduler::start(h.worker.clone(), Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert!(h.backend.calls().is_empty());
    }
}

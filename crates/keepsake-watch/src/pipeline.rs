//! The per-space change pipeline.
//!
//! One [`ChangePipeline`] wraps one watched root. Raw notifications arrive
//! on the watcher's own callback thread, get decoded, filtered and
//! throttled there, and are pushed into a bounded channel that a single
//! subscriber drains. If the native watch mechanism is unavailable (or the
//! configured budget of native watches is spent) the pipeline degrades to
//! polling instead of silently doing nothing.

use crate::error::{WatchError, WatchResult};
use crate::event::{decode_kind, ChangeEvent};
use crate::throttle::ThrottleMap;
use keepsake_util::path as kpath;
use notify::{Config, EventHandler, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Configuration for a change pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Minimum interval between version-worthy events for one path.
    pub throttle_window: Duration,

    /// Idle time after which a throttle entry is purged by maintenance.
    pub throttle_expiry: Duration,

    /// Scan interval for the polling fallback.
    pub poll_interval: Duration,

    /// How often the maintenance task purges stale throttle entries.
    pub maintenance_interval: Duration,

    /// Capacity of the per-space event channel.
    pub channel_capacity: usize,

    /// Maximum native watches handed out by a shared [`WatchBudget`].
    pub max_native_watches: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            throttle_window: Duration::from_secs(5),
            throttle_expiry: Duration::from_secs(400),
            poll_interval: Duration::from_secs(2),
            maintenance_interval: Duration::from_secs(60),
            channel_capacity: 256,
            max_native_watches: 50,
        }
    }
}

/// A shared budget of native watch slots.
///
/// Native change-notification facilities degrade or fail outright past a
/// platform-dependent number of watched roots. Pipelines sharing one budget
/// fall back to polling once the slots are spent, instead of failing.
#[derive(Debug, Clone)]
pub struct WatchBudget {
    remaining: Arc<AtomicUsize>,
}

impl WatchBudget {
    /// Create a budget with the given number of native slots.
    pub fn new(slots: usize) -> Self {
        Self {
            remaining: Arc::new(AtomicUsize::new(slots)),
        }
    }

    /// Try to reserve a native slot. The slot is returned on drop.
    fn try_acquire(&self) -> Option<NativeSlot> {
        let res = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        res.ok().map(|_| NativeSlot {
            remaining: Arc::clone(&self.remaining),
        })
    }

    /// Native slots still available.
    pub fn available(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// RAII guard for one reserved native watch slot.
#[derive(Debug)]
struct NativeSlot {
    remaining: Arc<AtomicUsize>,
}

impl Drop for NativeSlot {
    fn drop(&mut self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }
}

/// Decodes, filters and throttles raw notifications, then forwards them
/// into the space's channel. Runs on the watcher's callback thread.
#[derive(Clone)]
struct EventSink {
    root: PathBuf,
    tx: mpsc::Sender<ChangeEvent>,
    throttle: Arc<Mutex<ThrottleMap>>,
    active: Arc<AtomicBool>,
}

impl EventSink {
    fn process(&self, result: Result<notify::Event, notify::Error>) {
        // A notification racing with stop is dropped, never delivered.
        if !self.active.load(Ordering::Acquire) {
            return;
        }

        let event = match result {
            Ok(event) => event,
            Err(error) => {
                warn!(root = %self.root.display(), %error, "dropping undecodable watch event");
                return;
            }
        };

        let Some(kind) = decode_kind(&event.kind) else {
            return;
        };

        for path in event.paths {
            if kpath::in_control_dir(&path) {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if kpath::is_transient_name(name) {
                    continue;
                }
            }
            // Directory-level churn is not versioned; deletions can no
            // longer be stat'd so they pass through.
            if kind.is_version_worthy() && path.is_dir() {
                continue;
            }

            if kind.is_version_worthy() {
                let mut throttle = match self.throttle.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if !throttle.should_emit(&path, Instant::now()) {
                    trace!(path = %path.display(), "coalesced into open throttle window");
                    continue;
                }
            }

            match self.tx.try_send(ChangeEvent { path, kind }) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    warn!(
                        path = %dropped.path.display(),
                        "event channel full, dropping change event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => return,
            }
        }
    }
}

impl EventHandler for EventSink {
    fn handle_event(&mut self, event: Result<notify::Event, notify::Error>) {
        self.process(event);
    }
}

enum Backend {
    Native(RecommendedWatcher),
    Poll(PollWatcher),
}

struct Running {
    backend: Backend,
    maintenance: JoinHandle<()>,
    // Held for its Drop: returns the native slot to the shared budget.
    _native_slot: Option<NativeSlot>,
}

/// A change pipeline for one watched space root.
pub struct ChangePipeline {
    root: PathBuf,
    config: WatchConfig,
    budget: WatchBudget,
    throttle: Arc<Mutex<ThrottleMap>>,
    active: Arc<AtomicBool>,
    running: Option<Running>,
}

impl ChangePipeline {
    /// Create a pipeline for `root` with its own native-watch budget.
    pub fn new(root: impl Into<PathBuf>, config: WatchConfig) -> Self {
        let budget = WatchBudget::new(config.max_native_watches);
        Self::with_budget(root, config, budget)
    }

    /// Create a pipeline sharing a native-watch budget with other pipelines.
    pub fn with_budget(root: impl Into<PathBuf>, config: WatchConfig, budget: WatchBudget) -> Self {
        let throttle = ThrottleMap::new(config.throttle_window, config.throttle_expiry);
        Self {
            root: root.into(),
            config,
            budget,
            throttle: Arc::new(Mutex::new(throttle)),
            active: Arc::new(AtomicBool::new(false)),
            running: None,
        }
    }

    /// The watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start watching.
    ///
    /// Returns `Ok(Some(receiver))` on a fresh start and `Ok(None)` when the
    /// pipeline is already running - a second start is a safe no-op that
    /// leaves the existing subscriber's channel intact. Fails with an
    /// explicit error if the root is missing or not a directory, or if both
    /// the native backend and the polling fallback cannot be created.
    pub fn start(&mut self) -> WatchResult<Option<mpsc::Receiver<ChangeEvent>>> {
        if self.running.is_some() {
            debug!(root = %self.root.display(), "pipeline already running");
            return Ok(None);
        }

        if !self.root.exists() {
            return Err(WatchError::RootNotFound(self.root.clone()));
        }
        if !self.root.is_dir() {
            return Err(WatchError::NotADirectory(self.root.clone()));
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        self.active.store(true, Ordering::Release);

        let sink = EventSink {
            root: self.root.clone(),
            tx,
            throttle: Arc::clone(&self.throttle),
            active: Arc::clone(&self.active),
        };

        let mut native_slot = self.budget.try_acquire();
        let backend = if native_slot.is_some() {
            match Self::start_native(&self.root, sink.clone()) {
                Ok(watcher) => Backend::Native(watcher),
                Err(error) => {
                    warn!(
                        root = %self.root.display(),
                        %error,
                        "native watch failed, degrading to polling"
                    );
                    native_slot = None;
                    Backend::Poll(self.start_poll(sink)?)
                }
            }
        } else {
            debug!(
                root = %self.root.display(),
                "native watch budget spent, using polling"
            );
            Backend::Poll(self.start_poll(sink)?)
        };

        let maintenance = self.spawn_maintenance();
        self.running = Some(Running {
            backend,
            maintenance,
            _native_slot: native_slot,
        });

        debug!(
            root = %self.root.display(),
            polling = self.is_polling(),
            "pipeline started"
        );
        Ok(Some(rx))
    }

    fn start_native(root: &Path, sink: EventSink) -> Result<RecommendedWatcher, notify::Error> {
        let mut watcher = RecommendedWatcher::new(sink, Config::default())?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }

    fn start_poll(&self, sink: EventSink) -> WatchResult<PollWatcher> {
        let config = Config::default().with_poll_interval(self.config.poll_interval);
        let mut watcher = PollWatcher::new(sink, config)?;
        watcher.watch(&self.root, RecursiveMode::Recursive)?;
        Ok(watcher)
    }

    fn spawn_maintenance(&self) -> JoinHandle<()> {
        let throttle = Arc::clone(&self.throttle);
        let root = self.root.clone();
        let period = self.config.maintenance_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it so maintenance runs on
            // the period, not at startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = match throttle.lock() {
                    Ok(mut guard) => guard.purge_expired(Instant::now()),
                    Err(poisoned) => poisoned.into_inner().purge_expired(Instant::now()),
                };
                if purged > 0 {
                    debug!(root = %root.display(), purged, "purged stale throttle entries");
                }
            }
        })
    }

    /// Stop watching. Idempotent; events racing with the stop are dropped.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            self.active.store(false, Ordering::Release);
            running.maintenance.abort();
            drop(running.backend);
            debug!(root = %self.root.display(), "pipeline stopped");
        }
    }

    /// Purge throttle entries past the expiration window now, outside the
    /// periodic maintenance schedule.
    pub fn perform_maintenance(&self) -> usize {
        let purged = match self.throttle.lock() {
            Ok(mut guard) => guard.purge_expired(Instant::now()),
            Err(poisoned) => poisoned.into_inner().purge_expired(Instant::now()),
        };
        if purged > 0 {
            debug!(root = %self.root.display(), purged, "purged stale throttle entries");
        }
        purged
    }

    /// Whether the pipeline currently holds a watch.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Whether the pipeline is in the degraded polling mode.
    pub fn is_polling(&self) -> bool {
        matches!(
            self.running,
            Some(Running {
                backend: Backend::Poll(_),
                ..
            })
        )
    }
}

impl Drop for ChangePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChangeKind;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use notify::EventKind;
    use std::time::Duration;
    use tempfile::tempdir;

    fn test_config() -> WatchConfig {
        WatchConfig {
            poll_interval: Duration::from_millis(200),
            ..WatchConfig::default()
        }
    }

    fn sink_with_channel(capacity: usize) -> (EventSink, mpsc::Receiver<ChangeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let config = WatchConfig::default();
        let sink = EventSink {
            root: PathBuf::from("/space"),
            tx,
            throttle: Arc::new(Mutex::new(ThrottleMap::new(
                config.throttle_window,
                config.throttle_expiry,
            ))),
            active: Arc::new(AtomicBool::new(true)),
        };
        (sink, rx)
    }

    fn raw(kind: EventKind, path: &str) -> notify::Event {
        notify::Event::new(kind).add_path(PathBuf::from(path))
    }

    #[tokio::test]
    async fn test_sink_emits_created() {
        let (sink, mut rx) = sink_with_channel(16);
        sink.process(Ok(raw(EventKind::Create(CreateKind::File), "/space/a.txt")));

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Created);
        assert_eq!(event.path, PathBuf::from("/space/a.txt"));
    }

    #[tokio::test]
    async fn test_sink_filters_control_dir_and_dotfiles() {
        let (sink, mut rx) = sink_with_channel(16);
        sink.process(Ok(raw(
            EventKind::Create(CreateKind::File),
            "/space/.control/file_versions/x/y.data",
        )));
        sink.process(Ok(raw(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/space/.hidden",
        )));
        sink.process(Ok(raw(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/space/~$draft.docx",
        )));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sink_throttles_rapid_writes() {
        let (sink, mut rx) = sink_with_channel(16);
        for _ in 0..5 {
            sink.process(Ok(raw(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "/space/a.txt",
            )));
        }

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sink_deletes_bypass_throttle() {
        let (sink, mut rx) = sink_with_channel(16);
        sink.process(Ok(raw(EventKind::Remove(RemoveKind::File), "/space/a.txt")));
        sink.process(Ok(raw(EventKind::Remove(RemoveKind::File), "/space/a.txt")));

        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Deleted);
        assert_eq!(rx.try_recv().unwrap().kind, ChangeKind::Deleted);
    }

    #[tokio::test]
    async fn test_sink_drops_after_stop() {
        let (sink, mut rx) = sink_with_channel(16);
        sink.active.store(false, Ordering::Release);
        sink.process(Ok(raw(EventKind::Create(CreateKind::File), "/space/a.txt")));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sink_drops_watcher_errors() {
        let (sink, mut rx) = sink_with_channel(16);
        sink.process(Err(notify::Error::generic("synthetic failure")));

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_start_missing_root_fails_without_side_effects() {
        let mut pipeline = ChangePipeline::new("/does/not/exist", test_config());
        let result = pipeline.start();
        assert!(matches!(result, Err(WatchError::RootNotFound(_))));
        assert!(!pipeline.is_running());
        assert!(!Path::new("/does/not/exist").exists());
    }

    #[tokio::test]
    async fn test_start_on_file_fails() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, "x").unwrap();

        let mut pipeline = ChangePipeline::new(&file, test_config());
        assert!(matches!(
            pipeline.start(),
            Err(WatchError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let dir = tempdir().unwrap();
        let mut pipeline = ChangePipeline::new(dir.path(), test_config());

        let first = pipeline.start().unwrap();
        assert!(first.is_some());
        let second = pipeline.start().unwrap();
        assert!(second.is_none());
        assert!(pipeline.is_running());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut pipeline = ChangePipeline::new(dir.path(), test_config());
        pipeline.start().unwrap();

        pipeline.stop();
        pipeline.stop();
        assert!(!pipeline.is_running());
    }

    #[tokio::test]
    async fn test_watch_delivers_write_event() {
        let dir = tempdir().unwrap();
        let mut pipeline = ChangePipeline::new(dir.path(), test_config());
        let mut rx = pipeline.start().unwrap().unwrap();

        let target = dir.path().join("a.txt");
        std::fs::write(&target, "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no event within timeout")
            .expect("channel closed");
        assert!(event.kind.is_version_worthy());
        assert!(event.path.ends_with("a.txt"));
    }

    #[tokio::test]
    async fn test_exhausted_budget_degrades_to_polling() {
        let dir = tempdir().unwrap();
        let budget = WatchBudget::new(0);
        let mut pipeline = ChangePipeline::with_budget(dir.path(), test_config(), budget);
        let mut rx = pipeline.start().unwrap().unwrap();

        assert!(pipeline.is_polling());

        let target = dir.path().join("b.txt");
        std::fs::write(&target, "polled").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no event within timeout")
            .expect("channel closed");
        assert!(event.path.ends_with("b.txt"));
    }

    #[tokio::test]
    async fn test_budget_slot_returned_on_stop() {
        let dir = tempdir().unwrap();
        let budget = WatchBudget::new(1);
        let mut pipeline =
            ChangePipeline::with_budget(dir.path(), test_config(), budget.clone());
        pipeline.start().unwrap();
        assert_eq!(budget.available(), 0);

        pipeline.stop();
        assert_eq!(budget.available(), 1);
    }
}

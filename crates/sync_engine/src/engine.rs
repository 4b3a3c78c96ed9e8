//! Time synchronizer façade.
//!
//! Owns the round state behind one lock, the velocity history behind its
//! own lock, and the deadline task. Arrivals and deadline firings race on
//! the round lock; the deadline side only ever `try_lock`s.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError, Weak};

use contracts::{
    CloudTransformer, ContractError, PointCloud, RigidTransform, RoundMeta, RoundTrigger,
    SyncDiagnostics, SyncedCloudSet, SynchronizerConfig, TopicId, VelocitySample,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::aggregator::{Arrival, StreamAggregator};
use crate::compensator::MotionCompensator;
use crate::scheduler::{Deadline, FireOutcome, TimeoutScheduler};
use crate::synchronizer::RoundSynchronizer;

/// Everything guarded by the round lock
#[derive(Debug)]
struct RoundState {
    aggregator: StreamAggregator,
    deadline: Deadline,
    next_round_id: u64,
    last_publish: Option<Instant>,
    diagnostics: SyncDiagnostics,
}

struct Inner {
    config: SynchronizerConfig,
    compensator: MotionCompensator,
    transformer: Arc<dyn CloudTransformer>,
    state: Mutex<RoundState>,
    scheduler: TimeoutScheduler,
    output_tx: mpsc::Sender<SyncedCloudSet>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Point-cloud time synchronizer
///
/// Cheap to clone; every clone drives the same rounds.
#[derive(Clone)]
pub struct TimeSynchronizer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TimeSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSynchronizer")
            .field("output_frame", &self.inner.config.output_frame)
            .field("topics", &self.inner.config.input_topics)
            .finish()
    }
}

impl TimeSynchronizer {
    /// Bounded output channel sized by `max_queue_size`.
    pub fn output_channel(
        config: &SynchronizerConfig,
    ) -> (mpsc::Sender<SyncedCloudSet>, mpsc::Receiver<SyncedCloudSet>) {
        mpsc::channel(config.max_queue_size.max(1))
    }

    /// Validate `config` and start the deadline task on the ambient runtime.
    ///
    /// # Errors
    /// `ContractError::ConfigValidation` when the configuration is unusable.
    pub fn spawn(
        config: SynchronizerConfig,
        transformer: Arc<dyn CloudTransformer>,
        output_tx: mpsc::Sender<SyncedCloudSet>,
    ) -> Result<Self, ContractError> {
        config.validate()?;

        let aggregator = StreamAggregator::new(&config);
        let diagnostics =
            SyncDiagnostics::from_missing(aggregator.topics(), aggregator.not_synchronized());
        let (scheduler, deadline_rx) = TimeoutScheduler::new();

        let inner = Arc::new(Inner {
            compensator: MotionCompensator::new(),
            transformer,
            state: Mutex::new(RoundState {
                aggregator,
                deadline: Deadline::default(),
                next_round_id: 0,
                last_publish: None,
                diagnostics,
            }),
            scheduler,
            output_tx,
            task: Mutex::new(None),
            config,
        });

        let weak = Arc::downgrade(&inner);
        let handle = TimeoutScheduler::spawn(deadline_rx, move |now| fire_deadline(&weak, now));
        *lock(&inner.task) = Some(handle);

        info!(
            output_frame = %inner.config.output_frame,
            topics = ?inner.config.input_topics,
            timeout_sec = inner.config.timeout_sec,
            offsets = ?inner.config.input_offset,
            "time synchronizer started"
        );

        Ok(Self { inner })
    }

    pub fn config(&self) -> &SynchronizerConfig {
        &self.inner.config
    }

    /// Handle one inbound cloud.
    ///
    /// The cloud is normalised to packed XYZI first; malformed clouds and
    /// unknown topics are rejected without touching the round.
    #[instrument(
        level = "trace",
        name = "time_sync_on_cloud",
        skip(self, cloud),
        fields(stamp = cloud.stamp())
    )]
    pub fn on_cloud(&self, topic: &str, cloud: PointCloud) -> Result<(), ContractError> {
        let inner = &self.inner;

        let cloud = match cloud.to_xyzi() {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!(topic, error = %e, "rejecting malformed cloud");
                observability::record_cloud_rejected(topic, "malformed");
                return Err(e);
            }
        };

        let mut state = lock(&inner.state);
        if !state.aggregator.contains(topic) {
            observability::record_cloud_rejected(topic, "unknown_topic");
            return Err(ContractError::unknown_topic(topic));
        }
        observability::record_cloud_received(topic);

        match state.aggregator.on_arrival(topic, cloud)? {
            Arrival::Complete => {
                state.deadline.cancel();
                inner.scheduler.notify(state.deadline);
                inner.close_round(&mut state, RoundTrigger::Complete);
            }
            Arrival::Pending { rearm: Some(secs) } => {
                let at = state.deadline.arm(Instant::now(), secs);
                inner.scheduler.notify(state.deadline);
                trace!(topic, secs, deadline = ?at, "round deadline armed");
            }
            Arrival::Pending { rearm: None } => {}
        }
        Ok(())
    }

    /// Feed one velocity sample; independent of the round lock.
    pub fn on_velocity(&self, sample: VelocitySample) {
        observability::record_velocity_received();
        self.inner.compensator.record(sample);
    }

    /// Motion correction between two stamps from the current history.
    pub fn compensate(&self, from_time: f64, to_time: f64) -> RigidTransform {
        self.inner.compensator.compensate(from_time, to_time)
    }

    /// Diagnostics of the most recent round.
    pub fn diagnostics(&self) -> SyncDiagnostics {
        lock(&self.inner.state).diagnostics.clone()
    }

    /// Topics that did not contribute to the most recent round.
    pub fn not_synchronized_topics(&self) -> BTreeSet<TopicId> {
        lock(&self.inner.state).aggregator.not_synchronized().clone()
    }

    /// Topics still waiting for a cloud in the round in progress.
    pub fn pending_topics(&self) -> Vec<TopicId> {
        lock(&self.inner.state).aggregator.pending_topics()
    }

    /// Number of rounds published so far
    pub fn rounds_published(&self) -> u64 {
        lock(&self.inner.state).next_round_id
    }

    /// Stop the deadline task. Pending clouds are discarded.
    pub async fn shutdown(&self) {
        {
            let mut state = lock(&self.inner.state);
            state.deadline.cancel();
            self.inner.scheduler.notify(state.deadline);
        }

        let handle = lock(&self.inner.task).take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        info!(
            rounds = self.rounds_published(),
            truncated_compensations = self.inner.compensator.truncated_count(),
            "time synchronizer stopped"
        );
    }
}

impl Inner {
    /// Close the round in `state` and push the aligned set downstream.
    fn close_round(&self, state: &mut RoundState, trigger: RoundTrigger) {
        let started = Instant::now();
        let round = state.aggregator.close_round(trigger);

        let aligned = RoundSynchronizer {
            output_frame: &self.config.output_frame,
            compensator: &self.compensator,
            transformer: self.transformer.as_ref(),
        }
        .synchronize(round);

        let not_synchronized = aligned.not_synchronized();
        let diagnostics =
            SyncDiagnostics::from_missing(&self.config.input_topics, &not_synchronized);
        state.aggregator.set_not_synchronized(not_synchronized);
        state.diagnostics = diagnostics.clone();

        let round_id = state.next_round_id;
        state.next_round_id += 1;

        let now = Instant::now();
        let cyclic_time_ms = state
            .last_publish
            .map(|last| (now - last).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        state.last_publish = Some(now);

        let set = SyncedCloudSet {
            round_id,
            reference_stamp: aligned.reference_stamp,
            frame_id: self.config.output_frame.clone(),
            clouds: aligned.clouds,
            meta: RoundMeta {
                trigger,
                missing_topics: aligned.missing,
                failed_topics: aligned.failed,
                compensation: aligned.compensation,
                processing_time_ms: (now - started).as_secs_f64() * 1000.0,
                cyclic_time_ms,
                diagnostics,
            },
        };

        debug!(
            round_id,
            trigger = trigger.as_str(),
            reference_stamp = ?set.reference_stamp,
            present = set.present_count(),
            "round closed"
        );
        observability::record_round_metrics(&set);

        match self.output_tx.try_send(set) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(round_id, "output queue full, dropping synchronized set");
                observability::record_output_dropped();
            }
            Err(TrySendError::Closed(_)) => {
                debug!(round_id, "output receiver closed");
            }
        }
    }
}

/// Deadline callback: never blocks on the round lock.
fn fire_deadline(inner: &Weak<Inner>, now: Instant) -> FireOutcome {
    let Some(inner) = inner.upgrade() else {
        return FireOutcome::Stopped;
    };

    let mut state = match inner.state.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return FireOutcome::Contended,
    };

    if !state.deadline.is_due(now) {
        return FireOutcome::Idle;
    }
    state.deadline.cancel();
    inner.close_round(&mut state, RoundTrigger::Timeout);
    FireOutcome::Fired
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{RigidCloudTransformer, StaticFrameResolver};
    use contracts::{DiagnosticLevel, PointXYZI, TopicStatus};
    use std::time::Duration;

    fn cloud(stamp: f64) -> PointCloud {
        PointCloud::from_points(
            stamp,
            "base_link",
            &[PointXYZI {
                x: 1.0,
                y: 0.0,
                z: 0.0,
                intensity: 1.0,
            }],
        )
    }

    fn config(offsets: Vec<f64>) -> SynchronizerConfig {
        let mut config = SynchronizerConfig::new("base_link", vec!["/a".into(), "/b".into()]);
        config.input_offset = offsets;
        config
    }

    fn start(config: SynchronizerConfig) -> (TimeSynchronizer, mpsc::Receiver<SyncedCloudSet>) {
        let (tx, rx) = TimeSynchronizer::output_channel(&config);
        let transformer = Arc::new(RigidCloudTransformer::new(StaticFrameResolver::new()));
        let sync = TimeSynchronizer::spawn(config, transformer, tx).unwrap();
        (sync, rx)
    }

    fn assert_elapsed(from: Instant, expected_ms: u64) {
        let elapsed = from.elapsed();
        assert!(
            elapsed >= Duration::from_millis(expected_ms)
                && elapsed < Duration::from_millis(expected_ms + 3),
            "elapsed {elapsed:?}, expected ~{expected_ms}ms"
        );
    }

    #[tokio::test]
    async fn test_invalid_config_refused() {
        let (tx, _rx) = mpsc::channel(1);
        let transformer = Arc::new(RigidCloudTransformer::new(StaticFrameResolver::new()));
        let mut config = config(vec![]);
        config.output_frame.clear();
        let err = TimeSynchronizer::spawn(config, transformer, tx).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_publishes_immediately() {
        let (sync, mut rx) = start(config(vec![]));
        let t0 = Instant::now();

        sync.on_cloud("/a", cloud(10.05)).unwrap();
        assert!(rx.try_recv().is_err());
        sync.on_cloud("/b", cloud(10.0)).unwrap();

        let set = rx.try_recv().unwrap();
        assert_eq!(t0.elapsed(), Duration::ZERO);
        assert_eq!(set.round_id, 0);
        assert_eq!(set.meta.trigger, RoundTrigger::Complete);
        assert_eq!(set.reference_stamp, Some(10.0));
        assert_eq!(set.frame_id, "base_link");
        for cloud in set.clouds.values() {
            let cloud = cloud.as_ref().unwrap();
            assert_eq!(cloud.stamp(), 10.0);
            assert_eq!(cloud.frame_id(), "base_link");
        }
        assert_eq!(set.meta.diagnostics.level, DiagnosticLevel::Ok);
        assert!(sync.not_synchronized_topics().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_latency() {
        let (sync, mut rx) = start(config(vec![0.0, 0.0]));

        let t0 = Instant::now();
        sync.on_cloud("/a", cloud(1.0)).unwrap();

        let set = rx.recv().await.unwrap();
        assert_elapsed(t0, 100);
        assert_eq!(set.meta.trigger, RoundTrigger::Timeout);
        assert!(set.clouds["/a"].is_some());
        assert!(set.clouds["/b"].is_none());
        assert_eq!(set.meta.missing_topics, vec![TopicId::from("/b")]);
        assert_eq!(set.meta.diagnostics.level, DiagnosticLevel::Warn);
        assert_eq!(set.meta.diagnostics.topics["/b"], TopicStatus::Ng);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_deadline_without_offsets_or_overflow() {
        let (sync, mut rx) = start(config(vec![]));
        sync.on_cloud("/a", cloud(1.0)).unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(sync.pending_topics(), vec![TopicId::from("/b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlap_keeps_latest_payload() {
        let (sync, mut rx) = start(config(vec![]));

        sync.on_cloud("/a", cloud(1.0)).unwrap();
        sync.on_cloud("/a", cloud(1.1)).unwrap();
        sync.on_cloud("/b", cloud(1.12)).unwrap();

        let set = rx.try_recv().unwrap();
        assert_eq!(set.meta.trigger, RoundTrigger::Complete);
        assert_eq!(set.reference_stamp, Some(1.1));
        assert_eq!(set.meta.compensation["/a"].source_stamp, 1.1);

        // overflow was merged; the armed deadline must not fire an extra round
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overflow_carried_into_next_round_after_timeout() {
        let (sync, mut rx) = start(config(vec![]));

        let t0 = Instant::now();
        sync.on_cloud("/a", cloud(1.0)).unwrap();
        sync.on_cloud("/a", cloud(1.1)).unwrap();

        let first = rx.recv().await.unwrap();
        assert_elapsed(t0, 100);
        assert_eq!(first.meta.trigger, RoundTrigger::Timeout);
        assert_eq!(first.reference_stamp, Some(1.0));

        sync.on_cloud("/b", cloud(1.15)).unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(second.round_id, 1);
        assert_eq!(second.meta.compensation["/a"].source_stamp, 1.1);
    }

    /// Deadline is `timeout - offset` of the topic that opens the round:
    /// `/b` (offset 0.05) arriving first waits 50 ms, `/a` (offset 0.0)
    /// arriving first waits the full 100 ms.
    #[tokio::test(start_paused = true)]
    async fn test_offset_shortens_wait() {
        let (sync, mut rx) = start(config(vec![0.0, 0.05]));

        let t0 = Instant::now();
        sync.on_cloud("/b", cloud(1.0)).unwrap();
        rx.recv().await.unwrap();
        assert_elapsed(t0, 50);

        let t1 = Instant::now();
        sync.on_cloud("/a", cloud(2.0)).unwrap();
        rx.recv().await.unwrap();
        assert_elapsed(t1, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_beyond_timeout_fires_immediately() {
        let (sync, mut rx) = start(config(vec![0.0, 0.3]));

        let t0 = Instant::now();
        sync.on_cloud("/b", cloud(1.0)).unwrap();
        let set = rx.recv().await.unwrap();
        assert_elapsed(t0, 0);
        assert_eq!(set.meta.trigger, RoundTrigger::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_synchronized_matches_last_output() {
        let (sync, mut rx) = start(config(vec![0.0, 0.0]));
        // nothing published yet
        assert_eq!(sync.not_synchronized_topics().len(), 2);

        sync.on_cloud("/b", cloud(1.0)).unwrap();
        let set = rx.recv().await.unwrap();

        let absent: BTreeSet<TopicId> = set
            .clouds
            .iter()
            .filter(|(_, c)| c.is_none())
            .map(|(t, _)| t.clone())
            .collect();
        assert_eq!(sync.not_synchronized_topics(), absent);
        assert_eq!(sync.diagnostics(), set.meta.diagnostics);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejections_leave_round_untouched() {
        let (sync, mut rx) = start(config(vec![]));

        let err = sync.on_cloud("/c", cloud(1.0)).unwrap_err();
        assert!(matches!(err, ContractError::UnknownTopic { .. }));

        let mut malformed = cloud(1.0);
        malformed.fields.retain(|f| f.name != "y");
        let err = sync.on_cloud("/a", malformed).unwrap_err();
        assert!(matches!(err, ContractError::MalformedCloud { .. }));

        // intensity 超出单点步长
        let mut short_record = cloud(1.0);
        short_record.fields[3].offset = 14;
        let err = sync.on_cloud("/b", short_record).unwrap_err();
        assert!(matches!(err, ContractError::MalformedCloud { .. }));

        assert_eq!(sync.pending_topics().len(), 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_rejects_unbounded_timeout() {
        let mut config = config(vec![]);
        config.timeout_sec = 1e30;
        let (tx, _rx) = TimeSynchronizer::output_channel(&config);
        let transformer = Arc::new(RigidCloudTransformer::new(StaticFrameResolver::new()));
        let err = TimeSynchronizer::spawn(config, transformer, tx).err().unwrap();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_velocity_drives_compensation() {
        let (sync, mut rx) = start(config(vec![]));
        for i in 0..100 {
            sync.on_velocity(VelocitySample::new(i as f64 * 0.01, 10.0, 0.0));
        }
        assert!(sync.compensate(0.5, 0.5).translation.vector.norm() < 1e-12);

        sync.on_cloud("/a", cloud(0.55)).unwrap();
        sync.on_cloud("/b", cloud(0.5)).unwrap();
        let set = rx.try_recv().unwrap();

        let dx = set.meta.compensation["/a"].dx;
        assert!((dx - 0.5).abs() < 1e-6, "dx = {dx}");
        let point = set.clouds["/a"].as_ref().unwrap().points().unwrap()[0];
        assert!((point.x - 1.5).abs() < 1e-4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_output_queue_drops_without_blocking() {
        let mut config = config(vec![]);
        config.max_queue_size = 1;
        let (sync, mut rx) = start(config);

        for round in 0..3 {
            let stamp = round as f64;
            sync.on_cloud("/a", cloud(stamp)).unwrap();
            sync.on_cloud("/b", cloud(stamp)).unwrap();
        }

        assert_eq!(sync.rounds_published(), 3);
        assert_eq!(rx.try_recv().unwrap().round_id, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_deadline_task() {
        let (sync, mut rx) = start(config(vec![0.0, 0.0]));
        sync.on_cloud("/a", cloud(1.0)).unwrap();
        sync.shutdown().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}

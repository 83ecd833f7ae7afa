//! Bounded worker pool with ordered delivery.
//!
//! `W` worker threads pull units from a job channel; a driver thread feeds
//! the job channel one unit per completion (so at most `W` jobs are ever in
//! flight), runs every completion through the [`DeliveryBuffer`] and sends
//! the in-order result downstream as [`PipelineEvent`]s.

use crate::defaults;
use crate::error::{Result, VoxreelError};
use crate::pipeline::cancel::CancellationToken;
use crate::pipeline::delivery::{Delivered, DeliveryBuffer, Resolution};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::producer::{JobContext, Producer};
use crate::pipeline::types::{Artifact, PipelineEvent, WorkUnit};
use crate::storage::ArtifactStore;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Configuration for the producer pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of jobs running at once.
    pub workers: usize,
    /// How long in-flight jobs may keep running after cancellation.
    pub grace: Duration,
    /// How often the driver re-checks the cancellation flag.
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: defaults::WORKERS,
            grace: Duration::from_millis(defaults::SHUTDOWN_GRACE_MS),
            poll_interval: Duration::from_millis(defaults::POLL_INTERVAL_MS),
        }
    }
}

type Completion = (usize, Result<Artifact>);

/// Handle to a running pool.
pub struct PoolHandle {
    cancel: CancellationToken,
    driver: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl PoolHandle {
    /// Requests cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the driver has sent its final event.
    pub fn is_finished(&self) -> bool {
        self.driver.as_ref().is_none_or(|h| h.is_finished())
    }

    /// Waits up to `timeout` for the pool to finish on its own.
    ///
    /// Returns true if it finished.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_finished() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    /// Cancels the pool and waits for it, bounded by the grace period plus
    /// one second. Threads still running after that are detached.
    pub fn stop(mut self) {
        self.cancel.cancel();

        let deadline = Instant::now() + self.grace + Duration::from_secs(1);
        let poll_interval = Duration::from_millis(20);

        let mut threads: Vec<JoinHandle<()>> = self.driver.take().into_iter().collect();
        threads.append(&mut self.workers);

        loop {
            let mut remaining = Vec::new();
            for handle in threads.drain(..) {
                if handle.is_finished() {
                    if let Err(panic_info) = handle.join() {
                        log::error!("pool thread panicked: {}", panic_message(&*panic_info));
                    }
                } else {
                    remaining.push(handle);
                }
            }
            threads = remaining;

            if threads.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "shutdown timeout: {} pool thread(s) still running, detaching",
                    threads.len()
                );
                // Dropping JoinHandles detaches threads.
                break;
            }
            thread::sleep(poll_interval);
        }
    }
}

/// Worker pool running a [`Producer`] over a list of units.
pub struct ProducerPool {
    config: PoolConfig,
    error_reporter: Arc<dyn ErrorReporter>,
}

impl ProducerPool {
    /// Creates a pool with the default error reporter.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            error_reporter: Arc::new(LogReporter),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Starts processing `units`.
    ///
    /// Events are sent on `events` in delivery order. Every artifact is
    /// written to `store`. Fails only if the worker threads cannot be
    /// started.
    pub fn start(
        self,
        units: Vec<WorkUnit>,
        producer: Arc<dyn Producer>,
        store: Arc<ArtifactStore>,
        cancel: CancellationToken,
        events: Sender<PipelineEvent>,
    ) -> Result<PoolHandle> {
        if self.config.workers == 0 {
            return Err(VoxreelError::ConfigInvalidValue {
                key: "pipeline.workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let total = units.len();
        let worker_count = self.config.workers.min(total.max(1));
        let (job_tx, job_rx) = unbounded::<WorkUnit>();
        let (done_tx, done_rx) = unbounded::<Completion>();

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let job_rx = job_rx.clone();
            let done_tx = done_tx.clone();
            let producer = producer.clone();
            let store = store.clone();
            let cancel = cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("voxreel-worker-{}", id))
                .spawn(move || run_worker(job_rx, done_tx, producer, store, cancel));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the job channel lets the workers already
                    // spawned exit.
                    drop(job_tx);
                    return Err(VoxreelError::PoolStart {
                        message: format!("worker {}: {}", id, e),
                    });
                }
            }
        }
        drop(done_tx);

        let driver = Driver {
            units,
            total,
            worker_count,
            job_tx,
            done_rx,
            events,
            cancel: cancel.clone(),
            reporter: self.error_reporter,
            config: self.config.clone(),
        };
        let driver = thread::Builder::new()
            .name("voxreel-driver".to_string())
            .spawn(move || driver.run())
            .map_err(|e| VoxreelError::PoolStart {
                message: format!("driver: {}", e),
            })?;

        log::info!(
            "started {} worker(s) for {} chunk(s) using {}",
            worker_count,
            total,
            producer.name()
        );

        Ok(PoolHandle {
            cancel,
            driver: Some(driver),
            workers,
            grace: self.config.grace,
        })
    }
}

fn run_worker(
    job_rx: Receiver<WorkUnit>,
    done_tx: Sender<Completion>,
    producer: Arc<dyn Producer>,
    store: Arc<ArtifactStore>,
    cancel: CancellationToken,
) {
    while let Ok(unit) = job_rx.recv() {
        let ctx = JobContext {
            output: store.artifact_path(unit.index),
            cancel: &cancel,
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| producer.produce(&unit, &ctx)))
            .unwrap_or_else(|panic_info| {
                Err(VoxreelError::Production {
                    index: unit.index,
                    message: format!("producer panicked: {}", panic_message(&*panic_info)),
                })
            });
        if done_tx.send((unit.index, result)).is_err() {
            // Driver gone.
            break;
        }
    }
}

fn panic_message(panic_info: &(dyn std::any::Any + Send)) -> &str {
    panic_info
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
        .unwrap_or("unknown panic")
}

/// State owned by the driver thread.
struct Driver {
    units: Vec<WorkUnit>,
    total: usize,
    worker_count: usize,
    job_tx: Sender<WorkUnit>,
    done_rx: Receiver<Completion>,
    events: Sender<PipelineEvent>,
    cancel: CancellationToken,
    reporter: Arc<dyn ErrorReporter>,
    config: PoolConfig,
}

impl Driver {
    fn run(self) {
        let Driver {
            units,
            total,
            worker_count,
            job_tx,
            done_rx,
            events,
            cancel,
            reporter,
            config,
        } = self;

        let emit = |event: PipelineEvent| {
            if events.send(event).is_err() {
                // Nobody is listening any more.
                cancel.cancel();
            }
        };

        emit(PipelineEvent::Status {
            message: format!("Producing {} chunk(s) with {} worker(s)", total, worker_count),
        });

        let mut buffer: DeliveryBuffer<Artifact> = DeliveryBuffer::new(total);
        let mut queue = units.into_iter();
        let mut in_flight = 0usize;

        for unit in queue.by_ref().take(worker_count) {
            if job_tx.send(unit).is_err() {
                break;
            }
            in_flight += 1;
        }

        let mut cancel_deadline: Option<Instant> = None;
        let mut workers_gone = false;

        while !buffer.is_complete() {
            if cancel.is_cancelled() && cancel_deadline.is_none() {
                log::info!("cancellation requested, {} job(s) in flight", in_flight);
                cancel_deadline = Some(Instant::now() + config.grace);
            }
            if let Some(deadline) = cancel_deadline
                && (in_flight == 0 || Instant::now() >= deadline)
            {
                if in_flight > 0 {
                    log::warn!("abandoning {} in-flight job(s)", in_flight);
                }
                break;
            }

            let (index, result) = match done_rx.recv_timeout(config.poll_interval) {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    workers_gone = true;
                    break;
                }
            };
            in_flight = in_flight.saturating_sub(1);

            let resolution = match result {
                Ok(artifact) => {
                    log::debug!("chunk {} produced {}", index, artifact.path.display());
                    Resolution::Ready(artifact)
                }
                Err(VoxreelError::Cancelled) => Resolution::Missing("cancelled".to_string()),
                Err(e) => {
                    reporter.report(index, &e);
                    emit(PipelineEvent::Error {
                        index: Some(index),
                        message: e.to_string(),
                    });
                    Resolution::Missing(e.to_string())
                }
            };

            match buffer.resolve(index, resolution) {
                Ok(delivered) => {
                    for item in delivered {
                        emit_delivered(&emit, item, total);
                    }
                }
                Err(e) => log::error!("{}", e),
            }

            if !cancel.is_cancelled()
                && let Some(unit) = queue.next()
            {
                if job_tx.send(unit).is_ok() {
                    in_flight += 1;
                } else {
                    workers_gone = true;
                    break;
                }
            }
        }

        // Closing the job channel lets idle workers exit.
        drop(job_tx);

        if buffer.take_all_done() {
            log::info!("all {} chunk(s) delivered", total);
            emit(PipelineEvent::AllDone);
        } else {
            let (emitted, total) = buffer.progress();
            if workers_gone {
                emit(PipelineEvent::Error {
                    index: None,
                    message: "all workers exited before production finished".to_string(),
                });
            }
            log::info!("production stopped after {}/{} chunk(s)", emitted, total);
            emit(PipelineEvent::Cancelled { emitted, total });
        }
    }
}

fn emit_delivered(emit: &impl Fn(PipelineEvent), item: Delivered<Artifact>, total: usize) {
    match item.resolution {
        Resolution::Ready(artifact) => emit(PipelineEvent::SegmentReady {
            index: item.index,
            path: artifact.path,
            duration_ms: artifact.duration_ms,
        }),
        Resolution::Missing(reason) => emit(PipelineEvent::Missing {
            index: item.index,
            reason,
        }),
    }
    emit(PipelineEvent::Progress {
        emitted: item.index,
        total,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::CollectingReporter;
    use crate::pipeline::producer::MockProducer;

    fn units(n: usize) -> Vec<WorkUnit> {
        (1..=n).map(|i| WorkUnit::new(i, format!("chunk {}", i))).collect()
    }

    fn collect_until_terminal(rx: &Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(10)) {
            let done = event.is_terminal();
            out.push(event);
            if done {
                break;
            }
        }
        out
    }

    fn ready_indices(events: &[PipelineEvent]) -> Vec<usize> {
        events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::SegmentReady { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            grace: Duration::from_millis(500),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn start(
        producer: MockProducer,
        n: usize,
        workers: usize,
    ) -> (PoolHandle, Receiver<PipelineEvent>, Arc<ArtifactStore>) {
        let store = Arc::new(ArtifactStore::create("voxreel-pool-", n).unwrap());
        let (tx, rx) = unbounded();
        let handle = ProducerPool::new(config(workers))
            .start(
                units(n),
                Arc::new(producer),
                store.clone(),
                CancellationToken::new(),
                tx,
            )
            .unwrap();
        (handle, rx, store)
    }

    #[test]
    fn test_delivers_in_order_despite_completion_order() {
        // Unit 2 is slow, so 3 and 4 finish long before it.
        let producer = MockProducer::new()
            .with_delay(1, Duration::from_millis(60))
            .with_delay(2, Duration::from_millis(200))
            .with_delay(3, Duration::from_millis(20))
            .with_delay(4, Duration::from_millis(120))
            .with_delay(5, Duration::from_millis(30));
        let (handle, rx, _store) = start(producer, 5, 2);

        let events = collect_until_terminal(&rx);
        assert_eq!(ready_indices(&events), vec![1, 2, 3, 4, 5]);

        let progress: Vec<(usize, usize)> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Progress { emitted, total } => Some((*emitted, *total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress.last(), Some(&(5, 5)));
        assert_eq!(events.last(), Some(&PipelineEvent::AllDone));
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == PipelineEvent::AllDone)
                .count(),
            1
        );
        handle.stop();
    }

    #[test]
    fn test_never_more_than_w_jobs_in_flight() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingProducer {
            inner: MockProducer,
            running: AtomicUsize,
            peak: AtomicUsize,
        }

        impl Producer for CountingProducer {
            fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact> {
                let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(15));
                let result = self.inner.produce(unit, ctx);
                self.running.fetch_sub(1, Ordering::SeqCst);
                result
            }

            fn name(&self) -> &str {
                "counting"
            }
        }

        let producer = Arc::new(CountingProducer {
            inner: MockProducer::new().with_default_duration(10),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let store = Arc::new(ArtifactStore::create("voxreel-pool-", 12).unwrap());
        let (tx, rx) = unbounded();
        let handle = ProducerPool::new(config(3))
            .start(
                units(12),
                producer.clone(),
                store,
                CancellationToken::new(),
                tx,
            )
            .unwrap();

        let events = collect_until_terminal(&rx);
        assert_eq!(ready_indices(&events), (1..=12).collect::<Vec<_>>());
        assert!(producer.peak.load(Ordering::SeqCst) <= 3);
        handle.stop();
    }

    #[test]
    fn test_failed_unit_is_tombstoned_and_siblings_continue() {
        let reporter = Arc::new(CollectingReporter::new());
        let store = Arc::new(ArtifactStore::create("voxreel-pool-", 4).unwrap());
        let (tx, rx) = unbounded();
        let handle = ProducerPool::new(config(2))
            .with_error_reporter(reporter.clone())
            .start(
                units(4),
                Arc::new(MockProducer::new().with_failure(2)),
                store,
                CancellationToken::new(),
                tx,
            )
            .unwrap();

        let events = collect_until_terminal(&rx);
        assert_eq!(ready_indices(&events), vec![1, 3, 4]);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Missing { index: 2, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Error { index: Some(2), .. }
        )));
        assert_eq!(events.last(), Some(&PipelineEvent::AllDone));
        assert_eq!(reporter.failures().len(), 1);
        handle.stop();
    }

    #[test]
    fn test_panicking_producer_is_isolated() {
        let (handle, rx, _store) = start(MockProducer::new().with_panic(1), 3, 2);
        let events = collect_until_terminal(&rx);
        assert_eq!(ready_indices(&events), vec![2, 3]);
        assert!(events.iter().any(|e| matches!(
            e,
            PipelineEvent::Missing { index: 1, reason } if reason.contains("panicked")
        )));
        assert_eq!(events.last(), Some(&PipelineEvent::AllDone));
        handle.stop();
    }

    #[test]
    fn test_artifacts_land_in_store() {
        let (handle, rx, store) = start(MockProducer::new(), 2, 2);
        let events = collect_until_terminal(&rx);
        for event in &events {
            if let PipelineEvent::SegmentReady { index, path, .. } = event {
                assert_eq!(path, &store.artifact_path(*index));
                assert!(path.exists());
            }
        }
        handle.stop();
    }

    #[test]
    fn test_cancel_stops_submission_and_bounds_wait() {
        let mut producer = MockProducer::new();
        for i in 1..=20 {
            producer = producer.with_delay(i, Duration::from_millis(40));
        }
        let (handle, rx, _store) = start(producer, 20, 2);

        // Wait for the first delivery, then cancel.
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                PipelineEvent::SegmentReady { .. } => break,
                _ => continue,
            }
        }
        handle.cancel();

        let start = Instant::now();
        let events = collect_until_terminal(&rx);
        assert!(start.elapsed() < Duration::from_secs(3));
        match events.last() {
            Some(PipelineEvent::Cancelled { emitted, total }) => {
                assert!(*emitted < 20);
                assert_eq!(*total, 20);
            }
            other => panic!("expected Cancelled, got {:?}", other),
        }
        assert!(!events.contains(&PipelineEvent::AllDone));
        assert!(handle.wait(Duration::from_secs(2)));
        handle.stop();
    }

    #[test]
    fn test_stop_does_not_hang_on_stuck_job() {
        let producer = MockProducer::new().with_delay(1, Duration::from_secs(60));
        let store = Arc::new(ArtifactStore::create("voxreel-pool-", 1).unwrap());
        let (tx, _rx) = unbounded();
        struct Stubborn(MockProducer);
        impl Producer for Stubborn {
            fn produce(&self, unit: &WorkUnit, ctx: &JobContext<'_>) -> Result<Artifact> {
                // Ignores cancellation entirely.
                let never = CancellationToken::new();
                let ctx = JobContext {
                    output: ctx.output.clone(),
                    cancel: &never,
                };
                self.0.produce(unit, &ctx)
            }
            fn name(&self) -> &str {
                "stubborn"
            }
        }
        let handle = ProducerPool::new(PoolConfig {
            workers: 1,
            grace: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
        })
        .start(
            units(1),
            Arc::new(Stubborn(producer)),
            store,
            CancellationToken::new(),
            tx,
        )
        .unwrap();

        let start = Instant::now();
        handle.stop();
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_zero_workers_is_config_error() {
        let store = Arc::new(ArtifactStore::create("voxreel-pool-", 1).unwrap());
        let (tx, _rx) = unbounded();
        let result = ProducerPool::new(config(0)).start(
            units(1),
            Arc::new(MockProducer::new()),
            store,
            CancellationToken::new(),
            tx,
        );
        assert!(matches!(
            result,
            Err(VoxreelError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_empty_unit_list_finishes_immediately() {
        let (handle, rx, _store) = start(MockProducer::new(), 0, 2);
        let events = collect_until_terminal(&rx);
        assert_eq!(events.last(), Some(&PipelineEvent::AllDone));
        handle.stop();
    }
}

//! Posting background work from the render path.
//!
//! The render step decides *when* discovery and fill should run but never
//! runs them itself. It posts a [`BackgroundTask`] to a [`TaskScheduler`];
//! posting is a single atomic `fetch_or` on a pending set and never wakes
//! anything. The worker polls the set on a short tokio interval instead. Posting a task that is already
//! pending is a no-op, so a slow worker sees one coalesced request rather
//! than a backlog.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::BridgeError;

/// Work the render path can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackgroundTask {
    /// Run a discovery pass.
    ResolveStreams,
    /// Move frames from the inlet(s) into the buffer or sinks.
    FillBuffer,
}

impl BackgroundTask {
    /// Every task, in the order a worker runs them when both are pending.
    pub const ALL: [Self; 2] = [Self::ResolveStreams, Self::FillBuffer];

    fn bit(self) -> u8 {
        match self {
            Self::ResolveStreams => 0b01,
            Self::FillBuffer => 0b10,
        }
    }
}

/// Posts background tasks without blocking the caller.
pub trait TaskScheduler {
    /// Requests that `task` runs soon on the background context.
    fn schedule(&self, task: BackgroundTask);
}

/// How often a worker checks for posted tasks unless configured otherwise.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Scheduler backed by an atomic pending set that the worker polls.
///
/// Cloning shares the pending set.
#[derive(Clone)]
pub struct AuxScheduler {
    pending: Arc<AtomicU8>,
    poll_interval: Duration,
}

impl AuxScheduler {
    /// Creates a scheduler with nothing pending, polled every
    /// [`DEFAULT_POLL_INTERVAL`].
    pub fn new() -> Self {
        Self {
            pending: Arc::new(AtomicU8::new(0)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets how often the worker checks for posted tasks.
    ///
    /// Keep this below the posting period so a request never waits more
    /// than one period. Clamped to at least one millisecond.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// How often the worker checks for posted tasks.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether `task` was posted and not yet taken by the worker.
    pub fn is_pending(&self, task: BackgroundTask) -> bool {
        self.pending.load(Ordering::Acquire) & task.bit() != 0
    }

    /// Takes every pending task, clearing the set.
    pub fn take_pending(&self) -> Vec<BackgroundTask> {
        let pending = self.pending.swap(0, Ordering::AcqRel);
        BackgroundTask::ALL
            .into_iter()
            .filter(|task| pending & task.bit() != 0)
            .collect()
    }
}

impl Default for AuxScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler for AuxScheduler {
    fn schedule(&self, task: BackgroundTask) {
        self.pending.fetch_or(task.bit(), Ordering::AcqRel);
    }
}

impl std::fmt::Debug for AuxScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxScheduler")
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// Work executed on the background context when the render path asks for it.
#[async_trait]
pub trait AuxiliaryWork: Send + 'static {
    /// Runs one posted task to completion.
    async fn run_task(&mut self, task: BackgroundTask);

    /// Called once after the worker loop stops.
    async fn shutdown(&mut self) {}
}

/// Commands that can be sent to a running worker.
#[derive(Debug)]
enum WorkerCommand {
    Stop,
}

/// Handle to a worker spawned with [`spawn_auxiliary`].
///
/// Dropping the handle stops the worker without waiting for it.
pub struct AuxHandle<W> {
    cmd_tx: mpsc::Sender<WorkerCommand>,
    join: Option<JoinHandle<W>>,
}

impl<W> AuxHandle<W> {
    /// Whether the worker loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stops the worker after its current task and returns it.
    ///
    /// Tasks still pending are dropped.
    pub async fn stop(mut self) -> Result<W, BridgeError> {
        let _ = self.cmd_tx.send(WorkerCommand::Stop).await;
        let join = self.join.take().ok_or_else(|| BridgeError::WorkerFailed {
            reason: "worker already stopped".to_string(),
        })?;
        join.await.map_err(|e| BridgeError::WorkerFailed {
            reason: e.to_string(),
        })
    }
}

impl<W> Drop for AuxHandle<W> {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.cmd_tx.try_send(WorkerCommand::Stop);
        }
    }
}

impl<W> std::fmt::Debug for AuxHandle<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

/// Spawns `work` on the current tokio runtime, driven by `scheduler`.
///
/// A discovery pass is posted immediately so a stream that is already
/// advertised is picked up without waiting for the first render block.
///
/// # Errors
///
/// Returns [`BridgeError::NoRuntime`] when called outside a tokio runtime.
pub fn spawn_auxiliary<W: AuxiliaryWork>(
    scheduler: &AuxScheduler,
    work: W,
) -> Result<AuxHandle<W>, BridgeError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;
    let (cmd_tx, cmd_rx) = mpsc::channel(1);

    scheduler.schedule(BackgroundTask::ResolveStreams);
    let join = runtime.spawn(run_worker(scheduler.clone(), work, cmd_rx));

    Ok(AuxHandle {
        cmd_tx,
        join: Some(join),
    })
}

async fn run_worker<W: AuxiliaryWork>(
    scheduler: AuxScheduler,
    mut work: W,
    mut cmd_rx: mpsc::Receiver<WorkerCommand>,
) -> W {
    tracing::debug!(
        poll_interval_ms = scheduler.poll_interval().as_millis(),
        "Background worker started"
    );
    let mut poll = tokio::time::interval(scheduler.poll_interval());
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(WorkerCommand::Stop) | None => break,
            },
            _ = poll.tick() => {
                for task in scheduler.take_pending() {
                    work.run_task(task).await;
                }
            }
        }
    }

    work.shutdown().await;
    tracing::debug!("Background worker stopped");
    work
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        tasks: Vec<BackgroundTask>,
        shut_down: bool,
    }

    #[async_trait]
    impl AuxiliaryWork for Recorder {
        async fn run_task(&mut self, task: BackgroundTask) {
            self.tasks.push(task);
        }

        async fn shutdown(&mut self) {
            self.shut_down = true;
        }
    }

    #[test]
    fn test_schedule_coalesces() {
        let scheduler = AuxScheduler::new();
        scheduler.schedule(BackgroundTask::FillBuffer);
        scheduler.schedule(BackgroundTask::FillBuffer);
        scheduler.schedule(BackgroundTask::ResolveStreams);

        assert!(scheduler.is_pending(BackgroundTask::FillBuffer));
        assert_eq!(
            scheduler.take_pending(),
            vec![BackgroundTask::ResolveStreams, BackgroundTask::FillBuffer]
        );
        assert!(scheduler.take_pending().is_empty());
        assert!(!scheduler.is_pending(BackgroundTask::FillBuffer));
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let scheduler = AuxScheduler::new();
        let result = spawn_auxiliary(&scheduler, Recorder::default());
        assert!(matches!(result, Err(BridgeError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_worker_runs_posted_tasks() {
        let scheduler = AuxScheduler::new();
        let handle = spawn_auxiliary(&scheduler, Recorder::default()).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.schedule(BackgroundTask::FillBuffer);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let recorder = handle.stop().await.unwrap();
        assert_eq!(
            recorder.tasks,
            vec![BackgroundTask::ResolveStreams, BackgroundTask::FillBuffer]
        );
        assert!(recorder.shut_down);
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        assert_eq!(AuxScheduler::new().poll_interval(), DEFAULT_POLL_INTERVAL);
        let scheduler = AuxScheduler::new().with_poll_interval(Duration::ZERO);
        assert_eq!(scheduler.poll_interval(), Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_takes_posts_on_next_poll() {
        let scheduler = AuxScheduler::new().with_poll_interval(Duration::from_millis(10));
        let handle = spawn_auxiliary(&scheduler, Recorder::default()).unwrap();

        // The first poll is immediate and picks up the initial discovery
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!scheduler.is_pending(BackgroundTask::ResolveStreams));

        scheduler.schedule(BackgroundTask::FillBuffer);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(scheduler.is_pending(BackgroundTask::FillBuffer));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!scheduler.is_pending(BackgroundTask::FillBuffer));

        let recorder = handle.stop().await.unwrap();
        assert_eq!(
            recorder.tasks,
            vec![BackgroundTask::ResolveStreams, BackgroundTask::FillBuffer]
        );
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_worker() {
        let scheduler = AuxScheduler::new();
        let handle = spawn_auxiliary(&scheduler, Recorder::default()).unwrap();
        drop(handle);

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Nothing is listening any more; posting is still harmless
        scheduler.schedule(BackgroundTask::FillBuffer);
        assert!(scheduler.is_pending(BackgroundTask::FillBuffer));
    }
}

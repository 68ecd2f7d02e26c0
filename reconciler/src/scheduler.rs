use crate::engine::{CycleReport, Reconciler};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("scheduler is not running")]
    Stopped,
}

pub enum Command {
    // Run a cycle outside of the normal interval. The report is sent back once it finishes.
    Refresh(oneshot::Sender<CycleReport>),
    // Stop scheduling cycles. A cycle in progress is completed first.
    Shutdown,
}

/// Runs reconciliation cycles one at a time: the first immediately, then on every tick.
pub struct Scheduler {
    reconciler: Reconciler,
    every: Duration,
    rx: mpsc::Receiver<Command>,
    // Initially false and set to true once the first cycle has completed.
    ready: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    ready: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(reconciler: Reconciler, every: Duration) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(16);
        let ready = Arc::new(AtomicBool::new(false));

        let scheduler = Scheduler {
            reconciler,
            every,
            rx,
            ready: ready.clone(),
        };
        (scheduler, SchedulerHandle { tx, ready })
    }

    /// Runs until `Shutdown` is received or every handle is dropped.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(every_secs = self.every.as_secs(), "Starting scheduler");

        loop {
            // Commands go first: a cycle that overruns the period leaves the next
            // tick ready immediately.
            tokio::select! {
                biased;

                command = self.rx.recv() => match command {
                    Some(Command::Refresh(reply)) => {
                        tracing::info!("Refresh requested");
                        let report = self.cycle().await;
                        // The requester may have gone away
                        let _ = reply.send(report);
                        ticker.reset();
                    }
                    Some(Command::Shutdown) | None => {
                        tracing::info!("Stopping scheduler");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.cycle().await;
                }
            }
        }
    }

    async fn cycle(&mut self) -> CycleReport {
        let report = self.reconciler.run_cycle().await;
        self.ready.store(true, Ordering::Relaxed);
        report
    }
}

impl SchedulerHandle {
    /// Runs a cycle now and waits for its report.
    pub async fn refresh(&self) -> Result<CycleReport, SchedulerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Refresh(reply_tx))
            .await
            .map_err(|_| SchedulerError::Stopped)?;
        reply_rx.await.map_err(|_| SchedulerError::Stopped)
    }

    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| SchedulerError::Stopped)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

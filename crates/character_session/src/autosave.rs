use std::sync::Arc;
use std::time::{Duration, Instant};

use observability::FlushMetrics;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

use crate::manager::CharacterManager;

struct RunningTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Periodically flushes every resident character to the store.
///
/// The first flush happens one full interval after `start`. Stopping only
/// prevents future flushes; one already running is allowed to finish.
pub struct CharacterAutoSave {
    manager: Arc<CharacterManager>,
    task: Option<RunningTask>,
}

impl CharacterAutoSave {
    pub fn new(manager: Arc<CharacterManager>) -> Self {
        Self {
            manager,
            task: None,
        }
    }

    /// Spawn the flush loop on the current tokio runtime.
    ///
    /// Returns `false` (and changes nothing) if already running.
    pub fn start(&mut self, interval: Duration) -> bool {
        if self.task.is_some() {
            tracing::warn!("Auto-save timer is already running");
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_autosave(Arc::clone(&self.manager), interval, stop_rx));
        self.task = Some(RunningTask { stop_tx, handle });

        tracing::info!(interval_secs = interval.as_secs_f64(), "Character auto-save started");
        true
    }

    /// Cancel future flushes. Safe to call when not running.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                let _ = task.stop_tx.send(true);
                tracing::info!("Character auto-save stopped");
                true
            }
            None => false,
        }
    }

    /// Stop and wait for an in-flight flush to complete.
    pub async fn stop_and_wait(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        let _ = task.stop_tx.send(true);
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "Auto-save task ended abnormally");
        }
        tracing::info!("Character auto-save stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for CharacterAutoSave {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.stop_tx.send(true);
        }
    }
}

/// First tick one period from now. Ticks missed during a slow flush are
/// dropped so later flushes stay on the original grid.
fn flush_ticker(interval: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn run_autosave(
    manager: Arc<CharacterManager>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut ticker = flush_ticker(interval);
    let mut flush_number: u64 = 0;

    loop {
        tokio::select! {
            biased;
            // Err means the owning scheduler was dropped.
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        flush_number += 1;
        tracing::info!(flush = flush_number, "Running auto-save for characters...");

        // Flush runs outside the select so stopping never cuts it short.
        let started = Instant::now();
        let flush_manager = Arc::clone(&manager);
        match tokio::task::spawn_blocking(move || flush_manager.save_all_report()).await {
            Ok(report) => FlushMetrics {
                flush_number,
                duration_us: started.elapsed().as_micros(),
                resident: report.resident,
                saved: report.saved,
            }
            .log(),
            Err(e) => {
                tracing::error!(flush = flush_number, error = %e, "Error during auto-save")
            }
        }
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::monitor::{CheckOutcome, Monitor, Trigger};

/// Runs scheduled checks with a fixed gap after each cycle. At most one loop is alive.
#[derive(Clone)]
pub struct Scheduler {
    monitor: Arc<Monitor>,
    running: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(monitor: Arc<Monitor>) -> Self {
        Self {
            monitor,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the loop unless one is already running. Returns whether a loop was started.
    pub fn start(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Scheduler loop already running");
            return false;
        }

        let scheduler = self.clone();
        tokio::spawn(async move {
            loop {
                run_loop(&scheduler.monitor).await;
                if !scheduler.release_or_resume() {
                    break;
                }
            }
        });
        true
    }

    /// Clears the running flag once the loop has decided to exit.
    ///
    /// A `start` issued between that decision and the flag being cleared finds the flag
    /// still set and spawns nothing, so the enabled switch is checked again afterwards.
    /// Returns true when the exiting loop must keep going.
    fn release_or_resume(&self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        if !self.monitor.config().snapshot().monitor.enabled {
            return false;
        }
        let resumed = self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if resumed {
            info!("Monitoring re-enabled while the scheduler was stopping, resuming");
        }
        resumed
    }
}

async fn run_loop(monitor: &Monitor) {
    let settings = monitor.config().snapshot();
    info!(
        "Scheduler started (every {} seconds, limit {} per check)",
        settings.monitor.interval.as_secs(),
        settings.network.per_page
    );

    let mut changes = monitor.config().subscribe();
    loop {
        let settings = monitor.config().snapshot();
        if !settings.monitor.enabled {
            break;
        }
        tokio::select! {
            _ = sleep(settings.monitor.interval) => {}
            _ = wait_until_disabled(&mut changes) => {}
        }
        // Stopped while sleeping.
        if !monitor.config().snapshot().monitor.enabled {
            break;
        }

        match monitor.check_for_updates(Trigger::Scheduled).await {
            CheckOutcome::Failed(e) => error!("Scheduled check failed: {}", e),
            CheckOutcome::Delivered { articles, report } => info!(
                "Scheduled check sent {} articles ({} destinations, {} failed)",
                articles,
                report.delivered(),
                report.failed
            ),
            outcome => debug!("Scheduled check finished: {:?}", outcome),
        }
    }

    info!("Monitoring disabled, scheduler stopped");
}

async fn wait_until_disabled(changes: &mut watch::Receiver<Arc<Settings>>) {
    loop {
        if changes.changed().await.is_err() {
            // The config handle is gone; only the sleep can end the wait.
            std::future::pending::<()>().await;
        }
        if !changes.borrow_and_update().monitor.enabled {
            return;
        }
    }
}

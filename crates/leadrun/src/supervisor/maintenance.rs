//! Periodic supervisor housekeeping.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info};

use super::{JobSupervisor, SupervisorError};

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maintenance {
    /// Runs asked to stop for exceeding the job timeout.
    pub timed_out: usize,
    /// Event histories dropped for jobs stopped longer than the retention.
    pub evicted: usize,
}

/// Background thread running [`JobSupervisor::maintain`] at a fixed
/// interval. Stops when stopped explicitly or dropped.
pub struct MaintenanceHandle {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Disconnecting wakes the thread.
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Maintenance thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl JobSupervisor {
    /// Runs one housekeeping pass: stops runs past the job timeout and
    /// drops the event history of jobs stopped longer than the retention.
    pub fn maintain(&self) -> Maintenance {
        let timed_out = self.check_timeouts();
        let evicted = self.inner.broadcaster.evict_idle(self.inner.event_retention);
        if evicted > 0 {
            debug!(evicted, "Dropped event history of stopped jobs");
        }
        Maintenance { timed_out, evicted }
    }

    /// Starts a thread calling [`JobSupervisor::maintain`] every `interval`.
    pub fn spawn_maintenance(
        &self,
        interval: Duration,
    ) -> Result<MaintenanceHandle, SupervisorError> {
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let supervisor = self.clone();

        let handle = thread::Builder::new()
            .name("leadrun-maintenance".to_string())
            .spawn(move || run_maintenance(supervisor, stop_rx, interval))
            .map_err(SupervisorError::Spawn)?;

        info!(interval_ms = interval.as_millis() as u64, "Maintenance started");
        Ok(MaintenanceHandle {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

fn run_maintenance(supervisor: JobSupervisor, stop: Receiver<()>, interval: Duration) {
    debug!("Maintenance thread started");

    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                let pass = supervisor.maintain();
                if pass != Maintenance::default() {
                    debug!(
                        timed_out = pass.timed_out,
                        evicted = pass.evicted,
                        "Maintenance pass"
                    );
                }
            }
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!("Maintenance thread stopped");
}

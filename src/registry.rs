//! Ownership of running supervisors.
//!
//! The registry guarantees at most one supervisor per device.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::identity::DeviceIdentity;
use crate::supervisor::SupervisorTask;

/// Running supervisors keyed by device.
#[derive(Debug, Default)]
pub struct SupervisorRegistry {
    tasks: Mutex<HashMap<DeviceIdentity, SupervisorTask>>,
}

impl SupervisorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start supervising `device` with the task built by `spawn`.
    ///
    /// `spawn` is only called when no supervisor is registered for the
    /// device. A finished task left behind by a crashed supervisor is
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySupervised`] if a supervisor is running.
    pub fn start<F>(&self, device: DeviceIdentity, spawn: F) -> Result<()>
    where
        F: FnOnce() -> SupervisorTask,
    {
        let mut tasks = self.tasks.lock();

        if let Some(existing) = tasks.get(&device) {
            if !existing.is_finished() {
                return Err(Error::AlreadySupervised {
                    address: device.address(),
                });
            }
            warn!("[{}] Replacing finished supervisor", device);
        }

        tasks.insert(device, spawn());
        debug!("[{}] Supervisor registered", device);
        Ok(())
    }

    /// Stop the supervisor for `device`.
    ///
    /// Returns `false` if none was registered.
    pub async fn stop(&self, device: DeviceIdentity) -> Result<bool> {
        let task = self.tasks.lock().remove(&device);

        match task {
            Some(task) => {
                task.stop().await?;
                debug!("[{}] Supervisor stopped", device);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether a supervisor is registered for `device`.
    pub fn contains(&self, device: DeviceIdentity) -> bool {
        self.tasks.lock().contains_key(&device)
    }

    /// Whether a registered supervisor for `device` is still running.
    ///
    /// A finished entry does not count; [`start`](Self::start) replaces it.
    pub fn is_running(&self, device: DeviceIdentity) -> bool {
        self.tasks
            .lock()
            .get(&device)
            .map_or(false, |task| !task.is_finished())
    }

    /// All supervised devices, sorted.
    pub fn devices(&self) -> Vec<DeviceIdentity> {
        let mut devices: Vec<_> = self.tasks.lock().keys().copied().collect();
        devices.sort();
        devices
    }

    /// Number of registered supervisors.
    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Whether no supervisors are registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Stop every supervisor.
    ///
    /// All tasks are stopped even if some fail; the first failure is
    /// returned.
    pub async fn shutdown(&self) -> Result<()> {
        let tasks: Vec<_> = self.tasks.lock().drain().map(|(_, task)| task).collect();

        let mut first_error = None;
        for task in tasks {
            let device = task.device();
            if let Err(e) = task.stop().await {
                warn!("[{}] Error stopping supervisor: {}", device, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

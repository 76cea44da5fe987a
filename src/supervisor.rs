//! Connection supervision.
//!
//! A [`Supervisor`] owns the [`ConnectionHandle`] of one scale and keeps the
//! session alive for as long as it runs. It starts disconnected and retries
//! `connect` every scan interval until the scale answers, then checks the
//! session at the same cadence. Every transition between connected and
//! disconnected is published exactly once, so subscribers always see the two
//! kinds alternate, starting with `Connected`.
//!
//! A failed liveness check only counts as a disconnect when the handle also
//! reports the transport as down; otherwise it is logged and ignored.
//! There is no retry limit. The loop ends only when its cancellation token
//! fires, at which point the handle is disconnected and no event is emitted.

use std::future::Future;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace, warn};

use crate::ble::connection::{ConnectionHandle, ConnectionState};
use crate::config::SupervisionConfig;
use crate::error::{Error, Result};
use crate::events::{ConnectionEvent, EventKind, EventPublisher};
use crate::identity::DeviceIdentity;

/// Supervision state machine for one device.
pub struct Supervisor<H, P> {
    device: DeviceIdentity,
    config: SupervisionConfig,
    handle: H,
    publisher: P,
    state: ConnectionState,
}

impl<H, P> Supervisor<H, P>
where
    H: ConnectionHandle,
    P: EventPublisher,
{
    /// Create a supervisor in the `Disconnected` state.
    pub fn new(device: DeviceIdentity, config: SupervisionConfig, handle: H, publisher: P) -> Self {
        Self {
            device,
            config,
            handle,
            publisher,
            state: ConnectionState::Disconnected,
        }
    }

    /// The supervised device.
    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The timing parameters in use.
    pub fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    /// Supervise until `shutdown` is cancelled, then release the handle.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("[{}] Starting supervision", self.device);

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {}
            _ = self.supervise() => {}
        }

        debug!(
            "[{}] Supervision cancelled while {}",
            self.device, self.state
        );

        if let Err(e) = self.bounded(self.handle.disconnect()).await {
            warn!("[{}] Error releasing connection: {}", self.device, e);
        }
    }

    /// The perpetual steady-state loop.
    async fn supervise(&mut self) {
        self.reconnect().await;

        loop {
            tokio::time::sleep(self.config.scan_interval()).await;

            let result = self.bounded(self.handle.keepalive()).await;
            if let Err(e) = result {
                if !self.handle.is_connected() {
                    error!("[{}] BS440 device disconnected: {}", self.device, e);
                    self.set_state(ConnectionState::Disconnected);
                    self.reconnect().await;
                    continue;
                }

                error!("[{}] Error updating BS440 device: {}", self.device, e);
            }
        }
    }

    /// Retry `connect` every scan interval until it succeeds.
    async fn reconnect(&mut self) {
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            self.set_state(ConnectionState::Connecting);

            let result = self.bounded(self.handle.connect()).await;
            match result {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    return;
                }
                Err(e) if e.is_connection_error() => {
                    debug!(
                        "[{}] Connection attempt {} failed: {}",
                        self.device, attempts, e
                    );
                    self.set_state(ConnectionState::Disconnected);
                    tokio::time::sleep(self.config.scan_interval()).await;
                }
                Err(e) => {
                    warn!(
                        "[{}] Connection attempt {} failed unexpectedly: {}",
                        self.device, attempts, e
                    );
                    self.set_state(ConnectionState::Disconnected);
                    tokio::time::sleep(self.config.scan_interval()).await;
                }
            }
        }
    }

    /// Bound a handle operation by the connect timeout.
    async fn bounded(&self, op: impl Future<Output = Result<()>>) -> Result<()> {
        tokio::time::timeout(self.config.connect_timeout(), op)
            .await
            .unwrap_or(Err(Error::Timeout))
    }

    /// Update the state and publish when connectivity flips.
    fn set_state(&mut self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut self.state, new_state);
        if old_state == new_state {
            return;
        }

        trace!(
            "[{}] Connection state changed: {} -> {}",
            self.device,
            old_state,
            new_state
        );

        let kind = match (old_state.is_connected(), new_state.is_connected()) {
            (false, true) => EventKind::Connected,
            (true, false) => EventKind::Disconnected,
            _ => return,
        };

        if kind == EventKind::Connected {
            info!("[{}] BS440 device connected", self.device);
        }

        self.publisher.publish(ConnectionEvent::new(self.device, kind));
    }
}

/// A supervisor running on its own task.
///
/// Dropping the task cancels it.
pub struct SupervisorTask {
    device: DeviceIdentity,
    shutdown: CancellationToken,
    join: JoinHandle<()>,
    _guard: DropGuard,
}

impl SupervisorTask {
    /// Spawn `supervisor` onto the current runtime.
    pub fn spawn<H, P>(supervisor: Supervisor<H, P>) -> Self
    where
        H: ConnectionHandle + 'static,
        P: EventPublisher + 'static,
    {
        let shutdown = CancellationToken::new();
        let device = supervisor.device();
        let join = tokio::spawn(supervisor.run(shutdown.clone()));

        Self {
            device,
            _guard: shutdown.clone().drop_guard(),
            shutdown,
            join,
        }
    }

    /// The supervised device.
    pub fn device(&self) -> DeviceIdentity {
        self.device
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request cancellation without waiting.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Cancel the supervisor and wait until it has released its handle.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        self.join
            .await
            .map_err(|e| Error::Internal(format!("[{}] supervisor task failed: {}", self.device, e)))
    }
}

impl std::fmt::Debug for SupervisorTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorTask")
            .field("device", &self.device)
            .field("finished", &self.is_finished())
            .finish()
    }
}

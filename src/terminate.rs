//! Two-phase process termination.
//!
//! Each control call drives one state machine instance for its target pid:
//! a liveness check, a graceful signal, a detached grace-period wait, and a
//! forced signal only if the process survives the grace window. The caller
//! gets its answer as soon as the graceful signal dispatches; everything
//! after that runs fire-and-forget with its own error containment.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::SampleCache;
use crate::provider::{Liveness, ProbeError, ProcessProbe};

/// Progress of one termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Checking,
    SignaledGraceful,
    AwaitingGracePeriod,
    SignaledForced,
    Confirmed,
    NotFound,
    PermissionDenied,
    Failed,
}

/// Rejection reasons surfaced to the control caller.
#[derive(Debug, Error)]
pub enum TerminateError {
    #[error("process {0} not found")]
    NotFound(u32),
    #[error("not permitted to signal process {0}")]
    PermissionDenied(u32),
    #[error("failed to signal process {0}: {1}")]
    Signal(u32, String),
}

/// Domain events fanned out to every session by the broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    ProcessKilled { pid: u32 },
}

pub struct TerminationController {
    probe: Arc<dyn ProcessProbe>,
    cache: Arc<SampleCache>,
    events: broadcast::Sender<EngineEvent>,
    grace: Duration,
}

impl TerminationController {
    pub fn new(
        probe: Arc<dyn ProcessProbe>,
        cache: Arc<SampleCache>,
        events: broadcast::Sender<EngineEvent>,
        grace: Duration,
    ) -> Self {
        Self {
            probe,
            cache,
            events,
            grace,
        }
    }

    /// Synchronous portion of a termination request. Resolves as soon as the
    /// graceful signal dispatches; the grace-period escalation and the final
    /// confirmation continue in a detached task that survives the requesting
    /// session disconnecting.
    pub async fn terminate(&self, pid: u32) -> Result<(), TerminateError> {
        let mut state = TerminationState::Checking;
        debug!(pid, ?state, "termination requested");

        // EPERM from the zero-effect probe means the pid exists under
        // another owner; the permission classification happens when the real
        // signal is dispatched.
        if self.probe.liveness(pid) == Liveness::NotFound {
            state = TerminationState::NotFound;
            debug!(pid, ?state, "termination rejected");
            return Err(TerminateError::NotFound(pid));
        }

        state = TerminationState::SignaledGraceful;
        if let Err(e) = self.probe.terminate(pid) {
            let (terminal, err) = match e {
                ProbeError::PermissionDenied => (
                    TerminationState::PermissionDenied,
                    TerminateError::PermissionDenied(pid),
                ),
                ProbeError::NotFound => {
                    (TerminationState::NotFound, TerminateError::NotFound(pid))
                }
                ProbeError::Signal(msg) => {
                    (TerminationState::Failed, TerminateError::Signal(pid, msg))
                }
            };
            warn!(pid, state = ?terminal, "graceful signal failed");
            return Err(err);
        }
        debug!(pid, ?state, "graceful signal dispatched");

        state = TerminationState::AwaitingGracePeriod;
        debug!(pid, ?state, "grace period started");

        let probe = Arc::clone(&self.probe);
        let cache = Arc::clone(&self.cache);
        let events = self.events.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            escalate(probe, cache, events, pid, grace).await;
        });

        Ok(())
    }
}

/// Detached tail of the state machine: wait out the grace period, re-check
/// liveness to avoid signaling an already-reaped pid, force only if needed,
/// then confirm: invalidate the process cache and notify every session.
async fn escalate(
    probe: Arc<dyn ProcessProbe>,
    cache: Arc<SampleCache>,
    events: broadcast::Sender<EngineEvent>,
    pid: u32,
    grace: Duration,
) {
    tokio::time::sleep(grace).await;

    match probe.liveness(pid) {
        Liveness::NotFound => {
            debug!(pid, "exited within grace period");
        }
        Liveness::Exists | Liveness::PermissionDenied => {
            let state = TerminationState::SignaledForced;
            debug!(pid, ?state, "still alive after grace period, escalating");
            if let Err(e) = probe.kill(pid) {
                // NotFound here just means the pid exited between the check
                // and the signal; anything else is a terminal failure.
                if !matches!(e, ProbeError::NotFound) {
                    let state = TerminationState::Failed;
                    error!(pid, ?state, "forced signal failed: {e}");
                    return;
                }
            }
        }
    }

    let state = TerminationState::Confirmed;
    info!(pid, ?state, "process terminated");
    cache.invalidate_processes().await;
    let _ = events.send(EngineEvent::ProcessKilled { pid });
}

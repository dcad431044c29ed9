//! Start/stop lifecycle shared by the producer, consumers and the board.

use anyhow::{Context, Result};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::feed::{lock_recover, recover};
use crate::logging::{obj, v_str, warn, Domain};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Stopped,
}

/// Run state plus a condvar so a loop sleeping between iterations can be
/// woken by `stop()` instead of finishing its nap.
#[derive(Debug)]
pub struct LoopControl {
    state: Mutex<RunState>,
    changed: Condvar,
}

impl Default for LoopControl {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopControl {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Idle),
            changed: Condvar::new(),
        }
    }

    pub fn state(&self) -> RunState {
        *lock_recover(&self.state, "loop_state")
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Idle -> Running. Any other state is left alone.
    fn begin(&self) -> bool {
        let mut state = lock_recover(&self.state, "loop_state");
        match *state {
            RunState::Idle => {
                *state = RunState::Running;
                true
            }
            RunState::Running | RunState::Stopped => false,
        }
    }

    /// Running -> Stopped. Idle and Stopped are no-ops.
    fn finish(&self) -> bool {
        let stopped = {
            let mut state = lock_recover(&self.state, "loop_state");
            match *state {
                RunState::Running => {
                    *state = RunState::Stopped;
                    true
                }
                RunState::Idle | RunState::Stopped => false,
            }
        };
        if stopped {
            self.changed.notify_all();
        }
        stopped
    }

    /// Sleep for `period` unless stopped first. Returns whether still running.
    pub fn pause(&self, period: Duration) -> bool {
        let deadline = Instant::now() + period;
        let mut state = lock_recover(&self.state, "loop_state");
        while *state == RunState::Running {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            if remaining.is_zero() {
                break;
            }
            state = recover(self.changed.wait_timeout(state, remaining), "loop_state").0;
        }
        *state == RunState::Running
    }
}

/// A named OS thread running one loop body, stoppable once.
#[derive(Debug)]
pub struct Worker {
    name: String,
    control: Arc<LoopControl>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Worker {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            control: Arc::new(LoopControl::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn state(&self) -> RunState {
        self.control.state()
    }

    /// Spawn `body` on its own thread. Returns `Ok(false)` if the worker was
    /// already started (or already stopped).
    pub fn start<F>(&self, body: F) -> Result<bool>
    where
        F: FnOnce(Arc<LoopControl>) + Send + 'static,
    {
        // Held across spawn so a concurrent stop() joins the handle we store.
        let mut slot = lock_recover(&self.handle, "worker_handle");
        if !self.control.begin() {
            return Ok(false);
        }
        let control = Arc::clone(&self.control);
        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(control));
        match spawned {
            Ok(handle) => {
                *slot = Some(handle);
                Ok(true)
            }
            Err(err) => {
                self.control.finish();
                Err(err).with_context(|| format!("failed to spawn worker {}", self.name))
            }
        }
    }

    /// Request stop and join. Returns `false` if the worker was not running.
    pub fn stop(&self) -> bool {
        if !self.control.finish() {
            return false;
        }
        let handle = lock_recover(&self.handle, "worker_handle").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn(
                    Domain::System,
                    "worker_panicked",
                    obj(&[("worker", v_str(&self.name))]),
                );
            }
        }
        true
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Background maintenance timer.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

struct TimerState {
    stopped: Mutex<bool>,
    wake: Condvar,
}

/// Runs a closure on a named thread at a fixed interval until stopped.
///
/// Ticks never overlap; a slow tick delays the next one.
pub struct PeriodicTask {
    name: String,
    state: Arc<TimerState>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Start the task. The first tick fires one `interval` from now.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let state = Arc::new(TimerState { stopped: Mutex::new(false), wake: Condvar::new() });
        let thread_state = Arc::clone(&state);
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            let mut deadline = Instant::now() + interval;
            loop {
                {
                    let mut stopped =
                        thread_state.stopped.lock().unwrap_or_else(|p| p.into_inner());
                    loop {
                        if *stopped {
                            return;
                        }
                        let now = Instant::now();
                        if now >= deadline {
                            break;
                        }
                        stopped = thread_state
                            .wake
                            .wait_timeout(stopped, deadline - now)
                            .map(|(guard, _)| guard)
                            .unwrap_or_else(|p| p.into_inner().0);
                    }
                }
                tick();
                deadline = Instant::now() + interval;
            }
        })?;

        debug!(task = %name, ?interval, "periodic task started");
        Ok(Self { name, state, handle: Some(handle) })
    }

    /// Stop the task and wait for a running tick to finish.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        *self.state.stopped.lock().unwrap_or_else(|p| p.into_inner()) = true;
        self.state.wake.notify_all();
        if handle.join().is_err() {
            tracing::warn!(task = %self.name, "periodic task panicked");
        }
        debug!(task = %self.name, "periodic task stopped");
    }

    /// Whether the task is still scheduled.
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

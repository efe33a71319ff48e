//! Cancellable scheduled tasks owned by sessions
//!
//! Each task runs its callback behind a gate. Cancelling closes the gate while
//! holding its lock, so a callback that is mid-flight finishes first and no
//! callback starts after `cancel` returns. Aborting the tokio task afterwards
//! only reclaims the timer.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::warn;

#[derive(Debug)]
struct Gate {
    open: Mutex<bool>,
}

impl Gate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Run `f` if the gate is still open
    fn run(&self, f: impl FnOnce()) -> bool {
        match self.open.lock() {
            Ok(open) if *open => {
                f();
                true
            }
            _ => false,
        }
    }

    fn close(&self) {
        let mut open = match self.open.lock() {
            Ok(open) => open,
            Err(poisoned) => poisoned.into_inner(),
        };
        *open = false;
    }

    fn is_open(&self) -> bool {
        self.open.lock().map(|open| *open).unwrap_or(false)
    }
}

/// A timer whose callback is guaranteed not to run after cancellation
#[derive(Debug)]
pub struct ScheduledTask {
    gate: Arc<Gate>,
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Run `tick` every `period`, first after one full period
    pub fn repeating<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let gate = Arc::new(Gate::new());
        let task_gate = gate.clone();

        let handle = spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !task_gate.run(&mut tick) {
                    break;
                }
            }
        });

        Self { gate, handle }
    }

    /// Run `action` once after `delay`
    pub fn delayed<F>(delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let gate = Arc::new(Gate::new());
        let task_gate = gate.clone();

        let handle = spawn(async move {
            sleep(delay).await;
            task_gate.run(action);
            task_gate.close();
        });

        Self { gate, handle }
    }

    pub fn cancel(&self) {
        self.gate.close();
        if let Some(handle) = &self.handle {
            handle.abort();
        }
    }

    /// True once cancelled or, for one-shot tasks, once fired
    pub fn is_finished(&self) -> bool {
        !self.gate.is_open()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn spawn<F>(future: F) -> Option<JoinHandle<()>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => Some(runtime.spawn(future)),
        Err(_) => {
            warn!("No tokio runtime available, scheduled task will never fire");
            None
        }
    }
}

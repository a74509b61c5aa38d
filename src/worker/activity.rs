//! Idle back-off and interruptible waits

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Stop flag shared by the threads of one pool
///
/// Waits through [`ActivitySignal::wait`] return as soon as the signal stops.
#[derive(Debug)]
pub struct ActivitySignal {
    active: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl ActivitySignal {
    pub fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::Release);
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.wake.notify_all();
    }

    /// Sleep for up to `duration`; returns whether the signal is still active
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            if !self.is_active() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            guard = match self.wake.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}

impl Default for ActivitySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Escalating idle waits for one processor thread
///
/// Each idle cycle waits for the next configured duration, staying on the last
/// one; any work resets the sequence.
#[derive(Debug, Clone)]
pub struct ThreadActivity {
    durations: Vec<Duration>,
    index: usize,
}

impl ThreadActivity {
    pub fn new(durations: Vec<Duration>) -> Self {
        let durations = if durations.is_empty() {
            vec![Duration::from_secs(1)]
        } else {
            durations
        };
        Self { durations, index: 0 }
    }

    pub fn current_wait(&self) -> Duration {
        self.durations[self.index]
    }

    pub fn waiting(&mut self, signal: &ActivitySignal) {
        let duration = self.current_wait();
        if self.index + 1 < self.durations.len() {
            self.index += 1;
        }
        signal.wait(duration);
    }

    pub fn working(&mut self) {
        self.index = 0;
    }
}

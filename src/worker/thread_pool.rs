//! Named OS threads running a processor until disposed

use crate::bus::error::{BusResult, ServiceBusError};
use crate::queue::api::QueueHandle;
use crate::worker::activity::ActivitySignal;
use crate::worker::processor::Processor;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct ProcessorThreadPool {
    name: String,
    signal: Arc<ActivitySignal>,
    queues: Vec<QueueHandle>,
    threads: Vec<JoinHandle<()>>,
}

impl ProcessorThreadPool {
    /// Spawn `thread_count` threads, each driving its own processor
    ///
    /// `queues` are resumed here and interrupted on dispose so threads blocked
    /// in a receive wake up. If a thread cannot be spawned the threads already running are
    /// stopped and joined before the error is returned.
    pub fn start<F>(
        name: &str,
        thread_count: usize,
        queues: Vec<QueueHandle>,
        mut processor_factory: F,
    ) -> BusResult<Self>
    where
        F: FnMut() -> Box<dyn Processor>,
    {
        for queue in &queues {
            queue.resume();
        }

        let mut pool = Self {
            name: name.to_string(),
            signal: Arc::new(ActivitySignal::new()),
            queues,
            threads: Vec::new(),
        };

        let thread_count = thread_count.max(1);
        for index in 0..thread_count {
            let thread_name = format!("{}-{}", name, index + 1);
            let processor = processor_factory();
            let signal = Arc::clone(&pool.signal);
            let loop_name = thread_name.clone();
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || run(&loop_name, processor, &signal))
                .map_err(|e| ServiceBusError::ThreadStart {
                    name: thread_name,
                    message: e.to_string(),
                })?;
            pool.threads.push(handle);
        }

        log::info!("Started {} '{}' processor thread(s)", thread_count, name);
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn is_active(&self) -> bool {
        self.signal.is_active()
    }

    /// Stop every thread and wait for it to exit
    pub fn dispose(&mut self) {
        if self.threads.is_empty() && !self.signal.is_active() {
            return;
        }
        self.signal.stop();
        for queue in &self.queues {
            queue.interrupt();
        }
        for handle in self.threads.drain(..) {
            let thread_name = handle.thread().name().unwrap_or("processor").to_string();
            if handle.join().is_err() {
                log::error!("Processor thread '{}' terminated abnormally", thread_name);
            }
        }
        log::info!("Stopped '{}' processor threads", self.name);
    }
}

impl Drop for ProcessorThreadPool {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn run(name: &str, mut processor: Box<dyn Processor>, signal: &ActivitySignal) {
    log::debug!("Processor thread '{}' started", name);
    while signal.is_active() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| processor.execute(signal))) {
            log::error!(
                "Processor thread '{}' recovered from a panic: {}",
                name,
                panic_message(panic.as_ref())
            );
        }
    }
    log::debug!("Processor thread '{}' stopped", name);
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    struct Counting {
        executions: Arc<AtomicUsize>,
        panic_on_first: bool,
    }

    impl Processor for Counting {
        fn execute(&mut self, signal: &ActivitySignal) {
            let previous = self.executions.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_first && previous == 0 {
                panic!("first execution fails");
            }
            signal.wait(Duration::from_millis(5));
        }
    }

    fn wait_for(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_dispose_joins_and_stops_executions() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executions);
        let mut pool = ProcessorThreadPool::start("test-pool", 3, Vec::new(), || {
            Box::new(Counting {
                executions: Arc::clone(&counter),
                panic_on_first: false,
            })
        })
        .unwrap();
        assert_eq!(pool.thread_count(), 3);

        wait_for(|| executions.load(Ordering::SeqCst) >= 3);
        pool.dispose();
        let after_dispose = executions.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));

        assert!(!pool.is_active());
        assert_eq!(pool.thread_count(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), after_dispose);
    }

    #[test]
    fn test_panicking_execution_does_not_end_the_thread() {
        let executions = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&executions);
        let mut pool = ProcessorThreadPool::start("panicky", 1, Vec::new(), || {
            Box::new(Counting {
                executions: Arc::clone(&counter),
                panic_on_first: true,
            })
        })
        .unwrap();

        wait_for(|| executions.load(Ordering::SeqCst) >= 3);
        pool.dispose();

        assert!(executions.load(Ordering::SeqCst) >= 3);
    }
}

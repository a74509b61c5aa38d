//! Process shutdown coordination for the relaybus binary
//!
//! The bus itself runs on plain OS threads; the binary parks its main thread
//! on a small tokio runtime that listens for termination signals and then
//! calls `ServiceBus::stop()`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Coordinates graceful shutdown across the application
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    shutdown_requested: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    pub fn new() -> (Self, broadcast::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let coordinator = Self {
            shutdown_tx,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };
        (coordinator, shutdown_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Install signal handlers that trigger this coordinator
    ///
    /// A second signal exits the process immediately with status 130.
    pub fn install_signal_handlers(&self) {
        setup_signal_handlers(self.shutdown_tx.clone(), self.shutdown_requested.clone());
    }

    /// Block the current async task until shutdown is requested
    pub async fn wait(&self) {
        if self.is_shutdown_requested() {
            return;
        }
        let mut rx = self.subscribe();
        // Lagged or closed both mean a shutdown was broadcast
        let _ = rx.recv().await;
    }
}

fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>, shutdown_requested: Arc<AtomicBool>) {
    let signal_count = Arc::new(AtomicUsize::new(0));

    let notify = move |tx: &broadcast::Sender<()>, requested: &AtomicBool, counter: &AtomicUsize| {
        let prev = counter.fetch_add(1, Ordering::AcqRel);
        requested.store(true, Ordering::Release);
        let _ = tx.send(());
        if prev >= 1 {
            log::warn!("Second termination signal received; exiting");
            std::process::exit(130);
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }

        for kind in [SignalKind::interrupt(), SignalKind::terminate(), SignalKind::hangup()] {
            let tx = shutdown_tx.clone();
            let requested = shutdown_requested.clone();
            let counter = signal_count.clone();
            tokio::spawn(async move {
                if let Ok(mut sig) = signal(kind) {
                    while sig.recv().await.is_some() {
                        notify(&tx, &requested, &counter);
                    }
                }
            });
        }
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                notify(&shutdown_tx, &shutdown_requested, &signal_count);
            }
        });
    }
}

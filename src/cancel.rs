//! Cooperative cancellation for a pipeline run.
//!
//! A [`CancelHandle`] flips a `watch` channel once; every [`CancelSignal`] cloned
//! from it observes the flip. The retry envelope races each attempt and each
//! backoff sleep against [`CancelSignal::cancelled`], so outstanding work is
//! dropped as soon as the signal fires.

use tokio::sync::watch;
use tracing::info;

/// Sender side of the cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver side of the cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelHandle {
    /// Create a handle and the signal it controls.
    #[must_use]
    pub fn new_pair() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                tx,
            },
            CancelSignal {
                rx: Some(rx),
            },
        )
    }

    /// Request cancellation. Calling this more than once is harmless.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    /// A signal that never fires, for callers that do not support cancellation.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            rx: None,
        }
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves when cancellation is requested. Pending forever if the handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(mut rx) = self.rx.clone() else {
            return std::future::pending().await;
        };
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Cancel `handle` when the process receives Ctrl-C or SIGTERM.
pub fn cancel_on_shutdown_signal(handle: CancelHandle) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received SIGINT (Ctrl+C), cancelling"),
            () = terminate => info!("Received SIGTERM, cancelling"),
        }

        handle.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_is_observed() {
        let (handle, signal) = CancelHandle::new_pair();
        assert!(!signal.is_cancelled());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
        assert!(signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_never_does_not_fire() {
        let signal = CancelSignal::never();
        let result = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(result.is_err());
        assert!(!signal.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_fire() {
        let (handle, signal) = CancelHandle::new_pair();
        drop(handle);
        let result = tokio::time::timeout(Duration::from_millis(50), signal.cancelled()).await;
        assert!(result.is_err());
    }
}

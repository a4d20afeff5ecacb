//! Cooperative shutdown. Workers poll the handle at every loop iteration and
//! every timed wait, so SIGINT/SIGTERM drains within roughly one poll
//! interval.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

impl Shutdown {
    /// Installs SIGINT/SIGTERM handlers and returns the shared handle.
    pub fn install() -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut sigterm =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("install SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            #[cfg(not(unix))]
            {
                let _ = ctrl_c.await;
            }
            info!("shutdown signal received");
            let _ = tx.send(true);
        });
        Self { rx }
    }

    /// Unsignaled pair for tests and embedded use.
    pub fn manual() -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { rx }, ShutdownHandle { tx })
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleeps up to `timeout`; returns true when shutdown fired first.
    pub async fn wait_timeout(&mut self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(timeout) => false,
            changed = self.rx.changed() => changed.is_ok() && *self.rx.borrow(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_trigger_wakes_waiters() {
        let (mut shutdown, handle) = Shutdown::manual();
        assert!(!shutdown.is_triggered());

        handle.trigger();
        assert!(shutdown.wait_timeout(Duration::from_secs(5)).await);
        assert!(shutdown.is_triggered());
    }

    #[tokio::test]
    async fn wait_timeout_expires_without_signal() {
        let (mut shutdown, _handle) = Shutdown::manual();
        assert!(!shutdown.wait_timeout(Duration::from_millis(5)).await);
    }
}

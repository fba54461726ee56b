use crate::models::Security;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// Sending half of the shutdown flag, held by the signal watcher
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // No receivers left means nothing to stop
        let _ = self.tx.send(true);
    }
}

/// Cooperative shutdown flag
///
/// Observed only at wait points: an in-flight brokerage call always completes.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn channel() -> (ShutdownTrigger, Shutdown) {
        let (tx, rx) = watch::channel(false);
        (ShutdownTrigger { tx }, Shutdown { rx })
    }

    /// A flag that is never raised
    pub fn never() -> Self {
        let (_, shutdown) = Self::channel();
        shutdown
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|raised| *raised).await.is_err() {
            // Trigger dropped without firing
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration`, returning true if interrupted first
    pub async fn sleep(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.requested() => true,
        }
    }
}

/// Wait after the `attempt`th consecutive upstream failure, doubling each time
pub fn upstream_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(10))
}

/// State of the buy/sell cycle currently in flight
///
/// Owned by the controller for one cycle; the interrupt path reads the pending
/// order from here instead of from any global.
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub id: Uuid,
    pub security: Security,
    pub started_at: DateTime<Utc>,
    /// Buy order submitted and not yet filled or canceled
    pub pending_buy: Option<String>,
    /// Sell order listed and not yet filled
    pub pending_sell: Option<String>,
    pub extension_used: bool,
}

impl CycleContext {
    pub fn new(security: Security) -> Self {
        Self {
            id: Uuid::new_v4(),
            security,
            started_at: Utc::now(),
            pending_buy: None,
            pending_sell: None,
            extension_used: false,
        }
    }

    pub fn elapsed(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

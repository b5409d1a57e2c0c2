//! Network availability signal
//!
//! The host application knows when the device goes offline (OS
//! notifications, browser events); it feeds that into a
//! [`NetworkStatusMonitor`], and the request pipeline consults it before
//! every attempt.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shared online/offline flag. Cloning shares the same state.
#[derive(Debug, Clone)]
pub struct NetworkStatusMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl NetworkStatusMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender: Arc::new(sender) }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Record a connectivity change. Subscribers are notified only when the
    /// value actually changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "network status changed");
        }
    }

    /// Observe connectivity changes.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for NetworkStatusMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_changes_only() {
        let monitor = NetworkStatusMonitor::default();
        let mut rx = monitor.subscribe();
        assert!(monitor.is_online());

        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }
}

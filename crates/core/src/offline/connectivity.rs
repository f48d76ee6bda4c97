use log::info;
use std::sync::Arc;
use tokio::sync::watch;

/// Boolean "is online" signal with change notifications.
///
/// The platform layer feeds reachability changes through [`set_online`]; the offline
/// queue reads the current value and subscribes to transitions.
///
/// [`set_online`]: ConnectivityMonitor::set_online
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (sender, _) = watch::channel(initially_online);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Publishes a new state. Returns true when it differs from the previous one.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(
                "[Connectivity] Device is now {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_transitions_only() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        rx.changed().await.expect("changed");
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());

        let clone = monitor.clone();
        assert!(clone.set_online(true));
        rx.changed().await.expect("changed");
        assert!(*rx.borrow_and_update());
        assert!(monitor.is_online());
    }
}

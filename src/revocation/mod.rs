pub mod ws;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryOp {
    Register,
    Delete,
    DeleteAll,
}

/// Fan-out payload. Delivery is at-most-once and best-effort; lagged
/// subscribers lose events, so consumers keep a polling backstop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevocationEvent {
    /// Sign this device out now. No device_id targets every device.
    ForcedLogout { device_id: Option<String> },
    /// A session row for this user changed; re-check local validity.
    RegistryChanged { op: RegistryOp },
}

impl RevocationEvent {
    /// Whether a subscriber holding `device_id` should act on a forced logout.
    pub fn targets_device(&self, device_id: &str) -> bool {
        match self {
            RevocationEvent::ForcedLogout { device_id: None } => true,
            RevocationEvent::ForcedLogout {
                device_id: Some(target),
            } => target == device_id,
            RevocationEvent::RegistryChanged { .. } => false,
        }
    }
}

/// Per-user broadcast channels. One sender per user with live subscribers;
/// senders are pruned once the last receiver is gone.
pub struct RevocationHub {
    channels: Mutex<HashMap<String, broadcast::Sender<RevocationEvent>>>,
}

impl Default for RevocationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RevocationHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, user_id: &str) -> broadcast::Receiver<RevocationEvent> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    fn send(&self, user_id: &str, event: RevocationEvent) -> usize {
        let mut channels = self.channels.lock().unwrap();
        let Some(sender) = channels.get(user_id) else {
            return 0;
        };

        if sender.receiver_count() == 0 {
            channels.remove(user_id);
            return 0;
        }

        sender.send(event).unwrap_or(0)
    }

    /// Direct forced-logout broadcast; `device_id = None` hits every device.
    pub fn broadcast_logout(&self, user_id: &str, device_id: Option<String>) -> usize {
        let delivered = self.send(user_id, RevocationEvent::ForcedLogout { device_id });
        tracing::debug!(user_id, delivered, "forced logout broadcast");
        delivered
    }

    /// Secondary delivery path: every registry mutation is observable as a
    /// change event, independent of explicit broadcasts.
    pub fn notify_change(&self, user_id: &str, op: RegistryOp) -> usize {
        self.send(user_id, RevocationEvent::RegistryChanged { op })
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.channels
            .lock()
            .unwrap()
            .get(user_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let hub = RevocationHub::new();
        let mut a = hub.subscribe("u1");
        let mut b = hub.subscribe("u1");

        assert_eq!(hub.broadcast_logout("u1", None), 2);

        let ev = a.recv().await.unwrap();
        assert!(ev.targets_device("dev-a"));
        let ev = b.recv().await.unwrap();
        assert!(ev.targets_device("dev-b"));
    }

    #[tokio::test]
    async fn targeted_logout_only_matches_named_device() {
        let hub = RevocationHub::new();
        let mut rx = hub.subscribe("u1");

        hub.broadcast_logout("u1", Some("dev-a".into()));
        let ev = rx.recv().await.unwrap();

        assert!(ev.targets_device("dev-a"));
        assert!(!ev.targets_device("dev-b"));
    }

    #[tokio::test]
    async fn change_events_never_target_devices_directly() {
        let hub = RevocationHub::new();
        let mut rx = hub.subscribe("u1");

        hub.notify_change("u1", RegistryOp::DeleteAll);
        let ev = rx.recv().await.unwrap();

        assert!(matches!(ev, RevocationEvent::RegistryChanged { op: RegistryOp::DeleteAll }));
        assert!(!ev.targets_device("dev-a"));
    }

    #[tokio::test]
    async fn events_scoped_per_user() {
        let hub = RevocationHub::new();
        let mut other = hub.subscribe("u2");

        hub.subscribe("u1"); // keep the u1 channel alive
        hub.broadcast_logout("u1", None);

        assert!(matches!(
            other.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn dropped_subscribers_prune_the_channel() {
        let hub = RevocationHub::new();
        {
            let _rx = hub.subscribe("u1");
            assert_eq!(hub.subscriber_count("u1"), 1);
        }
        assert_eq!(hub.broadcast_logout("u1", None), 0);
        assert_eq!(hub.subscriber_count("u1"), 0);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::client::DeviceRegistry;
use crate::device::DeviceId;
use crate::provider::{IdentityProvider, SignOutScope};
use crate::revocation::RevocationEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Checking,
    Authorized,
    /// Terminal for this mounted instance; navigating away and remounting
    /// starts a fresh guard.
    Unauthorized,
}

/// Navigation requests for the surrounding UI shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardEvent {
    RedirectToLogin,
    RedirectToApp,
}

/// Which surface the guard is mounted on. Controls redirect suppression:
/// never bounce to login from the login surface, and push authenticated
/// visitors off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Login,
    Protected,
}

/// Poll cadence tuning; configurable values, not invariants.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub session_poll_interval: Duration,
    pub count_poll_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            session_poll_interval: Duration::from_secs(30),
            count_poll_interval: Duration::from_secs(30),
        }
    }
}

struct GuardInner {
    provider: Arc<dyn IdentityProvider>,
    registry: Arc<dyn DeviceRegistry>,
    device_id: DeviceId,
    surface: Surface,
    state_tx: watch::Sender<GuardState>,
    events_tx: mpsc::UnboundedSender<GuardEvent>,
    signed_out: AtomicBool,
}

impl GuardInner {
    /// The single convergence point for every revocation trigger: push
    /// events, the session poll and the count poll all end up here.
    async fn force_sign_out(&self, reason: &str) {
        if self.signed_out.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(reason, "forcing local sign-out");

        if let Ok(Some(session)) = self.provider.get_session().await {
            if let Err(err) = self
                .provider
                .sign_out(&session.access_token, SignOutScope::Local)
                .await
            {
                // The local credential is gone either way once we flip state.
                warn!(error = %err, "provider sign-out failed during forced logout");
            }
        }

        let _ = self.state_tx.send(GuardState::Unauthorized);
        if self.surface != Surface::Login {
            let _ = self.events_tx.send(GuardEvent::RedirectToLogin);
        }
    }

    fn done(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }

    /// Count reaching zero while we still hold a session is an authoritative
    /// remote revocation: another device's global logout deleted our row and
    /// the push event raced past us.
    async fn check_device_count(&self) {
        let token = match self.provider.get_session().await {
            Ok(Some(session)) => session.access_token,
            Ok(None) => {
                self.force_sign_out("session disappeared").await;
                return;
            }
            Err(_) => return, // transient; next tick retries
        };

        match self.registry.device_count(&token).await {
            Ok(0) => self.force_sign_out("device count reached zero").await,
            Ok(count) => debug!(count, "device count ok"),
            Err(err) => debug!(error = %err, "device count poll failed"),
        }
    }
}

/// Watches a mounted session: realtime revocation events plus two polling
/// backstops, all converging on one forced-sign-out path. All timers and the
/// subscription are torn down on shutdown/drop.
pub struct SessionGuard {
    state_rx: watch::Receiver<GuardState>,
    events_rx: Option<mpsc::UnboundedReceiver<GuardEvent>>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionGuard {
    pub async fn mount(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn DeviceRegistry>,
        device_id: DeviceId,
        events: broadcast::Receiver<RevocationEvent>,
        surface: Surface,
        config: GuardConfig,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(GuardState::Checking);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(GuardInner {
            provider,
            registry,
            device_id,
            surface,
            state_tx,
            events_tx,
            signed_out: AtomicBool::new(false),
        });

        let mut guard = Self {
            state_rx,
            events_rx: Some(events_rx),
            tasks: Vec::new(),
        };

        // -----------------------------------------
        // Initial check: do we hold a session at all?
        // -----------------------------------------
        let session = inner.provider.get_session().await.ok().flatten();

        let Some(_session) = session else {
            inner.signed_out.store(true, Ordering::SeqCst);
            let _ = inner.state_tx.send(GuardState::Unauthorized);
            if surface != Surface::Login {
                let _ = inner.events_tx.send(GuardEvent::RedirectToLogin);
            }
            return guard;
        };

        // Authenticated client sitting on the login surface: send it home.
        if surface == Surface::Login {
            let _ = inner.events_tx.send(GuardEvent::RedirectToApp);
        }

        let _ = inner.state_tx.send(GuardState::Authorized);

        guard.tasks.push(spawn_subscription_task(inner.clone(), events));
        guard
            .tasks
            .push(spawn_session_poll(inner.clone(), config.session_poll_interval));
        guard
            .tasks
            .push(spawn_count_poll(inner, config.count_poll_interval));

        guard
    }

    pub fn state(&self) -> GuardState {
        *self.state_rx.borrow()
    }

    /// Resolves once the guard leaves `current`. Used by shells that block on
    /// state changes instead of polling.
    pub async fn state_changed(&mut self) -> GuardState {
        let _ = self.state_rx.changed().await;
        *self.state_rx.borrow()
    }

    /// Navigation events; the consumer owns the receiving end.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<GuardEvent>> {
        self.events_rx.take()
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ------------------------------------------------------------
// TRIGGER 1: realtime revocation stream
// ------------------------------------------------------------
fn spawn_subscription_task(
    inner: Arc<GuardInner>,
    mut events: broadcast::Receiver<RevocationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if inner.done() {
                break;
            }
            match events.recv().await {
                Ok(event) => match &event {
                    RevocationEvent::ForcedLogout { .. } => {
                        if event.targets_device(inner.device_id.as_str()) {
                            inner.force_sign_out("revocation broadcast").await;
                            break;
                        }
                    }
                    // Row change: re-evaluate immediately instead of waiting
                    // for the next poll tick.
                    RevocationEvent::RegistryChanged { .. } => {
                        inner.check_device_count().await;
                        if inner.done() {
                            break;
                        }
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "revocation subscription lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ------------------------------------------------------------
// TRIGGER 2: local session validity poll
// ------------------------------------------------------------
fn spawn_session_poll(inner: Arc<GuardInner>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await; // immediate first tick, skip it

        loop {
            ticker.tick().await;
            if inner.done() {
                break;
            }
            match inner.provider.get_session().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    inner.force_sign_out("session disappeared").await;
                    break;
                }
                Err(_) => {} // transient; next tick retries
            }
        }
    })
}

// ------------------------------------------------------------
// TRIGGER 3: device-count poll (consistency backstop for the push channel)
// ------------------------------------------------------------
fn spawn_count_poll(inner: Arc<GuardInner>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if inner.done() {
                break;
            }
            inner.check_device_count().await;
        }
    })
}

//! Lifecycle of the single push connection.
//!
//! ```text
//! Uninitialized --(delayed connect)--> Connecting --(ok)--> Connected
//! Connected --(server/transport close)--> Disconnected --(backoff)--> Connecting
//! Connected --(disconnect())--> Disconnected
//! any --(transport error)--> Errored
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use fieldhouse_shared::{ClientCommand, ConnectionError, WsEnvelope};
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{
    ConnectionState, Connector, DisconnectReason, Link, LinkEvent, ReconnectPolicy,
};
use super::router::EventRouter;
use crate::config::ClientConfig;

/// Owns the push connection: delayed first connect, channel subscription,
/// reconnect on remote close, and teardown.
///
/// Cloning is cheap; all clones drive the same connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    url: String,
    channels: Vec<String>,
    connect_delay: Duration,
    reconnect: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    router: Arc<EventRouter>,
    state: watch::Sender<ConnectionState>,
    connected: watch::Sender<bool>,
    last_error: watch::Sender<Option<String>>,
    link: Mutex<Option<ActiveLink>>,
    tasks: Mutex<Tasks>,
    /// Ticket of the newest connect attempt. Bumped by `begin_connect` and by
    /// cancellation, so a stale handshake can tell it was superseded.
    attempt: AtomicU64,
    generation: AtomicU64,
    transport_connects: AtomicU64,
    torn_down: AtomicBool,
}

struct ActiveLink {
    generation: u64,
    outbound: UnboundedSender<String>,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct Tasks {
    scheduled: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Tasks {
    fn abort_all(&mut self) {
        for handle in [self.scheduled.take(), self.reconnect.take()].into_iter().flatten() {
            handle.abort();
        }
    }
}

impl ConnectionManager {
    pub fn new(
        config: &ClientConfig,
        connector: Arc<dyn Connector>,
        router: Arc<EventRouter>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Uninitialized);
        let (connected, _) = watch::channel(false);
        let (last_error, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                url: config.ws_url_with_token(),
                channels: config.channels.clone(),
                connect_delay: config.connect_delay,
                reconnect: config.reconnect.clone(),
                connector,
                router,
                state,
                connected,
                last_error,
                link: Mutex::new(None),
                tasks: Mutex::new(Tasks::default()),
                attempt: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                transport_connects: AtomicU64::new(0),
                torn_down: AtomicBool::new(false),
            }),
        }
    }

    /// Connect after the configured startup delay, on a background task.
    /// Scheduling again replaces a pending attempt.
    pub fn schedule_connect(&self) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.connect_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else { return };
            if let Err(e) = (ConnectionManager { inner }).connect().await {
                crate::log_error!("scheduled connect failed: {}", e);
            }
        });
        let mut tasks = self.inner.lock_tasks();
        if let Some(previous) = tasks.scheduled.replace(handle) {
            previous.abort();
        }
    }

    /// Open the connection unless it is already open or opening.
    ///
    /// On success the manager is `Connected`, the stored error is cleared and
    /// the subscription request has been queued. On failure it is `Errored`
    /// with the error text stored; no retry is scheduled. A handshake
    /// overtaken by [`disconnect`](Self::disconnect) returns
    /// [`ConnectionError::Cancelled`] and its link is dropped.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        if self.inner.torn_down.load(Ordering::SeqCst) {
            return Err(ConnectionError::TornDown);
        }
        let Some(ticket) = self.inner.begin_connect() else {
            crate::log_debug!(
                "connect() skipped, connection is {:?}",
                *self.inner.state.borrow()
            );
            return Ok(());
        };
        // Resets `Connecting` if this future is dropped mid-handshake.
        let _pending = PendingConnect {
            inner: &self.inner,
            ticket,
        };

        self.inner.transport_connects.fetch_add(1, Ordering::SeqCst);
        crate::log_info!("connecting to {}", self.inner.url);
        match self.inner.connector.connect(&self.inner.url).await {
            Ok(link) => {
                if Inner::open(&self.inner, link, ticket) {
                    Ok(())
                } else if self.inner.torn_down.load(Ordering::SeqCst) {
                    Err(ConnectionError::TornDown)
                } else {
                    crate::log_info!("handshake finished after disconnect, link dropped");
                    Err(ConnectionError::Cancelled)
                }
            }
            Err(err) => {
                if self.inner.is_current(ticket) {
                    self.inner.fail(err.to_string());
                }
                Err(err)
            }
        }
    }

    /// Close the connection on purpose. No automatic reconnect follows.
    ///
    /// Pending and in-flight connects are cancelled too; the manager stays
    /// `Disconnected` until the next explicit [`connect`](Self::connect).
    pub fn disconnect(&self) {
        self.inner.lock_tasks().abort_all();
        self.inner.cancel_connect();
        self.inner.close_link();
    }

    /// Stop everything: unregister all event handlers, cancel pending
    /// connect/reconnect tasks and force-close the link.
    pub fn teardown(&self) {
        self.inner.torn_down.store(true, Ordering::SeqCst);
        self.inner.router.unregister_all();
        self.inner.lock_tasks().abort_all();
        self.inner.cancel_connect();
        self.inner.close_link();
        crate::log_info!("connection manager torn down");
    }

    /// Send a command over the open link.
    pub fn send(&self, command: ClientCommand) -> Result<(), ConnectionError> {
        let link = self.inner.lock_link();
        let link = link.as_ref().ok_or(ConnectionError::NotConnected)?;
        Inner::send_on(&link.outbound, command)
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn last_error(&self) -> watch::Receiver<Option<String>> {
        self.inner.last_error.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.last_error.borrow().clone()
    }

    /// How many connect attempts actually reached the transport.
    pub fn transport_connects(&self) -> u64 {
        self.inner.transport_connects.load(Ordering::SeqCst)
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.inner.router
    }
}

impl Inner {
    fn lock_link(&self) -> std::sync::MutexGuard<'_, Option<ActiveLink>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: ConnectionState) {
        let connected = next.is_connected();
        self.state.send_replace(next);
        self.connected.send_if_modified(|c| {
            let changed = *c != connected;
            *c = connected;
            changed
        });
    }

    /// Atomically move to `Connecting` unless already connected or connecting.
    /// Returns the ticket identifying this attempt.
    fn begin_connect(&self) -> Option<u64> {
        let mut ticket = None;
        self.state.send_if_modified(|state| match state {
            ConnectionState::Connected | ConnectionState::Connecting => false,
            _ => {
                *state = ConnectionState::Connecting;
                ticket = Some(self.attempt.fetch_add(1, Ordering::SeqCst) + 1);
                true
            }
        });
        ticket
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.attempt.load(Ordering::SeqCst) == ticket
    }

    /// Supersede whatever attempt is in flight and leave `Connecting`.
    fn cancel_connect(&self) {
        self.state.send_if_modified(|state| {
            self.attempt.fetch_add(1, Ordering::SeqCst);
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
    }

    /// Leave `Connecting` if attempt `ticket` still owns it.
    fn abandon_connect(&self, ticket: u64) {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting && self.is_current(ticket) {
                *state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        });
    }

    fn fail(&self, message: String) {
        crate::log_error!("connection error: {}", message);
        self.last_error.send_replace(Some(message));
        self.set_state(ConnectionState::Errored);
    }

    fn send_on(outbound: &UnboundedSender<String>, command: ClientCommand) -> Result<(), ConnectionError> {
        let json = serde_json::to_string(&WsEnvelope::new(command))
            .map_err(|e| ConnectionError::Transport(e.to_string()))?;
        outbound
            .unbounded_send(json)
            .map_err(|e| ConnectionError::Transport(format!("failed to send: {e}")))
    }

    /// Install a freshly opened link for attempt `ticket`. Returns false (and
    /// drops the link) when the attempt was cancelled or the manager torn down.
    fn open(this: &Arc<Self>, link: Link, ticket: u64) -> bool {
        let Link { outbound, inbound } = link;

        // Cancellation bumps the ticket before taking the slot, so checking
        // under the slot lock is enough.
        let mut slot = this.lock_link();
        if this.torn_down.load(Ordering::SeqCst) || !this.is_current(ticket) {
            return false;
        }
        let generation = this.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Connected before the pump starts, so the link's own close or error
        // always lands after it.
        this.set_state(ConnectionState::Connected);
        this.last_error.send_replace(None);

        let pump = tokio::spawn(pump(Arc::downgrade(this), generation, inbound));
        if let Some(stale) = slot.replace(ActiveLink {
            generation,
            outbound: outbound.clone(),
            pump,
        }) {
            stale.pump.abort();
        }
        drop(slot);
        crate::log_info!("connected, subscribing to {:?}", this.channels);

        if let Err(e) = Self::send_on(&outbound, ClientCommand::subscribe(&this.channels)) {
            crate::log_warn!("subscription request not sent: {}", e);
        }
        true
    }

    /// Local close: drop the link without triggering a reconnect.
    fn close_link(&self) {
        let Some(link) = self.lock_link().take() else {
            return;
        };
        link.pump.abort();
        link.outbound.close_channel();
        self.set_state(ConnectionState::Disconnected);
        crate::log_info!("disconnected ({:?})", DisconnectReason::ClientClosed);
    }

    /// Take the link if it is still the one identified by `generation`.
    fn release_link(&self, generation: u64) -> Option<ActiveLink> {
        let mut slot = self.lock_link();
        match slot.as_ref() {
            Some(link) if link.generation == generation => slot.take(),
            _ => None,
        }
    }

    fn on_closed(this: &Arc<Self>, generation: u64, reason: DisconnectReason) {
        if this.release_link(generation).is_none() {
            return;
        }
        this.set_state(ConnectionState::Disconnected);
        crate::log_info!("disconnected ({:?})", reason);

        if reason.is_remote() && !this.torn_down.load(Ordering::SeqCst) {
            Self::start_reconnect(this);
        }
    }

    fn on_error(&self, generation: u64, message: String) {
        let Some(link) = self.release_link(generation) else {
            crate::log_debug!("ignoring error from stale link: {}", message);
            return;
        };
        link.outbound.close_channel();
        self.fail(message);
    }

    fn start_reconnect(this: &Arc<Self>) {
        let weak = Arc::downgrade(this);
        let policy = this.reconnect.clone();
        let handle = tokio::spawn(async move {
            let mut attempt = 0u32;
            while policy.allows(attempt) {
                let delay = policy.delay_for_attempt(attempt);
                crate::log_info!("reconnecting in {:?} (attempt {})", delay, attempt + 1);
                tokio::time::sleep(delay).await;
                attempt += 1;

                let Some(inner) = weak.upgrade() else { return };
                match (ConnectionManager { inner }).connect().await {
                    Ok(()) => return,
                    Err(ConnectionError::TornDown | ConnectionError::Cancelled) => return,
                    Err(e) => crate::log_warn!("reconnect attempt {} failed: {}", attempt, e),
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner.fail(ConnectionError::ReconnectExhausted { attempts: attempt }.to_string());
            }
        });

        let mut tasks = this.lock_tasks();
        if let Some(previous) = tasks.reconnect.replace(handle) {
            previous.abort();
        }
    }
}

/// Drop guard for an in-flight `connect()`.
struct PendingConnect<'a> {
    inner: &'a Inner,
    ticket: u64,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        self.inner.abandon_connect(self.ticket);
    }
}

/// Feed inbound link events to the router until the link ends.
async fn pump(inner: Weak<Inner>, generation: u64, mut inbound: UnboundedReceiver<LinkEvent>) {
    while let Some(event) = inbound.next().await {
        let Some(this) = inner.upgrade() else { return };
        match event {
            LinkEvent::Frame(text) => {
                this.router.dispatch_frame(&text);
            }
            LinkEvent::Closed(reason) => {
                Inner::on_closed(&this, generation, reason);
                return;
            }
            LinkEvent::Error(message) => {
                this.on_error(generation, message);
                return;
            }
        }
    }
    if let Some(this) = inner.upgrade() {
        Inner::on_closed(
            &this,
            generation,
            DisconnectReason::TransportLost("link ended".to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures_channel::mpsc::unbounded;

    use super::*;
    use crate::stores::{ChatStore, NotificationStore};

    /// Hands out links whose remote ends are kept alive for the test.
    #[derive(Default)]
    struct HeldLinks {
        held: Mutex<Vec<(UnboundedSender<LinkEvent>, UnboundedReceiver<String>)>>,
    }

    #[async_trait]
    impl Connector for HeldLinks {
        async fn connect(&self, _url: &str) -> Result<Link, ConnectionError> {
            let (event_tx, inbound) = unbounded();
            let (outbound, frame_rx) = unbounded();
            self.held.lock().unwrap().push((event_tx, frame_rx));
            Ok(Link { outbound, inbound })
        }
    }

    fn manager() -> ConnectionManager {
        let router = Arc::new(EventRouter::new(
            Arc::new(ChatStore::default()),
            Arc::new(NotificationStore::new()),
        ));
        ConnectionManager::new(
            &ClientConfig::default(),
            Arc::new(HeldLinks::default()),
            router,
        )
    }

    #[tokio::test]
    async fn errors_from_a_replaced_link_are_ignored() {
        let manager = manager();
        manager.connect().await.unwrap();
        let current = manager.inner.lock_link().as_ref().unwrap().generation;

        manager.inner.on_error(current + 7, "late error".to_string());
        assert_eq!(manager.current_state(), ConnectionState::Connected);
        assert!(manager.error().is_none());

        manager.inner.on_error(current, "reset".to_string());
        assert_eq!(manager.current_state(), ConnectionState::Errored);
        assert_eq!(manager.error().as_deref(), Some("reset"));
    }

    #[tokio::test]
    async fn superseded_ticket_cannot_open_a_link() {
        let manager = manager();
        let ticket = manager.inner.begin_connect().unwrap();
        assert!(manager.inner.begin_connect().is_none());

        manager.inner.cancel_connect();
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);

        let (outbound, _frames) = unbounded();
        let (_events, inbound) = unbounded();
        assert!(!Inner::open(&manager.inner, Link { outbound, inbound }, ticket));
        assert!(manager.inner.lock_link().is_none());

        // A dropped attempt that no longer owns the state leaves it alone.
        let fresh = manager.inner.begin_connect().unwrap();
        manager.inner.abandon_connect(ticket);
        assert_eq!(manager.current_state(), ConnectionState::Connecting);
        manager.inner.abandon_connect(fresh);
        assert_eq!(manager.current_state(), ConnectionState::Disconnected);
    }
}

//! Event multiplexer
//!
//! Owns the single push-channel subscription of a client session and fans
//! inbound notifications out to attached handles.
//!
//! Dispatch runs synchronously for a whole notification: every attached
//! handle whose filter intersects it is evaluated, in attach order, before
//! the next notification is read from the stream. This gives one total
//! order of delivery across all concurrently attached handles.
//!
//! Handles are evaluated against a snapshot of the registry, so detaching
//! (even from inside a predicate) takes effect from the next notification.

use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wpc_common::{MatchPolicy, Notification, NotificationFilter, TransportError, WireQuery};

use crate::transport::Transport;

/// Predicate evaluated against each notification that passes a filter
pub type Predicate = Arc<dyn Fn(&Notification) -> bool + Send + Sync>;

/// Identifies one attached handle; ids grow in attach order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Subscription requested, not yet confirmed by the remote side
    Connecting,
    /// Subscription confirmed; notifications are flowing
    Live,
    /// Closed by the owner or ended by the transport; never reopens
    Closed,
}

enum Sink {
    /// Fires on the first match, then the handle is removed
    Once(Option<oneshot::Sender<Notification>>),
    /// Receives every match until the receiver is dropped
    Stream(mpsc::UnboundedSender<Notification>),
}

struct Registration {
    id: HandleId,
    filter: NotificationFilter,
    predicate: Predicate,
    sink: Mutex<Sink>,
}

impl Registration {
    fn is_one_shot(&self) -> bool {
        matches!(*lock(&self.sink), Sink::Once(_))
    }
}

struct Shared {
    registrations: Mutex<Vec<Arc<Registration>>>,
    next_id: AtomicU64,
    state: watch::Sender<ChannelState>,
    closed_reason: Mutex<Option<TransportError>>,
    policy: MatchPolicy,
    dispatched: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// One-shot handle returned by [`Multiplexer::attach`]
pub struct Attachment {
    pub id: HandleId,
    /// Resolves with the first matching notification; errors once the
    /// handle is detached or the channel closes without a match
    pub receiver: oneshot::Receiver<Notification>,
}

/// Persistent handle returned by [`Multiplexer::watch`]
///
/// Receives every matching notification in dispatch order. Detaches on drop.
pub struct NotificationWatch {
    id: HandleId,
    receiver: mpsc::UnboundedReceiver<Notification>,
    mux: Multiplexer,
}

impl NotificationWatch {
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Next matching notification; `None` once the channel closed
    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }
}

impl Drop for NotificationWatch {
    fn drop(&mut self) {
        self.mux.detach(self.id);
    }
}

/// Shared handle to the session's push-channel multiplexer
#[derive(Clone)]
pub struct Multiplexer {
    shared: Arc<Shared>,
}

impl Multiplexer {
    /// Create a multiplexer in the `Connecting` state
    pub fn new(policy: MatchPolicy) -> Self {
        let (state, _) = watch::channel(ChannelState::Connecting);
        Self {
            shared: Arc::new(Shared {
                registrations: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                state,
                closed_reason: Mutex::new(None),
                policy,
                dispatched: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// Open the push channel
    ///
    /// Spawns the subscription task; the state moves to `Live` once the
    /// transport confirms the subscription. Only the first call has any
    /// effect: a session owns exactly one subscription.
    pub fn open(&self, transport: Arc<dyn Transport>, updates: WireQuery) {
        let mut task = lock(&self.shared.task);
        if task.is_some() || self.state() == ChannelState::Closed {
            warn!("Push channel already opened for this session, ignoring");
            return;
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(run_subscription(shared, transport, updates)));
    }

    /// Close the push channel
    ///
    /// Pending one-shot handles fail with `ChannelClosed`; watches end.
    pub fn close(&self) {
        if let Some(task) = lock(&self.shared.task).take() {
            task.abort();
        }
        self.shared.close_with(TransportError::ChannelClosed);
    }

    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    pub fn policy(&self) -> MatchPolicy {
        self.shared.policy
    }

    /// Wait until the subscription is confirmed live
    ///
    /// Fails with the reason the channel closed if it never became live
    /// (or closed since).
    pub async fn wait_live(&self) -> Result<(), TransportError> {
        let mut rx = self.shared.state.subscribe();
        let state = *rx
            .wait_for(|state| *state != ChannelState::Connecting)
            .await
            .map_err(|_| TransportError::ChannelClosed)?;

        match state {
            ChannelState::Live => Ok(()),
            _ => Err(self.closed_reason()),
        }
    }

    /// Why the channel closed (`ChannelClosed` if still open)
    pub fn closed_reason(&self) -> TransportError {
        lock(&self.shared.closed_reason)
            .clone()
            .unwrap_or(TransportError::ChannelClosed)
    }

    /// Attach a one-shot handle
    ///
    /// The handle fires on the first notification that passes `filter` and
    /// satisfies `predicate`, then is removed. Attaching to a closed channel
    /// yields a receiver that errors immediately.
    pub fn attach<F>(&self, filter: NotificationFilter, predicate: F) -> Attachment
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        let (tx, receiver) = oneshot::channel();
        let id = self.register(filter, Arc::new(predicate), Sink::Once(Some(tx)));
        Attachment { id, receiver }
    }

    /// Attach a persistent handle receiving every notification passing `filter`
    pub fn watch(&self, filter: NotificationFilter) -> NotificationWatch {
        self.watch_matching(filter, |_| true)
    }

    /// Attach a persistent handle receiving every notification passing
    /// `filter` and `predicate`
    pub fn watch_matching<F>(&self, filter: NotificationFilter, predicate: F) -> NotificationWatch
    where
        F: Fn(&Notification) -> bool + Send + Sync + 'static,
    {
        let (tx, receiver) = mpsc::unbounded_channel();
        let id = self.register(filter, Arc::new(predicate), Sink::Stream(tx));
        NotificationWatch {
            id,
            receiver,
            mux: self.clone(),
        }
    }

    /// Detach a handle; returns false if it was not attached
    pub fn detach(&self, id: HandleId) -> bool {
        let mut registrations = lock(&self.shared.registrations);
        match registrations.iter().position(|r| r.id == id) {
            Some(index) => {
                registrations.remove(index);
                debug!(handle = %id, "Detached");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, id: HandleId) -> bool {
        lock(&self.shared.registrations).iter().any(|r| r.id == id)
    }

    pub fn handle_count(&self) -> usize {
        lock(&self.shared.registrations).len()
    }

    /// Notifications dispatched since the channel opened
    pub fn dispatched_count(&self) -> u64 {
        self.shared.dispatched.load(Ordering::Relaxed)
    }

    fn register(&self, filter: NotificationFilter, predicate: Predicate, sink: Sink) -> HandleId {
        let id = HandleId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrations = lock(&self.shared.registrations);

        // Same lock as close_with, so a handle never slips in after the drain
        if self.state() == ChannelState::Closed {
            debug!(handle = %id, "Attach on closed push channel");
            return id;
        }

        registrations.push(Arc::new(Registration {
            id,
            filter,
            predicate,
            sink: Mutex::new(sink),
        }));
        debug!(handle = %id, filter = %filter, "Attached");
        id
    }

    #[cfg(test)]
    fn dispatch(&self, notification: &Notification) -> usize {
        self.shared.dispatch(notification)
    }

    #[cfg(test)]
    fn mark_live(&self) {
        self.shared.state.send_replace(ChannelState::Live);
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("state", &self.state())
            .field("policy", &self.shared.policy)
            .field("handles", &self.handle_count())
            .finish()
    }
}

impl Shared {
    /// Deliver one notification to every matching handle
    ///
    /// Returns the number of handles it was delivered to.
    fn dispatch(&self, notification: &Notification) -> usize {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        let snapshot: Vec<Arc<Registration>> = lock(&self.registrations).clone();

        let mut finished = Vec::new();
        let mut delivered = 0;
        let mut consumed = false;

        for registration in &snapshot {
            if !registration.filter.matches(notification) {
                continue;
            }
            // Once consumed, only persistent handles still see the notification
            if consumed && registration.is_one_shot() {
                continue;
            }
            if !(registration.predicate)(notification) {
                continue;
            }

            let mut sink = lock(&registration.sink);
            match &mut *sink {
                Sink::Once(slot) => {
                    let Some(tx) = slot.take() else {
                        continue;
                    };
                    finished.push(registration.id);
                    if tx.send(notification.clone()).is_ok() {
                        delivered += 1;
                        consumed = self.policy == MatchPolicy::Consuming;
                    }
                }
                Sink::Stream(tx) => {
                    if tx.send(notification.clone()).is_ok() {
                        delivered += 1;
                    } else {
                        finished.push(registration.id);
                    }
                }
            }
        }

        if !finished.is_empty() {
            lock(&self.registrations).retain(|r| !finished.contains(&r.id));
        }

        debug!(
            kind = %notification.kind(),
            domains = %notification.domains(),
            delivered,
            "Dispatched notification"
        );
        delivered
    }

    fn close_with(&self, reason: TransportError) {
        let drained = {
            let mut registrations = lock(&self.registrations);
            let already_closed = *self.state.borrow() == ChannelState::Closed;
            if already_closed {
                return;
            }
            *lock(&self.closed_reason) = Some(reason);
            self.state.send_replace(ChannelState::Closed);
            std::mem::take(&mut *registrations)
        };
        info!(pending = drained.len(), "Push channel closed");
    }
}

async fn run_subscription(shared: Arc<Shared>, transport: Arc<dyn Transport>, updates: WireQuery) {
    info!("Opening push channel");
    let mut stream = match transport.subscribe(&updates).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "Push channel subscription failed");
            shared.close_with(e);
            return;
        }
    };

    shared.state.send_replace(ChannelState::Live);
    info!("Push channel live");

    while let Some(item) = stream.next().await {
        match item {
            Ok(notification) => {
                shared.dispatch(&notification);
            }
            Err(TransportError::Decode(msg)) => {
                warn!("Dropping undecodable push message: {}", msg);
            }
            Err(e) => {
                warn!(error = %e, "Push channel failed");
                shared.close_with(e);
                return;
            }
        }
    }

    info!("Push channel ended by remote side");
    shared.close_with(TransportError::ChannelClosed);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

//! Correlated request/response channel across an isolation boundary
//!
//! Requests travel to the remote side as [`Envelope`]s over an mpsc channel;
//! replies come back as [`Reply`]s on a second channel and are routed to the
//! waiting caller by correlation id. Both channels are plain tokio channels,
//! so the remote side may be an in-process task
//! ([`TransportBridge::spawn_endpoint`]) or an adapter that forwards
//! envelopes to another process or machine ([`TransportBridge::from_channels`]).
//!
//! Every request resolves: with the reply, with [`BridgeError::Timeout`], or
//! with [`BridgeError::Unreachable`] when either channel is closed. A reply
//! that arrives after its request timed out is dropped, even when a newer
//! request for the same key is waiting.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Failure of the boundary itself, not of the remote operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("remote endpoint is unreachable")]
    Unreachable,

    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// A request with the same key is still awaiting its reply
    #[error("request {0} is already pending")]
    DuplicateRequest(String),
}

/// Request as seen by the remote side
///
/// `id` is unique per bridge and must be echoed back in the [`Reply`].
#[derive(Debug)]
pub struct Envelope<K, Req> {
    pub id: u64,
    pub key: K,
    pub request: Req,
}

/// Reply as sent back by the remote side
#[derive(Debug)]
pub struct Reply<K, Resp> {
    pub id: u64,
    pub key: K,
    pub response: Resp,
}

/// Remote side of a bridge
#[async_trait]
pub trait BridgeHandler<Req, Resp>: Send + Sync + 'static {
    async fn handle(&self, request: Req) -> Resp;
}

/// Waiting callers by correlation id, plus the id currently held by each key
struct Pending<K, Resp> {
    waiters: HashMap<u64, oneshot::Sender<Resp>>,
    keys: HashMap<K, u64>,
}

impl<K: Eq + Hash, Resp> Pending<K, Resp> {
    fn new() -> Self {
        Self {
            waiters: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Drop the waiter for `id` and release `key` if `id` still holds it
    fn remove(&mut self, id: u64, key: &K) -> Option<oneshot::Sender<Resp>> {
        if self.keys.get(key) == Some(&id) {
            self.keys.remove(key);
        }
        self.waiters.remove(&id)
    }

    fn clear(&mut self) {
        self.waiters.clear();
        self.keys.clear();
    }
}

type PendingMap<K, Resp> = Arc<Mutex<Pending<K, Resp>>>;

/// Caller side of a bridge
///
/// Cheap to share behind an `Arc`; any number of requests may be
/// outstanding at once as long as their keys differ.
pub struct TransportBridge<K, Req, Resp> {
    outbound: mpsc::Sender<Envelope<K, Req>>,
    pending: PendingMap<K, Resp>,
    next_id: AtomicU64,
    closed: CancellationToken,
    timeout: Duration,
}

impl<K, Req, Resp> TransportBridge<K, Req, Resp>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Build a bridge over existing channels
    ///
    /// Spawns the reply dispatcher; it runs until `replies` closes.
    pub fn from_channels(
        outbound: mpsc::Sender<Envelope<K, Req>>,
        replies: mpsc::Receiver<Reply<K, Resp>>,
        timeout: Duration,
    ) -> Self {
        let pending: PendingMap<K, Resp> = Arc::new(Mutex::new(Pending::new()));
        let closed = CancellationToken::new();

        tokio::spawn(dispatch_replies(
            replies,
            Arc::clone(&pending),
            closed.clone(),
        ));

        Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            closed,
            timeout,
        }
    }

    /// Build a bridge whose remote side is a task serving `handler`
    ///
    /// Each envelope is handled on its own task, so slow requests do not
    /// hold up others. The endpoint task ends when the bridge is dropped.
    pub fn spawn_endpoint<H>(handler: Arc<H>, capacity: usize, timeout: Duration) -> Self
    where
        H: BridgeHandler<Req, Resp> + ?Sized,
    {
        let capacity = capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (reply_tx, reply_rx) = mpsc::channel(capacity);

        tokio::spawn(serve_endpoint(handler, outbound_rx, reply_tx));

        Self::from_channels(outbound_tx, reply_rx, timeout)
    }

    /// Send `request` keyed by `key` and wait for its own reply
    pub async fn request(&self, key: K, request: Req) -> Result<Resp, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.keys.contains_key(&key) {
                return Err(BridgeError::DuplicateRequest(format!("{:?}", key)));
            }
            pending.keys.insert(key.clone(), id);
            pending.waiters.insert(id, tx);
        }

        let envelope = Envelope {
            id,
            key: key.clone(),
            request,
        };
        let exchange = async {
            self.outbound
                .send(envelope)
                .await
                .map_err(|_| BridgeError::Unreachable)?;

            tokio::select! {
                reply = rx => reply.map_err(|_| BridgeError::Unreachable),
                _ = self.closed.cancelled() => Err(BridgeError::Unreachable),
            }
        };

        let result = tokio::time::timeout(self.timeout, exchange)
            .await
            .unwrap_or(Err(BridgeError::Timeout(self.timeout)));

        if result.is_err() {
            self.pending.lock().await.remove(id, &key);
        }

        result
    }

    /// Number of requests awaiting a reply
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.waiters.len()
    }
}

async fn serve_endpoint<K, Req, Resp, H>(
    handler: Arc<H>,
    mut inbound: mpsc::Receiver<Envelope<K, Req>>,
    replies: mpsc::Sender<Reply<K, Resp>>,
) where
    K: Debug + Send + 'static,
    Req: Send + 'static,
    Resp: Send + 'static,
    H: BridgeHandler<Req, Resp> + ?Sized,
{
    while let Some(Envelope { id, key, request }) = inbound.recv().await {
        let handler = Arc::clone(&handler);
        let replies = replies.clone();
        tokio::spawn(async move {
            let response = handler.handle(request).await;
            if replies.send(Reply { id, key, response }).await.is_err() {
                debug!("Bridge reply channel closed before reply could be sent");
            }
        });
    }
    debug!("Bridge endpoint stopped");
}

async fn dispatch_replies<K, Resp>(
    mut replies: mpsc::Receiver<Reply<K, Resp>>,
    pending: PendingMap<K, Resp>,
    closed: CancellationToken,
) where
    K: Eq + Hash + Debug,
{
    while let Some(Reply { id, key, response }) = replies.recv().await {
        let waiter = pending.lock().await.remove(id, &key);
        match waiter {
            Some(tx) => {
                if tx.send(response).is_err() {
                    debug!(id, key = ?key, "Bridge caller went away before reply arrived");
                }
            }
            None => warn!(id, key = ?key, "Dropping bridge reply with no pending request"),
        }
    }

    closed.cancel();
    pending.lock().await.clear();
    debug!("Bridge reply dispatcher stopped");
}

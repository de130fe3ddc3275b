//! Named broadcast channels shared by the windows of one process.
//!
//! A [`BroadcastHub`] owns one `tokio::sync::broadcast` sender per channel
//! name. Each window opens its own [`ChannelEndpoint`]; a message published on
//! an endpoint reaches every *other* endpoint currently open on the same name.
//!
//! Guarantees are deliberately thin:
//! - FIFO per sender, no ordering across senders
//! - no acknowledgement, no retry
//! - endpoints opened after a publish never see it
//! - a lagging receiver skips the oldest frames (logged, not fatal)
//!
//! Frames travel as JSON text so a window never trusts a sibling's in-memory
//! representation, and so malformed or newer-build traffic can be dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::error::{ProtocolError, TransportError};
use crate::protocol::SyncMessage;

/// Channel name used by all windows of the app unless configured otherwise.
pub const DEFAULT_CHANNEL_NAME: &str = "translation-channel";

/// Default per-channel buffer (frames retained for slow receivers).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Send side of the inter-window channel, as seen by a window.
///
/// Implemented by [`ChannelEndpoint`]; tests may substitute their own.
pub trait SyncTransport: Send {
    /// Send `message` to every other subscriber. Fire-and-forget.
    fn publish(&self, message: &SyncMessage) -> crate::Result<()>;

    /// Next inbound message from a sibling, or `None` once closed.
    fn recv(&mut self) -> impl Future<Output = Option<SyncMessage>> + Send;

    /// Stop delivery. In-flight frames are not flushed.
    fn close(&mut self);
}

#[derive(Debug, Clone)]
struct Frame {
    origin: u64,
    body: Arc<str>,
}

#[derive(Debug, Default)]
struct HubInner {
    channels: HashMap<String, broadcast::Sender<Frame>>,
    next_endpoint_id: u64,
}

/// Registry of named channels.
///
/// Cloning a hub shares the registry.
#[derive(Debug, Clone, Default)]
pub struct BroadcastHub {
    inner: Arc<Mutex<HubInner>>,
}

impl BroadcastHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new endpoint on `name`, creating the channel if needed.
    ///
    /// `capacity` only applies when the channel is created; later opens share
    /// the existing buffer.
    pub fn open(&self, name: &str, capacity: usize) -> Result<ChannelEndpoint, TransportError> {
        if name.trim().is_empty() {
            return Err(TransportError::ChannelNameEmpty);
        }

        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.next_endpoint_id += 1;
        let id = inner.next_endpoint_id;

        let sender = inner
            .channels
            .entry(name.to_string())
            .and_modify(|tx| {
                // Recreate channels whose endpoints have all gone away.
                if tx.receiver_count() == 0 {
                    *tx = broadcast::channel(capacity.max(1)).0;
                }
            })
            .or_insert_with(|| broadcast::channel(capacity.max(1)).0)
            .clone();
        let receiver = sender.subscribe();

        info!(
            channel = name,
            endpoint_id = id,
            subscribers = sender.receiver_count(),
            "broadcast channel opened"
        );

        Ok(ChannelEndpoint {
            id,
            channel: name.to_string(),
            tx: Some(sender),
            rx: Some(receiver),
        })
    }

    /// Number of endpoints currently open on `name`.
    #[must_use]
    pub fn subscriber_count(&self, name: &str) -> usize {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .channels
            .get(name)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// One window's connection to a named channel.
#[derive(Debug)]
pub struct ChannelEndpoint {
    id: u64,
    channel: String,
    tx: Option<broadcast::Sender<Frame>>,
    rx: Option<broadcast::Receiver<Frame>>,
}

impl ChannelEndpoint {
    /// Hub-unique endpoint id; frames never loop back to their origin.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    /// Publish an already-encoded body.
    ///
    /// Used for forwarding traffic verbatim and for exercising tolerance of
    /// unknown or malformed frames.
    pub fn publish_raw(&self, body: impl Into<Arc<str>>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        let frame = Frame {
            origin: self.id,
            body: body.into(),
        };
        // No other subscribers is not an error: nobody is listening yet.
        let _ = tx.send(frame);
        Ok(())
    }

    async fn next_message(&mut self) -> Option<SyncMessage> {
        loop {
            let rx = self.rx.as_mut()?;
            match rx.recv().await {
                Ok(frame) if frame.origin == self.id => {}
                Ok(frame) => match SyncMessage::decode(&frame.body) {
                    Ok(message) => return Some(message),
                    Err(ProtocolError::UnknownType(kind)) => {
                        debug!(
                            channel = %self.channel,
                            origin = frame.origin,
                            kind = %kind,
                            "ignoring unknown message type"
                        );
                    }
                    Err(err) => {
                        debug!(
                            channel = %self.channel,
                            origin = frame.origin,
                            error = %err,
                            "ignoring malformed message"
                        );
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(
                        channel = %self.channel,
                        endpoint_id = self.id,
                        skipped,
                        "broadcast receiver lagged; oldest frames dropped"
                    );
                }
                Err(RecvError::Closed) => {
                    self.rx = None;
                    return None;
                }
            }
        }
    }
}

impl SyncTransport for ChannelEndpoint {
    fn publish(&self, message: &SyncMessage) -> crate::Result<()> {
        let body = message.encode()?;
        self.publish_raw(body)?;
        debug!(
            channel = %self.channel,
            endpoint_id = self.id,
            kind = message.kind(),
            "published"
        );
        Ok(())
    }

    fn recv(&mut self) -> impl Future<Output = Option<SyncMessage>> + Send {
        self.next_message()
    }

    fn close(&mut self) {
        if self.tx.take().is_some() {
            self.rx = None;
            info!(channel = %self.channel, endpoint_id = self.id, "broadcast channel closed");
        }
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        self.close();
    }
}

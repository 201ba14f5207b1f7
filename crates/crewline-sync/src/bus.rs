use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::warn;

/// A message delivered to subscribers: the channel it was published on
/// plus a structured payload.
#[derive(Debug, Clone)]
pub struct Published {
    /// Channel name.
    pub channel: String,
    /// Structured payload; by convention an object with an `action` field.
    pub payload: serde_json::Value,
}

/// Fire-and-forget publish/subscribe over named channels.
///
/// At-most-once, best-effort, no persistence: messages published while
/// nobody listens are dropped, and a slow subscriber that lags past the
/// buffer loses the overwritten messages. Never a system of record.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Published>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a payload to a channel. Returns the number of subscribers
    /// the message reached; zero is not an error.
    pub fn publish(&self, channel: &str, payload: serde_json::Value) -> usize {
        self.tx
            .send(Published {
                channel: channel.to_string(),
                payload,
            })
            .unwrap_or(0)
    }

    /// Subscribe to a set of channels. Receives only messages published
    /// after this call.
    pub fn subscribe<I, S>(&self, channels: I) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Subscription {
            rx: self.tx.subscribe(),
            channels: channels.into_iter().map(Into::into).collect(),
            closed: false,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A live subscription: a lazy, unbounded sequence of [`Published`]
/// messages, ended by [`Subscription::close`] or by dropping the bus.
/// Resubscribing on the bus restarts the sequence from the present.
pub struct Subscription {
    rx: broadcast::Receiver<Published>,
    channels: HashSet<String>,
    closed: bool,
}

impl Subscription {
    /// Wait for the next message on one of the subscribed channels.
    /// Returns `None` once closed or when every publisher is gone.
    /// Lagged messages are skipped with a warning, not an error.
    pub async fn recv(&mut self) -> Option<Published> {
        loop {
            if self.closed {
                return None;
            }
            match self.rx.recv().await {
                Ok(message) if self.channels.contains(&message.channel) => {
                    return Some(message);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "subscriber lagged; dropped messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop the sequence; subsequent `recv` calls return `None`.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

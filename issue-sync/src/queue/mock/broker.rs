use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use async_stream::stream;
use tokio::sync::{mpsc, Mutex};

use super::error::MockQueueError;
use crate::queue::{Delivery, DeliveryStream, MessageQueue};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Reject,
}

/// Everything the consumer asked the broker to do.
#[derive(Debug, Default)]
struct BrokerLog {
    prefetch: Option<u16>,
    subscription: Option<String>,
    dispositions: Vec<(u64, Disposition)>,
}

#[derive(Debug, Default)]
struct BrokerState {
    log: Mutex<BrokerLog>,
    channel_closed: AtomicBool,
    connection_closed: AtomicBool,
    fail_channel_close: AtomicBool,
    fail_connection_close: AtomicBool,
}

type Item = Result<MockDelivery, MockQueueError>;

/// The consuming half of an in-memory broker. Prefetch is recorded but not
/// enforced: every published message is delivered straight away.
#[derive(Debug)]
pub struct MockQueue {
    state: Arc<BrokerState>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Item>>>,
}

/// The test-facing half of an in-memory broker. Publishes messages and
/// inspects what the consumer did with them. Dropping it, or calling
/// [MockBroker::disconnect], closes the delivery stream.
#[derive(Debug)]
pub struct MockBroker {
    state: Arc<BrokerState>,
    sender: std::sync::Mutex<Option<mpsc::UnboundedSender<Item>>>,
    next_tag: AtomicU64,
}

impl MockQueue {
    pub fn new() -> (Self, MockBroker) {
        let state = Arc::new(BrokerState::default());
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            state: Arc::clone(&state),
            receiver: Mutex::new(Some(receiver)),
        };
        let broker = MockBroker {
            state,
            sender: std::sync::Mutex::new(Some(sender)),
            next_tag: AtomicU64::new(1),
        };
        (queue, broker)
    }
}

impl MockBroker {
    /// Messages sent after a disconnect are dropped.
    fn send(&self, item: Item) {
        if let Ok(guard) = self.sender.lock() {
            if let Some(sender) = guard.as_ref() {
                // the receiver only goes away with the queue
                let _ = sender.send(item);
            }
        }
    }

    fn push(&self, body: Vec<u8>, fail_settle: bool) -> u64 {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        let delivery = MockDelivery {
            tag,
            body,
            fail_settle,
            state: Arc::clone(&self.state),
        };
        self.send(Ok(delivery));
        tag
    }

    /// Publish a message, returning its delivery tag.
    pub fn publish(&self, body: impl Into<Vec<u8>>) -> u64 {
        self.push(body.into(), false)
    }

    /// Publish a message whose ack/reject will fail (but is still recorded).
    pub fn publish_unsettleable(&self, body: impl Into<Vec<u8>>) -> u64 {
        self.push(body.into(), true)
    }

    /// Yield a transport error on the delivery stream.
    pub fn break_stream(&self) {
        self.send(Err(MockQueueError::StreamBroken));
    }

    /// End the delivery stream once everything already published has been
    /// consumed, as a closed broker connection would.
    pub fn disconnect(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
    }

    pub fn fail_channel_close(&self) {
        self.state.fail_channel_close.store(true, Ordering::SeqCst);
    }

    pub fn fail_connection_close(&self) {
        self.state.fail_connection_close.store(true, Ordering::SeqCst);
    }

    /// Every settlement attempt so far, in order.
    pub async fn dispositions(&self) -> Vec<(u64, Disposition)> {
        self.state.log.lock().await.dispositions.clone()
    }

    pub async fn prefetch(&self) -> Option<u16> {
        self.state.log.lock().await.prefetch
    }

    pub async fn subscription(&self) -> Option<String> {
        self.state.log.lock().await.subscription.clone()
    }

    /// Whether a channel close was attempted.
    pub fn channel_closed(&self) -> bool {
        self.state.channel_closed.load(Ordering::SeqCst)
    }

    /// Whether a connection close was attempted.
    pub fn connection_closed(&self) -> bool {
        self.state.connection_closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageQueue for MockQueue {
    type Delivery = MockDelivery;
    type Error = MockQueueError;

    async fn set_prefetch(&self, count: u16) -> Result<(), Self::Error> {
        self.state.log.lock().await.prefetch = Some(count);
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<DeliveryStream<Self::Delivery, Self::Error>, Self::Error> {
        let mut receiver = self
            .receiver
            .lock()
            .await
            .take()
            .ok_or(MockQueueError::AlreadySubscribed)?;
        self.state.log.lock().await.subscription = Some(queue.to_string());
        Ok(Box::pin(stream! {
            while let Some(item) = receiver.recv().await {
                yield item;
            }
        }))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.state.channel_closed.store(true, Ordering::SeqCst);
        let channel = if self.state.fail_channel_close.load(Ordering::SeqCst) {
            Err(MockQueueError::ChannelClose)
        } else {
            Ok(())
        };
        self.state.connection_closed.store(true, Ordering::SeqCst);
        let connection = if self.state.fail_connection_close.load(Ordering::SeqCst) {
            Err(MockQueueError::ConnectionClose)
        } else {
            Ok(())
        };
        crate::util::first_error(channel, connection)
    }
}

/// A message delivered by a [MockQueue].
#[derive(Debug)]
pub struct MockDelivery {
    tag: u64,
    body: Vec<u8>,
    fail_settle: bool,
    state: Arc<BrokerState>,
}

impl MockDelivery {
    async fn settle(self, disposition: Disposition) -> Result<(), MockQueueError> {
        self.state
            .log
            .lock()
            .await
            .dispositions
            .push((self.tag, disposition));
        if self.fail_settle {
            Err(MockQueueError::SettleFailed(self.tag))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl Delivery for MockDelivery {
    type Error = MockQueueError;

    fn delivery_tag(&self) -> u64 {
        self.tag
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(self) -> Result<(), Self::Error> {
        self.settle(Disposition::Ack).await
    }

    async fn reject(self) -> Result<(), Self::Error> {
        self.settle(Disposition::Reject).await
    }
}

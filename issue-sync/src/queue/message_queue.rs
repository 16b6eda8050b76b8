use std::{error::Error, pin::Pin};

use futures::Stream;

/// A lazy, effectively infinite sequence of deliveries. It ends (or yields
/// an error) once the underlying channel is closed and can't be restarted.
pub type DeliveryStream<D, E> = Pin<Box<dyn Stream<Item = Result<D, E>> + Send>>;

/// A single message handed out by the broker, awaiting settlement.
#[async_trait::async_trait]
pub trait Delivery: Send + Sized + 'static {
    /// An error settling this delivery.
    type Error: Error + Send + Sync + 'static;

    /// The broker's identifier for this delivery on its channel.
    fn delivery_tag(&self) -> u64;

    /// The raw message payload.
    fn body(&self) -> &[u8];

    /// Positively acknowledge this delivery alone, removing it from the
    /// queue.
    async fn ack(self) -> Result<(), Self::Error>;

    /// Negatively acknowledge this delivery alone and discard it. It will
    /// not be requeued.
    async fn reject(self) -> Result<(), Self::Error>;
}

/// An open connection and channel to a broker.
#[async_trait::async_trait]
pub trait MessageQueue: Send + Sync + 'static {
    type Delivery: Delivery;
    /// An error occurring from an operation.
    type Error: Error + Send + Sync + 'static;

    /// Limit the number of unacknowledged deliveries the broker will push
    /// to this consumer.
    async fn set_prefetch(&self, count: u16) -> Result<(), Self::Error>;

    /// Start consuming `queue` with manual acknowledgement. The queue must
    /// already be declared.
    async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<DeliveryStream<Self::Delivery, Self::Error>, Self::Error>;

    /// Close the channel and then the connection. Both are attempted even
    /// if the first fails, and the first failure is returned.
    async fn close(&self) -> Result<(), Self::Error>;
}

use futures::StreamExt;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tracing::{debug, warn};

use super::{delivery::AmqpDelivery, error::AmqpError};
use crate::{
    queue::{DeliveryStream, MessageQueue},
    util::first_error,
};

/// AMQP reply code for a normal close.
const REPLY_SUCCESS: u16 = 200;

/// A connection to an AMQP broker with a single open channel.
pub struct AmqpQueue {
    connection: Connection,
    channel: Channel,
}

impl AmqpQueue {
    /// Dial the broker and open a channel. If the channel can't be opened
    /// the connection is closed again before returning.
    pub async fn connect(url: &str) -> Result<Self, AmqpError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                if let Err(close_err) = connection
                    .close(REPLY_SUCCESS, "failed to open channel")
                    .await
                {
                    warn!("Failed to close amqp connection: {}", close_err);
                }
                return Err(e.into());
            }
        };
        debug!("Opened amqp channel {}", channel.id());
        Ok(Self {
            connection,
            channel,
        })
    }
}

#[async_trait::async_trait]
impl MessageQueue for AmqpQueue {
    type Delivery = AmqpDelivery;
    type Error = AmqpError;

    async fn set_prefetch(&self, count: u16) -> Result<(), Self::Error> {
        self.channel
            .basic_qos(count, BasicQosOptions { global: false })
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
    ) -> Result<DeliveryStream<Self::Delivery, Self::Error>, Self::Error> {
        // an empty consumer tag lets the broker generate one
        let consumer = self
            .channel
            .basic_consume(
                queue,
                "",
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await?;
        debug!("Consuming {} as {}", queue, consumer.tag().as_str());
        Ok(Box::pin(consumer.map(|delivery| {
            delivery.map(AmqpDelivery::from).map_err(AmqpError::from)
        })))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let channel = self.channel.close(REPLY_SUCCESS, "closing").await;
        let connection = self.connection.close(REPLY_SUCCESS, "closing").await;
        first_error(
            channel.map_err(AmqpError::from),
            connection.map_err(AmqpError::from),
        )
    }
}

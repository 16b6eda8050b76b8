use lapin::options::{BasicAckOptions, BasicNackOptions};

use super::error::AmqpError;
use crate::queue::Delivery;

/// A delivery received over an AMQP channel.
#[derive(Debug)]
pub struct AmqpDelivery(lapin::message::Delivery);

impl From<lapin::message::Delivery> for AmqpDelivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self(delivery)
    }
}

#[async_trait::async_trait]
impl Delivery for AmqpDelivery {
    type Error = AmqpError;

    fn delivery_tag(&self) -> u64 {
        self.0.delivery_tag
    }

    fn body(&self) -> &[u8] {
        &self.0.data
    }

    async fn ack(self) -> Result<(), Self::Error> {
        self.0
            .acker
            .ack(BasicAckOptions { multiple: false })
            .await?;
        Ok(())
    }

    async fn reject(self) -> Result<(), Self::Error> {
        self.0
            .acker
            .nack(BasicNackOptions {
                multiple: false,
                requeue: false,
            })
            .await?;
        Ok(())
    }
}

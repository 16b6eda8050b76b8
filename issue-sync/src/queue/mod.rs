//! # Consuming from a message queue
//!
//! The consumer only needs three things from a broker: a prefetch ceiling,
//! a manually acknowledged subscription yielding an ordered stream of
//! deliveries, and a way to settle each delivery. [MessageQueue] and
//! [Delivery] describe exactly that.
//!
//! A [Delivery] is settled by value, so once it has been acknowledged or
//! rejected it's gone: settling the same delivery twice doesn't compile.
//!
//! ## Backends
//!
//! - `amqp`: AMQP 0.9.1 brokers (RabbitMQ) through lapin. Enabled by
//! default.
//! - `mocks`: an in-memory broker which records every settlement.

#[cfg(feature = "amqp")]
pub mod amqp;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

mod message_queue;

pub use message_queue::{Delivery, DeliveryStream, MessageQueue};

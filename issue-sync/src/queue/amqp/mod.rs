mod delivery;
mod error;
mod queue;

pub use delivery::AmqpDelivery;
pub use error::AmqpError;
pub use queue::AmqpQueue;

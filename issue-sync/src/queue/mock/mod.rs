mod broker;
mod error;

pub use broker::{Disposition, MockBroker, MockDelivery, MockQueue};
pub use error::MockQueueError;

use thiserror::Error;

/// Newtype around [lapin::Error]
#[derive(Debug, Error)]
#[error("amqp error: {0}")]
pub struct AmqpError(#[from] lapin::Error);

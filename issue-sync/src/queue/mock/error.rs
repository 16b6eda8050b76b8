use thiserror::Error;

#[derive(Debug, Error)]
pub enum MockQueueError {
    #[error("broker unreachable")]
    Unreachable,
    #[error("already subscribed")]
    AlreadySubscribed,
    #[error("failed to settle delivery {0}")]
    SettleFailed(u64),
    #[error("failed to close channel")]
    ChannelClose,
    #[error("failed to close connection")]
    ConnectionClose,
    #[error("delivery stream broken")]
    StreamBroken,
}

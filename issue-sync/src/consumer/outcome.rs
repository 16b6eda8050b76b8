use crate::error::ProcessError;

/// The terminal state of a single delivery.
#[derive(Debug)]
pub enum Outcome {
    /// The update was applied (possibly to zero rows) and the delivery was
    /// acknowledged.
    Acknowledged { id: i64, rows_affected: u64 },
    /// The delivery was rejected without requeue. `id` is unknown when the
    /// body couldn't be decoded.
    Rejected { id: Option<i64>, error: ProcessError },
}

impl Outcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Outcome::Acknowledged { .. })
    }

    pub fn id(&self) -> Option<i64> {
        match self {
            Outcome::Acknowledged { id, .. } => Some(*id),
            Outcome::Rejected { id, .. } => *id,
        }
    }
}

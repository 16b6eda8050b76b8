use std::fmt::Display;

use tracing::warn;

/// Combine the results of two independent release steps which have both
/// already been attempted. The first failure wins; a second failure is
/// logged rather than lost.
pub(crate) fn first_error<E: Display>(
    first: Result<(), E>,
    second: Result<(), E>,
) -> Result<(), E> {
    match (first, second) {
        (Err(first), Err(second)) => {
            warn!("Suppressed a second close error: {}", second);
            Err(first)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

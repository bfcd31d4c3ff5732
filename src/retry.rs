//! Bounded retry for operations that may hit a uniqueness collision

use std::future::Future;

/// Outcome of a single attempt
pub enum Attempt<T> {
    Done(T),
    /// The attempt collided and may be repeated with a fresh draw
    Retry,
}

/// Runs `attempt` up to `max_attempts` times, passing the 1-based attempt number.
///
/// Returns `Ok(None)` when every attempt asked for a retry. Errors stop the loop
/// immediately.
pub async fn retry_bounded<T, E, F, Fut>(max_attempts: usize, mut attempt: F) -> Result<Option<T>, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    for n in 1..=max_attempts {
        if let Attempt::Done(value) = attempt(n).await? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

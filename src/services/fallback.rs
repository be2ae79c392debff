use std::future::Future;

use crate::error::{AppError, AppResult};

/// Tries `candidates` in priority order and returns the first success.
///
/// A failure moves on to the next candidate. When every candidate fails the
/// last error is returned, so a uniform answer from all of them (every mirror
/// answering 404, say) keeps its meaning.
pub async fn first_success<'a, T, F, Fut>(candidates: &'a [String], mut attempt: F) -> AppResult<T>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut last_error = None;

    for candidate in candidates {
        match attempt(candidate.as_str()).await {
            Ok(value) => {
                log::debug!("Fallback: {} answered", candidate);
                return Ok(value);
            }
            Err(e) => {
                log::warn!("Fallback: {} failed: {}", candidate, e);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| AppError::Transient("no sources configured".to_string())))
}

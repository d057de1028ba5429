use std::{fmt::Display, future::Future, time::Duration};

use tracing::info;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 100,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Runs `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts are used up. The last error is returned on failure.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        should_retry: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && should_retry(&err) => {
                    info!(
                        attempt,
                        max_attempts = attempts,
                        error = %err,
                        "{label}: attempt failed; retrying"
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

//! Poll-with-backoff for asynchronous jobs (e.g. document text extraction)

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::Result;

/// What a single status check observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Pending,
    Completed(T),
    Failed(String),
}

/// How polling ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut { attempts: u32 },
}

/// Exponential delay schedule with a cap and an attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2,
            max_attempts: 60,
        }
    }
}

impl Backoff {
    /// Same delay between every check
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial: delay,
            max_delay: delay,
            multiplier: 1,
            max_attempts,
        }
    }

    /// Delay after the given (zero-based) failed attempt
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Call `check` until it completes, fails, or the attempt budget runs out.
///
/// # Errors
/// Errors returned by `check` itself end polling immediately.
pub async fn poll_with_backoff<T, F, Fut>(
    backoff: Backoff,
    sleeper: &dyn Sleeper,
    mut check: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<PollStatus<T>>> + Send,
{
    for attempt in 0..backoff.max_attempts {
        match check().await? {
            PollStatus::Completed(value) => return Ok(PollOutcome::Completed(value)),
            PollStatus::Failed(reason) => return Ok(PollOutcome::Failed(reason)),
            PollStatus::Pending => {}
        }

        if attempt + 1 < backoff.max_attempts {
            let delay = backoff.delay(attempt);
            debug!("Job still pending after attempt {}, waiting {:?}", attempt + 1, delay);
            sleeper.sleep(delay).await;
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: backoff.max_attempts,
    })
}

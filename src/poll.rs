use crate::error::Error;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How long to keep asking the authority about a resource that is still
/// being processed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
  /// Delay before the first poll. Doubles after every pending answer.
  #[serde(with = "humantime_serde")]
  pub interval: Duration,
  /// Upper bound for a single delay, including a `Retry-After` hint.
  #[serde(with = "humantime_serde")]
  pub max_interval: Duration,
  pub max_attempts: usize,
  /// Overall deadline for the whole poll loop.
  #[serde(with = "humantime_serde")]
  pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
  fn default() -> Self {
    PollPolicy {
      interval: Duration::from_secs(2),
      max_interval: Duration::from_secs(30),
      max_attempts: 10,
      timeout: Some(Duration::from_secs(300)),
    }
  }
}

/// One observation of a polled resource.
#[derive(Debug)]
pub enum Poll<T> {
  Ready(T),
  Pending { retry_after: Option<Duration> },
}

impl PollPolicy {
  /// The backoff delay before poll number `attempt` (1-based).
  pub fn delay(&self, attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    self
      .interval
      .checked_mul(1 << shift)
      .unwrap_or(self.max_interval)
      .min(self.max_interval)
  }

  /// Waits, then calls `poll`, until it reports [`Poll::Ready`]. Fails with
  /// [`Error::MaxAttemptsExceeded`] after `max_attempts` pending answers and
  /// with [`Error::Timeout`] once `timeout` has elapsed.
  pub async fn run<T, F, Fut>(&self, resource: &str, poll: F) -> Result<T, Error>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, Error>>,
  {
    match self.timeout {
      Some(after) => tokio::time::timeout(after, self.poll_loop(resource, poll))
        .await
        .map_err(|_| Error::Timeout {
          resource: resource.to_string(),
          after,
        })?,
      None => self.poll_loop(resource, poll).await,
    }
  }

  async fn poll_loop<T, F, Fut>(
    &self,
    resource: &str,
    mut poll: F,
  ) -> Result<T, Error>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Poll<T>, Error>>,
  {
    let mut delay = self.delay(1);
    for attempt in 1..=self.max_attempts {
      debug!(
        { resource, attempt, delay = ?delay },
        "Resource not done. Waiting to poll."
      );
      tokio::time::sleep(delay).await;

      match poll().await? {
        Poll::Ready(value) => return Ok(value),
        Poll::Pending { retry_after } => {
          delay = retry_after
            .map(|d| d.min(self.max_interval))
            .unwrap_or_else(|| self.delay(attempt + 1));
        }
      }
    }

    Err(Error::MaxAttemptsExceeded {
      resource: resource.to_string(),
      attempts: self.max_attempts,
    })
  }
}

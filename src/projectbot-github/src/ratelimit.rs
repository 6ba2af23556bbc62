//! Process-wide throttling of upstream requests.
//!
//! All concurrent invocations share one [`RequestLimiter`]. A request that
//! cannot get a slot within `max_wait` fails with
//! [`ProjectsError::RateLimited`] instead of queueing indefinitely.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ProjectsError, ProjectsResult};

/// Longest accepted window.
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest accepted queueing time.
pub const MAX_QUEUE_WAIT: Duration = Duration::from_secs(5 * 60);

/// Sliding-window limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
    /// Longest time a request may queue for a slot.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // GitHub's primary GraphQL budget is 5000 points per hour.
        Self {
            max_requests: 5000,
            window: Duration::from_secs(3600),
            max_wait: Duration::from_secs(2),
        }
    }
}

impl RateLimitConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> ProjectsResult<()> {
        if self.max_requests == 0 {
            return Err(ProjectsError::Config(
                "rate limit max_requests must be at least 1".to_string(),
            ));
        }
        if self.window.is_zero() {
            return Err(ProjectsError::Config(
                "rate limit window must be non-zero".to_string(),
            ));
        }
        if self.window > MAX_WINDOW {
            return Err(ProjectsError::Config(format!(
                "rate limit window must be at most {:?}",
                MAX_WINDOW
            )));
        }
        if self.max_wait > MAX_QUEUE_WAIT {
            return Err(ProjectsError::Config(format!(
                "rate limit max_wait must be at most {:?}",
                MAX_QUEUE_WAIT
            )));
        }
        Ok(())
    }
}

/// Sliding-window request limiter.
#[derive(Debug)]
pub struct RequestLimiter {
    config: RateLimitConfig,
    requests: Mutex<VecDeque<Instant>>,
}

impl Default for RequestLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RequestLimiter {
    /// Create a limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take a slot, waiting up to `max_wait` for one to free up.
    pub async fn acquire(&self) -> ProjectsResult<()> {
        // `None` means past any representable instant, never reachable.
        let deadline = Instant::now().checked_add(self.config.max_wait);

        loop {
            let now = Instant::now();
            let wait_time = match self.reserve(now).await {
                Ok(()) => return Ok(()),
                Err(wait_time) => wait_time,
            };

            let within_budget = match (now.checked_add(wait_time), deadline) {
                (Some(ready), Some(deadline)) => ready <= deadline,
                _ => false,
            };
            if !within_budget {
                warn!(
                    "Request limiter exhausted ({} per {:?}), next slot in {:?}",
                    self.config.max_requests, self.config.window, wait_time
                );
                return Err(ProjectsError::RateLimited {
                    retry_after_secs: wait_time.as_secs().max(1),
                });
            }

            debug!("Request limiter full, waiting {:?}", wait_time);
            sleep(wait_time).await;
        }
    }

    /// Slots still free in the current window.
    pub async fn remaining(&self) -> u32 {
        let mut requests = self.requests.lock().await;
        self.prune(&mut requests, Instant::now());
        let used = u32::try_from(requests.len()).unwrap_or(u32::MAX);
        self.config.max_requests.saturating_sub(used)
    }

    /// Record a request at `now`, or report how long until a slot frees.
    async fn reserve(&self, now: Instant) -> Result<(), Duration> {
        let mut requests = self.requests.lock().await;
        self.prune(&mut requests, now);

        if requests.len() < self.config.max_requests as usize {
            requests.push_back(now);
            return Ok(());
        }

        let wait_time = requests
            .front()
            .map(|oldest| self.config.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or_default();
        Err(wait_time.max(Duration::from_millis(1)))
    }

    /// Remove requests outside the window.
    fn prune(&self, requests: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= self.config.window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }
}

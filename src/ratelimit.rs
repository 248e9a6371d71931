//! Per-key sliding window rate limiting

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use log::{debug, warn};

/// At most `max_requests` hits per key inside any `window`.
///
/// Owned by whoever admits requests; not shared or global.
/// Hits older than the window are evicted on every check.
#[derive(Debug, Clone)]
pub struct SlidingWindowLimiter
{   max_requests: usize
  , window: Duration
  , hits: HashMap<String, VecDeque<Instant>>
}

impl SlidingWindowLimiter
{   pub fn new(max_requests: usize, window: Duration) -> Self
    {   debug!(
          "Creating rate limiter: {} requests per {:?}",
          max_requests, window
        );
        SlidingWindowLimiter
        {   max_requests
          , window
          , hits: HashMap::new()
        }
    }

    pub fn from_config(config: &crate::config::RateLimitConfig) -> Self
    {   SlidingWindowLimiter::new(
          config.max_requests
        , Duration::from_secs(config.window_secs)
        )
    }

    /// Admit a request for `key` at `now`, recording the hit,
    /// or report how long until a slot frees up.
    pub fn check(&mut self, key: &str, now: Instant)
      -> Result<(), crate::error::Error>
    {   let window = self.window;
        let hits = self.hits.entry(key.to_string()).or_default();
        while let Some(oldest) = hits.front()
        {   if now.saturating_duration_since(*oldest) >= window
            {   hits.pop_front();
            } else
            {   break;
            }
        }

        debug!(
          "Rate limit check for {}: {} of {}",
          key, hits.len(), self.max_requests
        );

        if hits.len() >= self.max_requests
        {   let retry_after = hits
              .front()
              .map(|oldest| {
                window.saturating_sub(now.saturating_duration_since(*oldest))
              })
              .unwrap_or(window);
            let retry_after_secs = ceil_secs(retry_after);
            warn!(
              "Rate limit exceeded for {} ({} requests), retry after {}s",
              key, hits.len(), retry_after_secs
            );
            return Err(crate::error::Error::LocalRateLimited
            {   retry_after_secs
            });
        }

        hits.push_back(now);
        Ok(())
    }

    /// Drop keys whose every hit has left the window
    pub fn evict_idle(&mut self, now: Instant)
    {   let window = self.window;
        let before = self.hits.len();
        self.hits.retain(|_, hits| {
          hits.back().map_or(false, |last| {
            now.saturating_duration_since(*last) < window
          })
        });
        let evicted = before - self.hits.len();
        if evicted > 0
        {   debug!("Evicted {} idle rate limit keys", evicted);
        }
    }

    /// Keys currently tracked
    pub fn tracked_keys(&self) -> usize
    {   self.hits.len()
    }
}

fn ceil_secs(duration: Duration) -> u64
{   let secs = duration.as_secs();
    if duration.subsec_nanos() > 0
    {   secs + 1
    } else
    {   secs
    }
}

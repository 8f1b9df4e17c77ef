use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

/// Sliding-window admission control per actor.
///
/// The hit map lives for the lifetime of the engine and is touched only
/// through `admit`; stale timestamps are evicted inline on each call. Check
/// and record happen under one lock, so concurrent calls for the same actor
/// cannot both squeeze into the last slot.
pub struct RateLimiter {
    enabled: bool,
    max_commands: usize,
    window: Duration,
    hits: Mutex<HashMap<u64, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            max_commands: config.max_commands as usize,
            window: Duration::from_secs(config.per_seconds),
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// True means proceed (and the call was recorded); false means the
    /// actor is over the limit and nothing was recorded.
    pub fn admit(&self, actor: u64) -> bool {
        self.admit_at(actor, Instant::now())
    }

    fn admit_at(&self, actor: u64, now: Instant) -> bool {
        if !self.enabled {
            return true;
        }

        let mut hits = self.hits.lock();

        // evict actors whose whole window has lapsed, so the map tracks
        // only currently-active actors
        hits.retain(|_, stamps| {
            stamps.retain(|stamp| now.saturating_duration_since(*stamp) < self.window);
            !stamps.is_empty()
        });

        let stamps = hits.entry(actor).or_default();
        if stamps.len() >= self.max_commands {
            return false;
        }

        stamps.push(now);
        true
    }

    /// Number of actors with at least one recorded call still inside the
    /// window, for observability and tests.
    pub fn tracked_actors(&self) -> usize {
        self.hits.lock().len()
    }
}

//! Configuration for full replication.

use std::time::Duration;

use rand::Rng;
use revsync_store::PassOptions;

/// When a one-way replication counts as complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OneWayCompletion {
    /// Both stores hold exactly the same revisions.
    #[default]
    Exact,
    /// The target holds every revision of the source; it may hold more.
    Superset,
}

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Retry `max_retries` times without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Upper bound of the wait before retry number `attempt` (0-based).
    pub fn backoff_cap(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(attempt);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Full-jitter delay: uniform in `[0, backoff_cap(attempt)]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let cap = self.backoff_cap(attempt).as_millis() as u64;
        if cap == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap))
    }
}

/// Configuration for the convergence loop.
#[derive(Debug, Clone)]
pub struct ConvergenceConfig {
    /// Options for every single replication pass.
    pub pass: PassOptions,
    /// Retries for transient failures, per pass and per snapshot.
    pub retry: RetryPolicy,
    /// Pass ceiling multiplier over the deepest revision tree.
    pub ceiling_factor: u32,
    /// Lowest pass ceiling, whatever the tree depth.
    pub min_pass_ceiling: u32,
    /// Absolute pass ceiling.
    pub max_passes: u32,
    /// Completion rule for one-way replication.
    pub one_way: OneWayCompletion,
    /// Wall-clock budget for the whole loop, checked between passes.
    pub deadline: Option<Duration>,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            pass: PassOptions::default(),
            retry: RetryPolicy::default(),
            ceiling_factor: 2,
            min_pass_ceiling: 4,
            max_passes: 1000,
            one_way: OneWayCompletion::Exact,
            deadline: None,
        }
    }
}

impl ConvergenceConfig {
    pub fn with_pass_options(mut self, pass: PassOptions) -> Self {
        self.pass = pass;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_passes(mut self, max_passes: u32) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    pub fn with_one_way(mut self, one_way: OneWayCompletion) -> Self {
        self.one_way = one_way;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Pass ceiling for stores whose deepest revision tree has `max_depth`
    /// revisions: `ceiling_factor * (max_depth + 1)`, clamped to
    /// `[min_pass_ceiling, max_passes]`.
    pub fn pass_ceiling(&self, max_depth: usize) -> u32 {
        let depth = u32::try_from(max_depth).unwrap_or(u32::MAX);
        let max = self.max_passes.max(1);
        self.ceiling_factor
            .saturating_mul(depth.saturating_add(1))
            .max(self.min_pass_ceiling)
            .min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_ceiling_scales_with_depth() {
        let config = ConvergenceConfig::default();
        assert_eq!(config.pass_ceiling(0), 4);
        assert_eq!(config.pass_ceiling(1), 4);
        assert_eq!(config.pass_ceiling(3), 8);
        assert_eq!(config.pass_ceiling(101), 204);
        assert_eq!(config.pass_ceiling(usize::MAX), 1000);

        let tight = ConvergenceConfig::default().with_max_passes(3);
        assert_eq!(tight.pass_ceiling(10), 3);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_cap(0), Duration::from_millis(50));
        assert_eq!(policy.backoff_cap(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_cap(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_cap(30), Duration::from_secs(2));

        for attempt in 0..5 {
            assert!(policy.delay(attempt) <= policy.backoff_cap(attempt));
        }
        assert_eq!(RetryPolicy::immediate(3).delay(2), Duration::ZERO);
    }
}

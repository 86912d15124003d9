//! Control-plane tuning knobs.
//!
//! Every interval and cap the dispatcher, scheduler, and orchestrator need
//! lives here with a documented default, so they share one source of truth
//! instead of scattering magic numbers.

use std::time::Duration;

/// Runtime configuration for one project's control plane.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Safety-net tick for the dispatcher loop when no DB-change event
    /// arrives.
    pub dispatcher_tick: Duration,
    /// How long a scheduled-task may sit in `executing` before the lease
    /// sweep returns it to `pending`. Defaults to 2x the dispatcher tick.
    pub lease_timeout: Duration,
    /// How often the lease sweep runs.
    pub lease_sweep_interval: Duration,
    /// Default `max_attempts` for scheduled tasks that don't specify one.
    pub default_max_attempts: i64,
    /// Base backoff delay for scheduled-task retries (doubles per attempt).
    pub backoff_base: Duration,
    /// Upper bound on backoff delay regardless of attempt count.
    pub backoff_cap: Duration,
    /// Interval between `pr-feedback` polling cycles.
    pub pr_feedback_interval: Duration,
    /// Interval between `comment-resolution` polling cycles.
    pub comment_resolution_interval: Duration,
    /// Maximum number of review->fix loop iterations before the
    /// orchestrator gives up and breaks out.
    pub max_review_iterations: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        let dispatcher_tick = Duration::from_secs(30);
        Self {
            dispatcher_tick,
            lease_timeout: dispatcher_tick * 2,
            lease_sweep_interval: dispatcher_tick,
            default_max_attempts: 5,
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(3600),
            pr_feedback_interval: Duration::from_secs(300),
            comment_resolution_interval: Duration::from_secs(300),
            max_review_iterations: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_timeout_is_double_the_tick() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.lease_timeout, cfg.dispatcher_tick * 2);
    }
}

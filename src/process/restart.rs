use crate::config::{BackoffKind, RestartConfig};
use std::time::{Duration, Instant};

/// Crash auto-restart policy
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    /// Ceiling on crash restarts within the window; `None` retries forever
    pub max_restarts: Option<usize>,
    /// Time window for counting restarts (in seconds)
    pub time_window_secs: u64,
    /// Delay before the first restart attempt
    pub initial_delay: Duration,
    pub backoff_strategy: BackoffStrategy,
}

impl RestartPolicy {
    pub fn from_config(config: &RestartConfig) -> Self {
        let backoff_strategy = match config.strategy {
            BackoffKind::Fixed => BackoffStrategy::Fixed,
            BackoffKind::Exponential => BackoffStrategy::Exponential {
                max_delay: Duration::from_millis(config.max_backoff_ms),
            },
        };

        Self {
            max_restarts: config.max_crash_restarts,
            time_window_secs: config.window_secs,
            initial_delay: Duration::from_millis(config.backoff_ms),
            backoff_strategy,
        }
    }

    /// Check if another restart is allowed given the recent history
    pub fn should_restart(&self, tracker: &RestartTracker) -> bool {
        match self.max_restarts {
            Some(max) => tracker.count_recent_restarts(self.time_window_secs) < max,
            None => true,
        }
    }

    /// Delay before the next restart attempt
    pub fn calculate_delay(&self, tracker: &RestartTracker) -> Duration {
        let recent = tracker.count_recent_restarts(self.time_window_secs);
        self.backoff_strategy.calculate_delay(self.initial_delay, recent)
    }
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self::from_config(&RestartConfig::default())
    }
}

/// Backoff strategy for restart delays
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between restarts
    Fixed,
    /// Exponential backoff with maximum delay
    Exponential { max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay for a given restart attempt
    pub fn calculate_delay(&self, initial_delay: Duration, restart_count: usize) -> Duration {
        match self {
            BackoffStrategy::Fixed => initial_delay,
            BackoffStrategy::Exponential { max_delay } => {
                // delay = initial * 2^restart_count
                let factor = 2_u32.saturating_pow(restart_count.min(31) as u32);
                initial_delay.saturating_mul(factor).min(*max_delay)
            }
        }
    }
}

/// Tracks crash restart history for one tenant
#[derive(Debug, Clone, Default)]
pub struct RestartTracker {
    restart_times: Vec<Instant>,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a restart attempt
    pub fn record_restart(&mut self) {
        self.restart_times.push(Instant::now());
    }

    pub fn restart_count(&self) -> usize {
        self.restart_times.len()
    }

    /// Count restarts within the specified time window (in seconds)
    pub fn count_recent_restarts(&self, window_secs: u64) -> usize {
        let window = Duration::from_secs(window_secs);
        self.restart_times
            .iter()
            .filter(|time| time.elapsed() < window)
            .count()
    }

    /// Remove restart records older than the specified window
    pub fn prune_old_restarts(&mut self, window_secs: u64) {
        let window = Duration::from_secs(window_secs);
        self.restart_times.retain(|time| time.elapsed() < window);
    }
}

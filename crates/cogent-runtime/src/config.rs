//! [`RuntimeConfig`] – knobs of the reasoning cycle and the scheduler.

use std::time::Duration;

use cogent_kernel::DEFAULT_EVENT_CAPACITY;
use serde::{Deserialize, Serialize};

/// How agent tasks share the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Every agent runs as its own task on the shared tokio pool.
    #[default]
    Pool,
    /// Agents take turns in launch order; one round per turn.
    Sequential,
}

impl std::str::FromStr for SchedulingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pool" => Ok(SchedulingMode::Pool),
            "sequential" => Ok(SchedulingMode::Sequential),
            other => Err(format!("unknown scheduling mode '{other}' (expected pool or sequential)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub scheduling: SchedulingMode,
    /// Granularity of sleep and turn polling.
    pub sleep_poll: Duration,
    /// A sleeping agent runs a round at least this often.
    pub sleep_timeout: Duration,
    /// Let agents sleep when two consecutive cycles observed no change.
    pub sleep_on_no_change: bool,
    /// Terminate an agent after this many rounds.
    pub max_rounds: Option<u64>,
    /// Membership changes buffered per agent before it has to resynchronise
    /// with the registry.  Raise it for large populations.
    pub membership_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scheduling: SchedulingMode::Pool,
            sleep_poll: Duration::from_millis(1),
            sleep_timeout: Duration::from_millis(500),
            sleep_on_no_change: true,
            max_rounds: None,
            membership_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    pub fn scheduling(mut self, mode: SchedulingMode) -> Self {
        self.scheduling = mode;
        self
    }

    pub fn max_rounds(mut self, rounds: u64) -> Self {
        self.max_rounds = Some(rounds);
        self
    }

    pub fn sleep_timeout(mut self, timeout: Duration) -> Self {
        self.sleep_timeout = timeout;
        self
    }

    pub fn sleep_on_no_change(mut self, enabled: bool) -> Self {
        self.sleep_on_no_change = enabled;
        self
    }

    pub fn membership_capacity(mut self, capacity: usize) -> Self {
        self.membership_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.scheduling, SchedulingMode::Pool);
        assert_eq!(config.sleep_poll, Duration::from_millis(1));
        assert_eq!(config.sleep_timeout, Duration::from_millis(500));
        assert!(config.sleep_on_no_change);
        assert_eq!(config.max_rounds, None);
        assert_eq!(config.membership_capacity, 256);
    }

    #[test]
    fn scheduling_mode_parses_case_insensitively() {
        assert_eq!("Sequential".parse::<SchedulingMode>(), Ok(SchedulingMode::Sequential));
        assert_eq!("pool".parse::<SchedulingMode>(), Ok(SchedulingMode::Pool));
        assert!("round-robin".parse::<SchedulingMode>().is_err());
    }
}

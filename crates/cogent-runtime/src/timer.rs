//! [`TimerManager`] – per-agent timers that fire as `timer(Name)` percepts.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use cogent_types::{DatabaseFormula, Term};
use tracing::debug;

#[derive(Debug, Clone)]
struct Timer {
    interval: Duration,
    next: Instant,
    until: Instant,
}

/// Timers started by `starttimer` actions.  A timer fires every `interval`
/// until `duration` has passed since it was started.
#[derive(Debug, Default)]
pub struct TimerManager {
    timers: BTreeMap<String, Timer>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the timer `name`.
    pub fn start(&mut self, name: impl Into<String>, interval: Duration, duration: Duration, now: Instant) {
        let name = name.into();
        debug!(timer = %name, ?interval, ?duration, "timer started");
        self.timers.insert(
            name,
            Timer {
                interval,
                next: now + interval,
                until: now + duration,
            },
        );
    }

    /// Returns `false` when no such timer was running.
    pub fn cancel(&mut self, name: &str) -> bool {
        self.timers.remove(name).is_some()
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.timers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Names of the timers due at `now`, in name order.  Due timers are
    /// rescheduled, or removed once their duration has run out.
    pub fn due(&mut self, now: Instant) -> Vec<String> {
        let mut fired = Vec::new();
        let mut expired = Vec::new();
        for (name, timer) in &mut self.timers {
            if timer.next > now {
                continue;
            }
            fired.push(name.clone());
            while timer.next <= now {
                timer.next += timer.interval.max(Duration::from_millis(1));
            }
            if timer.next > timer.until {
                expired.push(name.clone());
            }
        }
        for name in expired {
            debug!(timer = %name, "timer expired");
            self.timers.remove(&name);
        }
        fired
    }

    /// Earliest moment any timer fires.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.next).min()
    }

    /// The percept a fired timer produces.
    pub fn percept(name: &str) -> DatabaseFormula {
        DatabaseFormula::fact(Term::compound("timer", vec![Term::atom(name)]))
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

//! Rolling episode statistics.

use std::collections::VecDeque;

/// Values every statistic starts with so that early rates are not extreme.
pub const NEUTRAL_SEED: [bool; 4] = [false; 4];

/// Bounded FIFO of boolean episode flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingStat {
    values: VecDeque<bool>,
    capacity: usize,
}

impl RollingStat {
    /// Create an empty statistic holding at most `capacity` flags.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Create a statistic prefilled with `seed`, subject to eviction.
    pub fn seeded(capacity: usize, seed: &[bool]) -> Self {
        let mut stat = Self::new(capacity);
        for &value in seed {
            stat.push(value);
        }
        stat
    }

    /// Record a flag, evicting the oldest one when full.
    pub fn push(&mut self, value: bool) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Fraction of recorded flags that are set.
    pub fn rate(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().filter(|&&v| v).count() as f64 / self.values.len() as f64
    }

    /// Number of recorded flags.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maximum number of flags.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Recorded flags, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.values.iter().copied()
    }
}

/// Terminal flags of one environment step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EpisodeOutcome {
    /// Every goal succeeded.
    pub success: bool,
    /// The world reported a collision.
    pub collision: bool,
    /// Some goal timed out.
    pub timeout: bool,
    /// Some goal left its bounds.
    pub out_of_bounds: bool,
}

/// The four rolling statistics an environment keeps across episodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeStats {
    /// Success flags.
    pub success: RollingStat,
    /// Timeout flags.
    pub timeout: RollingStat,
    /// Out-of-bounds flags.
    pub out_of_bounds: RollingStat,
    /// Collision flags.
    pub collision: RollingStat,
}

impl EpisodeStats {
    /// Create neutral-seeded statistics of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            success: RollingStat::seeded(capacity, &NEUTRAL_SEED),
            timeout: RollingStat::seeded(capacity, &NEUTRAL_SEED),
            out_of_bounds: RollingStat::seeded(capacity, &NEUTRAL_SEED),
            collision: RollingStat::seeded(capacity, &NEUTRAL_SEED),
        }
    }

    /// Record the outcome of a finished episode.
    pub fn record(&mut self, outcome: &EpisodeOutcome) {
        self.success.push(outcome.success);
        self.timeout.push(outcome.timeout);
        self.out_of_bounds.push(outcome.out_of_bounds);
        self.collision.push(outcome.collision);
    }
}

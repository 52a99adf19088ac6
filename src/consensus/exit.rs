//! Early termination on sustained agreement.

use serde::{Deserialize, Serialize};

/// When a session may complete before its last round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitCriteria {
    pub enabled: bool,
    /// Agreement a round needs to count toward convergence.
    pub consensus_threshold: f64,
    /// Consecutive qualifying rounds required.
    pub convergence_rounds: u32,
}

impl Default for ExitCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            consensus_threshold: 0.9,
            convergence_rounds: 2,
        }
    }
}

impl ExitCriteria {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn new(consensus_threshold: f64, convergence_rounds: u32) -> Self {
        Self {
            enabled: true,
            consensus_threshold,
            convergence_rounds,
        }
    }

    /// Whether a round with this agreement counts toward convergence.
    pub fn qualifies(&self, agreement_level: f64) -> bool {
        agreement_level >= self.consensus_threshold
    }
}

/// Counts consecutive qualifying rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceTracker {
    consecutive: u32,
}

impl ConvergenceTracker {
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    /// Records a completed round and reports whether the criteria are now met.
    ///
    /// A non-qualifying round resets the count. Disabled criteria never fire
    /// and leave the count untouched.
    pub fn record(&mut self, criteria: &ExitCriteria, agreement_level: f64) -> bool {
        if !criteria.enabled {
            return false;
        }

        if criteria.qualifies(agreement_level) {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }

        self.consecutive >= criteria.convergence_rounds.max(1)
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

//! Overdue fine computation

use chrono::{DateTime, Utc};

/// Fine per full day overdue, in minor currency units
pub const DEFAULT_FINE_PER_DAY: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FineCalculator {
    per_day: u32,
}

impl FineCalculator {
    pub fn new(per_day: u32) -> Self {
        Self { per_day }
    }

    pub fn per_day(&self) -> u32 {
        self.per_day
    }

    /// Fine owed for a loan due at `due` and returned at `returned`.
    ///
    /// Only whole days count: the overdue interval is truncated to whole
    /// hours, then to whole days, so anything under 24h late costs nothing.
    pub fn compute_fine(&self, due: DateTime<Utc>, returned: DateTime<Utc>) -> i64 {
        if returned <= due {
            return 0;
        }

        let days_overdue = (returned - due).num_hours() / 24;
        days_overdue.saturating_mul(i64::from(self.per_day))
    }
}

impl Default for FineCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_FINE_PER_DAY)
    }
}

use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// What a flush achieved, independent of how long it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Idle,
    Partial,
    Complete,
}

/// Outcome of a single autosave flush.
#[derive(Debug, Clone)]
pub struct FlushMetrics {
    pub flush_number: u64,
    pub duration_us: u128,
    /// Characters resident in the cache when the flush started.
    pub resident: usize,
    pub saved: usize,
}

impl FlushMetrics {
    /// Flushes slower than this hold the session map long enough to stall joins.
    pub const FLUSH_BUDGET_US: u128 = 250_000;

    pub fn failed(&self) -> usize {
        self.resident.saturating_sub(self.saved)
    }

    pub fn over_budget(&self) -> bool {
        self.duration_us > Self::FLUSH_BUDGET_US
    }

    pub fn outcome(&self) -> FlushOutcome {
        if self.resident == 0 {
            FlushOutcome::Idle
        } else if self.failed() > 0 {
            FlushOutcome::Partial
        } else {
            FlushOutcome::Complete
        }
    }

    pub fn log(&self) {
        match self.outcome() {
            FlushOutcome::Idle => {
                tracing::info!(flush = self.flush_number, "No characters to auto-save")
            }
            FlushOutcome::Partial => tracing::warn!(
                flush = self.flush_number,
                resident = self.resident,
                saved = self.saved,
                failed = self.failed(),
                "autosave completed with failures"
            ),
            FlushOutcome::Complete => tracing::info!(
                flush = self.flush_number,
                duration_us = self.duration_us,
                resident = self.resident,
                saved = self.saved,
                "autosave completed"
            ),
        }

        if self.over_budget() {
            tracing::warn!(
                flush = self.flush_number,
                duration_us = self.duration_us,
                resident = self.resident,
                saved = self.saved,
                failed = self.failed(),
                "autosave exceeded budget ({}us > {}us)",
                self.duration_us,
                Self::FLUSH_BUDGET_US
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_count_is_resident_minus_saved() {
        let m = FlushMetrics {
            flush_number: 1,
            duration_us: 10,
            resident: 5,
            saved: 3,
        };
        assert_eq!(m.failed(), 2);
        assert!(!m.over_budget());
    }

    #[test]
    fn slow_flush_is_over_budget() {
        let m = FlushMetrics {
            flush_number: 2,
            duration_us: FlushMetrics::FLUSH_BUDGET_US + 1,
            resident: 0,
            saved: 0,
        };
        assert!(m.over_budget());
        assert_eq!(m.failed(), 0);
        assert_eq!(m.outcome(), FlushOutcome::Idle);
    }

    #[test]
    fn slow_partial_flush_still_reports_failures() {
        let m = FlushMetrics {
            flush_number: 3,
            duration_us: FlushMetrics::FLUSH_BUDGET_US * 2,
            resident: 4,
            saved: 1,
        };
        assert!(m.over_budget());
        assert_eq!(m.outcome(), FlushOutcome::Partial);
        assert_eq!(m.failed(), 3);
        m.log();
    }
}

use crate::errors::FruitbenchError;

pub const DEFAULT_BUDGET_MS: f64 = 30_000.0;
pub const DEFAULT_MIN_REPS: u32 = 5;
pub const DEFAULT_MAX_REPS: u32 = 1000;

/// Bounds for how often a case is repeated and for how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepetitionPolicy {
    pub budget_ms: f64,
    pub min_reps: u32,
    pub max_reps: u32,
}

impl Default for RepetitionPolicy {
    fn default() -> Self {
        RepetitionPolicy {
            budget_ms: DEFAULT_BUDGET_MS,
            min_reps: DEFAULT_MIN_REPS,
            max_reps: DEFAULT_MAX_REPS,
        }
    }
}

impl RepetitionPolicy {
    pub fn new(budget_ms: f64, min_reps: u32, max_reps: u32) -> Result<Self, FruitbenchError> {
        if !budget_ms.is_finite() || budget_ms <= 0.0 {
            return Err(FruitbenchError::InvalidBudget { budget_ms });
        }
        if min_reps == 0 || min_reps > max_reps {
            return Err(FruitbenchError::InvalidRepetitionBounds {
                min: min_reps,
                max: max_reps,
            });
        }
        Ok(RepetitionPolicy {
            budget_ms,
            min_reps,
            max_reps,
        })
    }

    /// Number of repetitions to aim for, given the first run's total time.
    ///
    /// Fast cases fill the budget up to `max_reps`; slow ones still get
    /// `min_reps`. A non-positive first time yields `min_reps`.
    pub fn plan_reps(&self, first_total_ms: f64) -> u32 {
        let reps = if first_total_ms > 0.0 {
            let ratio = (self.budget_ms / first_total_ms).floor();
            if ratio >= self.max_reps as f64 {
                self.max_reps
            } else {
                (ratio as u32).max(self.min_reps)
            }
        } else {
            self.min_reps
        };

        tracing::info!(
            "Estimated number of runs: {} based on the first run time of {:.2} ms",
            reps,
            first_total_ms
        );
        reps
    }

    /// Whether the runs completed so far have used up the time budget.
    pub fn should_stop(&self, cumulative_total_ms: f64) -> bool {
        cumulative_total_ms >= self.budget_ms
    }
}

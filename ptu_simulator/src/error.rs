use std::time::Duration;

use crate::{controller::goal::GoalId, models::Axis};

#[derive(Debug, thiserror::Error)]
pub enum PtuError {
    #[error("Target {target} for {axis} is outside of limits [{min}, {max}]")]
    InvalidTarget {
        axis: Axis,
        target: f64,
        min: f64,
        max: f64,
    },

    #[error("Target for {axis} is not a finite number: {target}")]
    NonFiniteTarget { axis: Axis, target: f64 },

    #[error("Speed for {axis} must be finite and non-negative, got {speed}")]
    InvalidSpeed { axis: Axis, speed: f64 },

    #[error("Axis {0} is already in motion")]
    AxisBusy(Axis),

    #[error("Axis {axis} did not converge within {elapsed:?}")]
    ConvergenceTimeout { axis: Axis, elapsed: Duration },

    #[error("Goal {0} not found")]
    GoalNotFound(GoalId),

    #[error("Goal task failed: {0}")]
    GoalTaskFailed(#[from] tokio::task::JoinError),
}

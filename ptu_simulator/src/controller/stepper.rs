//! Per-tick increment shared by every control loop.
//!
//! Far from the target the step scales with the remaining error; close to it
//! the magnitude is floored at `min_step`, so a move finishes in a finite
//! number of ticks instead of approaching the target asymptotically.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Step formula used by combined pan+tilt goals.
///
/// Combined goals historically scaled the error by the loop period *before*
/// the floor and applied the axis speed on the position update, while
/// single-axis moves do the opposite. With the default parameters a combined
/// move therefore advances ten times faster near the target than a single
/// axis move, and its floored step can be larger than the move threshold.
/// Whether that is intended is an open product question, so both formulas
/// are kept and selected explicitly.
///
/// `Legacy` stays the default. With the default rate and limits its raw step
/// never exceeds `min_step`, so every tick moves exactly `speed * min_step`
/// (0.01). A combined goal whose targets are off that grid hops
/// around them and only ends when the time limit aborts it. `Unified` reaches
/// any target within the move threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombinedStepFormula {
    /// `speed * floor(loop_period * error)`
    #[default]
    Legacy,
    /// `loop_period * floor(speed * error)`, same as single-axis moves.
    Unified,
}

/// Raises `raw` to at least `min_step` in magnitude, keeping its sign.
///
/// Zero counts as negative.
pub fn floor_step(raw: f64, min_step: f64) -> f64 {
    if raw.abs() < min_step {
        if raw > 0.0 { min_step } else { -min_step }
    } else {
        raw
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stepper {
    loop_period: f64,
}

impl Stepper {
    pub fn new(internal_rate: f64) -> Self {
        Self {
            loop_period: 1.0 / internal_rate,
        }
    }

    pub fn loop_period(&self) -> f64 {
        self.loop_period
    }

    /// Saturates instead of panicking on a period `Duration` cannot hold.
    pub fn tick(&self) -> Duration {
        Duration::try_from_secs_f64(self.loop_period).unwrap_or(Duration::MAX)
    }

    /// Position delta for one single-axis tick.
    pub fn single_axis_delta(&self, current: f64, target: f64, speed: f64, min_step: f64) -> f64 {
        let raw_step = speed * (target - current);
        self.loop_period * floor_step(raw_step, min_step)
    }

    /// Position delta for one axis of a combined tick.
    pub fn combined_axis_delta(
        &self,
        current: f64,
        target: f64,
        speed: f64,
        min_step: f64,
        formula: CombinedStepFormula,
    ) -> f64 {
        match formula {
            CombinedStepFormula::Legacy => {
                let raw_step = self.loop_period * (target - current);
                speed * floor_step(raw_step, min_step)
            }
            CombinedStepFormula::Unified => {
                self.single_axis_delta(current, target, speed, min_step)
            }
        }
    }
}

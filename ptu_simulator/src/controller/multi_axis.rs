use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use utilities::control_loop::{ControlLoop, Progress};

use crate::controller::{
    goal::{GoalContext, GoalFeedback},
    state_store::{AxisStateStore, PtuAxes},
    stepper::{CombinedStepFormula, Stepper},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombinedTick {
    pub pan: f64,
    pub tilt: f64,
    pub pan_converged: bool,
    pub tilt_converged: bool,
}

impl CombinedTick {
    pub fn converged(&self) -> bool {
        self.pan_converged && self.tilt_converged
    }
}

/// One combined tick: both candidates are computed from the positions at the
/// start of the tick, and an axis that has already converged keeps its
/// position while the other one continues.
pub fn step_combined(
    axes: &mut PtuAxes,
    pan_target: f64,
    tilt_target: f64,
    stepper: &Stepper,
    formula: CombinedStepFormula,
) -> CombinedTick {
    let next_pan = axes.pan.next_position_combined(pan_target, stepper, formula);
    let next_tilt = axes.tilt.next_position_combined(tilt_target, stepper, formula);

    if !axes.tilt.is_converged(tilt_target) {
        axes.tilt.move_to(next_tilt);
    }
    if !axes.pan.is_converged(pan_target) {
        axes.pan.move_to(next_pan);
    }

    CombinedTick {
        pan: axes.pan.position(),
        tilt: axes.tilt.position(),
        pan_converged: axes.pan.is_converged(pan_target),
        tilt_converged: axes.tilt.is_converged(tilt_target),
    }
}

/// Moves pan and tilt together in a single loop.
pub struct CombinedMotion {
    store: AxisStateStore,
    pan_target: f64,
    tilt_target: f64,
    pan_excursion: f64,
    tilt_excursion: f64,
    stepper: Stepper,
    formula: CombinedStepFormula,

    goal: Option<GoalContext>,

    time_limit: Option<Duration>,
    start_time: Instant,
}

impl CombinedMotion {
    /// Returns `None` when both axes are already within their thresholds.
    pub async fn start(
        store: AxisStateStore,
        pan_target: f64,
        tilt_target: f64,
        stepper: Stepper,
        formula: CombinedStepFormula,
        time_limit: Option<Duration>,
        goal: Option<GoalContext>,
    ) -> Option<Self> {
        let (needs_motion, pan_excursion, tilt_excursion) = store
            .with_axes(|axes| {
                (
                    axes.pan.needs_motion(pan_target) || axes.tilt.needs_motion(tilt_target),
                    axes.pan.error_to(pan_target),
                    axes.tilt.error_to(tilt_target),
                )
            })
            .await;

        if !needs_motion {
            debug!(pan_target, tilt_target, "Pan and tilt already within threshold");
            return None;
        }

        Some(Self {
            store,
            pan_target,
            tilt_target,
            pan_excursion,
            tilt_excursion,
            stepper,
            formula,
            goal,
            time_limit,
            start_time: Instant::now(),
        })
    }
}

impl ControlLoop for CombinedMotion {
    type Feedback = GoalFeedback;

    async fn advance(&mut self) -> Progress<GoalFeedback> {
        let (pan_target, tilt_target) = (self.pan_target, self.tilt_target);
        let (stepper, formula) = (self.stepper, self.formula);
        let (pan_excursion, tilt_excursion) = (self.pan_excursion, self.tilt_excursion);

        let (tick, percent_pan, percent_tilt) = self
            .store
            .with_axes(|axes| {
                let tick = step_combined(axes, pan_target, tilt_target, &stepper, formula);

                let percent_pan = if tick.pan_converged {
                    100.0
                } else {
                    axes.pan.completion(pan_target, pan_excursion)
                };
                let percent_tilt = if tick.tilt_converged {
                    100.0
                } else {
                    axes.tilt.completion(tilt_target, tilt_excursion)
                };

                (tick, percent_pan, percent_tilt)
            })
            .await;

        debug!(pan = tick.pan, tilt = tick.tilt, "Pan and tilt stepped");

        if tick.converged() {
            Progress::Converged
        } else {
            Progress::Moving(GoalFeedback::Combined {
                percent_pan,
                percent_tilt,
            })
        }
    }

    fn publish_feedback(&mut self, feedback: GoalFeedback) {
        if let Some(goal) = &self.goal {
            goal.publish_feedback(feedback);
        }
    }

    fn is_cancel_requested(&self) -> bool {
        self.goal
            .as_ref()
            .is_some_and(|goal| goal.is_cancel_requested())
    }

    fn get_loop_period(&self) -> Duration {
        self.stepper.tick()
    }

    fn get_time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn get_start_time(&self) -> Instant {
        self.start_time
    }
}

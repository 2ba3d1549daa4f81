use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;
use utilities::control_loop::{ControlLoop, Progress};

use crate::{
    controller::{
        goal::{GoalContext, GoalFeedback},
        state_store::AxisStateStore,
        stepper::Stepper,
    },
    models::Axis,
};

/// Drives one axis toward a target, one tick at a time.
///
/// Used both by immediate commands (no goal context, so no feedback and no
/// cancellation) and by single-axis goals.
pub struct SingleAxisMotion {
    store: AxisStateStore,
    axis: Axis,
    target: f64,
    excursion: f64,
    stepper: Stepper,

    goal: Option<GoalContext>,

    time_limit: Option<Duration>,
    start_time: Instant,
    ticks: u64,
}

impl SingleAxisMotion {
    /// Returns `None` when the axis is already within its move threshold.
    pub async fn start(
        store: AxisStateStore,
        axis: Axis,
        target: f64,
        stepper: Stepper,
        time_limit: Option<Duration>,
        goal: Option<GoalContext>,
    ) -> Option<Self> {
        let (needs_motion, excursion) = store
            .with_axes(|axes| {
                let model = axes.axis(axis);
                (model.needs_motion(target), model.error_to(target))
            })
            .await;

        if !needs_motion {
            debug!(%axis, target, "Axis already within threshold");
            return None;
        }

        Some(Self {
            store,
            axis,
            target,
            excursion,
            stepper,
            goal,
            time_limit,
            start_time: Instant::now(),
            ticks: 0,
        })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl ControlLoop for SingleAxisMotion {
    type Feedback = GoalFeedback;

    async fn advance(&mut self) -> Progress<GoalFeedback> {
        let (axis, target, stepper, excursion) =
            (self.axis, self.target, self.stepper, self.excursion);

        let (position, converged, completion) = self
            .store
            .with_axes(|axes| {
                let model = axes.axis_mut(axis);
                let position = model.step_toward(target, &stepper);
                (
                    position,
                    model.is_converged(target),
                    model.completion(target, excursion),
                )
            })
            .await;

        self.ticks += 1;
        debug!(%axis, position, tick = self.ticks, "Axis stepped");

        if converged {
            Progress::Converged
        } else {
            Progress::Moving(GoalFeedback::Single {
                percent: completion,
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

#[cfg(test)]
mod tests {
    use utilities::control_loop::LoopOutcome;

    use super::*;
    use crate::controller::axis::{AxisLimits, AxisModel};

    fn store() -> AxisStateStore {
        let limits = AxisLimits {
            min: -1.0,
            max: 1.0,
            min_step: 0.1,
            move_threshold: 0.001,
        };
        AxisStateStore::new(AxisModel::new(limits, 0.1), AxisModel::new(limits, 0.1))
    }

    #[tokio::test(start_paused = true)]
    async fn target_within_threshold_needs_no_motion() {
        let motion = SingleAxisMotion::start(
            store(),
            Axis::Pan,
            0.0005,
            Stepper::new(100.0),
            None,
            None,
        )
        .await;

        assert!(motion.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_motion_reaches_target() {
        let store = store();
        let mut motion = SingleAxisMotion::start(
            store.clone(),
            Axis::Tilt,
            -0.05,
            Stepper::new(100.0),
            None,
            None,
        )
        .await
        .unwrap();

        assert_eq!(motion.run().await, LoopOutcome::Converged);
        assert!((49..=51).contains(&motion.ticks()));
        assert!((store.position(Axis::Tilt).await + 0.05).abs() < 0.001);
        assert_eq!(store.position(Axis::Pan).await, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn time_limit_ends_a_diverging_motion() {
        let store = store();
        // Zero speed floors every step to -min_step, away from a positive target.
        store.set_speed(0.0, 0.1).await;

        let mut motion = SingleAxisMotion::start(
            store.clone(),
            Axis::Pan,
            0.5,
            Stepper::new(100.0),
            Some(Duration::from_millis(200)),
            None,
        )
        .await
        .unwrap();

        assert_eq!(motion.run().await, LoopOutcome::TimedOut);
        assert!(store.position(Axis::Pan).await < 0.0);
    }
}

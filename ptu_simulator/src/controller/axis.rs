use crate::{
    controller::stepper::{CombinedStepFormula, Stepper},
    error::PtuError,
    models::Axis,
};

/// Static configuration of one axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisLimits {
    pub min: f64,
    pub max: f64,
    pub min_step: f64,
    pub move_threshold: f64,
}

impl AxisLimits {
    pub fn contains(&self, target: f64) -> bool {
        (self.min..=self.max).contains(&target)
    }
}

/// Simulated position of one axis together with the parameters that drive it.
///
/// The model never clamps its own position to `[min, max]`; targets are
/// checked before a motion starts, not while it runs.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisModel {
    position: f64,
    speed: f64,
    limits: AxisLimits,
}

impl AxisModel {
    pub fn new(limits: AxisLimits, speed: f64) -> Self {
        Self {
            position: 0.0,
            speed,
            limits,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn limits(&self) -> &AxisLimits {
        &self.limits
    }

    pub(crate) fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub(crate) fn reset(&mut self) {
        self.position = 0.0;
    }

    pub fn error_to(&self, target: f64) -> f64 {
        (target - self.position).abs()
    }

    /// Entry guard: a motion only starts when the target is farther than the threshold.
    pub fn needs_motion(&self, target: f64) -> bool {
        self.error_to(target) > self.limits.move_threshold
    }

    pub fn is_converged(&self, target: f64) -> bool {
        self.error_to(target) < self.limits.move_threshold
    }

    pub fn check_target(&self, axis: Axis, target: f64) -> Result<(), PtuError> {
        if !target.is_finite() {
            return Err(PtuError::NonFiniteTarget { axis, target });
        }
        if !self.limits.contains(target) {
            return Err(PtuError::InvalidTarget {
                axis,
                target,
                min: self.limits.min,
                max: self.limits.max,
            });
        }
        Ok(())
    }

    pub fn next_position(&self, target: f64, stepper: &Stepper) -> f64 {
        self.position
            + stepper.single_axis_delta(self.position, target, self.speed, self.limits.min_step)
    }

    pub fn next_position_combined(
        &self,
        target: f64,
        stepper: &Stepper,
        formula: CombinedStepFormula,
    ) -> f64 {
        self.position
            + stepper.combined_axis_delta(
                self.position,
                target,
                self.speed,
                self.limits.min_step,
                formula,
            )
    }

    /// Applies one single-axis tick and returns the new position.
    pub fn step_toward(&mut self, target: f64, stepper: &Stepper) -> f64 {
        self.position = self.next_position(target, stepper);
        self.position
    }

    pub(crate) fn move_to(&mut self, position: f64) {
        self.position = position;
    }

    /// Percent of `excursion` already covered.
    pub fn completion(&self, target: f64, excursion: f64) -> f64 {
        100.0 - self.error_to(target) / excursion * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pan() -> AxisModel {
        AxisModel::new(
            AxisLimits {
                min: -1.0,
                max: 1.0,
                min_step: 0.1,
                move_threshold: 0.001,
            },
            0.1,
        )
    }

    #[test]
    fn reference_move_converges_within_tick_bound() {
        let stepper = Stepper::new(100.0);
        let mut model = pan();
        let target = 0.5;

        let floor = stepper.loop_period() * model.limits().min_step;
        let bound = (model.error_to(target) / floor).ceil() as u32 + 1;

        let first = model.step_toward(target, &stepper);
        assert!((first - 0.001).abs() < 1e-12);

        let mut ticks = 1;
        while !model.is_converged(target) {
            model.step_toward(target, &stepper);
            ticks += 1;
            assert!(ticks <= bound, "no convergence after {ticks} ticks");
        }

        assert!((499..=501).contains(&ticks));
        assert!(model.error_to(target) < 0.001);
    }

    #[test]
    fn proportional_region_converges_from_both_sides() {
        let stepper = Stepper::new(100.0);

        for &target in &[-0.95, -0.3, 0.7, 1.0] {
            let mut model = pan();
            model.set_speed(5.0);
            let floor = stepper.loop_period() * model.limits().min_step;
            let bound = (model.error_to(target) / floor).ceil() as u32 + 1;

            let mut ticks = 0;
            while !model.is_converged(target) {
                model.step_toward(target, &stepper);
                ticks += 1;
                assert!(ticks <= bound);
            }
        }
    }

    #[test]
    fn entry_guard_and_convergence_thresholds() {
        let model = pan();

        assert!(!model.needs_motion(0.0005));
        assert!(!model.needs_motion(0.001));
        assert!(model.needs_motion(0.0011));
        assert!(model.is_converged(0.0009));
        assert!(!model.is_converged(0.001));
    }

    #[test]
    fn targets_are_checked_against_limits() {
        let model = pan();

        assert!(model.check_target(Axis::Pan, 1.0).is_ok());
        assert!(matches!(
            model.check_target(Axis::Pan, 1.5),
            Err(PtuError::InvalidTarget { axis: Axis::Pan, .. })
        ));
        assert!(matches!(
            model.check_target(Axis::Pan, f64::NAN),
            Err(PtuError::NonFiniteTarget { .. })
        ));
    }

    #[test]
    fn reset_keeps_speed() {
        let stepper = Stepper::new(100.0);
        let mut model = pan();
        model.set_speed(0.4);
        model.step_toward(0.5, &stepper);

        model.reset();

        assert_eq!(model.position(), 0.0);
        assert_eq!(model.speed(), 0.4);
    }

    #[test]
    fn completion_is_relative_to_excursion() {
        let mut model = pan();
        model.move_to(0.25);

        assert!((model.completion(0.5, 0.5) - 50.0).abs() < 1e-9);
    }
}

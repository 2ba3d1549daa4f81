use std::{collections::HashMap, time::Duration};

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use utilities::control_loop::{ControlLoop as _, LoopOutcome};
use uuid::Uuid;

use crate::{
    config::PtuConfig,
    controller::{
        axis::{AxisLimits, AxisModel},
        goal::{
            GoalContext, GoalFeedback, GoalHandle, GoalId, GoalRecord, GoalRequest, GoalResult,
            GoalStatus, goal_channels,
        },
        multi_axis::CombinedMotion,
        single_axis::SingleAxisMotion,
        state_store::{AxisStateStore, MotionLease, OverlapPolicy},
        stepper::{CombinedStepFormula, Stepper},
    },
    error::PtuError,
    models::{Axis, PtuLimits, PtuState},
};

/// Finished goals are kept for status queries until the registry grows past this.
const GOAL_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct MotionSettings {
    pub stepper: Stepper,
    pub combined_step: CombinedStepFormula,
    pub overlap_policy: OverlapPolicy,
    pub validate_targets: bool,
    pub time_limit: Option<Duration>,
}

impl From<&PtuConfig> for MotionSettings {
    fn from(config: &PtuConfig) -> Self {
        Self {
            stepper: Stepper::new(config.internal_rate),
            combined_step: config.combined_step,
            overlap_policy: config.overlap_policy,
            validate_targets: config.validate_targets,
            time_limit: config.time_limit(),
        }
    }
}

/// The simulated pan/tilt unit.
pub struct PtuController {
    store: AxisStateStore,
    settings: MotionSettings,
    limits: PtuLimits,
    goals: Mutex<HashMap<GoalId, GoalRecord>>,
}

impl PtuController {
    pub fn new(config: &PtuConfig) -> Self {
        let pan = AxisModel::new(
            AxisLimits {
                min: config.pan.min,
                max: config.pan.max,
                min_step: config.min_step,
                move_threshold: config.pan.move_threshold,
            },
            config.pan.speed,
        );
        let tilt = AxisModel::new(
            AxisLimits {
                min: config.tilt.min,
                max: config.tilt.max,
                min_step: config.min_step,
                move_threshold: config.tilt.move_threshold,
            },
            config.tilt.speed,
        );

        Self {
            store: AxisStateStore::new(pan, tilt),
            settings: MotionSettings::from(config),
            limits: PtuLimits {
                pan_min: config.pan.min,
                pan_max: config.pan.max,
                tilt_min: config.tilt.min,
                tilt_max: config.tilt.max,
            },
            goals: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &AxisStateStore {
        &self.store
    }

    pub fn get_limits(&self) -> PtuLimits {
        self.limits
    }

    pub async fn state(&self) -> PtuState {
        let snapshot = self.store.snapshot().await;

        PtuState {
            timestamp: Utc::now(),
            pan: snapshot.pan,
            tilt: snapshot.tilt,
            pan_speed: snapshot.pan_speed,
            tilt_speed: snapshot.tilt_speed,
            pan_moving: self.store.is_moving(Axis::Pan),
            tilt_moving: self.store.is_moving(Axis::Tilt),
        }
    }

    async fn check_targets(&self, targets: &[(Axis, f64)]) -> Result<(), PtuError> {
        let validate = self.settings.validate_targets;

        self.store
            .with_axes(|axes| {
                for &(axis, target) in targets {
                    match axes.axis(axis).check_target(axis, target) {
                        Err(PtuError::InvalidTarget { .. }) if !validate => {}
                        result => result?,
                    }
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn set_pan(&self, target: f64) -> Result<(), PtuError> {
        self.set_axis(Axis::Pan, target).await
    }

    #[instrument(skip(self))]
    pub async fn set_tilt(&self, target: f64) -> Result<(), PtuError> {
        self.set_axis(Axis::Tilt, target).await
    }

    async fn set_axis(&self, axis: Axis, target: f64) -> Result<(), PtuError> {
        self.check_targets(&[(axis, target)]).await?;

        let _lease = self
            .store
            .lease(&[axis], self.settings.overlap_policy)
            .await
            .inspect_err(|e| warn!("Rejected {} command: {}", axis, e))?;

        info!("Moving {} to {}", axis, target);
        self.move_axis(axis, target).await
    }

    /// Pan converges first, then tilt.
    #[instrument(skip(self))]
    pub async fn set_pan_tilt(&self, pan: f64, tilt: f64) -> Result<(), PtuError> {
        self.check_targets(&[(Axis::Pan, pan), (Axis::Tilt, tilt)])
            .await?;

        let _lease = self
            .store
            .lease(&[Axis::Pan, Axis::Tilt], self.settings.overlap_policy)
            .await
            .inspect_err(|e| warn!("Rejected pan/tilt command: {}", e))?;

        info!("Moving pan to {} and tilt to {}", pan, tilt);
        self.move_axis(Axis::Pan, pan).await?;
        self.move_axis(Axis::Tilt, tilt).await
    }

    async fn move_axis(&self, axis: Axis, target: f64) -> Result<(), PtuError> {
        let Some(mut motion) = SingleAxisMotion::start(
            self.store.clone(),
            axis,
            target,
            self.settings.stepper,
            self.settings.time_limit,
            None,
        )
        .await
        else {
            return Ok(());
        };

        match motion.run().await {
            LoopOutcome::TimedOut => {
                warn!("{} gave up after {} ticks", axis, motion.ticks());
                Err(PtuError::ConvergenceTimeout {
                    axis,
                    elapsed: motion.elapsed(),
                })
            }
            // Immediate motions carry no cancel token.
            LoopOutcome::Converged | LoopOutcome::Canceled => {
                debug!("{} converged after {} ticks", axis, motion.ticks());
                Ok(())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn set_speed(&self, pan_speed: f64, tilt_speed: f64) -> Result<(), PtuError> {
        for (axis, speed) in [(Axis::Pan, pan_speed), (Axis::Tilt, tilt_speed)] {
            if !speed.is_finite() || speed < 0.0 {
                return Err(PtuError::InvalidSpeed { axis, speed });
            }
        }

        self.store.set_speed(pan_speed, tilt_speed).await;
        info!("Speed set to pan {} tilt {}", pan_speed, tilt_speed);
        Ok(())
    }

    /// Teleports both axes to zero. Speeds and running motions are untouched.
    pub async fn reset(&self) {
        self.store.reset().await;
        info!("Positions reset");
    }

    /// Accepts a goal and starts it in its own task.
    #[instrument(skip(self))]
    pub async fn submit_goal(&self, request: GoalRequest) -> Result<GoalHandle, PtuError> {
        let kind = request.kind();
        self.check_targets(&request.targets()).await?;

        let lease = self
            .store
            .lease_now(kind.axes(), self.settings.overlap_policy)
            .inspect_err(|e| warn!("Rejected {} goal: {}", kind, e))?;

        let id = Uuid::new_v4();
        let (context, record, receivers) = goal_channels(id, kind);
        self.register(id, record).await;

        let task = tokio::spawn(execute_goal(
            self.store.clone(),
            self.settings,
            request,
            context,
            lease,
        ));

        info!(%id, "Accepted {} goal", kind);
        Ok(GoalHandle::new(id, receivers, task))
    }

    async fn register(&self, id: GoalId, record: GoalRecord) {
        let mut goals = self.goals.lock().await;
        if goals.len() >= GOAL_HISTORY {
            goals.retain(|_, record| !record.is_terminal());
        }
        goals.insert(id, record);
    }

    pub async fn cancel_goal(&self, id: GoalId) -> Result<(), PtuError> {
        let goals = self.goals.lock().await;
        let record = goals.get(&id).ok_or(PtuError::GoalNotFound(id))?;

        info!(%id, "Cancel requested for {} goal", record.kind());
        record.cancel();
        Ok(())
    }

    pub async fn goal_status(
        &self,
        id: GoalId,
    ) -> Result<(GoalStatus, Option<GoalFeedback>), PtuError> {
        let goals = self.goals.lock().await;
        let record = goals.get(&id).ok_or(PtuError::GoalNotFound(id))?;

        Ok((record.status(), record.latest_feedback()))
    }

    /// Requests cancellation of every goal that is still running.
    pub async fn shutdown(&self) {
        let goals = self.goals.lock().await;
        for (id, record) in goals.iter().filter(|(_, record)| !record.is_terminal()) {
            debug!(%id, "Canceling goal on shutdown");
            record.cancel();
        }
    }
}

/// Waits for a queued lease, polling cancellation once per tick.
async fn wait_lease_or_cancel(
    store: &AxisStateStore,
    axes: &[Axis],
    context: &GoalContext,
    tick: Duration,
) -> Option<MotionLease> {
    let lease = store.wait_lease(axes);
    tokio::pin!(lease);

    loop {
        tokio::select! {
            lease = &mut lease => return Some(lease),
            _ = tokio::time::sleep(tick) => {
                if context.is_cancel_requested() {
                    return None;
                }
            }
        }
    }
}

async fn execute_goal(
    store: AxisStateStore,
    settings: MotionSettings,
    request: GoalRequest,
    context: GoalContext,
    lease: Option<MotionLease>,
) -> GoalResult {
    let id = context.id();
    let kind = request.kind();

    let _lease = match lease {
        Some(lease) => lease,
        None => {
            debug!(%id, "Waiting for {} to become free", kind);
            match wait_lease_or_cancel(&store, kind.axes(), &context, settings.stepper.tick()).await
            {
                Some(lease) => lease,
                None => {
                    info!(%id, "{} goal canceled while queued", kind);
                    return context.finish(GoalStatus::Canceled);
                }
            }
        }
    };

    let outcome = match request {
        GoalRequest::Pan { target } => {
            run_single(&store, &settings, Axis::Pan, target, &context).await
        }
        GoalRequest::Tilt { target } => {
            run_single(&store, &settings, Axis::Tilt, target, &context).await
        }
        GoalRequest::PanTilt { pan, tilt } => {
            match CombinedMotion::start(
                store.clone(),
                pan,
                tilt,
                settings.stepper,
                settings.combined_step,
                settings.time_limit,
                Some(context.clone()),
            )
            .await
            {
                Some(mut motion) => motion.run().await,
                None => LoopOutcome::Converged,
            }
        }
    };

    let status = match outcome {
        LoopOutcome::Converged => GoalStatus::Succeeded,
        LoopOutcome::Canceled => GoalStatus::Canceled,
        LoopOutcome::TimedOut => {
            warn!(%id, "{} goal exceeded its time limit", kind);
            GoalStatus::Aborted
        }
    };

    info!(%id, "{} goal {}", kind, status);
    context.finish(status)
}

async fn run_single(
    store: &AxisStateStore,
    settings: &MotionSettings,
    axis: Axis,
    target: f64,
    context: &GoalContext,
) -> LoopOutcome {
    match SingleAxisMotion::start(
        store.clone(),
        axis,
        target,
        settings.stepper,
        settings.time_limit,
        Some(context.clone()),
    )
    .await
    {
        Some(mut motion) => motion.run().await,
        None => LoopOutcome::Converged,
    }
}

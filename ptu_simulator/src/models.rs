use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::{
    controller::goal::{GoalFeedback, GoalId, GoalRequest, GoalStatus},
    error::PtuError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Pan,
    Tilt,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Pan => write!(f, "pan"),
            Axis::Tilt => write!(f, "tilt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PtuLimits {
    pub pan_min: f64,
    pub pan_max: f64,
    pub tilt_min: f64,
    pub tilt_max: f64,
}

/// Snapshot emitted by the state monitor.
#[derive(Debug, Clone, PartialEq)]
pub struct PtuState {
    pub timestamp: DateTime<Utc>,
    pub pan: f64,
    pub tilt: f64,
    pub pan_speed: f64,
    pub tilt_speed: f64,
    pub pan_moving: bool,
    pub tilt_moving: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPan(f64),
    SetTilt(f64),
    SetPanTilt { pan: f64, tilt: f64 },
    SetSpeed { pan_speed: f64, tilt_speed: f64 },
    Reset,
    GetLimits,
    GetState,

    SubmitGoal(GoalRequest),
    CancelGoal(GoalId),
    GoalStatus(GoalId),
}

impl Command {
    pub fn is_get_state(&self) -> bool {
        matches!(self, Command::GetState)
    }
}

#[derive(Debug, Clone)]
pub enum CommandResponse {
    Success,
    Limits(PtuLimits),
    State(PtuState),
    GoalAccepted(GoalId),
    GoalStatus {
        id: GoalId,
        status: GoalStatus,
        feedback: Option<GoalFeedback>,
    },
}

#[derive(Debug, Clone)]
pub struct CommandError {
    pub code: u16,
    pub message: String,
}

impl CommandError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<PtuError> for CommandError {
    fn from(error: PtuError) -> Self {
        let code = match &error {
            PtuError::InvalidTarget { .. }
            | PtuError::NonFiniteTarget { .. }
            | PtuError::InvalidSpeed { .. } => 400,
            PtuError::GoalNotFound(_) => 404,
            PtuError::AxisBusy(_) => 409,
            PtuError::ConvergenceTimeout { .. } => 504,
            PtuError::GoalTaskFailed(_) => 500,
        };

        CommandError::new(code, error.to_string())
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {}: {}", self.code, self.message)
    }
}

pub type CommandResult = Result<CommandResponse, CommandError>;

#[derive(Debug)]
pub struct CommandEnvelope {
    pub command: Command,
    pub response: oneshot::Sender<CommandResult>,
}

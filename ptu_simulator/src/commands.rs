use crate::controller::goal::GoalRequest;
use crate::models::{Command, CommandEnvelope, CommandResult};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Parses one `verb[:arg[:arg]]` line of the socket protocol.
pub fn parse(cmd_str: &str) -> Option<Command> {
    let parts: Vec<&str> = cmd_str.trim().split(':').collect();

    let float = |index: usize| parts.get(index)?.trim().parse::<f64>().ok();
    let id = |index: usize| Uuid::parse_str(parts.get(index)?.trim()).ok();
    let arity = |expected: usize| parts.len() == expected + 1;

    let command = match parts[0] {
        "set_pan" if arity(1) => Command::SetPan(float(1)?),
        "set_tilt" if arity(1) => Command::SetTilt(float(1)?),
        "set_pan_tilt" if arity(2) => Command::SetPanTilt {
            pan: float(1)?,
            tilt: float(2)?,
        },
        "set_speed" if arity(2) => Command::SetSpeed {
            pan_speed: float(1)?,
            tilt_speed: float(2)?,
        },
        "reset" if arity(0) => Command::Reset,
        "get_limits" if arity(0) => Command::GetLimits,
        "get_state" if arity(0) => Command::GetState,
        "goal_pan" if arity(1) => Command::SubmitGoal(GoalRequest::Pan { target: float(1)? }),
        "goal_tilt" if arity(1) => Command::SubmitGoal(GoalRequest::Tilt { target: float(1)? }),
        "goal_pan_tilt" if arity(2) => Command::SubmitGoal(GoalRequest::PanTilt {
            pan: float(1)?,
            tilt: float(2)?,
        }),
        "cancel" if arity(1) => Command::CancelGoal(id(1)?),
        "goal_status" if arity(1) => Command::GoalStatus(id(1)?),
        _ => return None,
    };

    Some(command)
}

pub fn parse_command(cmd_str: &str) -> Option<(CommandEnvelope, oneshot::Receiver<CommandResult>)> {
    let command = parse(cmd_str)?;
    let (tx, rx) = oneshot::channel();

    Some((
        CommandEnvelope {
            command,
            response: tx,
        },
        rx,
    ))
}

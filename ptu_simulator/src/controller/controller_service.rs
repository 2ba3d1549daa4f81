use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::controller::ptu::PtuController;
use crate::models::{Command, CommandEnvelope, CommandError, CommandResponse, CommandResult};

/// Drains the command channel. Every request runs in its own task, so a long
/// immediate move never blocks the next command.
pub async fn run_controller(
    mut command_rx: mpsc::Receiver<CommandEnvelope>,
    controller: Arc<PtuController>,
) -> Result<()> {
    while let Some(envelope) = command_rx.recv().await {
        let controller = controller.clone();

        tokio::spawn(async move {
            let CommandEnvelope { command, response } = envelope;
            debug!(?command, "Dispatching command");

            let result = handle_command(&controller, command).await;
            if let Err(e) = &result {
                warn!("Command failed: {}", e);
            }

            if response.send(result).is_err() {
                debug!("Requester went away before the response was ready");
            }
        });
    }

    Ok(())
}

pub async fn handle_command(controller: &PtuController, command: Command) -> CommandResult {
    match command {
        Command::SetPan(target) => controller
            .set_pan(target)
            .await
            .map(|_| CommandResponse::Success)
            .map_err(CommandError::from),
        Command::SetTilt(target) => controller
            .set_tilt(target)
            .await
            .map(|_| CommandResponse::Success)
            .map_err(CommandError::from),
        Command::SetPanTilt { pan, tilt } => controller
            .set_pan_tilt(pan, tilt)
            .await
            .map(|_| CommandResponse::Success)
            .map_err(CommandError::from),
        Command::SetSpeed {
            pan_speed,
            tilt_speed,
        } => controller
            .set_speed(pan_speed, tilt_speed)
            .await
            .map(|_| CommandResponse::Success)
            .map_err(CommandError::from),
        Command::Reset => {
            controller.reset().await;
            Ok(CommandResponse::Success)
        }
        Command::GetLimits => Ok(CommandResponse::Limits(controller.get_limits())),
        Command::GetState => Ok(CommandResponse::State(controller.state().await)),
        Command::SubmitGoal(request) => controller
            .submit_goal(request)
            .await
            .map(|handle| CommandResponse::GoalAccepted(handle.id()))
            .map_err(CommandError::from),
        Command::CancelGoal(id) => controller
            .cancel_goal(id)
            .await
            .map(|_| CommandResponse::Success)
            .map_err(CommandError::from),
        Command::GoalStatus(id) => controller
            .goal_status(id)
            .await
            .map(|(status, feedback)| CommandResponse::GoalStatus {
                id,
                status,
                feedback,
            })
            .map_err(CommandError::from),
    }
}

pub fn create_controller(config: &crate::config::PtuConfig) -> Arc<PtuController> {
    Arc::new(PtuController::new(config))
}

#[cfg(test)]
mod tests {
    use tokio::sync::oneshot;

    use super::*;
    use crate::config::PtuConfig;

    async fn request(tx: &mpsc::Sender<CommandEnvelope>, command: Command) -> CommandResult {
        let (response, rx) = oneshot::channel();
        tx.send(CommandEnvelope { command, response }).await.unwrap();
        rx.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn dispatcher_answers_every_request() {
        let controller = create_controller(&PtuConfig::default());
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(run_controller(rx, controller.clone()));

        assert!(matches!(
            request(&tx, Command::SetPan(0.05)).await,
            Ok(CommandResponse::Success)
        ));
        assert!((controller.store().position(crate::models::Axis::Pan).await - 0.05).abs() < 0.001);

        assert!(matches!(
            request(&tx, Command::GetLimits).await,
            Ok(CommandResponse::Limits(limits)) if limits.tilt_max == 0.5
        ));

        let error = request(&tx, Command::SetTilt(3.0)).await.unwrap_err();
        assert_eq!(error.code, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_axis_maps_to_conflict() {
        let controller = create_controller(&PtuConfig::default());
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(run_controller(rx, controller.clone()));

        let Ok(CommandResponse::GoalAccepted(id)) = request(
            &tx,
            Command::SubmitGoal(crate::controller::goal::GoalRequest::Pan { target: 0.5 }),
        )
        .await
        else {
            panic!("goal was not accepted");
        };

        let error = request(&tx, Command::SetPan(-0.5)).await.unwrap_err();
        assert_eq!(error.code, 409);

        assert!(matches!(
            request(&tx, Command::CancelGoal(id)).await,
            Ok(CommandResponse::Success)
        ));
    }
}

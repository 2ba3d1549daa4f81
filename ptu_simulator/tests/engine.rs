use std::time::Duration;

use ptu_simulator::{
    config::PtuConfig,
    controller::{ptu::PtuController, state_store::OverlapPolicy},
    error::PtuError,
    models::Axis,
};
use tokio::time::Instant;

fn controller_with(configure: impl FnOnce(&mut PtuConfig)) -> PtuController {
    let mut config = PtuConfig::default();
    configure(&mut config);
    PtuController::new(&config)
}

#[tokio::test(start_paused = true)]
async fn pan_reaches_target_in_about_five_seconds() {
    let controller = PtuController::new(&PtuConfig::default());
    let start = Instant::now();

    controller.set_pan(0.5).await.unwrap();

    let elapsed = start.elapsed();
    assert!(
        elapsed >= Duration::from_millis(4900) && elapsed <= Duration::from_millis(5100),
        "took {:?}",
        elapsed
    );

    let state = controller.state().await;
    assert!((state.pan - 0.5).abs() < 0.001);
    assert_eq!(state.tilt, 0.0);
    assert!(!state.pan_moving);
}

#[tokio::test(start_paused = true)]
async fn pan_tilt_moves_pan_first() {
    let controller = PtuController::new(&PtuConfig::default());

    controller.set_pan_tilt(-0.02, 0.03).await.unwrap();

    let state = controller.state().await;
    assert!((state.pan + 0.02).abs() < 0.001);
    assert!((state.tilt - 0.03).abs() < 0.001);
}

#[tokio::test(start_paused = true)]
async fn target_within_threshold_returns_immediately() {
    let controller = PtuController::new(&PtuConfig::default());
    let start = Instant::now();

    controller.set_tilt(0.0005).await.unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(controller.state().await.tilt, 0.0);
}

#[tokio::test(start_paused = true)]
async fn reset_keeps_speeds() {
    let controller = PtuController::new(&PtuConfig::default());
    controller.set_speed(0.3, 0.4).await.unwrap();
    controller.set_pan(0.2).await.unwrap();

    controller.reset().await;

    let state = controller.state().await;
    assert_eq!((state.pan, state.tilt), (0.0, 0.0));
    assert_eq!((state.pan_speed, state.tilt_speed), (0.3, 0.4));
}

#[tokio::test(start_paused = true)]
async fn zero_speed_motion_times_out() {
    let controller = controller_with(|config| config.time_limit_secs = 0.5);
    controller.set_speed(0.0, 0.1).await.unwrap();

    let error = controller.set_pan(0.5).await.unwrap_err();

    match error {
        PtuError::ConvergenceTimeout { axis, elapsed } => {
            assert_eq!(axis, Axis::Pan);
            assert!(elapsed > Duration::from_millis(500));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(controller.state().await.pan < 0.0);
    assert!(!controller.store().is_moving(Axis::Pan));
}

#[tokio::test]
async fn non_finite_target_is_rejected() {
    let controller = PtuController::new(&PtuConfig::default());

    assert!(matches!(
        controller.set_pan(f64::NAN).await,
        Err(PtuError::NonFiniteTarget { axis: Axis::Pan, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn immediate_command_on_busy_axis_is_rejected() {
    let controller = std::sync::Arc::new(PtuController::new(&PtuConfig::default()));

    let mover = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.set_tilt(0.2).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(controller.state().await.tilt_moving);
    assert!(matches!(
        controller.set_pan_tilt(0.1, 0.1).await,
        Err(PtuError::AxisBusy(Axis::Tilt))
    ));
    // Pan is free.
    controller.set_pan(0.01).await.unwrap();

    mover.await.unwrap().unwrap();
    assert!((controller.state().await.tilt - 0.2).abs() < 0.001);
}

#[tokio::test(start_paused = true)]
async fn queued_immediate_commands_run_in_turn() {
    let controller = std::sync::Arc::new(controller_with(|config| {
        config.overlap_policy = OverlapPolicy::Queue;
    }));

    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.set_pan(0.05).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let start = Instant::now();
    controller.set_pan(-0.05).await.unwrap();

    first.await.unwrap().unwrap();
    // The second move only started once the first had converged.
    assert!(start.elapsed() >= Duration::from_millis(900));
    assert!((controller.state().await.pan + 0.05).abs() < 0.001);
}

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::controller::ptu::PtuController;
use crate::models::PtuState;

/// Destination for periodic state snapshots.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn publish(&self, state: &PtuState) -> Result<()>;
}

/// Keeps the latest snapshot for `get_state` requests.
pub struct WatchStateSink {
    tx: watch::Sender<Option<PtuState>>,
}

impl WatchStateSink {
    pub fn new(tx: watch::Sender<Option<PtuState>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl StateSink for WatchStateSink {
    async fn publish(&self, state: &PtuState) -> Result<()> {
        self.tx.send_replace(Some(state.clone()));
        Ok(())
    }
}

pub struct TracingStateSink;

#[async_trait]
impl StateSink for TracingStateSink {
    async fn publish(&self, state: &PtuState) -> Result<()> {
        debug!(
            pan = state.pan,
            tilt = state.tilt,
            pan_moving = state.pan_moving,
            tilt_moving = state.tilt_moving,
            "State"
        );
        Ok(())
    }
}

pub async fn run_state_monitor(
    controller: Arc<PtuController>,
    sinks: Vec<Arc<dyn StateSink>>,
    period: Duration,
) -> Result<()> {
    let mut interval = tokio::time::interval(period);

    loop {
        interval.tick().await;

        let state = controller.state().await;
        for sink in &sinks {
            if let Err(e) = sink.publish(&state).await {
                warn!("Failed to publish state: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PtuConfig;

    #[tokio::test(start_paused = true)]
    async fn snapshots_follow_the_controller() {
        let controller = Arc::new(PtuController::new(&PtuConfig::default()));
        let (tx, mut rx) = watch::channel(None);
        let sinks: Vec<Arc<dyn StateSink>> =
            vec![Arc::new(WatchStateSink::new(tx)), Arc::new(TracingStateSink)];

        tokio::spawn(run_state_monitor(
            controller.clone(),
            sinks,
            Duration::from_millis(100),
        ));

        rx.changed().await.unwrap();
        let first = rx.borrow_and_update().clone().unwrap();
        assert_eq!((first.pan, first.tilt), (0.0, 0.0));
        assert!(!first.pan_moving);

        controller.set_speed(0.2, 0.3).await.unwrap();
        rx.changed().await.unwrap();
        let second = rx.borrow_and_update().clone().unwrap();
        assert_eq!((second.pan_speed, second.tilt_speed), (0.2, 0.3));
    }
}

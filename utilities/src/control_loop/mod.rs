#![allow(async_fn_in_trait)]

use std::time::Duration;

use tokio::time::Instant;

/// What a single tick of a control loop produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress<F> {
    Converged,
    Moving(F),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Converged,
    Canceled,
    TimedOut,
}

/// A motion paced at a fixed tick period.
///
/// Implementors only describe one tick; [`ControlLoop::run`] owns the ordering
/// every controller shares: advance, poll cancellation, test convergence,
/// report progress, check the time budget, sleep.
pub trait ControlLoop {
    type Feedback;

    async fn advance(&mut self) -> Progress<Self::Feedback>;
    fn publish_feedback(&mut self, feedback: Self::Feedback);
    fn is_cancel_requested(&self) -> bool;

    fn get_loop_period(&self) -> Duration;
    fn get_time_limit(&self) -> Option<Duration>;
    fn get_start_time(&self) -> Instant;

    fn elapsed(&self) -> Duration {
        self.get_start_time().elapsed()
    }

    fn is_time_limit_exceeded(&self) -> bool {
        self.get_time_limit()
            .is_some_and(|limit| self.elapsed() > limit)
    }

    async fn run(&mut self) -> LoopOutcome {
        loop {
            let progress = self.advance().await;

            // A step that was already applied is kept, the outcome is not.
            if self.is_cancel_requested() {
                return LoopOutcome::Canceled;
            }

            match progress {
                Progress::Converged => return LoopOutcome::Converged,
                Progress::Moving(feedback) => self.publish_feedback(feedback),
            }

            if self.is_time_limit_exceeded() {
                return LoopOutcome::TimedOut;
            }

            tokio::time::sleep(self.get_loop_period()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use super::*;

    struct Countdown {
        remaining: u32,
        cancel_at: Option<u32>,
        cancel: Arc<AtomicBool>,
        feedback: Vec<u32>,
        time_limit: Option<Duration>,
        start_time: Instant,
    }

    impl Countdown {
        fn new(remaining: u32) -> Self {
            Self {
                remaining,
                cancel_at: None,
                cancel: Arc::new(AtomicBool::new(false)),
                feedback: Vec::new(),
                time_limit: None,
                start_time: Instant::now(),
            }
        }
    }

    impl ControlLoop for Countdown {
        type Feedback = u32;

        async fn advance(&mut self) -> Progress<u32> {
            self.remaining = self.remaining.saturating_sub(1);
            if Some(self.remaining) == self.cancel_at {
                self.cancel.store(true, Ordering::SeqCst);
            }
            if self.remaining == 0 {
                Progress::Converged
            } else {
                Progress::Moving(self.remaining)
            }
        }

        fn publish_feedback(&mut self, feedback: u32) {
            self.feedback.push(feedback);
        }

        fn is_cancel_requested(&self) -> bool {
            self.cancel.load(Ordering::SeqCst)
        }

        fn get_loop_period(&self) -> Duration {
            Duration::from_millis(10)
        }

        fn get_time_limit(&self) -> Option<Duration> {
            self.time_limit
        }

        fn get_start_time(&self) -> Instant {
            self.start_time
        }
    }

    #[tokio::test(start_paused = true)]
    async fn converges_and_sleeps_between_ticks() {
        let mut countdown = Countdown::new(4);
        let start = Instant::now();

        assert_eq!(countdown.run().await, LoopOutcome::Converged);
        assert_eq!(countdown.feedback, vec![3, 2, 1]);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(30) && elapsed < Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_wins_over_convergence() {
        let mut countdown = Countdown::new(3);
        countdown.cancel_at = Some(0);

        assert_eq!(countdown.run().await, LoopOutcome::Canceled);
        assert_eq!(countdown.feedback, vec![2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn time_limit_stops_the_loop() {
        let mut countdown = Countdown::new(u32::MAX);
        countdown.time_limit = Some(Duration::from_millis(95));

        assert_eq!(countdown.run().await, LoopOutcome::TimedOut);
        assert!((10..=11).contains(&countdown.feedback.len()));
    }
}

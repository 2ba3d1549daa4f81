//! Long-running, cancelable motion requests.
//!
//! An accepted goal runs in its own task. The caller keeps a [`GoalHandle`]
//! for feedback, cancellation and the final result; the controller keeps a
//! [`GoalRecord`] so the goal can also be found by id.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{error::PtuError, models::Axis};

pub type GoalId = Uuid;

/// Unread progress reports kept per goal. Older reports are not replaced;
/// newer ones are dropped until the caller catches up, and the record always
/// holds the latest.
pub const FEEDBACK_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalKind {
    Pan,
    Tilt,
    PanTilt,
}

impl GoalKind {
    /// Axes held by the goal, in locking order.
    pub fn axes(&self) -> &'static [Axis] {
        match self {
            GoalKind::Pan => &[Axis::Pan],
            GoalKind::Tilt => &[Axis::Tilt],
            GoalKind::PanTilt => &[Axis::Pan, Axis::Tilt],
        }
    }
}

impl fmt::Display for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalKind::Pan => write!(f, "pan"),
            GoalKind::Tilt => write!(f, "tilt"),
            GoalKind::PanTilt => write!(f, "pan_tilt"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalRequest {
    Pan { target: f64 },
    Tilt { target: f64 },
    PanTilt { pan: f64, tilt: f64 },
}

impl GoalRequest {
    pub fn kind(&self) -> GoalKind {
        match self {
            GoalRequest::Pan { .. } => GoalKind::Pan,
            GoalRequest::Tilt { .. } => GoalKind::Tilt,
            GoalRequest::PanTilt { .. } => GoalKind::PanTilt,
        }
    }

    pub fn targets(&self) -> Vec<(Axis, f64)> {
        match *self {
            GoalRequest::Pan { target } => vec![(Axis::Pan, target)],
            GoalRequest::Tilt { target } => vec![(Axis::Tilt, target)],
            GoalRequest::PanTilt { pan, tilt } => vec![(Axis::Pan, pan), (Axis::Tilt, tilt)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalStatus {
    Executing,
    Canceling,
    Succeeded,
    Canceled,
    /// The motion ran out of its time budget.
    Aborted,
}

impl GoalStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GoalStatus::Succeeded | GoalStatus::Canceled | GoalStatus::Aborted
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GoalStatus::Executing => "executing",
            GoalStatus::Canceling => "canceling",
            GoalStatus::Succeeded => "succeeded",
            GoalStatus::Canceled => "canceled",
            GoalStatus::Aborted => "aborted",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GoalFeedback {
    Single { percent: f64 },
    Combined { percent_pan: f64, percent_tilt: f64 },
}

impl fmt::Display for GoalFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalFeedback::Single { percent } => write!(f, "{:.1}%", percent),
            GoalFeedback::Combined {
                percent_pan,
                percent_tilt,
            } => write!(f, "pan {:.1}% tilt {:.1}%", percent_pan, percent_tilt),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GoalResult {
    pub id: GoalId,
    pub status: GoalStatus,
}

impl GoalResult {
    pub fn succeeded(&self) -> bool {
        self.status == GoalStatus::Succeeded
    }
}

/// Cooperative cancellation flag, polled once per tick.
#[derive(Clone)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
    status: Arc<watch::Sender<GoalStatus>>,
}

impl CancelToken {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.status.send_if_modified(|status| {
            if *status == GoalStatus::Executing {
                *status = GoalStatus::Canceling;
                true
            } else {
                false
            }
        });
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Execution side of a goal, owned by its task.
#[derive(Clone)]
pub struct GoalContext {
    id: GoalId,
    token: CancelToken,
    status: Arc<watch::Sender<GoalStatus>>,
    feedback: mpsc::Sender<GoalFeedback>,
    latest: Arc<watch::Sender<Option<GoalFeedback>>>,
}

impl GoalContext {
    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancel_requested()
    }

    pub fn publish_feedback(&self, feedback: GoalFeedback) {
        // A full or closed stream never stalls the goal.
        let _ = self.feedback.try_send(feedback);
        self.latest.send_replace(Some(feedback));
    }

    pub fn finish(&self, status: GoalStatus) -> GoalResult {
        self.status.send_replace(status);
        GoalResult {
            id: self.id,
            status,
        }
    }
}

/// Registry view of a goal.
#[derive(Clone)]
pub struct GoalRecord {
    kind: GoalKind,
    token: CancelToken,
    status: watch::Receiver<GoalStatus>,
    latest: watch::Receiver<Option<GoalFeedback>>,
}

impl GoalRecord {
    pub fn kind(&self) -> GoalKind {
        self.kind
    }

    pub fn status(&self) -> GoalStatus {
        *self.status.borrow()
    }

    pub fn latest_feedback(&self) -> Option<GoalFeedback> {
        *self.latest.borrow()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

pub(crate) struct GoalReceivers {
    token: CancelToken,
    status: watch::Receiver<GoalStatus>,
    feedback: mpsc::Receiver<GoalFeedback>,
}

pub(crate) fn goal_channels(id: GoalId, kind: GoalKind) -> (GoalContext, GoalRecord, GoalReceivers) {
    let (status_tx, status_rx) = watch::channel(GoalStatus::Executing);
    let (latest_tx, latest_rx) = watch::channel(None);
    let (feedback_tx, feedback_rx) = mpsc::channel(FEEDBACK_BUFFER);

    let status_tx = Arc::new(status_tx);
    let token = CancelToken {
        requested: Arc::new(AtomicBool::new(false)),
        status: status_tx.clone(),
    };

    let context = GoalContext {
        id,
        token: token.clone(),
        status: status_tx,
        feedback: feedback_tx,
        latest: Arc::new(latest_tx),
    };

    let record = GoalRecord {
        kind,
        token: token.clone(),
        status: status_rx.clone(),
        latest: latest_rx,
    };

    let receivers = GoalReceivers {
        token,
        status: status_rx,
        feedback: feedback_rx,
    };

    (context, record, receivers)
}

/// Caller side of an accepted goal.
pub struct GoalHandle {
    id: GoalId,
    token: CancelToken,
    status: watch::Receiver<GoalStatus>,
    feedback: mpsc::Receiver<GoalFeedback>,
    task: JoinHandle<GoalResult>,
}

impl GoalHandle {
    pub(crate) fn new(
        id: GoalId,
        receivers: GoalReceivers,
        task: JoinHandle<GoalResult>,
    ) -> Self {
        Self {
            id,
            token: receivers.token,
            status: receivers.status,
            feedback: receivers.feedback,
            task,
        }
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn status(&self) -> GoalStatus {
        *self.status.borrow()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Next progress report, or `None` once the goal has finished and every
    /// report was consumed.
    pub async fn next_feedback(&mut self) -> Option<GoalFeedback> {
        self.feedback.recv().await
    }

    pub fn try_next_feedback(&mut self) -> Option<GoalFeedback> {
        self.feedback.try_recv().ok()
    }

    pub async fn result(self) -> Result<GoalResult, PtuError> {
        Ok(self.task.await?)
    }
}

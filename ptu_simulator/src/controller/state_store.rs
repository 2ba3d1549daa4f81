//! Single source of truth for pan/tilt positions and speeds.
//!
//! Both axes and both speeds sit behind one lock. Every control loop takes it
//! for the read-modify-write of a single tick and releases it before sleeping;
//! [`AxisStateStore::with_axes`] only accepts a synchronous closure, so the
//! guard cannot be held across an await point.
//!
//! Separately, each axis has a motion lease. Whether a second motion on a busy
//! axis is refused, queued or allowed to interleave is decided by
//! [`OverlapPolicy`].

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{controller::axis::AxisModel, error::PtuError, models::Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct PtuAxes {
    pub pan: AxisModel,
    pub tilt: AxisModel,
}

impl PtuAxes {
    pub fn axis(&self, axis: Axis) -> &AxisModel {
        match axis {
            Axis::Pan => &self.pan,
            Axis::Tilt => &self.tilt,
        }
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisModel {
        match axis {
            Axis::Pan => &mut self.pan,
            Axis::Tilt => &mut self.tilt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxesSnapshot {
    pub pan: f64,
    pub tilt: f64,
    pub pan_speed: f64,
    pub tilt_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// A motion on a busy axis fails with `AxisBusy`.
    #[default]
    Reject,
    /// A motion on a busy axis waits until the axis is released.
    Queue,
    /// Motions share the axis; only individual ticks are serialized.
    Interleave,
}

/// Marks axes as moving for as long as it is alive.
pub struct MotionLease {
    _guards: Vec<OwnedMutexGuard<()>>,
    active: Vec<Arc<AtomicUsize>>,
}

impl MotionLease {
    fn new(guards: Vec<OwnedMutexGuard<()>>, active: Vec<Arc<AtomicUsize>>) -> Self {
        for counter in &active {
            counter.fetch_add(1, Ordering::SeqCst);
        }

        Self {
            _guards: guards,
            active,
        }
    }
}

impl Drop for MotionLease {
    fn drop(&mut self) {
        for counter in &self.active {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone)]
pub struct AxisStateStore {
    axes: Arc<Mutex<PtuAxes>>,
    leases: [Arc<Mutex<()>>; 2],
    active: [Arc<AtomicUsize>; 2],
}

fn slot(axis: Axis) -> usize {
    match axis {
        Axis::Pan => 0,
        Axis::Tilt => 1,
    }
}

impl AxisStateStore {
    pub fn new(pan: AxisModel, tilt: AxisModel) -> Self {
        Self {
            axes: Arc::new(Mutex::new(PtuAxes { pan, tilt })),
            leases: [Arc::new(Mutex::new(())), Arc::new(Mutex::new(()))],
            active: [
                Arc::new(AtomicUsize::new(0)),
                Arc::new(AtomicUsize::new(0)),
            ],
        }
    }

    /// Runs `f` inside the critical section.
    pub async fn with_axes<R>(&self, f: impl FnOnce(&mut PtuAxes) -> R) -> R {
        let mut axes = self.axes.lock().await;
        f(&mut axes)
    }

    pub async fn position(&self, axis: Axis) -> f64 {
        self.with_axes(|axes| axes.axis(axis).position()).await
    }

    pub async fn snapshot(&self) -> AxesSnapshot {
        self.with_axes(|axes| AxesSnapshot {
            pan: axes.pan.position(),
            tilt: axes.tilt.position(),
            pan_speed: axes.pan.speed(),
            tilt_speed: axes.tilt.speed(),
        })
        .await
    }

    /// Replaces both speeds in one critical section.
    pub async fn set_speed(&self, pan_speed: f64, tilt_speed: f64) {
        self.with_axes(|axes| {
            axes.pan.set_speed(pan_speed);
            axes.tilt.set_speed(tilt_speed);
        })
        .await
    }

    pub async fn reset(&self) {
        self.with_axes(|axes| {
            axes.pan.reset();
            axes.tilt.reset();
        })
        .await
    }

    pub fn is_moving(&self, axis: Axis) -> bool {
        self.active[slot(axis)].load(Ordering::SeqCst) > 0
    }

    fn counters(&self, axes: &[Axis]) -> Vec<Arc<AtomicUsize>> {
        axes.iter()
            .map(|axis| self.active[slot(*axis)].clone())
            .collect()
    }

    /// Takes the lease right away when the policy allows deciding now.
    ///
    /// Returns `Ok(None)` under [`OverlapPolicy::Queue`]; the caller then
    /// waits with [`AxisStateStore::wait_lease`].
    pub fn lease_now(
        &self,
        axes: &[Axis],
        policy: OverlapPolicy,
    ) -> Result<Option<MotionLease>, PtuError> {
        match policy {
            OverlapPolicy::Reject => {
                let mut guards = Vec::with_capacity(axes.len());
                for axis in axes {
                    let guard = self.leases[slot(*axis)]
                        .clone()
                        .try_lock_owned()
                        .map_err(|_| PtuError::AxisBusy(*axis))?;
                    guards.push(guard);
                }
                Ok(Some(MotionLease::new(guards, self.counters(axes))))
            }
            OverlapPolicy::Queue => Ok(None),
            OverlapPolicy::Interleave => Ok(Some(MotionLease::new(Vec::new(), self.counters(axes)))),
        }
    }

    /// Waits for every axis in `axes`, locking them in the given order.
    pub async fn wait_lease(&self, axes: &[Axis]) -> MotionLease {
        let mut guards = Vec::with_capacity(axes.len());
        for axis in axes {
            guards.push(self.leases[slot(*axis)].clone().lock_owned().await);
        }
        MotionLease::new(guards, self.counters(axes))
    }

    pub async fn lease(
        &self,
        axes: &[Axis],
        policy: OverlapPolicy,
    ) -> Result<MotionLease, PtuError> {
        match self.lease_now(axes, policy)? {
            Some(lease) => Ok(lease),
            None => Ok(self.wait_lease(axes).await),
        }
    }
}

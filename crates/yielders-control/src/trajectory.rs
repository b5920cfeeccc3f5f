//! Trajectory holding and time-based sampling.
//!
//! A [`TrajectorySampler`] holds zero or one active trajectory and
//! produces an interpolated reference state for a query time. Replacement
//! semantics: a new trajectory replaces the old one in full, it is never
//! merged.

use std::sync::Arc;

use yielders_core::time::ControlTime;
use yielders_core::types::{JointState, JointTrajectory};

/// Indices of the waypoint pair bracketing a sample.
///
/// `start == end` when the sample landed exactly on (or past) a single
/// waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledSegment {
    pub start: usize,
    pub end: usize,
}

/// Holds the active trajectory and interpolates reference states.
#[derive(Debug, Default)]
pub struct TrajectorySampler {
    trajectory: Option<Arc<JointTrajectory>>,
    /// Cycle time at which the active trajectory was installed.
    start_time: ControlTime,
}

impl TrajectorySampler {
    /// Create an empty sampler.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trajectory: None,
            start_time: ControlTime::new(),
        }
    }

    /// Install a trajectory, atomically replacing any previous one in
    /// full. Waypoint times are interpreted relative to `now`.
    pub fn replace(&mut self, trajectory: Arc<JointTrajectory>, now: ControlTime) {
        self.trajectory = Some(trajectory);
        self.start_time = now;
    }

    /// Drop the active trajectory.
    pub fn clear(&mut self) {
        self.trajectory = None;
    }

    /// True when a trajectory is loaded.
    #[must_use]
    pub const fn has_trajectory(&self) -> bool {
        self.trajectory.is_some()
    }

    /// The active trajectory, if any.
    #[must_use]
    pub const fn trajectory(&self) -> Option<&Arc<JointTrajectory>> {
        self.trajectory.as_ref()
    }

    /// Sample the active trajectory at `now`, writing the interpolated
    /// reference into `out` (reusing its allocations).
    ///
    /// Returns `None` when no trajectory is loaded or `now` precedes the
    /// first waypoint; `out` is untouched in that case. A query beyond the
    /// final waypoint yields the final waypoint's state with both segment
    /// indices pinned to it.
    pub fn sample(&self, now: ControlTime, out: &mut JointState) -> Option<SampledSegment> {
        let trajectory = self.trajectory.as_ref()?;
        let points = &trajectory.points;
        let first = points.first()?;

        let elapsed = now - self.start_time;
        if elapsed < first.time_from_start.to_duration() {
            return None;
        }

        let last_index = points.len() - 1;
        if elapsed >= points[last_index].time_from_start.to_duration() {
            out.clone_from(&points[last_index]);
            return Some(SampledSegment {
                start: last_index,
                end: last_index,
            });
        }

        // Bracketing pair: points[i].t <= elapsed < points[i+1].t
        let mut start = 0;
        for (i, point) in points.iter().enumerate().rev() {
            if elapsed >= point.time_from_start.to_duration() {
                start = i;
                break;
            }
        }
        let end = start + 1;

        let t0 = points[start].time_from_start.secs_f64();
        let t1 = points[end].time_from_start.secs_f64();
        let alpha = (elapsed.as_secs_f64() - t0) / (t1 - t0);
        interpolate(&points[start], &points[end], alpha, out);
        out.time_from_start = ControlTime::from_duration(elapsed);

        Some(SampledSegment { start, end })
    }

    /// True unless the sampled segment is the final one: distinguishes
    /// "in motion" from "at goal".
    #[must_use]
    pub fn is_before_last_point(&self, segment: SampledSegment) -> bool {
        self.trajectory
            .as_ref()
            .is_some_and(|t| segment.end + 1 < t.points.len())
    }
}

/// Linearly interpolate every field present in both endpoints; a field
/// absent in either endpoint stays absent.
fn interpolate(a: &JointState, b: &JointState, alpha: f64, out: &mut JointState) {
    fn lerp_field(out: &mut Vec<f64>, a: &[f64], b: &[f64], alpha: f64) {
        out.clear();
        if a.is_empty() || a.len() != b.len() {
            return;
        }
        out.extend(a.iter().zip(b.iter()).map(|(x, y)| x + (y - x) * alpha));
    }
    lerp_field(&mut out.positions, &a.positions, &b.positions, alpha);
    lerp_field(&mut out.velocities, &a.velocities, &b.velocities, alpha);
    lerp_field(
        &mut out.accelerations,
        &a.accelerations,
        &b.accelerations,
        alpha,
    );
    lerp_field(&mut out.efforts, &a.efforts, &b.efforts, alpha);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

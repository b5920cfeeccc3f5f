use nalgebra::{UnitQuaternion, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::error::TrajectoryError;
use crate::time::ControlTime;

// ---------------------------------------------------------------------------
// InterfaceKind
// ---------------------------------------------------------------------------

/// A hardware interface kind, per joint.
///
/// The derived ordering is the canonical interface order; configured
/// interface lists are sorted with it so indexing stays deterministic
/// regardless of declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Position,
    Velocity,
    Acceleration,
    Effort,
}

// ---------------------------------------------------------------------------
// JointState
// ---------------------------------------------------------------------------

/// Per-joint state sample: positions, velocities, accelerations, efforts.
///
/// Each field is independently present or absent; an empty vector means the
/// field is absent and must be ignored during interpolation and command
/// writing. Present fields have one entry per joint, in canonical joint
/// order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointState {
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
    pub accelerations: Vec<f64>,
    pub efforts: Vec<f64>,
    /// Offset of this sample from its trajectory's start.
    #[serde(default)]
    pub time_from_start: ControlTime,
}

impl JointState {
    /// Create an empty state (all fields absent).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            positions: Vec::new(),
            velocities: Vec::new(),
            accelerations: Vec::new(),
            efforts: Vec::new(),
            time_from_start: ControlTime::new(),
        }
    }

    /// Create a state with only positions present.
    #[must_use]
    pub const fn with_positions(positions: Vec<f64>) -> Self {
        Self {
            positions,
            velocities: Vec::new(),
            accelerations: Vec::new(),
            efforts: Vec::new(),
            time_from_start: ControlTime::new(),
        }
    }

    /// Number of joints in the position field (zero if absent).
    #[must_use]
    pub const fn dof(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub const fn has_positions(&self) -> bool {
        !self.positions.is_empty()
    }

    #[must_use]
    pub const fn has_velocities(&self) -> bool {
        !self.velocities.is_empty()
    }

    #[must_use]
    pub const fn has_accelerations(&self) -> bool {
        !self.accelerations.is_empty()
    }

    #[must_use]
    pub const fn has_efforts(&self) -> bool {
        !self.efforts.is_empty()
    }

    /// Resize fields for `dof` joints: fields named in `kinds` are sized and
    /// zero-filled, the rest are cleared (made absent).
    pub fn resize_for(&mut self, dof: usize, kinds: &[InterfaceKind]) {
        let fields: [(&mut Vec<f64>, InterfaceKind); 4] = [
            (&mut self.positions, InterfaceKind::Position),
            (&mut self.velocities, InterfaceKind::Velocity),
            (&mut self.accelerations, InterfaceKind::Acceleration),
            (&mut self.efforts, InterfaceKind::Effort),
        ];
        for (field, kind) in fields {
            if kinds.contains(&kind) {
                field.clear();
                field.resize(dof, 0.0);
            } else {
                field.clear();
            }
        }
    }

    /// Clear all fields, making them absent.
    pub fn clear_fields(&mut self) {
        self.positions.clear();
        self.velocities.clear();
        self.accelerations.clear();
        self.efforts.clear();
    }

    /// Assign the element-wise error `desired − actual` for fields present
    /// in both states; fields absent in either are cleared.
    pub fn assign_error(&mut self, desired: &Self, actual: &Self) {
        fn field_error(out: &mut Vec<f64>, desired: &[f64], actual: &[f64]) {
            out.clear();
            if desired.is_empty() || desired.len() != actual.len() {
                return;
            }
            out.extend(desired.iter().zip(actual.iter()).map(|(d, a)| d - a));
        }
        field_error(&mut self.positions, &desired.positions, &actual.positions);
        field_error(&mut self.velocities, &desired.velocities, &actual.velocities);
        field_error(
            &mut self.accelerations,
            &desired.accelerations,
            &actual.accelerations,
        );
        field_error(&mut self.efforts, &desired.efforts, &actual.efforts);
    }

    /// Clear any field containing a non-finite value.
    ///
    /// Hardware command interfaces report NaN when nothing has been
    /// commanded yet; a field holding such a value is treated as absent so
    /// the caller reseeds from measured state instead.
    pub fn retain_finite_fields(&mut self) {
        for field in [
            &mut self.positions,
            &mut self.velocities,
            &mut self.accelerations,
            &mut self.efforts,
        ] {
            if field.iter().any(|v| !v.is_finite()) {
                field.clear();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wrench
// ---------------------------------------------------------------------------

/// A force/torque measurement in a named frame.
///
/// Replaced wholesale on each read; never accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct Wrench {
    /// Force (N).
    pub force: Vector3<f64>,
    /// Torque (Nm).
    pub torque: Vector3<f64>,
    /// Frame the wrench is expressed in.
    pub frame: String,
}

impl Default for Wrench {
    fn default() -> Self {
        Self::zero()
    }
}

impl Wrench {
    /// Zero wrench in an unnamed frame.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
            frame: String::new(),
        }
    }

    /// Create from force and torque components.
    #[must_use]
    pub fn new(force: Vector3<f64>, torque: Vector3<f64>, frame: impl Into<String>) -> Self {
        Self {
            force,
            torque,
            frame: frame.into(),
        }
    }

    /// Stacked 6-vector: (fx, fy, fz, tx, ty, tz).
    #[must_use]
    pub fn as_vector6(&self) -> Vector6<f64> {
        Vector6::new(
            self.force.x,
            self.force.y,
            self.force.z,
            self.torque.x,
            self.torque.y,
            self.torque.z,
        )
    }
}

// ---------------------------------------------------------------------------
// PoseCommand
// ---------------------------------------------------------------------------

/// A Cartesian pose target in a named frame.
///
/// Accepted for completeness; joint-command mode is the only mode the
/// control core fully consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseCommand {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub frame: String,
}

impl Default for PoseCommand {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            frame: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// JointTrajectory
// ---------------------------------------------------------------------------

/// A time-ordered sequence of joint waypoints.
///
/// Invariant: strictly increasing `time_from_start` across `points`.
/// Trajectories are replaced atomically and wholly; they are never merged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointTrajectory {
    /// Joint names in canonical order.
    pub joint_names: Vec<String>,
    /// Waypoints, strictly ordered by `time_from_start`.
    pub points: Vec<JointState>,
}

impl JointTrajectory {
    /// Validate waypoint ordering and field lengths.
    ///
    /// Called by the non-real-time ingestion side before publishing; the
    /// sampler assumes validated input.
    pub fn validate(&self) -> Result<(), TrajectoryError> {
        if self.points.is_empty() {
            return Err(TrajectoryError::Empty);
        }
        let dof = self.joint_names.len();
        let mut last_time = None;
        for (index, point) in self.points.iter().enumerate() {
            if let Some(last) = last_time {
                if point.time_from_start <= last {
                    return Err(TrajectoryError::NonMonotonicTime { index });
                }
            }
            last_time = Some(point.time_from_start);

            for field in [
                &point.positions,
                &point.velocities,
                &point.accelerations,
                &point.efforts,
            ] {
                if !field.is_empty() && field.len() != dof {
                    return Err(TrajectoryError::LengthMismatch {
                        index,
                        expected: dof,
                        got: field.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Duration from start to the final waypoint. Zero when empty.
    #[must_use]
    pub fn duration(&self) -> ControlTime {
        self.points
            .last()
            .map_or_else(ControlTime::new, |p| p.time_from_start)
    }
}

// ---------------------------------------------------------------------------
// ControllerSnapshot
// ---------------------------------------------------------------------------

/// Per-cycle telemetry payload for the external state publisher.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub joint_names: Vec<String>,
    /// Reference state sampled from the trajectory, before admittance.
    pub input_joint_command: JointState,
    pub desired_joint_state: JointState,
    pub actual_joint_state: JointState,
    pub error_joint_state: JointState,
    /// True when the differential IK reported a near-singular configuration
    /// this cycle (result was damped, not exact).
    pub near_singularity: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

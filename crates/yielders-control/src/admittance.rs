//! Cartesian mass-spring-damper compliance mapped into joint space.
//!
//! Each cycle the [`AdmittanceRule`] integrates
//! `acc = (F − d·v − k·x) / m` per enabled Cartesian axis, then converts
//! the accumulated displacement and velocity through the differential IK
//! (referenced to the current end-effector frame) and adds the joint
//! corrections to the reference state.
//!
//! The integrator state must be zeroed with [`reset`](AdmittanceRule::reset)
//! on activation and on trajectory replacement; stale state would command
//! an unbounded jump on restart.

use nalgebra::Vector6;
use tracing::debug;
use yielders_core::config::AdmittanceConfig;
use yielders_core::types::{JointState, Wrench};
use yielders_kinematics::{DifferentialIk, KinematicsError};

/// Runtime admittance parameters with absolute damping.
///
/// Applied only between cycles, never mid-cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittanceParameters {
    /// Axes the compliance acts on.
    pub selected_axes: [bool; 6],
    /// Virtual mass per axis.
    pub mass: [f64; 6],
    /// Spring stiffness per axis.
    pub stiffness: [f64; 6],
    /// Absolute damping per axis.
    pub damping: [f64; 6],
    /// Frame the wrench and the compliance act in.
    pub control_frame: String,
    /// Base frame of the differential IK.
    pub ik_base_frame: String,
}

impl From<&AdmittanceConfig> for AdmittanceParameters {
    fn from(config: &AdmittanceConfig) -> Self {
        Self {
            selected_axes: config.selected_axes,
            mass: config.mass,
            stiffness: config.stiffness,
            damping: config.damping(),
            control_frame: config.control_frame.clone(),
            ik_base_frame: config.ik_base_frame.clone(),
        }
    }
}

/// Per-cycle result flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdmittanceUpdate {
    /// The IK mapping went through a near-singular configuration; the
    /// joint correction is bounded but degraded.
    pub near_singularity: bool,
}

/// Admittance dynamics integrator.
///
/// Owns its integrator state exclusively; the [`DifferentialIk`] is a
/// collaborator passed in by the owner each call.
#[derive(Debug)]
pub struct AdmittanceRule {
    params: AdmittanceParameters,
    /// Accumulated Cartesian displacement in the control frame.
    displacement: Vector6<f64>,
    /// Accumulated Cartesian velocity in the control frame.
    velocity: Vector6<f64>,
    /// Scratch for the stacked delta conversions.
    delta_scratch: Vec<f64>,
}

impl AdmittanceRule {
    /// Create a rule with zeroed integrator state.
    #[must_use]
    pub fn new(params: AdmittanceParameters) -> Self {
        Self {
            params,
            displacement: Vector6::zeros(),
            velocity: Vector6::zeros(),
            delta_scratch: vec![0.0; 6],
        }
    }

    /// Replace the parameters. Call only between cycles.
    pub fn set_parameters(&mut self, params: AdmittanceParameters) {
        self.params = params;
    }

    /// Current parameters.
    #[must_use]
    pub const fn parameters(&self) -> &AdmittanceParameters {
        &self.params
    }

    /// Accumulated Cartesian displacement (control frame).
    #[must_use]
    pub const fn displacement(&self) -> &Vector6<f64> {
        &self.displacement
    }

    /// Accumulated Cartesian velocity (control frame).
    #[must_use]
    pub const fn velocity(&self) -> &Vector6<f64> {
        &self.velocity
    }

    /// Zero the integrator state.
    ///
    /// Must be called on activation and whenever the tracked trajectory is
    /// replaced.
    pub fn reset(&mut self) {
        self.displacement = Vector6::zeros();
        self.velocity = Vector6::zeros();
    }

    /// Integrate the compliance dynamics over `period` and produce the
    /// desired state into `out`.
    ///
    /// `current` supplies the measured joint configuration loaded into the
    /// IK; `reference` is the trajectory sample the joint corrections are
    /// added to. Disabled axes hold zero displacement and velocity, so with
    /// every axis disabled `out` reproduces `reference` exactly.
    ///
    /// # Errors
    ///
    /// Propagates [`KinematicsError`] from the IK; the integrator state is
    /// already advanced when that happens, but `out` must be discarded.
    pub fn update(
        &mut self,
        current: &JointState,
        wrench: &Wrench,
        reference: &JointState,
        period: std::time::Duration,
        ik: &mut DifferentialIk,
        out: &mut JointState,
    ) -> Result<AdmittanceUpdate, KinematicsError> {
        ik.synchronize(&current.positions)?;

        if !wrench.frame.is_empty() && wrench.frame != self.params.control_frame {
            // The sensor collaborator is expected to resolve frames; a
            // mismatch here means a miswired pipeline upstream.
            debug!(
                got = %wrench.frame,
                expected = %self.params.control_frame,
                "wrench frame differs from the configured control frame"
            );
        }

        let dt = period.as_secs_f64();
        let force = wrench.as_vector6();
        for axis in 0..6 {
            if self.params.selected_axes[axis] {
                // Semi-implicit Euler: velocity first, displacement with
                // the updated velocity.
                let acceleration = (force[axis]
                    - self.params.damping[axis] * self.velocity[axis]
                    - self.params.stiffness[axis] * self.displacement[axis])
                    / self.params.mass[axis];
                self.velocity[axis] += acceleration * dt;
                self.displacement[axis] += self.velocity[axis] * dt;
            } else {
                self.displacement[axis] = 0.0;
                self.velocity[axis] = 0.0;
            }
        }

        // Compliance acts in the control frame riding on the end effector.
        let control_to_base = *ik.model().end_effector_pose();

        self.delta_scratch.clear();
        self.delta_scratch.extend(self.displacement.iter());
        let pose_correction = ik.cartesian_to_joint(&self.delta_scratch, &control_to_base)?;

        self.delta_scratch.clear();
        self.delta_scratch.extend(self.velocity.iter());
        let velocity_correction = ik.cartesian_to_joint(&self.delta_scratch, &control_to_base)?;

        apply_correction(
            &mut out.positions,
            &reference.positions,
            &current.positions,
            &pose_correction.delta,
        );
        apply_correction(
            &mut out.velocities,
            &reference.velocities,
            &[],
            &velocity_correction.delta,
        );
        out.accelerations.clone_from(&reference.accelerations);
        out.efforts.clear();
        out.time_from_start = reference.time_from_start;

        Ok(AdmittanceUpdate {
            near_singularity: pose_correction.near_singularity
                || velocity_correction.near_singularity,
        })
    }
}

/// `out = base + correction`, where `base` is the reference field when
/// present, the fallback otherwise (or zeros when both are absent).
fn apply_correction(out: &mut Vec<f64>, reference: &[f64], fallback: &[f64], correction: &[f64]) {
    out.clear();
    let base = if reference.len() == correction.len() {
        reference
    } else if fallback.len() == correction.len() {
        fallback
    } else {
        out.extend(correction.iter());
        return;
    };
    out.extend(base.iter().zip(correction.iter()).map(|(b, c)| b + c));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

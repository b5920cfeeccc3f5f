//! Differential inverse kinematics over a cached pseudo-inverse.
//!
//! [`DifferentialIk`] owns a [`KinematicModel`] and a
//! [`PseudoInverseStrategy`]. A cycle first loads the measured joint
//! configuration with [`synchronize`](DifferentialIk::synchronize), which
//! recomputes the Jacobian and its pseudo-inverse once; both delta
//! conversions then reuse the cached factors and are read-only.

use nalgebra::{DVector, Isometry3, Vector3};

use crate::error::KinematicsError;
use crate::model::KinematicModel;
use crate::pinv::{InversionQuality, PseudoInverseStrategy};

/// A joint-space correction produced from a Cartesian delta.
#[derive(Debug, Clone, PartialEq)]
pub struct JointCorrection {
    /// Per-joint deltas, in canonical joint order.
    pub delta: Vec<f64>,
    /// True when the pseudo-inverse was damped near a singularity; the
    /// correction is bounded but degraded, not exact.
    pub near_singularity: bool,
}

/// Bidirectional Cartesian ↔ joint delta conversion via the manipulator
/// Jacobian.
pub struct DifferentialIk {
    model: KinematicModel,
    strategy: Box<dyn PseudoInverseStrategy>,
    /// Cached pseudo-inverse, `dof x task_dims`, valid for the
    /// configuration last loaded by `synchronize`.
    pinv: nalgebra::DMatrix<f64>,
    quality: InversionQuality,
}

impl std::fmt::Debug for DifferentialIk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DifferentialIk")
            .field("dof", &self.model.dof())
            .field("task_dims", &self.model.task_dims())
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl DifferentialIk {
    /// Create a differential IK over `model` with the given inversion
    /// strategy, synchronized to the model's current configuration.
    #[must_use]
    pub fn new(model: KinematicModel, strategy: Box<dyn PseudoInverseStrategy>) -> Self {
        let mut ik = Self {
            pinv: nalgebra::DMatrix::zeros(model.dof(), model.task_dims()),
            quality: InversionQuality::WellConditioned,
            model,
            strategy,
        };
        ik.quality = ik.strategy.invert(ik.model.jacobian(), &mut ik.pinv);
        ik
    }

    /// Load the joint configuration and recompute the cached Jacobian
    /// pseudo-inverse (once per cycle).
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::DimensionMismatch`] if
    /// `positions.len()` does not match the model DOF; the previous
    /// configuration and cache remain valid.
    pub fn synchronize(&mut self, positions: &[f64]) -> Result<(), KinematicsError> {
        self.model.set_configuration(positions)?;
        self.quality = self.strategy.invert(self.model.jacobian(), &mut self.pinv);
        Ok(())
    }

    /// Convert a Cartesian delta to a joint delta:
    /// `Δθ = J⁺ · (R · Δx)`.
    ///
    /// `delta_x` is expressed in the control frame;
    /// `control_to_base` re-expresses it in the IK base frame before
    /// applying the cached pseudo-inverse.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::SizeMismatch`] if
    /// `delta_x.len()` differs from the model's task dimension.
    pub fn cartesian_to_joint(
        &self,
        delta_x: &[f64],
        control_to_base: &Isometry3<f64>,
    ) -> Result<JointCorrection, KinematicsError> {
        let task_dims = self.model.task_dims();
        if delta_x.len() != task_dims {
            return Err(KinematicsError::SizeMismatch {
                expected: task_dims,
                got: delta_x.len(),
            });
        }

        let mut base_delta = DVector::zeros(task_dims);
        rotate_spatial_blocks(delta_x, control_to_base, base_delta.as_mut_slice());
        let delta_theta = &self.pinv * base_delta;

        Ok(JointCorrection {
            delta: delta_theta.iter().copied().collect(),
            near_singularity: self.quality.is_degraded(),
        })
    }

    /// Convert a joint delta to a Cartesian delta:
    /// `Δx = R · (J · Δθ)`, re-expressed in the target frame by
    /// `base_to_target`.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::SizeMismatch`] if
    /// `delta_theta.len()` differs from the model DOF.
    pub fn joint_to_cartesian(
        &self,
        delta_theta: &[f64],
        base_to_target: &Isometry3<f64>,
    ) -> Result<Vec<f64>, KinematicsError> {
        if delta_theta.len() != self.model.dof() {
            return Err(KinematicsError::SizeMismatch {
                expected: self.model.dof(),
                got: delta_theta.len(),
            });
        }

        let theta = DVector::from_column_slice(delta_theta);
        let base_delta = self.model.jacobian() * theta;
        let mut out = vec![0.0; self.model.task_dims()];
        rotate_spatial_blocks(base_delta.as_slice(), base_to_target, &mut out);
        Ok(out)
    }

    /// Conditioning reported by the last synchronize.
    #[must_use]
    pub const fn quality(&self) -> InversionQuality {
        self.quality
    }

    /// The owned kinematic model.
    #[must_use]
    pub const fn model(&self) -> &KinematicModel {
        &self.model
    }
}

/// Rotate each (linear, angular) 6-block of a stacked spatial vector into
/// another frame.
fn rotate_spatial_blocks(input: &[f64], transform: &Isometry3<f64>, out: &mut [f64]) {
    debug_assert_eq!(input.len(), out.len());
    for (input_block, out_block) in input.chunks_exact(6).zip(out.chunks_exact_mut(6)) {
        let linear =
            transform.rotation * Vector3::new(input_block[0], input_block[1], input_block[2]);
        let angular =
            transform.rotation * Vector3::new(input_block[3], input_block[4], input_block[5]);
        out_block[..3].copy_from_slice(linear.as_slice());
        out_block[3..].copy_from_slice(angular.as_slice());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

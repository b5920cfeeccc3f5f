//! Kinematic model coupling configuration updates with Jacobian
//! recomputation.
//!
//! A [`KinematicModel`] owns a [`KinematicChain`] plus pre-allocated
//! buffers for the per-joint frames and the geometric Jacobian. The
//! Jacobian is only ever exposed for the configuration most recently
//! loaded with [`set_configuration`](KinematicModel::set_configuration),
//! so a stale Jacobian is unrepresentable. Concurrent access requires
//! external synchronization.

use nalgebra::{DMatrix, Isometry3, Vector3};

use crate::chain::KinematicChain;
use crate::error::KinematicsError;

/// Forward position and geometric Jacobian for a serial chain.
#[derive(Debug, Clone)]
pub struct KinematicModel {
    chain: KinematicChain,
    positions: Vec<f64>,
    origins: Vec<Vector3<f64>>,
    axes: Vec<Vector3<f64>>,
    ee_pose: Isometry3<f64>,
    /// Geometric Jacobian, `task_dims x dof`, rows 0..3 linear, 3..6 angular.
    jacobian: DMatrix<f64>,
}

impl KinematicModel {
    /// Create a model at the zero configuration.
    #[must_use]
    pub fn new(chain: KinematicChain) -> Self {
        let dof = chain.dof();
        let mut model = Self {
            chain,
            positions: vec![0.0; dof],
            origins: vec![Vector3::zeros(); dof],
            axes: vec![Vector3::zeros(); dof],
            ee_pose: Isometry3::identity(),
            jacobian: DMatrix::zeros(6, dof),
        };
        // The zero vector always matches the chain DOF.
        let zero = vec![0.0; dof];
        let _ = model.set_configuration(&zero);
        model
    }

    /// Number of actuated degrees of freedom.
    #[must_use]
    pub const fn dof(&self) -> usize {
        self.positions.len()
    }

    /// Number of end-effector frames the Jacobian is stacked over.
    ///
    /// A single serial chain has one; task-space dimensions are always
    /// derived from this so a stacked multi-chain model stays additive.
    #[must_use]
    pub const fn num_end_effectors(&self) -> usize {
        1
    }

    /// Task-space dimension of the Jacobian (rows).
    #[must_use]
    pub const fn task_dims(&self) -> usize {
        6 * self.num_end_effectors()
    }

    /// Load a joint configuration and recompute forward position and the
    /// Jacobian (update-then-query coupling).
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::DimensionMismatch`] if
    /// `q.len() != self.dof()`; the previously loaded configuration and
    /// Jacobian remain untouched.
    pub fn set_configuration(&mut self, q: &[f64]) -> Result<(), KinematicsError> {
        self.ee_pose = self
            .chain
            .joint_frames(q, &mut self.origins, &mut self.axes)?;
        self.positions.copy_from_slice(q);
        self.rebuild_jacobian();
        Ok(())
    }

    fn rebuild_jacobian(&mut self) {
        let ee_pos = self.ee_pose.translation.vector;
        for (i, joint) in self.chain.joints().iter().enumerate() {
            let z_i = &self.axes[i];
            if joint.is_prismatic {
                // Linear velocity along the axis, no angular contribution.
                self.jacobian[(0, i)] = z_i.x;
                self.jacobian[(1, i)] = z_i.y;
                self.jacobian[(2, i)] = z_i.z;
                self.jacobian[(3, i)] = 0.0;
                self.jacobian[(4, i)] = 0.0;
                self.jacobian[(5, i)] = 0.0;
            } else {
                // Revolute: linear = z x (p_ee - o_i), angular = z.
                let r = ee_pos - self.origins[i];
                let cross = z_i.cross(&r);
                self.jacobian[(0, i)] = cross.x;
                self.jacobian[(1, i)] = cross.y;
                self.jacobian[(2, i)] = cross.z;
                self.jacobian[(3, i)] = z_i.x;
                self.jacobian[(4, i)] = z_i.y;
                self.jacobian[(5, i)] = z_i.z;
            }
        }
    }

    /// Geometric Jacobian for the loaded configuration.
    #[must_use]
    pub const fn jacobian(&self) -> &DMatrix<f64> {
        &self.jacobian
    }

    /// The loaded joint configuration.
    #[must_use]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// End-effector pose in the base frame for the loaded configuration.
    #[must_use]
    pub const fn end_effector_pose(&self) -> &Isometry3<f64> {
        &self.ee_pose
    }

    /// The underlying chain.
    #[must_use]
    pub const fn chain(&self) -> &KinematicChain {
        &self.chain
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Kinematic chain built from a [`ChainConfig`].
//!
//! A [`KinematicChain`] is an ordered list of actuated joints from the base
//! frame to the end-effector frame. It stores the static transforms
//! (origins) and joint axes needed for forward kinematics and Jacobian
//! computation.

use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, UnitVector3, Vector3};

use yielders_core::config::{ChainConfig, JointDescriptor};
use yielders_core::error::ConfigError;

use crate::error::KinematicsError;

/// A single joint in the kinematic chain.
#[derive(Debug, Clone)]
pub struct ChainJoint {
    /// Name of this joint.
    pub name: String,
    /// Static transform from the parent link frame to this joint frame.
    pub origin: Isometry3<f64>,
    /// Joint axis in the joint's local frame.
    pub axis: UnitVector3<f64>,
    /// Whether this is a prismatic joint (false = revolute).
    pub is_prismatic: bool,
}

/// An ordered kinematic chain from base to end-effector.
///
/// Built from a [`ChainConfig`] at configure time. Any trailing fixed
/// transform to the tool frame is captured in the end-effector offset.
#[derive(Debug, Clone)]
pub struct KinematicChain {
    /// Ordered joints from base to end-effector.
    joints: Vec<ChainJoint>,
    /// Transform from the last joint's frame to the end-effector frame.
    ee_offset: Isometry3<f64>,
}

impl KinematicChain {
    /// Build a kinematic chain from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroAxis`] if a joint axis has zero length.
    pub fn from_config(config: &ChainConfig) -> Result<Self, ConfigError> {
        let mut joints = Vec::with_capacity(config.joints.len());
        for (index, descriptor) in config.joints.iter().enumerate() {
            joints.push(Self::build_joint(index, descriptor)?);
        }
        Ok(Self {
            joints,
            ee_offset: origin_to_isometry(&config.tip_offset_xyz, &config.tip_offset_rpy),
        })
    }

    fn build_joint(index: usize, descriptor: &JointDescriptor) -> Result<ChainJoint, ConfigError> {
        let axis = Vector3::new(descriptor.axis[0], descriptor.axis[1], descriptor.axis[2]);
        let Some(axis) = UnitVector3::try_new(axis, f64::EPSILON) else {
            return Err(ConfigError::ZeroAxis(index));
        };
        Ok(ChainJoint {
            name: descriptor.name.clone(),
            origin: origin_to_isometry(&descriptor.origin_xyz, &descriptor.origin_rpy),
            axis,
            is_prismatic: descriptor.prismatic,
        })
    }

    /// Number of actuated degrees of freedom.
    #[must_use]
    pub const fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Joint names in chain order.
    #[must_use]
    pub fn joint_names(&self) -> Vec<&str> {
        self.joints.iter().map(|j| j.name.as_str()).collect()
    }

    /// Access the joint definitions.
    #[must_use]
    pub fn joints(&self) -> &[ChainJoint] {
        &self.joints
    }

    /// End-effector offset after the last joint.
    #[must_use]
    pub const fn ee_offset(&self) -> &Isometry3<f64> {
        &self.ee_offset
    }

    /// Compute forward kinematics: joint positions -> end-effector pose in
    /// the base frame.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::DimensionMismatch`] if
    /// `q.len() != self.dof()`.
    pub fn forward_kinematics(&self, q: &[f64]) -> Result<Isometry3<f64>, KinematicsError> {
        self.check_dof(q)?;

        let mut transform = Isometry3::identity();
        for (joint, &position) in self.joints.iter().zip(q.iter()) {
            transform *= joint.origin;
            transform *= joint_transform(&joint.axis, joint.is_prismatic, position);
        }
        Ok(transform * self.ee_offset)
    }

    /// Compute per-joint frames for Jacobian assembly.
    ///
    /// Writes each joint's origin and axis (both in the base frame, taken
    /// before the joint's own motion) into `origins` and `axes`, and
    /// returns the end-effector pose. The output slices must each hold
    /// `dof()` entries.
    ///
    /// # Errors
    ///
    /// Returns [`KinematicsError::DimensionMismatch`] if
    /// `q.len() != self.dof()`.
    pub fn joint_frames(
        &self,
        q: &[f64],
        origins: &mut [Vector3<f64>],
        axes: &mut [Vector3<f64>],
    ) -> Result<Isometry3<f64>, KinematicsError> {
        self.check_dof(q)?;
        debug_assert_eq!(origins.len(), self.dof());
        debug_assert_eq!(axes.len(), self.dof());

        let mut transform = Isometry3::identity();
        for (i, (joint, &position)) in self.joints.iter().zip(q.iter()).enumerate() {
            transform *= joint.origin;

            // Frame of the joint before its own motion
            origins[i] = transform.translation.vector;
            axes[i] = transform.rotation * joint.axis.into_inner();

            transform *= joint_transform(&joint.axis, joint.is_prismatic, position);
        }
        Ok(transform * self.ee_offset)
    }

    fn check_dof(&self, q: &[f64]) -> Result<(), KinematicsError> {
        if q.len() != self.dof() {
            return Err(KinematicsError::DimensionMismatch {
                expected: self.dof(),
                got: q.len(),
            });
        }
        Ok(())
    }
}

/// Convert an xyz + rpy origin to an [`Isometry3`].
fn origin_to_isometry(xyz: &[f64; 3], rpy: &[f64; 3]) -> Isometry3<f64> {
    let translation = Translation3::new(xyz[0], xyz[1], xyz[2]);
    let rotation =
        UnitQuaternion::from_matrix(&rotation_matrix_from_rpy(rpy[0], rpy[1], rpy[2]));
    Isometry3::from_parts(translation, rotation)
}

/// Build a rotation matrix from roll-pitch-yaw (intrinsic XYZ / extrinsic ZYX).
fn rotation_matrix_from_rpy(roll: f64, pitch: f64, yaw: f64) -> Matrix3<f64> {
    let (sr, cr) = roll.sin_cos();
    let (sp, cp) = pitch.sin_cos();
    let (sy, cy) = yaw.sin_cos();

    // Extrinsic ZYX = Intrinsic XYZ
    Matrix3::new(
        cy * cp,
        cy * sp * sr - sy * cr,
        cy * sp * cr + sy * sr,
        sy * cp,
        sy * sp * sr + cy * cr,
        sy * sp * cr - cy * sr,
        -sp,
        cp * sr,
        cp * cr,
    )
}

/// Compute the transform for a single joint at a given position.
fn joint_transform(axis: &UnitVector3<f64>, is_prismatic: bool, position: f64) -> Isometry3<f64> {
    if is_prismatic {
        Isometry3::from_parts(
            Translation3::from(axis.into_inner() * position),
            UnitQuaternion::identity(),
        )
    } else {
        Isometry3::from_parts(
            Translation3::identity(),
            UnitQuaternion::from_axis_angle(axis, position),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

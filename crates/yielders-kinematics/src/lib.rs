//! Kinematics layer for the yielders compliant-arm controller.
//!
//! Provides forward kinematics, geometric Jacobian computation, and a
//! damped-pseudo-inverse differential IK for serial chains described by
//! [`ChainConfig`](yielders_core::config::ChainConfig).
//!
//! # Architecture
//!
//! ```text
//! ChainConfig ──► KinematicChain ──► KinematicModel ──► DifferentialIk
//! ```
//!
//! The [`KinematicChain`] is built from configuration at configure time.
//! The [`KinematicModel`] couples configuration updates with Jacobian
//! recomputation; [`DifferentialIk`] then converts Cartesian deltas to
//! joint deltas (and back) through a swappable pseudo-inverse strategy.

pub mod chain;
pub mod diffik;
pub mod error;
pub mod model;
pub mod pinv;

pub use chain::KinematicChain;
pub use diffik::{DifferentialIk, JointCorrection};
pub use error::KinematicsError;
pub use model::KinematicModel;
pub use pinv::{DampedLeastSquares, InversionQuality, PseudoInverseStrategy, TruncatedSvd};

use thiserror::Error;

/// Kinematics errors.
///
/// Copy + static payloads for cheap propagation in the per-cycle path.
/// Every variant is fatal to the triggering call only: no internal state
/// is modified when one is returned, and the caller must discard any
/// partial result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KinematicsError {
    /// A joint-space vector does not match the model's degrees of freedom.
    #[error("Dimension mismatch: expected {expected} joint values, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A task-space or joint-space delta does not match the conversion's
    /// expected length.
    #[error("Size mismatch: expected {expected} elements, got {got}")]
    SizeMismatch { expected: usize, got: usize },
}

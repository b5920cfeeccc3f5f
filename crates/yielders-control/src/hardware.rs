//! Contract for the hardware abstraction that supplies joint state and
//! consumes joint commands.
//!
//! The implementation (drivers, a simulator, a test mock) lives outside
//! the control core; the loop only relies on the guarantees spelled out
//! here.

use thiserror::Error;

use yielders_core::types::JointState;

/// Hardware access errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    /// The hardware's joint count does not match the caller's buffers.
    #[error("Hardware has {got} joints, caller expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Interfaces could not be claimed for exclusive use.
    #[error("Failed to claim hardware interfaces: {0}")]
    ClaimFailed(String),

    /// Interfaces could not be released cleanly.
    #[error("Failed to release hardware interfaces: {0}")]
    ReleaseFailed(String),
}

/// Per-joint state and command interfaces.
///
/// # Contract
///
/// - `read_state` fills only the fields already sized by the caller
///   (explicitly resized before the call, never grown by the hardware) and
///   fails with [`HardwareError::DimensionMismatch`] when the sizes
///   disagree with its joint count. It never reads or writes out of
///   bounds.
/// - `read_command` reports the most recently written command; values are
///   NaN where nothing has been commanded yet. Callers treat a NaN as "no
///   prior command" and reseed from measured state.
/// - `write_command` consumes only the present fields of the command.
/// - All methods are non-blocking; they are called from the real-time
///   context.
pub trait HardwareInterface {
    /// Number of joints exposed.
    fn dof(&self) -> usize;

    /// Claim exclusive use of the interfaces.
    fn claim(&mut self) -> Result<(), HardwareError>;

    /// Release the interfaces.
    fn release(&mut self) -> Result<(), HardwareError>;

    /// Fill the present fields of `out` with measured values.
    fn read_state(&self, out: &mut JointState) -> Result<(), HardwareError>;

    /// Fill the present fields of `out` with the last written command
    /// (NaN where none exists).
    fn read_command(&self, out: &mut JointState);

    /// Write the present fields of `command` to the command interfaces.
    fn write_command(&mut self, command: &JointState);
}

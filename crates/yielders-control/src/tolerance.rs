//! Per-joint tolerance evaluation for the external action-server
//! collaborator.

use yielders_core::config::ToleranceEntry;
use yielders_core::types::JointState;

/// True when the error state at `index` is within `tolerance`.
///
/// A component set to `0.0` is disabled; absent error fields never
/// violate.
#[must_use]
pub fn check_state_tolerance(
    error: &JointState,
    index: usize,
    tolerance: &ToleranceEntry,
) -> bool {
    within(&error.positions, index, tolerance.position)
        && within(&error.velocities, index, tolerance.velocity)
        && within(&error.accelerations, index, tolerance.acceleration)
}

fn within(field: &[f64], index: usize, tolerance: f64) -> bool {
    if tolerance <= 0.0 {
        return true;
    }
    field.get(index).is_none_or(|e| e.abs() <= tolerance)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

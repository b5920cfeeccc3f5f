//! Deterministic saturation of joint commands to configured bounds.

use std::time::Duration;

use yielders_core::config::JointLimitsConfig;
use yielders_core::types::JointState;

/// Clamps a joint state to per-joint bounds.
///
/// An unconfigured limiter (`None` limits) is an explicit no-op; pure
/// saturation, no smoothing.
#[derive(Debug, Clone, Default)]
pub struct JointLimiter {
    limits: Option<Vec<JointLimitsConfig>>,
}

impl JointLimiter {
    /// Create a limiter; `None` disables limiting entirely.
    #[must_use]
    pub const fn new(limits: Option<Vec<JointLimitsConfig>>) -> Self {
        Self { limits }
    }

    /// True when limits are configured.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.limits.is_some()
    }

    /// Clamp the state's present fields in place.
    ///
    /// `_period` is part of the enforcement contract (rate-aware limiters
    /// share this signature) but pure saturation does not consume it.
    pub fn enforce(&self, state: &mut JointState, _period: Duration) {
        let Some(limits) = &self.limits else {
            return;
        };
        for (index, limit) in limits.iter().enumerate() {
            if let (Some([lower, upper]), Some(position)) =
                (limit.position, state.positions.get_mut(index))
            {
                *position = position.clamp(lower, upper);
            }
            if let (Some(max), Some(velocity)) =
                (limit.max_velocity, state.velocities.get_mut(index))
            {
                *velocity = velocity.clamp(-max, max);
            }
            if let (Some(max), Some(acceleration)) =
                (limit.max_acceleration, state.accelerations.get_mut(index))
            {
                *acceleration = acceleration.clamp(-max, max);
            }
            if let (Some(max), Some(effort)) = (limit.max_effort, state.efforts.get_mut(index)) {
                *effort = effort.clamp(-max, max);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

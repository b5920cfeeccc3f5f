//! Lifecycle state machine gating when the control loop may run.
//!
//! An explicit enumerated state with a transition table, so an illegal
//! operation (say, `update()` while unconfigured) is a representable,
//! testable condition instead of a scattered boolean.

use thiserror::Error;

/// Controller lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Constructed; no model, no buffers.
    Unconfigured,
    /// Configured and allocated; not commanding hardware.
    Inactive,
    /// Running the per-cycle pipeline.
    Active,
    /// Transient: tearing down to `Unconfigured`.
    CleaningUp,
    /// Transient: attempting recovery.
    ErrorHandling,
    /// Unrecoverable; terminal.
    Finalized,
}

/// Illegal lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("Operation '{operation}' is not allowed in state {from:?}")]
    InvalidTransition {
        from: LifecycleState,
        operation: &'static str,
    },
}

/// Tracks the lifecycle state and enforces valid transitions.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    state: LifecycleState,
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMachine {
    /// Create a machine in [`Unconfigured`](LifecycleState::Unconfigured).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: LifecycleState::Unconfigured,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Check that `operation` is legal in the current state without
    /// transitioning. Lets callers validate before doing irreversible
    /// work.
    pub fn ensure(
        &self,
        operation: &'static str,
        allowed: &[LifecycleState],
    ) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state,
                operation,
            })
        }
    }

    /// Unconfigured → Inactive.
    pub fn configure(&mut self) -> Result<(), LifecycleError> {
        self.transition("configure", &[LifecycleState::Unconfigured], LifecycleState::Inactive)
    }

    /// Inactive → Active.
    pub fn activate(&mut self) -> Result<(), LifecycleError> {
        self.transition("activate", &[LifecycleState::Inactive], LifecycleState::Active)
    }

    /// Active → Inactive.
    pub fn deactivate(&mut self) -> Result<(), LifecycleError> {
        self.transition("deactivate", &[LifecycleState::Active], LifecycleState::Inactive)
    }

    /// {Active, Inactive} → CleaningUp.
    pub fn begin_cleanup(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            "cleanup",
            &[LifecycleState::Active, LifecycleState::Inactive],
            LifecycleState::CleaningUp,
        )
    }

    /// CleaningUp → Unconfigured.
    pub fn finish_cleanup(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            "finish_cleanup",
            &[LifecycleState::CleaningUp],
            LifecycleState::Unconfigured,
        )
    }

    /// Any non-terminal state → ErrorHandling.
    pub fn begin_error_handling(&mut self) -> Result<(), LifecycleError> {
        self.transition(
            "error",
            &[
                LifecycleState::Unconfigured,
                LifecycleState::Inactive,
                LifecycleState::Active,
                LifecycleState::CleaningUp,
                LifecycleState::ErrorHandling,
            ],
            LifecycleState::ErrorHandling,
        )
    }

    /// ErrorHandling → Unconfigured on recovery, Finalized otherwise.
    pub fn finish_error_handling(&mut self, recovered: bool) -> Result<(), LifecycleError> {
        let to = if recovered {
            LifecycleState::Unconfigured
        } else {
            LifecycleState::Finalized
        };
        self.transition("finish_error", &[LifecycleState::ErrorHandling], to)
    }

    fn transition(
        &mut self,
        operation: &'static str,
        allowed: &[LifecycleState],
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        self.ensure(operation, allowed)?;
        self.state = to;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

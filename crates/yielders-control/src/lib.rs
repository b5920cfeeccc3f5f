//! Real-time admittance control loop for a compliant robot arm.
//!
//! Converts a reference joint trajectory and a measured wrench into a
//! compliant joint-space command each cycle:
//!
//! ```text
//! hardware state ──► ControlLoop ──► TrajectorySampler ──► reference
//!                         │                                   │
//!                  RealtimeBuffers                     AdmittanceRule ──► JointLimiter ──► command
//!                  (traj/wrench/pose)                  (+ DifferentialIk)
//! ```
//!
//! The loop runs in a strictly periodic real-time context; command
//! ingestion from other threads goes exclusively through
//! [`RealtimeBuffer`], and a lifecycle state machine gates when the loop
//! may run.

pub mod admittance;
pub mod controller;
pub mod hardware;
pub mod lifecycle;
pub mod limiter;
pub mod rtbuf;
pub mod tolerance;
pub mod trajectory;

pub use admittance::{AdmittanceParameters, AdmittanceRule, AdmittanceUpdate};
pub use controller::{
    CommandBuffers, ControlError, ControlLoop, CycleOutcome, SnapshotPublisher,
};
pub use hardware::{HardwareError, HardwareInterface};
pub use lifecycle::{LifecycleError, LifecycleMachine, LifecycleState};
pub use limiter::JointLimiter;
pub use rtbuf::RealtimeBuffer;
pub use tolerance::check_state_tolerance;
pub use trajectory::{SampledSegment, TrajectorySampler};

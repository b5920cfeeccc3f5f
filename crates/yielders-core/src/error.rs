use thiserror::Error;

/// Configuration errors.
///
/// Fatal only at configure time; a failed configure blocks the transition
/// out of the unconfigured state.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("'joints' list was empty")]
    NoJoints,

    #[error("Invalid control_period: {0} (must be > 0)")]
    InvalidControlPeriod(f64),

    #[error("Joint count mismatch: {joints} joints configured, chain has {chain}")]
    JointCountMismatch { joints: usize, chain: usize },

    #[error("Joint name mismatch at index {index}: expected '{expected}', chain has '{got}'")]
    JointNameMismatch {
        index: usize,
        expected: String,
        got: String,
    },

    #[error("No command interfaces configured")]
    NoCommandInterfaces,

    #[error("No state interfaces configured")]
    NoStateInterfaces,

    #[error("Joint axis at index {0} has zero length")]
    ZeroAxis(usize),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Trajectory validation errors.
///
/// Raised by the non-real-time ingestion side before a trajectory is
/// published to the controller; the sampler assumes validated input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrajectoryError {
    #[error("Trajectory has no waypoints")]
    Empty,

    #[error("Waypoint {index} does not advance time (timestamps must be strictly increasing)")]
    NonMonotonicTime { index: usize },

    #[error("Waypoint {index} field length {got} does not match joint count {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::InterfaceKind;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_control_period() -> f64 {
    0.01
}
const fn default_axis() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}
const fn default_selected_axes() -> [bool; 6] {
    [true; 6]
}
const fn default_damping_ratio() -> [f64; 6] {
    [1.0; 6]
}
fn default_control_frame() -> String {
    "tool0".into()
}
fn default_ik_base_frame() -> String {
    "base_link".into()
}
fn default_command_interfaces() -> Vec<InterfaceKind> {
    vec![
        InterfaceKind::Position,
        InterfaceKind::Velocity,
        InterfaceKind::Acceleration,
    ]
}
fn default_state_interfaces() -> Vec<InterfaceKind> {
    vec![InterfaceKind::Position, InterfaceKind::Velocity]
}
const fn default_pinv_kind() -> PinvKind {
    PinvKind::DampedLeastSquares
}
const fn default_ik_damping() -> f64 {
    0.01
}

// ---------------------------------------------------------------------------
// ChainConfig
// ---------------------------------------------------------------------------

/// One actuated joint in the serial chain description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointDescriptor {
    pub name: String,
    /// Static translation from the parent frame to this joint frame (m).
    #[serde(default)]
    pub origin_xyz: [f64; 3],
    /// Static roll-pitch-yaw from the parent frame to this joint frame (rad).
    #[serde(default)]
    pub origin_rpy: [f64; 3],
    /// Joint axis in the joint's local frame.
    #[serde(default = "default_axis")]
    pub axis: [f64; 3],
    /// Prismatic joint (false = revolute).
    #[serde(default)]
    pub prismatic: bool,
}

/// Serial-chain description from which the kinematic model is built at
/// configure time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Actuated joints, base to tip.
    pub joints: Vec<JointDescriptor>,
    /// Fixed translation from the last joint's frame to the end-effector (m).
    #[serde(default)]
    pub tip_offset_xyz: [f64; 3],
    /// Fixed rotation from the last joint's frame to the end-effector (rad).
    #[serde(default)]
    pub tip_offset_rpy: [f64; 3],
}

// ---------------------------------------------------------------------------
// IkConfig
// ---------------------------------------------------------------------------

/// Pseudo-inverse policy for the differential IK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinvKind {
    /// Damp singular values below the threshold (`σ/(σ²+λ²)`).
    DampedLeastSquares,
    /// Zero singular values below the threshold.
    TruncatedSvd,
}

/// Differential-IK inversion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IkConfig {
    #[serde(default = "default_pinv_kind")]
    pub strategy: PinvKind,
    /// Damping factor λ for damped least squares.
    #[serde(default = "default_ik_damping")]
    pub damping: f64,
    /// Singular values below this are damped or truncated.
    #[serde(default = "default_ik_damping")]
    pub singular_threshold: f64,
}

impl Default for IkConfig {
    fn default() -> Self {
        Self {
            strategy: default_pinv_kind(),
            damping: default_ik_damping(),
            singular_threshold: default_ik_damping(),
        }
    }
}

impl IkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.damping <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "ik.damping".into(),
                message: "must be positive".into(),
            });
        }
        if self.singular_threshold < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "ik.singular_threshold".into(),
                message: "must be non-negative".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AdmittanceConfig
// ---------------------------------------------------------------------------

/// Per-axis mass-spring-damper parameters for the six Cartesian axes
/// (x, y, z, rx, ry, rz).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmittanceConfig {
    /// Axes the compliance acts on; a disabled axis passes the reference
    /// through unmodified.
    #[serde(default = "default_selected_axes")]
    pub selected_axes: [bool; 6],
    /// Virtual mass (kg, kg·m²).
    pub mass: [f64; 6],
    /// Spring stiffness (N/m, Nm/rad).
    pub stiffness: [f64; 6],
    /// Damping as a ratio of critical damping (1.0 = critically damped).
    #[serde(default = "default_damping_ratio")]
    pub damping_ratio: [f64; 6],
    /// Frame the wrench and the compliance act in.
    #[serde(default = "default_control_frame")]
    pub control_frame: String,
    /// Base frame of the differential IK.
    #[serde(default = "default_ik_base_frame")]
    pub ik_base_frame: String,
}

impl Default for AdmittanceConfig {
    fn default() -> Self {
        Self {
            selected_axes: default_selected_axes(),
            mass: [1.0; 6],
            stiffness: [100.0, 100.0, 100.0, 10.0, 10.0, 10.0],
            damping_ratio: default_damping_ratio(),
            control_frame: default_control_frame(),
            ik_base_frame: default_ik_base_frame(),
        }
    }
}

impl AdmittanceConfig {
    /// Absolute damping per axis: `d = ζ · 2·√(k·m)`.
    #[must_use]
    pub fn damping(&self) -> [f64; 6] {
        let mut damping = [0.0; 6];
        for i in 0..6 {
            damping[i] = self.damping_ratio[i] * 2.0 * (self.stiffness[i] * self.mass[i]).sqrt();
        }
        damping
    }

    /// Validate per-axis parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, &m) in self.mass.iter().enumerate() {
            if self.selected_axes[i] && m <= 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("admittance.mass[{i}]"),
                    message: "must be positive on an enabled axis".into(),
                });
            }
        }
        for (i, &k) in self.stiffness.iter().enumerate() {
            if k < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("admittance.stiffness[{i}]"),
                    message: "must be non-negative".into(),
                });
            }
        }
        for (i, &z) in self.damping_ratio.iter().enumerate() {
            if z < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("admittance.damping_ratio[{i}]"),
                    message: "must be non-negative".into(),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Limits and tolerances
// ---------------------------------------------------------------------------

/// Saturation bounds for one joint. Absent components are unbounded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointLimitsConfig {
    /// Position bounds `[lower, upper]`.
    #[serde(default)]
    pub position: Option<[f64; 2]>,
    /// Symmetric velocity bound.
    #[serde(default)]
    pub max_velocity: Option<f64>,
    /// Symmetric acceleration bound.
    #[serde(default)]
    pub max_acceleration: Option<f64>,
    /// Symmetric effort bound.
    #[serde(default)]
    pub max_effort: Option<f64>,
}

/// Per-joint tolerance on one state field; `0.0` disables the component.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ToleranceEntry {
    #[serde(default)]
    pub position: f64,
    #[serde(default)]
    pub velocity: f64,
    #[serde(default)]
    pub acceleration: f64,
}

/// Trajectory-following tolerances for the external action server.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Per-joint tolerance while the trajectory is in motion.
    #[serde(default)]
    pub state: Vec<ToleranceEntry>,
    /// Per-joint tolerance at the final waypoint.
    #[serde(default)]
    pub goal: Vec<ToleranceEntry>,
    /// Allowed overrun past the trajectory end (s); evaluated by the
    /// action-server collaborator.
    #[serde(default)]
    pub goal_time: f64,
}

// ---------------------------------------------------------------------------
// ControllerConfig
// ---------------------------------------------------------------------------

/// Full configure-time input for the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Joint names in canonical order.
    pub joints: Vec<String>,
    /// Interface kinds commanded each cycle.
    #[serde(default = "default_command_interfaces")]
    pub command_interfaces: Vec<InterfaceKind>,
    /// Interface kinds read from hardware each cycle.
    #[serde(default = "default_state_interfaces")]
    pub state_interfaces: Vec<InterfaceKind>,
    /// Fixed control period (s).
    #[serde(default = "default_control_period")]
    pub control_period: f64,
    pub chain: ChainConfig,
    #[serde(default)]
    pub ik: IkConfig,
    #[serde(default)]
    pub admittance: AdmittanceConfig,
    /// Per-joint saturation bounds; `None` disables the limiter.
    #[serde(default)]
    pub limits: Option<Vec<JointLimitsConfig>>,
    #[serde(default)]
    pub tolerances: Option<ToleranceConfig>,
}

impl ControllerConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.joints.is_empty() {
            return Err(ConfigError::NoJoints);
        }
        if self.control_period <= 0.0 {
            return Err(ConfigError::InvalidControlPeriod(self.control_period));
        }
        if self.command_interfaces.is_empty() {
            return Err(ConfigError::NoCommandInterfaces);
        }
        if self.state_interfaces.is_empty() {
            return Err(ConfigError::NoStateInterfaces);
        }
        if !self.command_interfaces.contains(&InterfaceKind::Position) {
            return Err(ConfigError::InvalidValue {
                field: "command_interfaces".into(),
                message: "position interface is required".into(),
            });
        }
        if !self.state_interfaces.contains(&InterfaceKind::Position) {
            return Err(ConfigError::InvalidValue {
                field: "state_interfaces".into(),
                message: "position interface is required".into(),
            });
        }
        if self.chain.joints.len() != self.joints.len() {
            return Err(ConfigError::JointCountMismatch {
                joints: self.joints.len(),
                chain: self.chain.joints.len(),
            });
        }
        for (index, (name, joint)) in self.joints.iter().zip(&self.chain.joints).enumerate() {
            if name != &joint.name {
                return Err(ConfigError::JointNameMismatch {
                    index,
                    expected: name.clone(),
                    got: joint.name.clone(),
                });
            }
        }
        for (index, joint) in self.chain.joints.iter().enumerate() {
            let norm_sq: f64 = joint.axis.iter().map(|a| a * a).sum();
            if norm_sq <= f64::EPSILON {
                return Err(ConfigError::ZeroAxis(index));
            }
        }
        self.ik.validate()?;
        self.admittance.validate()?;
        if let Some(limits) = &self.limits {
            if limits.len() != self.joints.len() {
                return Err(ConfigError::InvalidValue {
                    field: "limits".into(),
                    message: format!(
                        "expected {} per-joint entries, got {}",
                        self.joints.len(),
                        limits.len()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Number of joints.
    #[must_use]
    pub const fn dof(&self) -> usize {
        self.joints.len()
    }

    /// Control rate in Hz.
    #[must_use]
    pub fn control_hz(&self) -> f64 {
        1.0 / self.control_period
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_joint_config() -> ControllerConfig {
        ControllerConfig {
            joints: vec!["shoulder".into(), "elbow".into()],
            command_interfaces: default_command_interfaces(),
            state_interfaces: default_state_interfaces(),
            control_period: 0.01,
            chain: ChainConfig {
                joints: vec![
                    JointDescriptor {
                        name: "shoulder".into(),
                        origin_xyz: [0.0, 0.0, 0.05],
                        origin_rpy: [0.0; 3],
                        axis: [0.0, 0.0, 1.0],
                        prismatic: false,
                    },
                    JointDescriptor {
                        name: "elbow".into(),
                        origin_xyz: [0.0, 0.0, 0.3],
                        origin_rpy: [0.0; 3],
                        axis: [0.0, 1.0, 0.0],
                        prismatic: false,
                    },
                ],
                tip_offset_xyz: [0.0, 0.0, 0.25],
                tip_offset_rpy: [0.0; 3],
            },
            ik: IkConfig::default(),
            admittance: AdmittanceConfig::default(),
            limits: None,
            tolerances: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(two_joint_config().validate().is_ok());
    }

    #[test]
    fn empty_joints_rejected() {
        let mut config = two_joint_config();
        config.joints.clear();
        assert!(matches!(config.validate(), Err(ConfigError::NoJoints)));
    }

    #[test]
    fn zero_period_rejected() {
        let mut config = two_joint_config();
        config.control_period = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidControlPeriod(_))
        ));
    }

    #[test]
    fn chain_count_mismatch_rejected() {
        let mut config = two_joint_config();
        config.chain.joints.pop();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::JointCountMismatch { joints: 2, chain: 1 })
        ));
    }

    #[test]
    fn chain_name_mismatch_rejected() {
        let mut config = two_joint_config();
        config.chain.joints[1].name = "wrist".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::JointNameMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn zero_axis_rejected() {
        let mut config = two_joint_config();
        config.chain.joints[0].axis = [0.0; 3];
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAxis(0))));
    }

    #[test]
    fn nonpositive_mass_on_enabled_axis_rejected() {
        let mut config = two_joint_config();
        config.admittance.mass[2] = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn zero_mass_on_disabled_axis_allowed() {
        let mut config = two_joint_config();
        config.admittance.selected_axes[2] = false;
        config.admittance.mass[2] = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn limits_length_mismatch_rejected() {
        let mut config = two_joint_config();
        config.limits = Some(vec![JointLimitsConfig::default()]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn critical_damping_formula() {
        let config = AdmittanceConfig {
            mass: [1.0; 6],
            stiffness: [100.0; 6],
            damping_ratio: [1.0; 6],
            ..AdmittanceConfig::default()
        };
        let damping = config.damping();
        // d = 2·√(100·1) = 20
        for d in damping {
            assert_relative_eq!(d, 20.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn from_toml_str_with_defaults() {
        let toml_src = r#"
            joints = ["j1"]

            [[chain.joints]]
            name = "j1"
            axis = [0.0, 0.0, 1.0]

            [admittance]
            mass = [1.0, 1.0, 1.0, 0.1, 0.1, 0.1]
            stiffness = [100.0, 100.0, 100.0, 10.0, 10.0, 10.0]
        "#;
        let config = ControllerConfig::from_toml_str(toml_src).unwrap();
        assert_eq!(config.dof(), 1);
        assert_relative_eq!(config.control_period, 0.01);
        assert_relative_eq!(config.control_hz(), 100.0);
        assert_eq!(
            config.command_interfaces,
            vec![
                InterfaceKind::Position,
                InterfaceKind::Velocity,
                InterfaceKind::Acceleration
            ]
        );
        assert_eq!(config.admittance.selected_axes, [true; 6]);
    }

    #[test]
    fn from_toml_str_invalid_rejected() {
        let toml_src = r#"
            joints = []
            [chain]
            joints = []
        "#;
        assert!(ControllerConfig::from_toml_str(toml_src).is_err());
    }

    #[test]
    fn interface_kinds_parse_snake_case() {
        let toml_src = r#"
            joints = ["j1"]
            command_interfaces = ["position", "effort"]

            [[chain.joints]]
            name = "j1"
        "#;
        let config = ControllerConfig::from_toml_str(toml_src).unwrap();
        assert_eq!(
            config.command_interfaces,
            vec![InterfaceKind::Position, InterfaceKind::Effort]
        );
    }
}

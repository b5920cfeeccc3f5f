//! Control loop orchestration and lifecycle.
//!
//! [`ControlLoop`] owns every pipeline component and runs the fixed
//! per-cycle sequence: drain command buffers, read hardware state, sample
//! the trajectory, apply the admittance rule, enforce joint limits, write
//! the hardware command, evaluate tolerances, publish a snapshot. A
//! lifecycle state machine gates execution: `update()` outside
//! [`LifecycleState::Active`] is a successful no-op.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use yielders_core::config::{AdmittanceConfig, ControllerConfig, PinvKind, ToleranceConfig};
use yielders_core::error::ConfigError;
use yielders_core::time::ControlTime;
use yielders_core::types::{
    ControllerSnapshot, InterfaceKind, JointState, JointTrajectory, PoseCommand, Wrench,
};
use yielders_kinematics::{
    DampedLeastSquares, DifferentialIk, KinematicChain, KinematicModel, KinematicsError,
    PseudoInverseStrategy, TruncatedSvd,
};

use crate::admittance::{AdmittanceParameters, AdmittanceRule};
use crate::hardware::{HardwareError, HardwareInterface};
use crate::lifecycle::{LifecycleError, LifecycleMachine, LifecycleState};
use crate::limiter::JointLimiter;
use crate::rtbuf::RealtimeBuffer;
use crate::tolerance::check_state_tolerance;
use crate::trajectory::TrajectorySampler;

/// Duration of the single-waypoint return-home trajectory captured at
/// activation.
const HOME_TIME_FROM_START: Duration = Duration::from_millis(50);

/// Control loop errors.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Kinematics(#[from] KinematicsError),

    #[error("Controller pipeline is not configured")]
    NotConfigured,
}

/// Input mailboxes shared with non-real-time producer threads.
///
/// Producers write; the control loop is the only reader.
#[derive(Debug, Default)]
pub struct CommandBuffers {
    pub trajectory: RealtimeBuffer<JointTrajectory>,
    pub wrench: RealtimeBuffer<Wrench>,
    pub pose: RealtimeBuffer<PoseCommand>,
}

/// Try-lock snapshot slot for the external telemetry publisher.
///
/// The real-time writer skips a contended cycle instead of blocking; the
/// non-real-time reader may block briefly.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    slot: Mutex<ControllerSnapshot>,
}

impl SnapshotPublisher {
    /// Fill the slot if it is free. Returns false when the cycle's publish
    /// was skipped.
    pub fn publish_with(&self, fill: impl FnOnce(&mut ControllerSnapshot)) -> bool {
        match self.slot.try_lock() {
            Ok(mut snapshot) => {
                fill(&mut snapshot);
                true
            }
            Err(_) => false,
        }
    }

    /// Clone the latest published snapshot.
    #[must_use]
    pub fn latest(&self) -> ControllerSnapshot {
        match self.slot.lock() {
            Ok(snapshot) => snapshot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

/// Result flags of one `update()` call, for the external action-server
/// collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleOutcome {
    /// False when the loop was not `Active` (successful no-op).
    pub ran: bool,
    /// True while the sampled segment is not the final one.
    pub before_last_point: bool,
    /// Mid-trajectory state tolerance violated.
    pub abort: bool,
    /// Final-segment goal tolerance violated.
    pub goal_tolerance_violated: bool,
    /// The IK mapping was damped near a singularity this cycle.
    pub near_singularity: bool,
}

/// Everything built at configure time and reused each cycle.
struct Pipeline {
    ik: DifferentialIk,
    admittance: AdmittanceRule,
    sampler: TrajectorySampler,
    limiter: JointLimiter,
    tolerances: Option<ToleranceConfig>,
    command_kinds: Vec<InterfaceKind>,
    state_kinds: Vec<InterfaceKind>,

    state_current: JointState,
    state_reference: JointState,
    last_state_reference: JointState,
    pre_admittance: JointState,
    state_desired: JointState,
    state_error: JointState,
    last_commanded: JointState,

    active_trajectory: Option<Arc<JointTrajectory>>,
    active_wrench: Option<Arc<Wrench>>,
    active_pose: Option<Arc<PoseCommand>>,
    home: Option<Arc<JointTrajectory>>,
    was_degraded: bool,
}

/// The real-time control core: owns the pipeline, the lifecycle machine,
/// the command buffers, and the hardware.
pub struct ControlLoop<H: HardwareInterface> {
    config: ControllerConfig,
    hardware: H,
    claimed: bool,
    lifecycle: LifecycleMachine,
    buffers: Arc<CommandBuffers>,
    snapshots: Arc<SnapshotPublisher>,
    pipeline: Option<Pipeline>,
}

impl<H: HardwareInterface> ControlLoop<H> {
    /// Create an unconfigured loop.
    pub fn new(config: ControllerConfig, hardware: H) -> Self {
        Self {
            config,
            hardware,
            claimed: false,
            lifecycle: LifecycleMachine::new(),
            buffers: Arc::new(CommandBuffers::default()),
            snapshots: Arc::new(SnapshotPublisher::default()),
            pipeline: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// The input mailboxes, for producer threads.
    #[must_use]
    pub fn command_buffers(&self) -> Arc<CommandBuffers> {
        Arc::clone(&self.buffers)
    }

    /// The snapshot slot, for the telemetry publisher.
    #[must_use]
    pub fn snapshots(&self) -> Arc<SnapshotPublisher> {
        Arc::clone(&self.snapshots)
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// The hardware implementation (mainly for inspection in tests).
    #[must_use]
    pub const fn hardware(&self) -> &H {
        &self.hardware
    }

    /// The most recently commanded state, if configured. Seeded from the
    /// hardware command interfaces at activation, then refreshed every
    /// cycle.
    #[must_use]
    pub fn last_commanded_state(&self) -> Option<&JointState> {
        self.pipeline.as_ref().map(|p| &p.last_commanded)
    }

    /// Validate parameters, build the kinematic model, and allocate all
    /// per-cycle buffers: Unconfigured → Inactive.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] blocks the transition; the loop stays Unconfigured.
    pub fn configure(&mut self) -> Result<(), ControlError> {
        self.lifecycle
            .ensure("configure", &[LifecycleState::Unconfigured])?;
        self.config.validate()?;
        if self.hardware.dof() != self.config.dof() {
            return Err(HardwareError::DimensionMismatch {
                expected: self.config.dof(),
                got: self.hardware.dof(),
            }
            .into());
        }

        let chain = KinematicChain::from_config(&self.config.chain)?;
        let model = KinematicModel::new(chain);
        let strategy: Box<dyn PseudoInverseStrategy> = match self.config.ik.strategy {
            PinvKind::DampedLeastSquares => Box::new(DampedLeastSquares {
                damping: self.config.ik.damping,
                singular_threshold: self.config.ik.singular_threshold,
            }),
            PinvKind::TruncatedSvd => Box::new(TruncatedSvd {
                threshold: self.config.ik.singular_threshold,
            }),
        };

        let dof = self.config.dof();
        let mut command_kinds = self.config.command_interfaces.clone();
        command_kinds.sort();
        command_kinds.dedup();
        let mut state_kinds = self.config.state_interfaces.clone();
        state_kinds.sort();
        state_kinds.dedup();

        let mut pipeline = Pipeline {
            ik: DifferentialIk::new(model, strategy),
            admittance: AdmittanceRule::new(AdmittanceParameters::from(&self.config.admittance)),
            sampler: TrajectorySampler::new(),
            limiter: JointLimiter::new(self.config.limits.clone()),
            tolerances: self.config.tolerances.clone(),
            command_kinds,
            state_kinds,
            state_current: JointState::new(),
            state_reference: JointState::new(),
            last_state_reference: JointState::new(),
            pre_admittance: JointState::new(),
            state_desired: JointState::new(),
            state_error: JointState::new(),
            last_commanded: JointState::new(),
            active_trajectory: None,
            active_wrench: None,
            active_pose: None,
            home: None,
            was_degraded: false,
        };
        pipeline.state_current.resize_for(dof, &pipeline.state_kinds);
        pipeline
            .state_reference
            .resize_for(dof, &pipeline.state_kinds);
        pipeline
            .last_state_reference
            .resize_for(dof, &pipeline.state_kinds);
        pipeline
            .state_desired
            .resize_for(dof, &pipeline.command_kinds);
        pipeline
            .last_commanded
            .resize_for(dof, &pipeline.command_kinds);
        self.pipeline = Some(pipeline);

        self.lifecycle.configure()?;
        info!(
            joints = dof,
            period_s = self.config.control_period,
            "controller configured"
        );
        Ok(())
    }

    /// Claim hardware interfaces, seed the last-commanded state from
    /// hardware (reseeding from measured state where commands are NaN),
    /// capture the home pose, and reset the admittance integrator:
    /// Inactive → Active.
    pub fn activate(&mut self, now: ControlTime) -> Result<(), ControlError> {
        self.lifecycle.ensure("activate", &[LifecycleState::Inactive])?;
        let pipeline = self.pipeline.as_mut().ok_or(ControlError::NotConfigured)?;
        let dof = self.config.dof();

        self.hardware.claim()?;
        self.claimed = true;

        // A restarted controller resumes from its previous command when
        // one exists; NaN marks "no prior command" and forces a reseed
        // from measured state instead of propagating the invalid value.
        pipeline
            .last_commanded
            .resize_for(dof, &pipeline.command_kinds);
        self.hardware.read_command(&mut pipeline.last_commanded);
        pipeline.last_commanded.retain_finite_fields();

        pipeline.state_current.resize_for(dof, &pipeline.state_kinds);
        self.hardware.read_state(&mut pipeline.state_current)?;
        seed_missing_fields(
            &mut pipeline.last_commanded,
            &pipeline.state_current,
            dof,
            &pipeline.command_kinds,
        );

        // Seed references from the measured state so the first cycle holds
        // position instead of jumping.
        pipeline.last_state_reference.clone_from(&pipeline.state_current);
        pipeline.state_reference.clone_from(&pipeline.state_current);

        // Home pose: a single waypoint at the measured position.
        let mut home_point = JointState::with_positions(pipeline.state_current.positions.clone());
        home_point.time_from_start = ControlTime::from_duration(HOME_TIME_FROM_START);
        pipeline.home = Some(Arc::new(JointTrajectory {
            joint_names: self.config.joints.clone(),
            points: vec![home_point],
        }));

        pipeline.admittance.reset();
        pipeline.sampler.clear();
        pipeline.active_trajectory = None;
        self.buffers.trajectory.clear();

        self.lifecycle.activate()?;
        info!(time = %now, "controller activated");
        Ok(())
    }

    /// Release hardware interfaces: Active → Inactive.
    pub fn deactivate(&mut self) -> Result<(), ControlError> {
        self.lifecycle.ensure("deactivate", &[LifecycleState::Active])?;
        self.release_hardware()?;
        self.lifecycle.deactivate()?;
        info!("controller deactivated");
        Ok(())
    }

    /// Swap the active trajectory for the return-home trajectory and tear
    /// down to Unconfigured: {Active, Inactive} → Unconfigured.
    pub fn cleanup(&mut self, now: ControlTime) -> Result<(), ControlError> {
        self.lifecycle.begin_cleanup()?;

        let release_result = self.release_hardware();
        if let Some(pipeline) = self.pipeline.as_mut() {
            if let Some(home) = pipeline.home.clone() {
                pipeline.sampler.replace(home, now);
                pipeline.active_trajectory = None;
                pipeline.admittance.reset();
            }
        }
        self.lifecycle.finish_cleanup()?;
        info!("controller cleaned up");
        release_result?;
        Ok(())
    }

    /// Attempt recovery from a fault: any non-terminal state →
    /// Unconfigured on success, Finalized on failure.
    pub fn handle_error(&mut self) -> Result<LifecycleState, LifecycleError> {
        self.lifecycle.begin_error_handling()?;

        let recovered = self.release_hardware().is_ok();
        self.buffers.trajectory.clear();
        self.buffers.wrench.clear();
        self.buffers.pose.clear();
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.sampler.clear();
            pipeline.admittance.reset();
            pipeline.active_trajectory = None;
            pipeline.active_wrench = None;
            pipeline.active_pose = None;
        }

        self.lifecycle.finish_error_handling(recovered)?;
        if recovered {
            warn!("controller recovered from error, now unconfigured");
        } else {
            warn!("controller failed to recover, finalized");
        }
        Ok(self.lifecycle.state())
    }

    fn release_hardware(&mut self) -> Result<(), ControlError> {
        if self.claimed {
            self.hardware.release()?;
            self.claimed = false;
        }
        Ok(())
    }

    /// Run one control cycle at `now` with the elapsed `period`.
    ///
    /// Outside `Active` this is a no-op returning success with
    /// `ran == false` and no hardware interaction.
    ///
    /// # Errors
    ///
    /// A dimension mismatch from hardware or kinematics is fatal to this
    /// cycle only: no command is written and internal state is not
    /// corrupted.
    pub fn update(&mut self, now: ControlTime, period: Duration) -> Result<CycleOutcome, ControlError> {
        if self.lifecycle.state() != LifecycleState::Active {
            return Ok(CycleOutcome::default());
        }
        let pipeline = self.pipeline.as_mut().ok_or(ControlError::NotConfigured)?;
        let dof = self.config.dof();

        // (1) Drain command buffers; last write wins, pointer identity
        // detects replacement.
        let incoming = self.buffers.trajectory.read();
        if !same_arc(&pipeline.active_trajectory, &incoming) {
            pipeline.active_trajectory = incoming.clone();
            if let Some(trajectory) = incoming {
                debug!(waypoints = trajectory.points.len(), "trajectory replaced");
                pipeline.sampler.replace(trajectory, now);
                pipeline.admittance.reset();
            }
        }
        let incoming = self.buffers.wrench.read();
        if !same_arc(&pipeline.active_wrench, &incoming) {
            pipeline.active_wrench = incoming;
        }
        let incoming = self.buffers.pose.read();
        if !same_arc(&pipeline.active_pose, &incoming) {
            // Accepted for completeness; joint-command mode is the only
            // mode this core consumes.
            pipeline.active_pose = incoming;
        }

        // (2) Measured state.
        pipeline.state_current.resize_for(dof, &pipeline.state_kinds);
        self.hardware.read_state(&mut pipeline.state_current)?;

        // (3) Reference from the trajectory; an invalid sample holds the
        // last valid reference instead of jumping.
        let segment = pipeline.sampler.sample(now, &mut pipeline.state_reference);
        if segment.is_some() {
            pipeline
                .last_state_reference
                .clone_from(&pipeline.state_reference);
        } else {
            pipeline
                .state_reference
                .clone_from(&pipeline.last_state_reference);
        }
        pipeline.pre_admittance.clone_from(&pipeline.state_reference);

        // (4) Admittance dynamics.
        let default_wrench = Wrench::zero();
        let wrench = pipeline
            .active_wrench
            .as_deref()
            .unwrap_or(&default_wrench);
        let admittance = pipeline.admittance.update(
            &pipeline.state_current,
            wrench,
            &pipeline.state_reference,
            period,
            &mut pipeline.ik,
            &mut pipeline.state_desired,
        )?;
        if admittance.near_singularity && !pipeline.was_degraded {
            warn!("differential IK near a singular configuration, output damped");
        }
        pipeline.was_degraded = admittance.near_singularity;

        // (5) Saturation.
        pipeline.limiter.enforce(&mut pipeline.state_desired, period);

        // (6) Command hardware.
        self.hardware.write_command(&pipeline.state_desired);

        // (7) Tolerances for the action-server collaborator.
        pipeline
            .state_error
            .assign_error(&pipeline.state_desired, &pipeline.state_current);
        let before_last_point =
            segment.is_some_and(|s| pipeline.sampler.is_before_last_point(s));
        let mut abort = false;
        let mut goal_tolerance_violated = false;
        if let (Some(tolerances), Some(_)) = (&pipeline.tolerances, segment) {
            for index in 0..dof {
                if before_last_point {
                    if let Some(tolerance) = tolerances.state.get(index) {
                        abort |= !check_state_tolerance(&pipeline.state_error, index, tolerance);
                    }
                } else if let Some(tolerance) = tolerances.goal.get(index) {
                    goal_tolerance_violated |=
                        !check_state_tolerance(&pipeline.state_error, index, tolerance);
                }
            }
        }

        pipeline.last_commanded.clone_from(&pipeline.state_desired);

        // (8) Telemetry snapshot; a contended slot skips this cycle.
        let joint_names = &self.config.joints;
        self.snapshots.publish_with(|snapshot| {
            snapshot.joint_names.clone_from(joint_names);
            snapshot
                .input_joint_command
                .clone_from(&pipeline.pre_admittance);
            snapshot
                .desired_joint_state
                .clone_from(&pipeline.state_desired);
            snapshot
                .actual_joint_state
                .clone_from(&pipeline.state_current);
            snapshot.error_joint_state.clone_from(&pipeline.state_error);
            snapshot.near_singularity = admittance.near_singularity;
        });

        Ok(CycleOutcome {
            ran: true,
            before_last_point,
            abort,
            goal_tolerance_violated,
            near_singularity: admittance.near_singularity,
        })
    }

    /// Replace the admittance parameters. Requires `&mut self`, so the
    /// update lands between cycles, never partially visible mid-cycle.
    pub fn set_admittance_config(
        &mut self,
        admittance: AdmittanceConfig,
    ) -> Result<(), ControlError> {
        admittance.validate()?;
        let pipeline = self.pipeline.as_mut().ok_or(ControlError::NotConfigured)?;
        pipeline
            .admittance
            .set_parameters(AdmittanceParameters::from(&admittance));
        self.config.admittance = admittance;
        Ok(())
    }
}

/// Seed command fields that are still absent after NaN filtering from the
/// measured state (or zeros where the measurement lacks the field).
fn seed_missing_fields(
    command: &mut JointState,
    measured: &JointState,
    dof: usize,
    kinds: &[InterfaceKind],
) {
    let fields: [(&mut Vec<f64>, &Vec<f64>, InterfaceKind); 4] = [
        (
            &mut command.positions,
            &measured.positions,
            InterfaceKind::Position,
        ),
        (
            &mut command.velocities,
            &measured.velocities,
            InterfaceKind::Velocity,
        ),
        (
            &mut command.accelerations,
            &measured.accelerations,
            InterfaceKind::Acceleration,
        ),
        (&mut command.efforts, &measured.efforts, InterfaceKind::Effort),
    ];
    for (field, source, kind) in fields {
        if !kinds.contains(&kind) || !field.is_empty() {
            continue;
        }
        if source.len() == dof {
            field.clone_from(source);
        } else {
            field.resize(dof, 0.0);
        }
    }
}

/// Pointer-identity comparison, the buffer-drain change detector.
fn same_arc<T>(a: &Option<Arc<T>>, b: &Option<Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yielders_core::config::{AdmittanceConfig, ChainConfig, IkConfig, JointDescriptor};

    const PERIOD: Duration = Duration::from_millis(10);

    // -- mock hardware --

    /// In-memory hardware: measured state is settable, commands are
    /// recorded, claim/release counted.
    struct MockHardware {
        dof: usize,
        positions: Vec<f64>,
        velocities: Vec<f64>,
        commanded: Mutex<JointState>,
        writes: AtomicUsize,
        fail_release: bool,
    }

    impl MockHardware {
        fn new(dof: usize) -> Self {
            Self {
                dof,
                positions: vec![0.0; dof],
                velocities: vec![0.0; dof],
                commanded: Mutex::new(JointState::new()),
                writes: AtomicUsize::new(0),
                fail_release: false,
            }
        }

        fn last_command(&self) -> JointState {
            self.commanded.lock().unwrap().clone()
        }

        fn write_count(&self) -> usize {
            self.writes.load(Ordering::Relaxed)
        }
    }

    impl HardwareInterface for MockHardware {
        fn dof(&self) -> usize {
            self.dof
        }

        fn claim(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }

        fn release(&mut self) -> Result<(), HardwareError> {
            if self.fail_release {
                Err(HardwareError::ReleaseFailed("mock".into()))
            } else {
                Ok(())
            }
        }

        fn read_state(&self, out: &mut JointState) -> Result<(), HardwareError> {
            for (field, source) in [
                (&mut out.positions, &self.positions),
                (&mut out.velocities, &self.velocities),
            ] {
                if field.is_empty() {
                    continue;
                }
                if field.len() != source.len() {
                    return Err(HardwareError::DimensionMismatch {
                        expected: field.len(),
                        got: source.len(),
                    });
                }
                field.copy_from_slice(source);
            }
            Ok(())
        }

        fn read_command(&self, out: &mut JointState) {
            let commanded = self.commanded.lock().unwrap();
            for (field, source) in [
                (&mut out.positions, &commanded.positions),
                (&mut out.velocities, &commanded.velocities),
                (&mut out.accelerations, &commanded.accelerations),
            ] {
                if field.len() == source.len() {
                    field.copy_from_slice(source);
                } else {
                    field.iter_mut().for_each(|v| *v = f64::NAN);
                }
            }
        }

        fn write_command(&mut self, command: &JointState) {
            *self.commanded.lock().unwrap() = command.clone();
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
    }

    // -- fixtures --

    fn revolute(name: &str, origin_z: f64, axis: [f64; 3]) -> JointDescriptor {
        JointDescriptor {
            name: name.into(),
            origin_xyz: [0.0, 0.0, origin_z],
            origin_rpy: [0.0; 3],
            axis,
            prismatic: false,
        }
    }

    fn two_joint_config() -> ControllerConfig {
        ControllerConfig {
            joints: vec!["shoulder".into(), "elbow".into()],
            command_interfaces: vec![InterfaceKind::Position, InterfaceKind::Velocity],
            state_interfaces: vec![InterfaceKind::Position, InterfaceKind::Velocity],
            control_period: 0.01,
            chain: ChainConfig {
                joints: vec![
                    revolute("shoulder", 0.1, [0.0, 1.0, 0.0]),
                    revolute("elbow", 0.3, [0.0, 1.0, 0.0]),
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

    fn configured_loop() -> ControlLoop<MockHardware> {
        let mut control = ControlLoop::new(two_joint_config(), MockHardware::new(2));
        control.configure().unwrap();
        control
    }

    fn trajectory_to(position: f64, secs: f64) -> JointTrajectory {
        JointTrajectory {
            joint_names: vec!["shoulder".into(), "elbow".into()],
            points: vec![JointState {
                positions: vec![position, position],
                time_from_start: ControlTime::from_secs(secs),
                ..JointState::new()
            }],
        }
    }

    // -- lifecycle --

    #[test]
    fn configure_transitions_to_inactive() {
        let control = configured_loop();
        assert_eq!(control.state(), LifecycleState::Inactive);
    }

    #[test]
    fn configure_rejects_invalid_config() {
        let mut config = two_joint_config();
        config.control_period = 0.0;
        let mut control = ControlLoop::new(config, MockHardware::new(2));
        assert!(control.configure().is_err());
        assert_eq!(control.state(), LifecycleState::Unconfigured);
    }

    #[test]
    fn configure_rejects_hardware_dof_mismatch() {
        let mut control = ControlLoop::new(two_joint_config(), MockHardware::new(3));
        assert!(matches!(
            control.configure(),
            Err(ControlError::Hardware(HardwareError::DimensionMismatch { .. }))
        ));
        assert_eq!(control.state(), LifecycleState::Unconfigured);
    }

    #[test]
    fn activate_requires_configure() {
        let mut control = ControlLoop::new(two_joint_config(), MockHardware::new(2));
        assert!(control.activate(ControlTime::new()).is_err());
    }

    #[test]
    fn full_lifecycle_round() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        assert_eq!(control.state(), LifecycleState::Active);
        control.deactivate().unwrap();
        assert_eq!(control.state(), LifecycleState::Inactive);
        control.cleanup(ControlTime::new()).unwrap();
        assert_eq!(control.state(), LifecycleState::Unconfigured);
        // Reconfigure after cleanup works.
        control.configure().unwrap();
        assert_eq!(control.state(), LifecycleState::Inactive);
    }

    #[test]
    fn error_recovery_unconfigures() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let state = control.handle_error().unwrap();
        assert_eq!(state, LifecycleState::Unconfigured);
    }

    #[test]
    fn error_with_failing_release_finalizes() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        // Make the release fail after activation claimed the interfaces.
        control.hardware.fail_release = true;
        let state = control.handle_error().unwrap();
        assert_eq!(state, LifecycleState::Finalized);
        assert!(control.configure().is_err());
    }

    // -- update gating --

    #[test]
    fn update_in_inactive_is_successful_noop() {
        let mut control = configured_loop();
        let outcome = control.update(ControlTime::new(), PERIOD).unwrap();
        assert!(!outcome.ran);
        assert_eq!(control.hardware().write_count(), 0);
    }

    #[test]
    fn update_in_unconfigured_is_successful_noop() {
        let mut control = ControlLoop::new(two_joint_config(), MockHardware::new(2));
        let outcome = control.update(ControlTime::new(), PERIOD).unwrap();
        assert!(!outcome.ran);
    }

    #[test]
    fn update_when_active_writes_commands() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let outcome = control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        assert!(outcome.ran);
        assert_eq!(control.hardware().write_count(), 1);
    }

    // -- pipeline behavior --

    #[test]
    fn holds_measured_position_without_trajectory() {
        let mut control = ControlLoop::new(two_joint_config(), {
            let mut hw = MockHardware::new(2);
            hw.positions = vec![0.4, -0.2];
            hw
        });
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();

        let command = control.hardware().last_command();
        assert_relative_eq!(command.positions[0], 0.4, epsilon = 1e-9);
        assert_relative_eq!(command.positions[1], -0.2, epsilon = 1e-9);
    }

    #[test]
    fn tracks_submitted_trajectory() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let buffers = control.command_buffers();

        buffers.trajectory.write(trajectory_to(0.5, 0.05));
        // First update installs the trajectory; the next one is past its
        // single waypoint and commands the goal position.
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        control.update(ControlTime::from_secs(0.1), PERIOD).unwrap();
        let command = control.hardware().last_command();
        assert_relative_eq!(command.positions[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn trajectory_replacement_resets_admittance() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let buffers = control.command_buffers();

        // Build up integrator state with a sustained wrench.
        buffers.wrench.write(Wrench::new(
            nalgebra::Vector3::new(10.0, 0.0, 0.0),
            nalgebra::Vector3::zeros(),
            "tool0",
        ));
        let mut now = ControlTime::new();
        for _ in 0..50 {
            now += PERIOD;
            control.update(now, PERIOD).unwrap();
        }
        let displaced = control.pipeline.as_ref().unwrap().admittance.displacement()[0];
        assert!(displaced.abs() > 1e-4);

        // Replacement must zero the integrator.
        buffers.trajectory.write(trajectory_to(0.1, 1.0));
        now += PERIOD;
        control.update(now, PERIOD).unwrap();
        let pipeline = control.pipeline.as_ref().unwrap();
        // One cycle of integration after the reset is far below the
        // accumulated value.
        assert!(pipeline.admittance.displacement()[0].abs() < displaced.abs() / 10.0);
    }

    #[test]
    fn repeated_reads_of_same_trajectory_do_not_reset() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let buffers = control.command_buffers();
        buffers.trajectory.write(trajectory_to(0.2, 0.5));

        let mut now = ControlTime::new();
        now += PERIOD;
        control.update(now, PERIOD).unwrap();
        let start_time_probe = {
            let pipeline = control.pipeline.as_ref().unwrap();
            let mut out = JointState::new();
            pipeline.sampler.sample(ControlTime::from_secs(0.6), &mut out)
        };
        assert!(start_time_probe.is_some());

        // Further cycles with the unchanged buffer keep the same sampler
        // installation (no re-replace, no reset).
        for _ in 0..5 {
            now += PERIOD;
            control.update(now, PERIOD).unwrap();
        }
        let pipeline = control.pipeline.as_ref().unwrap();
        let mut out = JointState::new();
        assert!(pipeline
            .sampler
            .sample(ControlTime::from_secs(0.6), &mut out)
            .is_some());
    }

    #[test]
    fn limiter_clamps_commanded_position() {
        let mut config = two_joint_config();
        config.limits = Some(vec![
            yielders_core::config::JointLimitsConfig {
                position: Some([-1.0, 1.0]),
                ..Default::default()
            },
            yielders_core::config::JointLimitsConfig::default(),
        ]);
        let mut control = ControlLoop::new(config, MockHardware::new(2));
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();

        let buffers = control.command_buffers();
        buffers.trajectory.write(trajectory_to(1.5, 0.05));
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        control.update(ControlTime::from_secs(0.1), PERIOD).unwrap();

        let command = control.hardware().last_command();
        assert_relative_eq!(command.positions[0], 1.0, epsilon = 1e-12);
        // Second joint is unbounded.
        assert_relative_eq!(command.positions[1], 1.5, epsilon = 1e-9);
    }

    #[test]
    fn goal_tolerance_violation_flagged_at_end() {
        let mut config = two_joint_config();
        config.tolerances = Some(ToleranceConfig {
            state: vec![],
            goal: vec![
                yielders_core::config::ToleranceEntry {
                    position: 0.01,
                    ..Default::default()
                };
                2
            ],
            goal_time: 0.0,
        });
        let mut control = ControlLoop::new(config, MockHardware::new(2));
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();

        // Goal far from the measured position; hardware never moves.
        let buffers = control.command_buffers();
        buffers.trajectory.write(trajectory_to(0.8, 0.05));
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        let outcome = control.update(ControlTime::from_secs(0.1), PERIOD).unwrap();
        assert!(!outcome.before_last_point);
        assert!(outcome.goal_tolerance_violated);
        assert!(!outcome.abort);
    }

    #[test]
    fn mid_trajectory_violation_flags_abort() {
        let mut config = two_joint_config();
        config.tolerances = Some(ToleranceConfig {
            state: vec![
                yielders_core::config::ToleranceEntry {
                    position: 0.01,
                    ..Default::default()
                };
                2
            ],
            goal: vec![],
            goal_time: 0.0,
        });
        let mut control = ControlLoop::new(config, MockHardware::new(2));
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();

        let buffers = control.command_buffers();
        buffers.trajectory.write(JointTrajectory {
            joint_names: vec!["shoulder".into(), "elbow".into()],
            points: vec![
                JointState {
                    positions: vec![0.8, 0.8],
                    time_from_start: ControlTime::from_secs(0.05),
                    ..JointState::new()
                },
                JointState {
                    positions: vec![0.9, 0.9],
                    time_from_start: ControlTime::from_secs(10.0),
                    ..JointState::new()
                },
                JointState {
                    positions: vec![1.0, 1.0],
                    time_from_start: ControlTime::from_secs(20.0),
                    ..JointState::new()
                },
            ],
        });
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        let outcome = control.update(ControlTime::from_secs(0.1), PERIOD).unwrap();
        assert!(outcome.before_last_point);
        assert!(outcome.abort);
        assert!(!outcome.goal_tolerance_violated);
    }

    #[test]
    fn snapshot_reflects_cycle() {
        let mut control = ControlLoop::new(two_joint_config(), {
            let mut hw = MockHardware::new(2);
            hw.positions = vec![0.3, 0.1];
            hw
        });
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();

        let snapshot = control.snapshots().latest();
        assert_eq!(snapshot.joint_names, vec!["shoulder", "elbow"]);
        assert_relative_eq!(snapshot.actual_joint_state.positions[0], 0.3, epsilon = 1e-9);
        assert_eq!(
            snapshot.desired_joint_state.positions.len(),
            snapshot.actual_joint_state.positions.len()
        );
    }

    #[test]
    fn nan_commands_reseed_from_measured_state() {
        let mut control = ControlLoop::new(two_joint_config(), {
            let mut hw = MockHardware::new(2);
            hw.positions = vec![0.7, -0.3];
            hw
        });
        control.configure().unwrap();
        // No command was ever written: read_command yields NaN.
        control.activate(ControlTime::new()).unwrap();
        let pipeline = control.pipeline.as_ref().unwrap();
        assert_relative_eq!(pipeline.last_commanded.positions[0], 0.7, epsilon = 1e-12);
        assert_relative_eq!(pipeline.last_commanded.positions[1], -0.3, epsilon = 1e-12);
        assert!(pipeline.last_commanded.positions.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn cleanup_installs_home_trajectory() {
        let mut control = ControlLoop::new(two_joint_config(), {
            let mut hw = MockHardware::new(2);
            hw.positions = vec![0.25, 0.5];
            hw
        });
        control.configure().unwrap();
        control.activate(ControlTime::new()).unwrap();
        control.deactivate().unwrap();
        control.cleanup(ControlTime::from_secs(1.0)).unwrap();

        let pipeline = control.pipeline.as_ref().unwrap();
        let mut out = JointState::new();
        let segment = pipeline
            .sampler
            .sample(ControlTime::from_secs(1.1), &mut out)
            .unwrap();
        assert_eq!(segment.start, segment.end);
        assert_relative_eq!(out.positions[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(out.positions[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn admittance_parameters_replaceable_between_cycles() {
        let mut control = configured_loop();
        let softer = AdmittanceConfig {
            stiffness: [50.0, 50.0, 50.0, 5.0, 5.0, 5.0],
            ..AdmittanceConfig::default()
        };
        control.set_admittance_config(softer.clone()).unwrap();
        let pipeline = control.pipeline.as_ref().unwrap();
        assert_eq!(pipeline.admittance.parameters().stiffness, softer.stiffness);
        assert_eq!(control.config().admittance, softer);
    }

    #[test]
    fn invalid_admittance_update_rejected() {
        let mut control = configured_loop();
        let bad = AdmittanceConfig {
            mass: [-1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            ..AdmittanceConfig::default()
        };
        assert!(control.set_admittance_config(bad).is_err());
    }

    #[test]
    fn pose_commands_are_accepted_but_not_consumed() {
        let mut control = configured_loop();
        control.activate(ControlTime::new()).unwrap();
        let buffers = control.command_buffers();
        buffers.pose.write(PoseCommand::default());
        control.update(ControlTime::from_secs(0.01), PERIOD).unwrap();
        assert!(control.pipeline.as_ref().unwrap().active_pose.is_some());
    }
}

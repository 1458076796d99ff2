//! `MotionController`: the single facade the canonical-machine layer above
//! this crate talks to (§6 upward interface, §10.5).
//!
//! Bundles the block pool (inside `PlannerState`), the runtime executor, and
//! the feedhold controller behind one handle, the way
//! `klipper-host::state::PrinterState` bundles its own subsystems behind one
//! struct rather than making callers wire several independent pieces
//! together themselves.

use crate::block::{AXES, CommandCallback};
use crate::config::PlannerConfig;
use crate::errors::PlannerError;
use crate::feedhold::{FeedholdController, HoldState};
use crate::kinematics::Kinematics;
use crate::plan::PlannerState;
use crate::pulse::StepPulser;
use crate::runtime::{ExecStatus, RuntimeState};

/// Owns a planner, a runtime executor, and a feedhold controller for one
/// toolhead. `N` is the block pool's ring size; `K` and `P` are the
/// machine-specific kinematics transform and step pulser, chosen once at
/// construction and held by value for the controller's lifetime.
pub struct MotionController<const N: usize, K: Kinematics, P: StepPulser> {
    planner: PlannerState<N>,
    runtime: RuntimeState,
    feedhold: FeedholdController,
    kinematics: K,
    pulser: P,
}

impl<const N: usize, K: Kinematics, P: StepPulser> MotionController<N, K, P> {
    pub fn new(config: PlannerConfig, kinematics: K, pulser: P) -> Result<Self, PlannerError> {
        Ok(Self {
            planner: PlannerState::new(config)?,
            runtime: RuntimeState::new(),
            feedhold: FeedholdController::new(),
            kinematics,
            pulser,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        self.planner.config()
    }

    pub fn hold_state(&self) -> HoldState {
        self.feedhold.state()
    }

    // -- Motion queueing -----------------------------------------------

    /// Queues a jerk-limited linear move to `target`, in work-space
    /// coordinates, at up to `feedrate` length-units/minute.
    pub fn aline(&mut self, target: [f64; AXES], feedrate: f64) -> Result<(), PlannerError> {
        self.planner.aline(target, feedrate)
    }

    pub fn dwell(&mut self, seconds: f64) -> Result<(), PlannerError> {
        self.planner.dwell(seconds)
    }

    pub fn queue_command(
        &mut self,
        callback: CommandCallback,
        int_val: i32,
        dbl_val: f64,
    ) -> Result<(), PlannerError> {
        self.planner.queue_command(callback, int_val, dbl_val)
    }

    // -- Coordinate surgery ----------------------------------------------

    /// Resets the planner's notion of where it is without moving anything —
    /// used after a silent jump (e.g. a work-offset change) where the
    /// physical tool hasn't actually moved.
    pub fn set_plan_position(&mut self, position: [f64; AXES]) {
        self.planner.set_position(position);
    }

    /// Resets the planner's position to reflect a change in the machine's
    /// own coordinate system (e.g. `G92`, or post-homing). At this layer
    /// the two calls converge on the same operation: the only position
    /// this crate persists between moves is the planner's, since the
    /// runtime's notion of "current position" only exists while a block is
    /// actively running and is always derived from it.
    pub fn set_axes_position(&mut self, position: [f64; AXES]) {
        self.planner.set_position(position);
    }

    pub fn set_plan_lineindex(&mut self, lineindex: u32) {
        self.planner.set_next_lineindex(lineindex);
    }

    // -- Runtime reads ------------------------------------------------

    /// Work-space position of axis `axis`, read live from the executor
    /// while it's mid-block, or from the planner's queued position while
    /// idle (the two agree at rest — §5).
    pub fn get_runtime_work_position(&self, axis: usize) -> f64 {
        match self.runtime.current_position(self.planner.pool()) {
            Some(pos) => pos[axis],
            None => self.planner.position()[axis],
        }
    }

    /// Stepper-space position of axis `axis`, the work position passed
    /// through this controller's kinematics transform.
    pub fn get_runtime_machine_position(&self, axis: usize) -> f64 {
        let work = match self.runtime.current_position(self.planner.pool()) {
            Some(pos) => pos,
            None => self.planner.position(),
        };
        self.kinematics.to_stepper_positions(&work)[axis]
    }

    /// Instantaneous velocity of the executor, or `0.0` while idle.
    pub fn get_runtime_velocity(&self) -> f64 {
        self.runtime
            .current_velocity(self.planner.pool())
            .unwrap_or(0.0)
    }

    /// Line index of the block currently running, or `0` while idle.
    pub fn get_runtime_linenum(&self) -> u32 {
        match self.runtime.current_block_index() {
            Some(idx) => self.planner.pool().block(idx).linenum,
            None => 0,
        }
    }

    pub fn get_runtime_lineindex(&self) -> u32 {
        match self.runtime.current_block_index() {
            Some(idx) => self.planner.pool().block(idx).lineindex,
            None => 0,
        }
    }

    pub fn get_planner_buffers_available(&self) -> usize {
        self.planner.buffers_available()
    }

    /// Empties the queue (§6).
    pub fn flush_planner(&mut self) {
        self.planner.flush();
    }

    // -- Feedhold -------------------------------------------------------

    pub fn request_hold(&mut self) {
        self.feedhold.request_hold();
    }

    /// Drives the feedhold state machine one step; a no-op unless a hold
    /// is in flight. Call once per main-loop tick alongside `exec_move`.
    pub fn plan_hold_callback(&mut self) {
        self.feedhold.plan_hold_callback(
            self.planner.pool_mut(),
            &self.runtime,
            self.planner.config(),
        );
    }

    pub fn end_hold_callback(&mut self) {
        self.feedhold.end_hold_callback();
    }

    // -- Executor ---------------------------------------------------------

    /// Called from the low-priority interrupt context: advances the
    /// executor by at most one segment, and notifies the feedhold
    /// controller if that segment was the one that brought the decel block
    /// to rest.
    pub fn exec_move(&mut self) -> Result<ExecStatus, PlannerError> {
        let was_busy = self.runtime.is_busy();
        let status = self.runtime.exec_move(
            self.planner.pool_mut(),
            &self.kinematics,
            &mut self.pulser,
            self.planner.config(),
        )?;
        if was_busy && !self.runtime.is_busy() && self.hold_state() == HoldState::Decel {
            self.feedhold.notify_decel_complete();
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::IdentityKinematics;
    use crate::pulse::RecordingPulser;

    fn controller() -> MotionController<8, IdentityKinematics, RecordingPulser> {
        MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default())
            .unwrap()
    }

    #[test]
    fn aline_then_drain_reaches_the_target() {
        let mut mc = controller();
        mc.aline([100.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3000.0).unwrap();

        let mut guard = 0;
        loop {
            guard += 1;
            assert!(guard < 10_000);
            if mc.exec_move().unwrap() == ExecStatus::Noop {
                break;
            }
        }
        assert!((mc.get_runtime_work_position(0) - 100.0).abs() < 1e-6);
        assert_eq!(mc.get_planner_buffers_available(), 8);
    }

    #[test]
    fn flush_planner_drops_queued_work() {
        let mut mc = controller();
        mc.aline([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1000.0).unwrap();
        mc.aline([20.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1000.0).unwrap();
        assert!(mc.get_planner_buffers_available() < 8);
        mc.flush_planner();
        assert_eq!(mc.get_planner_buffers_available(), 8);
    }

    #[test]
    fn hold_requested_mid_move_drives_feedhold_to_hold_and_back_to_off() {
        let mut mc = controller();
        mc.aline([500.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3000.0).unwrap();

        for _ in 0..4 {
            mc.exec_move().unwrap();
        }
        mc.request_hold();
        mc.plan_hold_callback();
        assert_eq!(mc.hold_state(), HoldState::Decel);

        let mut guard = 0;
        while mc.hold_state() == HoldState::Decel {
            guard += 1;
            assert!(guard < 10_000);
            mc.exec_move().unwrap();
        }
        assert_eq!(mc.hold_state(), HoldState::Hold);

        mc.end_hold_callback();
        assert_eq!(mc.hold_state(), HoldState::Off);
    }
}

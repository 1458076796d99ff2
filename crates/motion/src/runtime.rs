//! Runtime executor: walks the head/body/tail of the block at the front
//! of the queue, emitting fixed-duration `prep_line` segments to a
//! `StepPulser` (§4.4).
//!
//! This is the half of the planner that is expected to run from an
//! interrupt context on an MCU target — it never blocks, never
//! allocates, and does at most one segment's worth of work per call. The
//! foreground/planner side (`plan.rs`) and this side touch the same
//! `BlockPool`, but never the same slot at the same time: the planner
//! only mutates `Queued`/`Pending` slots, this module only mutates the
//! slot currently `Running` (§5).

use crate::block::{AXES, MoveState, MoveType};
use crate::config::{IntegrationStrategy, PlannerConfig};
use crate::errors::PlannerError;
use crate::kinematics::Kinematics;
use crate::pool::BlockPool;
use crate::pulse::StepPulser;

/// Which jerk-ramp section of the current block the executor is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Head,
    Body,
    Tail,
}

/// Result of a single `exec_move` call (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// Nothing runnable; the queue is empty.
    Noop,
    /// Progress was made but no segment was emitted this call (a section
    /// boundary was crossed, or a sub-minimum section was skipped) — call
    /// again immediately rather than waiting a full tick.
    Eagain,
    /// One segment was emitted to the pulser.
    Ok,
}

/// Executor-side state for the block currently at the front of the queue.
/// Lives across calls to `exec_move` for as long as that block is running.
struct ActiveMove {
    block_idx: usize,
    section: Section,
    /// Elapsed time (minutes) within the current section.
    section_elapsed: f64,
    /// Work-space position at the start of the block (i.e. the previous
    /// block's end), used to reconstruct absolute position from
    /// distance-along-unit-vector.
    start_position: [f64; AXES],
    /// Stepper-space position last reported to the pulser — the basis for
    /// this segment's step delta.
    last_stepper_position: [f64; AXES],
    /// Carries sub-integer step remainders forward so rounding never
    /// accumulates a drift larger than half a step (§4.4 "segmenting with
    /// rounding correction").
    step_remainder: [f64; AXES],
}

/// Executor singleton: one `RuntimeState` drives one `StepPulser` (§5).
pub struct RuntimeState {
    active: Option<ActiveMove>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeState {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// `true` while a block is loaded and running, independent of whether
    /// the current call emitted a segment.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_block_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.block_idx)
    }

    pub(crate) fn current_section(&self) -> Option<Section> {
        self.active.as_ref().map(|a| a.section)
    }

    /// Instantaneous velocity at the executor's current position within
    /// the active block — used by the feedhold controller to seed a decel
    /// plan from where the tool actually is, not from the block's nominal
    /// entry velocity (§4.5).
    pub fn current_velocity<const N: usize>(&self, pool: &BlockPool<N>) -> Option<f64> {
        let active = self.active.as_ref()?;
        let data = pool.block(active.block_idx).aline().ok()?;
        Some(match active.section {
            Section::Head => {
                let total =
                    crate::trapezoid::ramp_time(data.head_length, data.entry_velocity, data.cruise_velocity);
                crate::trapezoid::ramp_velocity(
                    data.entry_velocity,
                    data.cruise_velocity,
                    total,
                    active.section_elapsed,
                )
            }
            Section::Body => data.cruise_velocity,
            Section::Tail => {
                let total =
                    crate::trapezoid::ramp_time(data.tail_length, data.cruise_velocity, data.exit_velocity);
                crate::trapezoid::ramp_velocity(
                    data.cruise_velocity,
                    data.exit_velocity,
                    total,
                    active.section_elapsed,
                )
            }
        })
    }

    /// Distance already covered within the active block.
    pub fn distance_traveled_in_block<const N: usize>(&self, pool: &BlockPool<N>) -> Option<f64> {
        let active = self.active.as_ref()?;
        let data = pool.block(active.block_idx).aline().ok()?;
        Some(match active.section {
            Section::Head => closed_form_distance(Section::Head, data, active.section_elapsed),
            Section::Body => data.head_length + data.cruise_velocity * active.section_elapsed,
            Section::Tail => {
                data.head_length
                    + data.body_length
                    + closed_form_distance(Section::Tail, data, active.section_elapsed)
            }
        })
    }

    /// Distance left to cover before the active block's end, at its
    /// currently planned length.
    pub fn distance_remaining_in_block<const N: usize>(&self, pool: &BlockPool<N>) -> Option<f64> {
        let active = self.active.as_ref()?;
        let data = pool.block(active.block_idx).aline().ok()?;
        let traveled = self.distance_traveled_in_block(pool)?;
        Some((data.length - traveled).max(0.0))
    }

    /// Absolute work-space position the executor is at right now, or
    /// `None` while idle (the caller falls back to the planner's own
    /// position in that case) — backs `get_runtime_work_position` (§6).
    pub fn current_position<const N: usize>(&self, pool: &BlockPool<N>) -> Option<[f64; AXES]> {
        let active = self.active.as_ref()?;
        let data = pool.block(active.block_idx).aline().ok()?;
        let traveled = self.distance_traveled_in_block(pool)?;
        let mut position = active.start_position;
        for i in 0..AXES {
            position[i] = active.start_position[i] + data.unit[i] * traveled;
        }
        Some(position)
    }

    /// Does at most one unit of executor work: loads the next runnable
    /// block if idle, advances it by one segment, or closes it out.
    pub fn exec_move<const N: usize, K: Kinematics, P: StepPulser>(
        &mut self,
        pool: &mut BlockPool<N>,
        kinematics: &K,
        pulser: &mut P,
        cfg: &PlannerConfig,
    ) -> Result<ExecStatus, PlannerError> {
        if self.active.is_none() {
            let idx = match pool.acquire_run() {
                Some(idx) => idx,
                None => return Ok(ExecStatus::Noop),
            };

            match pool.block(idx).move_type {
                MoveType::Aline => {
                    if pool.block(idx).move_state == MoveState::Skip {
                        // Too short to hold even its own dominant ramp
                        // (§4.2 step 1): the planner already folded its
                        // endpoint into the queued position, so it retires
                        // without ever becoming an `ActiveMove` — position
                        // advances, nothing reaches the step pulser.
                        self.finish_block(pool, idx);
                        return Ok(ExecStatus::Eagain);
                    }
                    let data = pool.block(idx).aline()?;
                    let mut start_position = [0.0; AXES];
                    for i in 0..AXES {
                        start_position[i] = data.target[i] - data.unit[i] * data.length;
                    }
                    let last_stepper_position = kinematics.to_stepper_positions(&start_position);
                    self.active = Some(ActiveMove {
                        block_idx: idx,
                        section: Section::Head,
                        section_elapsed: 0.0,
                        start_position,
                        last_stepper_position,
                        step_remainder: [0.0; AXES],
                    });
                }
                MoveType::Dwell => {
                    pool.block_mut(idx).move_state = MoveState::Run;
                    self.finish_block(pool, idx);
                    return Ok(ExecStatus::Eagain);
                }
                MoveType::Command => {
                    let block = pool.block(idx);
                    if let crate::block::Payload::Command {
                        callback,
                        int_val,
                        dbl_val,
                    } = block.payload
                    {
                        callback(int_val, dbl_val);
                    }
                    self.finish_block(pool, idx);
                    return Ok(ExecStatus::Eagain);
                }
                MoveType::None => {
                    return Err(PlannerError::InternalError);
                }
            }
        }

        self.step(pool, kinematics, pulser, cfg)
    }

    fn finish_block<const N: usize>(&mut self, pool: &mut BlockPool<N>, idx: usize) {
        pool.block_mut(idx).move_state = MoveState::Run;
        pool.free_run();
    }

    fn step<const N: usize, K: Kinematics, P: StepPulser>(
        &mut self,
        pool: &mut BlockPool<N>,
        kinematics: &K,
        pulser: &mut P,
        cfg: &PlannerConfig,
    ) -> Result<ExecStatus, PlannerError> {
        let (block_idx, section, section_elapsed, start_position, last_stepper_position, step_remainder) = {
            let active = self.active.as_ref().expect("checked by caller");
            (
                active.block_idx,
                active.section,
                active.section_elapsed,
                active.start_position,
                active.last_stepper_position,
                active.step_remainder,
            )
        };

        let data = *pool.block(block_idx).aline()?;

        let (section_length, section_start_distance) = match section {
            Section::Head => (data.head_length, 0.0),
            Section::Body => (data.body_length, data.head_length),
            Section::Tail => (data.tail_length, data.head_length + data.body_length),
        };

        let section_time = section_time_for(section, &data, section_length);
        let remaining = (section_time - section_elapsed).max(0.0);

        if remaining <= 0.0 {
            self.advance_section(pool);
            return Ok(ExecStatus::Eagain);
        }

        let min_time_minutes = cfg.min_segment_time_minutes();
        let target_time = cfg.estimated_segment_time_minutes().min(remaining);

        if target_time < min_time_minutes && target_time < remaining {
            // Too small a slice to emit on its own, but more of this
            // section remains: fold it into the next call rather than
            // stalling on a sub-minimum segment.
            if let Some(active) = self.active.as_mut() {
                active.section_elapsed += target_time;
            }
            return Ok(ExecStatus::Eagain);
        }

        let new_elapsed = section_elapsed + target_time;
        let distance_at = section_distance(
            section,
            &data,
            new_elapsed.min(section_time),
            cfg.integration_strategy,
        );
        let total_distance = section_start_distance + distance_at;

        let mut position = start_position;
        for i in 0..AXES {
            position[i] = start_position[i] + data.unit[i] * total_distance;
        }
        let stepper_position = kinematics.to_stepper_positions(&position);

        let mut steps = [0i32; AXES];
        let mut new_remainder = step_remainder;
        for i in 0..AXES {
            let exact = stepper_position[i] - last_stepper_position[i] + step_remainder[i];
            let whole = exact.trunc();
            new_remainder[i] = exact - whole;
            steps[i] = whole as i32;
        }

        let microseconds = target_time * 60.0 * 1_000_000.0;
        if microseconds >= cfg.minimum_segment_microseconds {
            pulser.prep_line(steps, microseconds);
        } else {
            crate::log::debug!("skipping sub-minimum segment ({} us)", microseconds);
        }

        if let Some(active) = self.active.as_mut() {
            active.last_stepper_position = stepper_position;
            active.step_remainder = new_remainder;
            active.section_elapsed = new_elapsed;
        }

        if new_elapsed + 1e-12 >= section_time {
            self.advance_section(pool);
            return Ok(ExecStatus::Eagain);
        }

        Ok(ExecStatus::Ok)
    }

    /// Moves to the next section of the current block, or retires the
    /// block entirely once `Tail` completes.
    fn advance_section<const N: usize>(&mut self, pool: &mut BlockPool<N>) {
        let active = self.active.as_mut().expect("checked by caller");
        match active.section {
            Section::Head => {
                active.section = Section::Body;
                active.section_elapsed = 0.0;
            }
            Section::Body => {
                active.section = Section::Tail;
                active.section_elapsed = 0.0;
            }
            Section::Tail => {
                let idx = active.block_idx;
                self.finish_block(pool, idx);
                self.active = None;
            }
        }
    }
}

/// Total time (minutes) a section lasts, given its length and the jerk
/// ramp it's driven by.
fn section_time_for(section: Section, data: &crate::block::AlineData, section_length: f64) -> f64 {
    match section {
        Section::Head => {
            crate::trapezoid::ramp_time(data.head_length, data.entry_velocity, data.cruise_velocity)
        }
        Section::Tail => {
            crate::trapezoid::ramp_time(data.tail_length, data.cruise_velocity, data.exit_velocity)
        }
        Section::Body => {
            if data.cruise_velocity > 0.0 {
                section_length / data.cruise_velocity
            } else {
                0.0
            }
        }
    }
}

/// Distance traveled within the current section after `t` minutes have
/// elapsed since the section began.
///
/// Closed-form: integrates the two-sub-phase jerk-limited velocity profile
/// (`ramp_distance`) directly, with no per-step error. Forward-difference:
/// the same velocity law (`ramp_velocity`) evaluated at discrete ticks and
/// summed — a fixed-point-friendly alternative whose error shrinks with
/// smaller ticks but never reaches zero (§10.4 decision).
fn section_distance(
    section: Section,
    data: &crate::block::AlineData,
    t: f64,
    strategy: IntegrationStrategy,
) -> f64 {
    match strategy {
        IntegrationStrategy::ClosedForm => closed_form_distance(section, data, t),
        IntegrationStrategy::ForwardDifference => forward_difference_distance(section, data, t),
    }
}

fn closed_form_distance(section: Section, data: &crate::block::AlineData, t: f64) -> f64 {
    match section {
        Section::Head => {
            let total =
                crate::trapezoid::ramp_time(data.head_length, data.entry_velocity, data.cruise_velocity);
            crate::trapezoid::ramp_distance(data.entry_velocity, data.cruise_velocity, total, t)
        }
        Section::Tail => {
            let total =
                crate::trapezoid::ramp_time(data.tail_length, data.cruise_velocity, data.exit_velocity);
            crate::trapezoid::ramp_distance(data.cruise_velocity, data.exit_velocity, total, t)
        }
        Section::Body => data.cruise_velocity * t,
    }
}

/// Forward-difference alternate: subdivides `t` into small fixed ticks and
/// accumulates `v * dt` directly instead of evaluating the closed-form
/// integral. Tick count is fixed rather than adaptive so this stays
/// bounded-cost per call — appropriate for a budget-constrained MCU loop
/// that prefers predictable cost over closed-form precision.
fn forward_difference_distance(section: Section, data: &crate::block::AlineData, t: f64) -> f64 {
    const TICKS: u32 = 8;
    if t <= 0.0 {
        return 0.0;
    }
    let dt = t / TICKS as f64;
    let mut distance = 0.0;
    let mut elapsed = 0.0;
    for _ in 0..TICKS {
        let v = match section {
            Section::Head => {
                let total =
                    crate::trapezoid::ramp_time(data.head_length, data.entry_velocity, data.cruise_velocity);
                crate::trapezoid::ramp_velocity(data.entry_velocity, data.cruise_velocity, total, elapsed)
            }
            Section::Tail => {
                let total =
                    crate::trapezoid::ramp_time(data.tail_length, data.cruise_velocity, data.exit_velocity);
                crate::trapezoid::ramp_velocity(data.cruise_velocity, data.exit_velocity, total, elapsed)
            }
            Section::Body => data.cruise_velocity,
        };
        distance += v * dt;
        elapsed += dt;
    }
    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::kinematics::IdentityKinematics;
    use crate::plan::PlannerState;
    use crate::pulse::RecordingPulser;

    #[test]
    fn runtime_is_noop_on_an_empty_queue() {
        let mut pool: BlockPool<8> = BlockPool::new();
        let mut runtime = RuntimeState::new();
        let kin = IdentityKinematics;
        let mut pulser = RecordingPulser::default();
        let cfg = PlannerConfig::default();
        let status = runtime.exec_move(&mut pool, &kin, &mut pulser, &cfg).unwrap();
        assert_eq!(status, ExecStatus::Noop);
    }

    #[test]
    fn runtime_drains_a_planned_move_into_segments() {
        let cfg = PlannerConfig::default();
        let mut planner: PlannerState<8> = PlannerState::new(cfg).unwrap();
        planner
            .aline([10.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3000.0)
            .unwrap();

        let mut runtime = RuntimeState::new();
        let kin = IdentityKinematics;
        let mut pulser = RecordingPulser::default();

        let mut guard = 0;
        loop {
            guard += 1;
            assert!(guard < 10_000, "runtime never drained the queue");
            let status = runtime
                .exec_move(planner.pool_mut(), &kin, &mut pulser, planner.config())
                .unwrap();
            if status == ExecStatus::Noop {
                break;
            }
        }

        assert!(!pulser.segments.is_empty());
        let total_x: i32 = pulser.segments.iter().map(|(steps, _)| steps[0]).sum();
        assert!(total_x > 0, "expected net positive travel on X");
    }

    #[test]
    fn dwell_blocks_drain_without_emitting_segments() {
        let cfg = PlannerConfig::default();
        let mut planner: PlannerState<8> = PlannerState::new(cfg).unwrap();
        planner.dwell(0.1).unwrap();

        let mut runtime = RuntimeState::new();
        let kin = IdentityKinematics;
        let mut pulser = RecordingPulser::default();

        let mut guard = 0;
        loop {
            guard += 1;
            assert!(guard < 100);
            let status = runtime
                .exec_move(planner.pool_mut(), &kin, &mut pulser, planner.config())
                .unwrap();
            if status == ExecStatus::Noop {
                break;
            }
        }
        assert!(pulser.segments.is_empty());
    }
}

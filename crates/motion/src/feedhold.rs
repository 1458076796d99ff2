//! Feedhold controller: decelerates the tool to a controlled stop on
//! request, and lets it resume from rest afterward (§4.5).
//!
//! `SYNC` waits for the executor to actually be mid-block (a hold
//! requested between blocks has nothing to decelerate out of); `PLAN`
//! computes the decel profile once, from the executor's real
//! instantaneous position and velocity; `DECEL` is a pass-through state
//! while the rewritten profile plays out; `HOLD` is the stopped state.
//! Two distinct decel shapes are possible once planning commits (§4.5):
//!
//! - Case 1: the active block has enough distance left to absorb the
//!   full stop on its own — its remaining portion is re-fit in place.
//! - Case 2: it doesn't, so the active block's remaining portion only
//!   bleeds off part of the speed, every other queued block is dropped,
//!   and a synthetic block carries the rest of the deceleration.

use crate::block::{AXES, AlineData, MoveType, Payload};
use crate::config::PlannerConfig;
use crate::pool::BlockPool;
use crate::runtime::{RuntimeState, Section};
use crate::trapezoid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HoldState {
    #[default]
    Off,
    /// Hold requested; waiting for the executor to be inside a block.
    Sync,
    /// Executor is mid-block; about to compute the decel plan.
    Plan,
    /// Decel plan committed; the rewritten profile is playing out.
    Decel,
    /// Fully stopped.
    Hold,
}

#[derive(Debug, Default)]
pub struct FeedholdController {
    state: HoldState,
}

impl FeedholdController {
    pub fn new() -> Self {
        Self { state: HoldState::Off }
    }

    pub fn state(&self) -> HoldState {
        self.state
    }

    pub fn is_holding(&self) -> bool {
        self.state != HoldState::Off
    }

    /// Operator-facing request to begin a feedhold.
    pub fn request_hold(&mut self) {
        if self.state == HoldState::Off {
            self.state = HoldState::Sync;
        }
    }

    /// Drives `SYNC -> PLAN -> DECEL`. Call once per executor tick while
    /// `is_holding()` — a no-op once `DECEL` or `HOLD` is reached.
    pub fn plan_hold_callback<const N: usize>(
        &mut self,
        pool: &mut BlockPool<N>,
        runtime: &RuntimeState,
        cfg: &PlannerConfig,
    ) {
        match self.state {
            HoldState::Off | HoldState::Decel | HoldState::Hold => {}
            HoldState::Sync => {
                if runtime.is_busy() {
                    self.state = HoldState::Plan;
                }
            }
            HoldState::Plan => {
                if let Some(idx) = runtime.current_block_index() {
                    self.replan_decel(pool, runtime, idx, cfg);
                }
                self.state = HoldState::Decel;
            }
        }
    }

    /// Called once the executor reports the decel block has retired —
    /// moves `DECEL -> HOLD`.
    pub fn notify_decel_complete(&mut self) {
        if self.state == HoldState::Decel {
            self.state = HoldState::Hold;
        }
    }

    /// Resumes motion from a full stop: `HOLD -> OFF`. The planner's
    /// ordinary `replan()` handles whatever comes next starting from zero
    /// velocity, since every block this controller touched already has
    /// `exit_velocity == 0.0` at the point it left `HOLD`.
    pub fn end_hold_callback(&mut self) {
        if self.state == HoldState::Hold {
            self.state = HoldState::Off;
        }
    }

    fn replan_decel<const N: usize>(
        &mut self,
        pool: &mut BlockPool<N>,
        runtime: &RuntimeState,
        idx: usize,
        cfg: &PlannerConfig,
    ) {
        let v0 = match runtime.current_velocity(pool) {
            Some(v) if v > 0.0 => v,
            _ => {
                self.discard_remaining_queue(pool, idx);
                return;
            }
        };
        let remaining = runtime.distance_remaining_in_block(pool).unwrap_or(0.0);
        let section = runtime.current_section();

        let data = match pool.block(idx).aline() {
            Ok(d) => *d,
            Err(_) => return,
        };

        let full_stop_distance = trapezoid::target_length(v0, 0.0, data.cbrt_jerk);

        if full_stop_distance <= remaining {
            self.fit_case_one(pool, idx, &data, section, v0, remaining, 0.0, cfg);
            self.discard_remaining_queue(pool, idx);
        } else {
            let exit_here = braking_exit_velocity(remaining, v0, data.cbrt_jerk, cfg);
            self.fit_case_one(pool, idx, &data, section, v0, remaining, exit_here, cfg);
            // Discard whatever was queued behind the active block *before*
            // appending the synthetic continuation, or the continuation
            // itself — now the newest block in the ring — would be
            // discarded right along with them.
            self.discard_remaining_queue(pool, idx);
            self.append_decel_continuation(pool, &data, exit_here, full_stop_distance - remaining);
        }
    }

    /// Rewrites the portion of the block at `idx` from the executor's
    /// current position to the block's end so it decelerates from `v0` to
    /// `target_exit` over `remaining` length, leaving the already-executed
    /// prefix of the block untouched (§4.5 Case 1, and the first leg of
    /// Case 2).
    fn fit_case_one<const N: usize>(
        &self,
        pool: &mut BlockPool<N>,
        idx: usize,
        data: &AlineData,
        section: Option<Section>,
        v0: f64,
        remaining: f64,
        target_exit: f64,
        cfg: &PlannerConfig,
    ) {
        let traveled = data.length - remaining;

        let (new_head_length, consumed_before_tail) = match section {
            Some(Section::Head) => (traveled, 0.0),
            Some(Section::Body) => (data.head_length, traveled - data.head_length),
            Some(Section::Tail) | None => (data.head_length, data.body_length),
        };

        let fit = match section {
            Some(Section::Tail) => None,
            _ => trapezoid::fit_trapezoid(remaining, v0, v0, target_exit, data.cbrt_jerk, cfg).ok(),
        };

        let block = pool.block_mut(idx);
        block.replannable = false;
        if let Ok(d) = block.aline_mut() {
            d.cruise_velocity = v0;
            d.exit_velocity = target_exit;
            d.exit_vmax = target_exit;
            d.head_length = new_head_length;
            match fit {
                Some(f) => {
                    d.body_length = consumed_before_tail + f.body_length;
                    d.tail_length = f.tail_length;
                }
                None => {
                    // Already inside the tail: the remaining distance
                    // itself is the new tail, sized to land on
                    // `target_exit` by construction of `braking_exit_velocity`.
                    d.body_length = consumed_before_tail;
                    d.tail_length = remaining;
                }
            }
        }
    }

    /// Appends a synthetic tail-only block continuing the deceleration
    /// that the current block's remaining length couldn't finish, along
    /// the same unit vector (§4.5 Case 2).
    fn append_decel_continuation<const N: usize>(
        &self,
        pool: &mut BlockPool<N>,
        data: &AlineData,
        entry_velocity: f64,
        distance: f64,
    ) {
        if distance <= 0.0 {
            return;
        }
        let mut target = [0.0; AXES];
        for i in 0..AXES {
            target[i] = data.target[i] + data.unit[i] * distance;
        }

        let idx = match pool.acquire_write(0) {
            Some(idx) => idx,
            None => {
                crate::log::warn!("feedhold decel continuation dropped: no free block");
                return;
            }
        };

        let mut continuation = AlineData::default();
        continuation.target = target;
        continuation.unit = data.unit;
        continuation.length = distance;
        continuation.set_jerk(data.jerk);
        continuation.entry_vmax = entry_velocity;
        continuation.cruise_vmax = entry_velocity;
        continuation.exit_vmax = 0.0;
        continuation.entry_velocity = entry_velocity;
        continuation.cruise_velocity = entry_velocity;
        continuation.exit_velocity = 0.0;
        continuation.head_length = 0.0;
        continuation.body_length = 0.0;
        continuation.tail_length = distance;

        let block = pool.block_mut(idx);
        block.payload = Payload::Aline(continuation);
        block.replannable = false;
        pool.commit_write(MoveType::Aline);
    }

    /// Drops every queued block after `idx` — a hold pre-empts whatever
    /// was coming next in the program (§4.5).
    fn discard_remaining_queue<const N: usize>(&self, pool: &mut BlockPool<N>, idx: usize) {
        let mut trailing: heapless::Vec<usize, N> = heapless::Vec::new();
        let mut past_idx = false;
        for queued in pool.iter_queue() {
            if past_idx {
                let _ = trailing.push(queued);
            }
            if queued == idx {
                past_idx = true;
            }
        }
        for queued in trailing {
            pool.discard(queued);
        }
    }
}

/// Largest velocity reachable after braking from `v0` over exactly
/// `distance`, found by bisection rather than a closed form (§9, feedhold
/// open question — kept deliberately simple since this is an emergency
/// path, not the steady-state planner).
fn braking_exit_velocity(distance: f64, v0: f64, cbrt_jerk: f64, cfg: &PlannerConfig) -> f64 {
    if distance <= 0.0 {
        return v0;
    }
    let mut lo = 0.0;
    let mut hi = v0;
    for _ in 0..cfg.trapezoid_iteration_max.max(20) {
        let mid = (lo + hi) / 2.0;
        let dist = trapezoid::target_length(mid, v0, cbrt_jerk);
        if dist > distance {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::IdentityKinematics;
    use crate::plan::PlannerState;
    use crate::pulse::RecordingPulser;
    use crate::runtime::ExecStatus;

    #[test]
    fn hold_requested_between_blocks_waits_in_sync_until_executor_is_busy() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline([50.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3000.0).unwrap();
        let mut runtime = RuntimeState::new();
        let mut hold = FeedholdController::new();

        hold.request_hold();
        assert_eq!(hold.state(), HoldState::Sync);
        hold.plan_hold_callback(planner.pool_mut(), &runtime, planner.config());
        // Runtime hasn't loaded a block yet, so SYNC should not advance.
        assert_eq!(hold.state(), HoldState::Sync);

        let kin = IdentityKinematics;
        let mut pulser = RecordingPulser::default();
        runtime
            .exec_move(planner.pool_mut(), &kin, &mut pulser, planner.config())
            .unwrap();
        hold.plan_hold_callback(planner.pool_mut(), &runtime, planner.config());
        assert_eq!(hold.state(), HoldState::Decel);
    }

    #[test]
    fn case_one_decel_leaves_block_ending_at_zero_exit_velocity() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline([500.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3000.0).unwrap();

        let mut runtime = RuntimeState::new();
        let kin = IdentityKinematics;
        let mut pulser = RecordingPulser::default();
        let mut hold = FeedholdController::new();

        // Drive the executor partway into the block before requesting a hold.
        for _ in 0..4 {
            let status = runtime
                .exec_move(planner.pool_mut(), &kin, &mut pulser, planner.config())
                .unwrap();
            if status == ExecStatus::Noop {
                break;
            }
        }

        hold.request_hold();
        hold.plan_hold_callback(planner.pool_mut(), &runtime, planner.config());
        assert_eq!(hold.state(), HoldState::Decel);

        let idx = runtime.current_block_index().unwrap();
        let data = planner.pool().block(idx).aline().unwrap();
        assert_eq!(data.exit_velocity, 0.0);
    }
}

//! Block-list planner: turns a stream of `aline` requests into a queue of
//! ring blocks whose entry/cruise/exit velocities and trapezoid fits are
//! mutually consistent (§4.3).
//!
//! The reconciliation is the same two-pass shape as `klipper_estimator`'s
//! `OperationSequence`/`MoveSequence` (backward pass limits exit
//! velocities by what's downstream and by each block's own braking
//! distance; forward pass limits entry velocities by what's actually
//! reachable from upstream), adapted to walk index-linked ring slots
//! instead of a `VecDeque`, and to the jerk-limited `delta_vmax` additive
//! recurrence (§4.3) instead of that planner's constant-acceleration one.

use heapless::Vec as HVec;

use crate::block::{AlineData, MoveState, MoveType, Payload, AXES};
use crate::config::PlannerConfig;
use crate::errors::PlannerError;
use crate::junction;
use crate::pool::BlockPool;
use crate::trapezoid;

#[cfg(feature = "std")]
fn sqrt(x: f64) -> f64 {
    x.sqrt()
}
#[cfg(not(feature = "std"))]
fn sqrt(x: f64) -> f64 {
    libm::sqrt(x)
}

/// Owns the block pool and the planner's running position. One instance
/// per axis group / toolhead (§5 "Concurrency Model": a single-owner
/// planning context, with the runtime executor reading out the blocks it
/// produces).
pub struct PlannerState<const N: usize> {
    pool: BlockPool<N>,
    config: PlannerConfig,
    /// Position at the end of the last queued block — the planner's
    /// notion of "current position", distinct from the executor's actual
    /// in-flight position (§5).
    position: [f64; AXES],
    previous_unit: Option<[f64; AXES]>,
    previous_cruise_vmax: f64,
    next_lineindex: u32,
}

impl<const N: usize> PlannerState<N> {
    pub fn new(config: PlannerConfig) -> Result<Self, PlannerError> {
        config.validate()?;
        if config.planner_pool_size != N {
            crate::log::warn!(
                "planner_pool_size ({}) does not match the block pool's compile-time size ({}) \
                 — the configured value is cosmetic and N is what actually governs ring capacity",
                config.planner_pool_size,
                N
            );
        }
        Ok(Self {
            pool: BlockPool::new(),
            config,
            position: [0.0; AXES],
            previous_unit: None,
            previous_cruise_vmax: 0.0,
            next_lineindex: 1,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn pool(&self) -> &BlockPool<N> {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BlockPool<N> {
        &mut self.pool
    }

    pub fn position(&self) -> [f64; AXES] {
        self.position
    }

    /// Resets the planner's notion of current position without queuing a
    /// move — used after a rehome or a jog, and by `set_axes_position`
    /// (§6 upward interface). Clears the cached junction state since the
    /// next queued move can no longer assume continuity with whatever
    /// direction the planner was previously heading.
    pub fn set_position(&mut self, position: [f64; AXES]) {
        self.position = position;
        self.previous_unit = None;
        self.previous_cruise_vmax = 0.0;
    }

    pub fn buffers_available(&self) -> usize {
        self.pool.available()
    }

    /// Overrides the line index the next queued block will carry, without
    /// touching position or queue contents — `set_plan_lineindex` (§6).
    pub fn set_next_lineindex(&mut self, lineindex: u32) {
        self.next_lineindex = lineindex;
    }

    /// Empties the queue (`flush_planner`, §6). Position is left untouched,
    /// but the cached junction state is cleared along with it, since there
    /// is nothing left queued for a subsequent move to corner against.
    pub fn flush(&mut self) {
        self.pool = BlockPool::new();
        self.previous_unit = None;
        self.previous_cruise_vmax = 0.0;
    }

    /// Queues a straight-line move to `target` at up to `feedrate`
    /// (length-units/minute), then replans the whole queued tail.
    ///
    /// Returns `Err(BufferFull)` if the ring has no free slot; the caller
    /// is expected to retry the identical request once a block frees
    /// (§5 "Backpressure" — this crate performs no blocking of its own).
    pub fn aline(&mut self, target: [f64; AXES], feedrate: f64) -> Result<(), PlannerError> {
        let mut delta = [0.0; AXES];
        let mut length_sq = 0.0;
        for i in 0..AXES {
            delta[i] = target[i] - self.position[i];
            length_sq += delta[i] * delta[i];
        }
        let length = sqrt(length_sq);
        if length <= 0.0 {
            return Err(PlannerError::ZeroLengthMove);
        }

        let mut unit = [0.0; AXES];
        for i in 0..AXES {
            unit[i] = delta[i] / length;
        }

        let idx = self
            .pool
            .acquire_write(self.next_lineindex)
            .ok_or(PlannerError::BufferFull)?;

        let jerk = self.block_jerk(&unit);
        let cruise_vmax = self.block_cruise_vmax(&unit, feedrate);
        let entry_vmax = match &self.previous_unit {
            Some(prev_unit) => {
                let jv = junction::junction_velocity(prev_unit, &unit, &self.config);
                jv.min(cruise_vmax).min(self.previous_cruise_vmax)
            }
            None => 0.0,
        };

        let mut data = AlineData::default();
        data.target = target;
        data.unit = unit;
        data.length = length;
        data.set_jerk(jerk);
        data.entry_vmax = entry_vmax;
        data.cruise_vmax = cruise_vmax;
        data.exit_vmax = cruise_vmax;
        data.entry_velocity = entry_vmax;
        data.cruise_velocity = cruise_vmax;
        data.exit_velocity = cruise_vmax;
        data.braking_velocity = entry_vmax;

        let block = self.pool.block_mut(idx);
        block.payload = Payload::Aline(data);
        block.replannable = true;
        self.pool.commit_write(MoveType::Aline);

        self.position = target;
        self.previous_unit = Some(unit);
        self.previous_cruise_vmax = cruise_vmax;
        self.next_lineindex = self.next_lineindex.wrapping_add(1);

        self.replan();
        Ok(())
    }

    /// Queues a dwell block (no motion, just a timed pause) — §3.
    pub fn dwell(&mut self, seconds: f64) -> Result<(), PlannerError> {
        if seconds <= 0.0 {
            return Err(PlannerError::ZeroLengthMove);
        }
        let idx = self
            .pool
            .acquire_write(self.next_lineindex)
            .ok_or(PlannerError::BufferFull)?;
        let block = self.pool.block_mut(idx);
        block.payload = Payload::Dwell { seconds };
        block.replannable = false;
        self.pool.commit_write(MoveType::Dwell);
        self.next_lineindex = self.next_lineindex.wrapping_add(1);
        // Dwells are velocity-zero boundaries; motion either side of one
        // cannot carry cornering speed across it.
        self.previous_unit = None;
        self.previous_cruise_vmax = 0.0;
        Ok(())
    }

    /// Queues a synchronous command callback, run in queue order once the
    /// executor reaches it (§6 upward interface, `queue_command`).
    pub fn queue_command(
        &mut self,
        callback: crate::block::CommandCallback,
        int_val: i32,
        dbl_val: f64,
    ) -> Result<(), PlannerError> {
        let idx = self
            .pool
            .acquire_write(self.next_lineindex)
            .ok_or(PlannerError::BufferFull)?;
        let block = self.pool.block_mut(idx);
        block.payload = Payload::Command {
            callback,
            int_val,
            dbl_val,
        };
        block.replannable = false;
        self.pool.commit_write(MoveType::Command);
        self.next_lineindex = self.next_lineindex.wrapping_add(1);
        self.previous_unit = None;
        self.previous_cruise_vmax = 0.0;
        Ok(())
    }

    fn block_jerk(&self, unit: &[f64; AXES]) -> f64 {
        let mut jerk = f64::INFINITY;
        for i in 0..AXES {
            if unit[i] != 0.0 {
                jerk = jerk.min(self.config.axes[i].jerk_max / unit[i].abs());
            }
        }
        if jerk.is_finite() {
            jerk
        } else {
            self.config.axes[0].jerk_max
        }
    }

    fn block_cruise_vmax(&self, unit: &[f64; AXES], feedrate: f64) -> f64 {
        let mut vmax = feedrate.max(0.0);
        for i in 0..AXES {
            if unit[i] != 0.0 {
                vmax = vmax.min(self.config.axes[i].velocity_max / unit[i].abs());
                vmax = vmax.min(self.config.axes[i].feedrate_max / unit[i].abs());
            }
        }
        vmax
    }

    /// Backward pass then forward pass then trapezoid fit, over every
    /// block currently in the queue (§4.3). Re-run in full on every
    /// `aline` call — the ring holds at most `planner_pool_size` blocks,
    /// so this stays cheap, and re-deriving from scratch avoids the
    /// incremental-update bugs a partial replan invites.
    pub fn replan(&mut self) {
        let indices: HVec<usize, N> = self.pool.iter_queue().collect();
        if indices.is_empty() {
            return;
        }

        // Backward pass: walk tail to head. Each block's braking_velocity is
        // the fastest this block could be entered at and still hand off no
        // more than the next block's own entry_vmax/braking_velocity,
        // bounded by how much speed this block's own length/jerk can add
        // from a standing start (`delta_vmax`, §4.3). Stops dead at the
        // first non-replannable block — everything behind an in-flight or
        // already-committed block is outside this pass's authority.
        let mut next_entry_vmax = 0.0;
        let mut next_braking_velocity = 0.0;
        for &idx in indices.iter().rev() {
            if self.pool.block(idx).move_type != MoveType::Aline {
                next_entry_vmax = 0.0;
                next_braking_velocity = 0.0;
                continue;
            }
            if !self.pool.block(idx).replannable {
                break;
            }

            let (length, cbrt_jerk, entry_vmax) = {
                let d = self.pool.block(idx).aline().expect("checked Aline above");
                (d.length, d.cbrt_jerk, d.entry_vmax)
            };
            let delta = trapezoid::delta_vmax(length, cbrt_jerk);
            let braking_velocity = next_entry_vmax.min(next_braking_velocity) + delta;

            let d = self
                .pool
                .block_mut(idx)
                .aline_mut()
                .expect("checked Aline above");
            d.delta_vmax = delta;
            d.braking_velocity = braking_velocity;

            next_entry_vmax = entry_vmax;
            next_braking_velocity = braking_velocity;
        }

        // Forward pass: walk head to tail, capping each block's entry
        // velocity by what the previous block can actually hand off, then
        // fit a trapezoid for every still-replannable block. A block that
        // the executor has already started running is never replannable
        // (§4.1 "Interaction with replanning") — its committed profile is
        // left untouched and its actual exit velocity is read back as the
        // next block's available entry.
        let mut prev_exit = 0.0;
        for (i, &idx) in indices.iter().enumerate() {
            if self.pool.block(idx).move_type != MoveType::Aline {
                prev_exit = 0.0;
                continue;
            }

            if !self.pool.block(idx).replannable {
                prev_exit = self
                    .pool
                    .block(idx)
                    .aline()
                    .map(|d| d.exit_velocity)
                    .unwrap_or(0.0);
                continue;
            }

            let (length, cbrt_jerk, cruise_vmax, exit_vmax, entry_vmax, delta) = {
                let d = self.pool.block(idx).aline().expect("checked Aline above");
                (d.length, d.cbrt_jerk, d.cruise_vmax, d.exit_vmax, d.entry_vmax, d.delta_vmax)
            };

            let entry_velocity = if i == 0 { entry_vmax } else { prev_exit };

            // Only the immediate next queue slot matters: a dwell or
            // command between two Aline blocks is a velocity-zero
            // boundary, not a block to look past (mirrors the backward
            // pass's reset-on-non-Aline behavior).
            let (next_entry_vmax, next_braking_velocity) = match indices.get(i + 1) {
                Some(&next_idx) if self.pool.block(next_idx).move_type == MoveType::Aline => {
                    let nd = self.pool.block(next_idx).aline().expect("checked Aline above");
                    (nd.entry_vmax, nd.braking_velocity)
                }
                _ => (0.0, 0.0),
            };

            let exit_velocity = exit_vmax
                .min(next_braking_velocity)
                .min(next_entry_vmax)
                .min(entry_velocity + delta);

            // A block is only safe to touch on a later replan if its exit
            // velocity wasn't pinned by one of the hard ceilings above: its
            // own vmax, the next block's entry, or (once its predecessor
            // has already committed) its own delta_vmax reach (§4.3).
            let frozen_predecessor = i > 0
                && self.pool.block(indices[i - 1]).move_type == MoveType::Aline
                && !self.pool.block(indices[i - 1]).replannable;
            let tol = self.config.trapezoid_velocity_tolerance;
            let replannable_after = !((exit_velocity - exit_vmax).abs() <= tol
                || (exit_velocity - next_entry_vmax).abs() <= tol
                || (frozen_predecessor && (exit_velocity - (entry_velocity + delta)).abs() <= tol));

            let fit = trapezoid::fit_trapezoid(
                length,
                entry_velocity,
                cruise_vmax,
                exit_velocity,
                cbrt_jerk,
                &self.config,
            );

            match fit {
                Ok(f) => {
                    let head_time = trapezoid::ramp_time(f.head_length, entry_velocity, f.cruise_velocity);
                    let tail_time = trapezoid::ramp_time(f.tail_length, f.cruise_velocity, exit_velocity);
                    let body_time = if f.cruise_velocity > 0.0 {
                        f.body_length / f.cruise_velocity
                    } else {
                        0.0
                    };

                    let d = self
                        .pool
                        .block_mut(idx)
                        .aline_mut()
                        .expect("checked Aline above");
                    d.entry_velocity = entry_velocity;
                    d.exit_velocity = exit_velocity;
                    d.cruise_velocity = f.cruise_velocity;
                    d.head_length = f.head_length;
                    d.body_length = f.body_length;
                    d.tail_length = f.tail_length;
                    d.time = head_time + body_time + tail_time;
                    d.min_time = d.length / cruise_vmax.max(f64::EPSILON);

                    let block = self.pool.block_mut(idx);
                    block.replannable = replannable_after;
                    block.move_state = if f.skip { MoveState::Skip } else { MoveState::New };

                    prev_exit = exit_velocity;
                }
                Err(err) => {
                    crate::log::warn!("trapezoid fit failed, leaving block unplanned");
                    let _ = err;
                    self.pool.block_mut(idx).replannable = replannable_after;
                    prev_exit = 0.0;
                }
            }
        }
    }

    /// Marks the block at `idx` (and everything before it in run order) as
    /// frozen against further replanning — called by the executor once a
    /// block has begun emitting segments (§4.1).
    pub fn freeze_running(&mut self, idx: usize) {
        self.pool.block_mut(idx).replannable = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(x: f64, y: f64) -> [f64; AXES] {
        [x, y, 0.0, 0.0, 0.0, 0.0]
    }

    #[test]
    fn single_move_plans_a_full_trapezoid() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline(target(100.0, 0.0), 3000.0).unwrap();

        let idx = planner.pool().first().unwrap();
        let data = planner.pool().block(idx).aline().unwrap();
        assert!(data.entry_velocity >= 0.0);
        assert!(data.exit_velocity >= 0.0);
        let sum = data.head_length + data.body_length + data.tail_length;
        assert!((sum - data.length).abs() < 1e-3, "sum={sum} length={}", data.length);
    }

    #[test]
    fn straight_continuation_reaches_cruise_speed_at_junction() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline(target(50.0, 0.0), 3000.0).unwrap();
        planner.aline(target(100.0, 0.0), 3000.0).unwrap();

        let first = planner.pool().first().unwrap();
        let data = planner.pool().block(first).aline().unwrap();
        // A straight continuation should let the junction run at (or very
        // near) the shared cruise velocity rather than braking to zero.
        assert!(data.exit_velocity > 0.0);
    }

    #[test]
    fn sharp_corner_brakes_the_junction() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline(target(50.0, 0.0), 3000.0).unwrap();
        planner.aline(target(50.0, -50.0), 3000.0).unwrap();

        let first = planner.pool().first().unwrap();
        let data = planner.pool().block(first).aline().unwrap();
        assert!(data.exit_velocity < data.cruise_vmax);
    }

    #[test]
    fn buffer_full_is_reported_not_panicked() {
        let mut planner: PlannerState<2> = PlannerState::new(PlannerConfig::default()).unwrap();
        planner.aline(target(10.0, 0.0), 1000.0).unwrap();
        planner.aline(target(20.0, 0.0), 1000.0).unwrap();
        assert_eq!(
            planner.aline(target(30.0, 0.0), 1000.0),
            Err(PlannerError::BufferFull)
        );
    }

    #[test]
    fn zero_length_move_is_rejected_without_consuming_a_slot() {
        let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
        let available = planner.buffers_available();
        assert_eq!(
            planner.aline(target(0.0, 0.0), 1000.0),
            Err(PlannerError::ZeroLengthMove)
        );
        assert_eq!(planner.buffers_available(), available);
    }
}

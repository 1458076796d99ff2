//! Jerk-limited S-curve trapezoid generator (§4.2).
//!
//! Given a block's entry/cruise/exit velocities and its length, this works
//! out how much of the move is head (accelerating), body (cruise), and tail
//! (decelerating), and the jerk-smoothed velocity profile within each. The
//! seven-segment S-curve (jerk up / constant accel / jerk down, repeated for
//! deceleration) collapses here into head/body/tail because junction
//! velocities are already continuous across blocks — there is no constant-
//! accel plateau within a head or tail, only the two jerk ramps back to
//! back, so "head length" already means the full jerk-smoothed ramp.

use crate::config::PlannerConfig;
use crate::errors::PlannerError;

/// Length-domain fit of a single block's trapezoid, in the three lengths
/// `head_length + body_length + tail_length == length` (within tolerance).
/// `skip` signals a move too short to hold even its dominant ramp — the
/// caller marks the block `MoveState::Skip` rather than scheduling any
/// section for it (§4.2 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TrapezoidFit {
    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,
    pub cruise_velocity: f64,
    pub skip: bool,
}

#[cfg(feature = "std")]
fn libm_sqrt(x: f64) -> f64 {
    x.sqrt()
}
#[cfg(not(feature = "std"))]
fn libm_sqrt(x: f64) -> f64 {
    libm::sqrt(x)
}

#[cfg(feature = "std")]
fn cbrt(x: f64) -> f64 {
    x.cbrt()
}
#[cfg(not(feature = "std"))]
fn cbrt(x: f64) -> f64 {
    libm::cbrt(x)
}

/// `target_length(V1, V2)` (§4.2): distance needed for a single jerk-limited
/// ramp between velocities `V1` and `V2` under jerk `Jm`, given the block's
/// precomputed `cbrt_jerk = Jm^(1/3)`: `|V1-V2| * sqrt(|V1-V2|/Jm)`.
pub fn target_length(v1: f64, v2: f64, cbrt_jerk: f64) -> f64 {
    let dv = (v1 - v2).abs();
    if dv <= 0.0 || cbrt_jerk <= 0.0 {
        return 0.0;
    }
    let jerk = cbrt_jerk * cbrt_jerk * cbrt_jerk;
    dv * libm_sqrt(dv / jerk)
}

/// `target_velocity(V1, L)` (§4.2): velocity reached starting at `V1` over a
/// single jerk-limited ramp spanning distance `L`: `L^(2/3)*Jm^(1/3) + V1`.
/// The exact inverse of `target_length`:
/// `target_velocity(v1, target_length(v1, v2, j), j) == v2`.
pub fn target_velocity(v1: f64, length: f64, cbrt_jerk: f64) -> f64 {
    if length <= 0.0 {
        return v1;
    }
    let c = cbrt(length);
    v1 + c * c * cbrt_jerk
}

/// Velocity gain achievable over a block's own `length` from a standing
/// start, under its own jerk limit (§3 `delta_vmax`) — the planning ceiling
/// used by the backward/forward pass's additive braking/exit-velocity
/// recurrences (§4.3).
pub fn delta_vmax(length: f64, cbrt_jerk: f64) -> f64 {
    target_velocity(0.0, length, cbrt_jerk)
}

/// Time (minutes) a jerk-limited ramp of `length` between endpoint
/// velocities `v0`/`v1` takes (§4.4 segmentation: "move_time = length /
/// midpoint_velocity").
pub fn ramp_time(length: f64, v0: f64, v1: f64) -> f64 {
    let midpoint = (v0 + v1) / 2.0;
    if midpoint <= 0.0 {
        return 0.0;
    }
    length / midpoint
}

/// Velocity at elapsed time `t` within a section's jerk ramp spanning
/// `total_time` minutes from `v_start` to `v_end` (§4.4): two quadratic
/// sub-phases — concave then convex for an accelerating head, convex then
/// concave for a decelerating tail — meeting exactly at the midpoint
/// velocity `(v_start+v_end)/2` at `t = total_time/2`, with acceleration
/// back to zero at both section endpoints.
pub fn ramp_velocity(v_start: f64, v_end: f64, total_time: f64, t: f64) -> f64 {
    if total_time <= 0.0 {
        return v_end;
    }
    let half = total_time / 2.0;
    let t = t.clamp(0.0, total_time);
    let k = (v_end - v_start) / (2.0 * half * half);
    if t <= half {
        v_start + k * t * t
    } else {
        let u = t - half;
        let mid_v = (v_start + v_end) / 2.0;
        let accel_peak = k * total_time;
        mid_v + accel_peak * u - k * u * u
    }
}

/// Distance covered by elapsed time `t` within the same ramp — the closed
/// form integral of `ramp_velocity`, exact to float precision and
/// independent of how finely the caller subdivides the section (§4.4).
pub fn ramp_distance(v_start: f64, v_end: f64, total_time: f64, t: f64) -> f64 {
    if total_time <= 0.0 {
        return 0.0;
    }
    let half = total_time / 2.0;
    let t = t.clamp(0.0, total_time);
    let k = (v_end - v_start) / (2.0 * half * half);
    if t <= half {
        v_start * t + k * t * t * t / 3.0
    } else {
        let mid_distance = v_start * half + k * half * half * half / 3.0;
        let u = t - half;
        let mid_v = (v_start + v_end) / 2.0;
        let accel_peak = k * total_time;
        mid_distance + mid_v * u + accel_peak * u * u / 2.0 - k * u * u * u / 3.0
    }
}

fn min_head_length(cruise: f64, entry: f64, cfg: &PlannerConfig) -> f64 {
    cfg.min_segment_time_minutes() * (cruise + entry)
}

fn min_tail_length(cruise: f64, exit: f64, cfg: &PlannerConfig) -> f64 {
    cfg.min_segment_time_minutes() * (cruise + exit)
}

fn min_body_length(cruise: f64, cfg: &PlannerConfig) -> f64 {
    cfg.min_segment_time_minutes() * cruise
}

/// Computes the head/body/tail length split for one block.
///
/// `entry_v`, `cruise_v`, `exit_v` must already satisfy
/// `entry_v <= cruise_v` and `exit_v <= cruise_v` (the planner's
/// forward/backward pass is responsible for that before calling here).
/// `cbrt_jerk` is the block's precomputed cube root of jerk.
pub fn fit_trapezoid(
    length: f64,
    entry_v: f64,
    cruise_v: f64,
    exit_v: f64,
    cbrt_jerk: f64,
    cfg: &PlannerConfig,
) -> Result<TrapezoidFit, PlannerError> {
    if length <= 0.0 {
        return Err(PlannerError::ZeroLengthMove);
    }

    // Step 1: too short to hold a cruise at all — not even a full
    // entry-to-exit ramp plus one minimum-length body fits in `length`.
    let minimum_length = target_length(entry_v, exit_v, cbrt_jerk);
    if length <= minimum_length + min_body_length(cruise_v, cfg) {
        return Ok(fit_too_short(length, entry_v, exit_v, cbrt_jerk, cfg));
    }

    // Step 2: ideal head/tail at the requested cruise, zeroed out below
    // their own minimum section length rather than kept as a ramp the
    // executor could never schedule above its minimum segment time.
    let mut head_length = target_length(entry_v, cruise_v, cbrt_jerk);
    let mut tail_length = target_length(exit_v, cruise_v, cbrt_jerk);
    if head_length < min_head_length(cruise_v, entry_v, cfg) {
        head_length = 0.0;
    }
    if tail_length < min_tail_length(cruise_v, exit_v, cfg) {
        tail_length = 0.0;
    }

    // Step 3: rate-limited — the requested cruise can't be reached within
    // `length` even with zero body. Re-derive the peak velocity the length
    // can actually support and re-fit head/tail around it.
    if head_length + tail_length > length + cfg.trapezoid_length_fit_tolerance {
        return fit_degenerate(length, entry_v, exit_v, cbrt_jerk, cfg);
    }

    // Step 4: requested-fit. Fold a too-small body into whichever ramp is
    // nonzero rather than emitting a section the executor could never
    // schedule above its own minimum segment time.
    let mut body_length = length - head_length - tail_length;
    let min_body = min_body_length(cruise_v, cfg);
    if body_length > 0.0 && body_length < min_body {
        if head_length > 0.0 && tail_length > 0.0 {
            head_length += body_length / 2.0;
            tail_length += body_length / 2.0;
        } else if head_length > 0.0 {
            head_length += body_length;
        } else if tail_length > 0.0 {
            tail_length += body_length;
        }
        body_length = 0.0;
    }

    let cruise_velocity = if head_length == 0.0 && tail_length == 0.0 {
        entry_v
    } else {
        cruise_v
    };

    Ok(TrapezoidFit {
        head_length,
        body_length,
        tail_length,
        cruise_velocity,
        skip: false,
    })
}

/// §4.2 step 1: a move too short to hold even its own dominant ramp is
/// degraded to a single head-only or tail-only section (or, if entry and
/// exit already match, a body-only section at that velocity), each
/// potentially capped below the requested velocity by what `length` alone
/// can support — and marked `skip` entirely if even that single section
/// would fall under its own minimum length.
fn fit_too_short(
    length: f64,
    entry_v: f64,
    exit_v: f64,
    cbrt_jerk: f64,
    cfg: &PlannerConfig,
) -> TrapezoidFit {
    if entry_v > exit_v {
        let cruise = target_velocity(exit_v, length, cbrt_jerk).min(entry_v);
        if length < min_tail_length(cruise, exit_v, cfg) {
            return TrapezoidFit {
                skip: true,
                ..TrapezoidFit::default()
            };
        }
        TrapezoidFit {
            head_length: 0.0,
            body_length: 0.0,
            tail_length: length,
            cruise_velocity: cruise,
            skip: false,
        }
    } else if entry_v < exit_v {
        let cruise = target_velocity(entry_v, length, cbrt_jerk).min(exit_v);
        if length < min_head_length(cruise, entry_v, cfg) {
            return TrapezoidFit {
                skip: true,
                ..TrapezoidFit::default()
            };
        }
        TrapezoidFit {
            head_length: length,
            body_length: 0.0,
            tail_length: 0.0,
            cruise_velocity: cruise,
            skip: false,
        }
    } else {
        if length < min_body_length(entry_v, cfg) {
            return TrapezoidFit {
                skip: true,
                ..TrapezoidFit::default()
            };
        }
        TrapezoidFit {
            head_length: 0.0,
            body_length: length,
            tail_length: 0.0,
            cruise_velocity: entry_v,
            skip: false,
        }
    }
}

/// Re-derives the achievable peak velocity when the requested cruise
/// velocity cannot be reached within the available length, then fits
/// head/tail (with zero body) around that peak.
///
/// When `entry_v == exit_v` (within `trapezoid_velocity_tolerance`) the two
/// ramps are mirror images of each other and the peak follows directly from
/// `target_velocity` over half the length. Otherwise there's no closed form
/// and this falls back to the asymmetric iterative solver below.
fn fit_degenerate(
    length: f64,
    entry_v: f64,
    exit_v: f64,
    cbrt_jerk: f64,
    cfg: &PlannerConfig,
) -> Result<TrapezoidFit, PlannerError> {
    if (entry_v - exit_v).abs() <= cfg.trapezoid_velocity_tolerance {
        let peak = symmetric_peak_velocity(length, entry_v, cbrt_jerk);
        let mut head_length = target_length(entry_v, peak, cbrt_jerk);
        let mut tail_length = target_length(exit_v, peak, cbrt_jerk);
        // Rounding correction: force the two halves to consume exactly
        // `length` so downstream segmenting never walks past the target.
        let overshoot = head_length + tail_length - length;
        if overshoot.abs() > 0.0 {
            head_length -= overshoot / 2.0;
            tail_length -= overshoot / 2.0;
        }
        return Ok(TrapezoidFit {
            head_length,
            body_length: 0.0,
            tail_length,
            cruise_velocity: peak,
            skip: false,
        });
    }

    Ok(asymmetric_peak_fit(length, entry_v, exit_v, cbrt_jerk, cfg))
}

/// Closed form for the achievable peak velocity of a symmetric (equal
/// entry/exit velocity) jerk-limited ramp pair spanning `length`: each half
/// of the pair is one `target_length`/`target_velocity` ramp over half the
/// distance.
fn symmetric_peak_velocity(length: f64, v0: f64, cbrt_jerk: f64) -> f64 {
    target_velocity(v0, length / 2.0, cbrt_jerk)
}

/// Asymmetric head/tail fit when `entry_v != exit_v` and the requested
/// cruise velocity is unreachable: iteratively adjusts a trial peak
/// velocity until `head_length + tail_length` converges on `length` within
/// `trapezoid_iteration_error_percent`, or gives up after
/// `trapezoid_iteration_max` steps and accepts the last trial, rescaled to
/// span exactly `length` (§9, "Open question: the asymmetric HT iteration
/// formulation").
fn asymmetric_peak_fit(
    length: f64,
    entry_v: f64,
    exit_v: f64,
    cbrt_jerk: f64,
    cfg: &PlannerConfig,
) -> TrapezoidFit {
    let lo_v = entry_v.max(exit_v);
    let mut peak = lo_v;
    // Seed the upper bracket from the symmetric estimate around the mean
    // entry/exit velocity; guaranteed to be >= either endpoint.
    let mean_v = (entry_v + exit_v) / 2.0;
    let mut hi_peak = symmetric_peak_velocity(length, mean_v, cbrt_jerk).max(lo_v + 1.0);

    let mut iterations = 0u32;
    let mut converged = false;
    let mut head_length = 0.0;
    let mut tail_length = 0.0;

    while iterations < cfg.trapezoid_iteration_max {
        iterations += 1;
        head_length = target_length(entry_v, peak, cbrt_jerk);
        tail_length = target_length(exit_v, peak, cbrt_jerk);
        let total = head_length + tail_length;
        let err = (total - length) / length;

        if err.abs() <= cfg.trapezoid_iteration_error_percent {
            converged = true;
            break;
        }

        if total > length {
            hi_peak = peak;
            peak = (lo_v + peak) / 2.0;
        } else {
            peak = (peak + hi_peak) / 2.0;
        }
    }

    let overshoot = head_length + tail_length - length;
    if overshoot.abs() > 0.0 {
        let scale = if head_length + tail_length > 0.0 {
            length / (head_length + tail_length)
        } else {
            1.0
        };
        head_length *= scale;
        tail_length *= scale;
    }

    let fit = TrapezoidFit {
        head_length,
        body_length: 0.0,
        tail_length,
        cruise_velocity: peak,
        skip: false,
    };

    // Non-convergence is logged, not fatal: the last trial's lengths are
    // rescaled to span exactly `length` (above) and the move still runs,
    // just with a peak velocity that is an approximation rather than an
    // exact fit (§9, second open question).
    if !converged {
        crate::log::warn!("trapezoid HT iteration did not converge after {} steps", iterations);
    }

    fit
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PlannerConfig {
        PlannerConfig::default()
    }

    #[test]
    fn target_length_and_target_velocity_are_inverses() {
        let cbrt_jerk = cbrt(cfg().axes[0].jerk_max);
        let v1 = 200.0;
        let v2 = 900.0;
        let length = target_length(v1, v2, cbrt_jerk);
        let back = target_velocity(v1, length, cbrt_jerk);
        assert!((back - v2).abs() < 1e-6, "back={back} v2={v2}");
    }

    #[test]
    fn full_trapezoid_lengths_sum_to_total() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        let fit = fit_trapezoid(100.0, 0.0, 500.0, 0.0, cbrt_jerk, &c).unwrap();
        let sum = fit.head_length + fit.body_length + fit.tail_length;
        assert!((sum - 100.0).abs() < 1e-6, "sum={sum}");
        assert!(fit.body_length > 0.0);
        assert!(!fit.skip);
    }

    #[test]
    fn symmetric_triangle_has_no_body() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        // Ask for a cruise velocity clearly unreachable in a short move.
        let fit = fit_trapezoid(0.01, 0.0, 50_000.0, 0.0, cbrt_jerk, &c).unwrap();
        assert_eq!(fit.body_length, 0.0);
        assert!(fit.cruise_velocity < 50_000.0);
        let sum = fit.head_length + fit.tail_length;
        assert!((sum - 0.01).abs() < 1e-6, "sum={sum}");
    }

    #[test]
    fn zero_length_is_rejected() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        assert_eq!(
            fit_trapezoid(0.0, 0.0, 100.0, 0.0, cbrt_jerk, &c),
            Err(PlannerError::ZeroLengthMove)
        );
    }

    #[test]
    fn delta_vmax_increases_with_distance() {
        let cbrt_jerk = cbrt(50_000_000.0);
        let short = delta_vmax(0.01, cbrt_jerk);
        let long = delta_vmax(1.0, cbrt_jerk);
        assert!(long > short);
        assert!(short >= 0.0);
    }

    #[test]
    fn asymmetric_short_move_always_spans_the_requested_length() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        let fit = fit_trapezoid(0.001, 1000.0, 20_000.0, 200.0, cbrt_jerk, &c).unwrap();
        let sum = fit.head_length + fit.tail_length + fit.body_length;
        assert!((sum - 0.001).abs() < 1e-6);
    }

    #[test]
    fn a_move_too_short_for_its_own_ramp_is_marked_skip() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        // Entry and exit velocities close together, and a length far
        // shorter than even one minimum-duration segment at that speed.
        let fit = fit_trapezoid(1e-9, 500.0, 500.0, 500.0, cbrt_jerk, &c).unwrap();
        assert!(fit.skip);
    }

    #[test]
    fn tail_dominated_short_move_degrades_entry_and_spans_the_length() {
        let c = cfg();
        let cbrt_jerk = cbrt(c.axes[0].jerk_max);
        // Too short for a body, entry far above exit: tail-dominated.
        let length = target_length(1000.0, 0.0, cbrt_jerk) * 0.5;
        let fit = fit_trapezoid(length, 1000.0, 1000.0, 0.0, cbrt_jerk, &c).unwrap();
        assert!(!fit.skip);
        assert_eq!(fit.head_length, 0.0);
        assert_eq!(fit.body_length, 0.0);
        assert!((fit.tail_length - length).abs() < 1e-9);
        assert!(fit.cruise_velocity <= 1000.0);
    }
}

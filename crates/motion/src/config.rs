//! Process-wide, read-mostly configuration for the planner.
//!
//! Mirrors `klipper-host::config::PrinterConfig` in shape (one struct per
//! section, a top-level struct nesting the per-axis ones) but carries no
//! file-parsing responsibility of its own — that belongs to the
//! configuration/persistence store above this crate. Callers build a
//! `PlannerConfig` programmatically, or via `serde` when the `serde-support`
//! feature is enabled.

#[cfg(feature = "serde-support")]
use serde::{Deserialize, Serialize};

use crate::block::AXES;
use crate::errors::PlannerError;

/// Which method the runtime executor uses to turn a section's elapsed
/// time into traveled distance (§10.4 decision: closed-form is primary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub enum IntegrationStrategy {
    /// Evaluate the jerk-limited velocity/position polynomials directly.
    /// Exact (to float precision) and independent of segment duration.
    #[default]
    ClosedForm,
    /// Accumulate velocity and position by repeated Euler steps at the
    /// segment's own duration. Cheaper per step on hardware without an FPU
    /// capable of the closed-form's cubic terms, at the cost of drift that
    /// grows with segment duration.
    ForwardDifference,
}

/// Per-axis planning ceilings (§6, "Configurable parameters / Per-axis").
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct AxisConfig {
    /// Maximum jerk this axis will tolerate, length-units / min^3.
    pub jerk_max: f64,
    /// Junction deviation tolerance for cornering, length-units.
    pub junction_dev: f64,
    /// Absolute velocity ceiling, length-units / min.
    pub velocity_max: f64,
    /// Feedrate ceiling (distinct from `velocity_max` so rapids and feeds
    /// can be capped independently), length-units / min.
    pub feedrate_max: f64,
    /// Soft travel limit, length-units.
    pub travel_max: f64,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            jerk_max: 50_000_000.0,
            junction_dev: 0.05,
            velocity_max: 10_000.0,
            feedrate_max: 10_000.0,
            travel_max: 300.0,
        }
    }
}

/// Global planning parameters (§6, "Configurable parameters / Global").
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde-support", derive(Serialize, Deserialize))]
pub struct PlannerConfig {
    pub axes: [AxisConfig; AXES],
    /// Centripetal-acceleration bound used by the junction-velocity formula.
    pub junction_acceleration: f64,
    /// Nominal segment duration target, microseconds.
    pub estimated_segment_microseconds: f64,
    /// Hard floor below which a section is skipped rather than emitted.
    pub minimum_segment_microseconds: f64,
    /// Ring size of the block pool (`N` in §4.1).
    pub planner_pool_size: usize,
    /// `FIT_TOLERANCE` in the trapezoid generator.
    pub trapezoid_length_fit_tolerance: f64,
    /// `VEL_TOLERANCE` — below this |entry-exit| delta the HT split is
    /// treated as symmetric.
    pub trapezoid_velocity_tolerance: f64,
    /// `ITERATION_MAX` for the asymmetric head/tail solver.
    pub trapezoid_iteration_max: u32,
    /// `ITERATION_ERROR` (relative, e.g. 0.01 == 1%) convergence threshold.
    pub trapezoid_iteration_error_percent: f64,
    /// Precision used when deciding two blocks share a jerk value (and so
    /// can reuse cached `recip_jerk`/`cbrt_jerk`).
    pub jerk_match_precision: f64,
    /// Which integration method the runtime executor uses per segment.
    pub integration_strategy: IntegrationStrategy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            axes: [AxisConfig::default(); AXES],
            junction_acceleration: 100_000.0,
            estimated_segment_microseconds: 5_000.0,
            minimum_segment_microseconds: 2_500.0,
            planner_pool_size: 28,
            trapezoid_length_fit_tolerance: 0.0001,
            trapezoid_velocity_tolerance: 0.0001,
            trapezoid_iteration_max: 10,
            trapezoid_iteration_error_percent: 0.01,
            jerk_match_precision: 1_000_000.0,
            integration_strategy: IntegrationStrategy::ClosedForm,
        }
    }
}

impl PlannerConfig {
    /// Minimum section length (time-domain floor, expressed in minutes to
    /// match the rest of the planner's feedrate-per-minute units).
    pub fn min_segment_time_minutes(&self) -> f64 {
        self.minimum_segment_microseconds / 1_000_000.0 / 60.0
    }

    pub fn estimated_segment_time_minutes(&self) -> f64 {
        self.estimated_segment_microseconds / 1_000_000.0 / 60.0
    }

    /// Rejects non-positive ceilings before they can reach a live move.
    ///
    /// The configuration/persistence store above this crate is expected to
    /// call this once at load and again after any live edit, since a stale
    /// `recip_jerk`/`cbrt_jerk` cached on an in-flight block must never
    /// survive a reconfiguration (§9).
    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.planner_pool_size < 3 {
            return Err(PlannerError::InvalidConfig("planner_pool_size must be >= 3"));
        }
        if self.junction_acceleration <= 0.0 {
            return Err(PlannerError::InvalidConfig("junction_acceleration must be > 0"));
        }
        if self.minimum_segment_microseconds <= 0.0
            || self.estimated_segment_microseconds < self.minimum_segment_microseconds
        {
            return Err(PlannerError::InvalidConfig(
                "estimated_segment_microseconds must be >= minimum_segment_microseconds > 0",
            ));
        }
        if self.trapezoid_iteration_max == 0 {
            return Err(PlannerError::InvalidConfig("trapezoid_iteration_max must be > 0"));
        }
        for axis in self.axes.iter() {
            if axis.jerk_max <= 0.0 || axis.velocity_max <= 0.0 || axis.feedrate_max <= 0.0 {
                return Err(PlannerError::InvalidConfig(
                    "per-axis jerk_max, velocity_max, and feedrate_max must be > 0",
                ));
            }
            if axis.junction_dev < 0.0 {
                return Err(PlannerError::InvalidConfig("junction_dev must be >= 0"));
            }
        }
        Ok(())
    }
}

//! Error taxonomy for the motion planning crate (§7).
//!
//! Ported from the teacher's bare two-variant enum to the full taxonomy the
//! spec names, using `thiserror` the way `klipper-host` and
//! `klipper-mcu-firmware` already do elsewhere in this workspace rather than
//! hand-rolling `Display`. `thiserror::Error` derives without requiring
//! `std`, so this stays usable from the `no_std` build.

use thiserror::Error;

/// Errors that can occur while planning or executing motion.
#[derive(Debug, Error, PartialEq, Clone, Copy)]
pub enum PlannerError {
    /// The write buffer is full; the caller must retry on the next tick.
    #[error("planner queue is full")]
    BufferFull,

    /// Caller invoked `acquire_write` expecting a free slot per its own
    /// bookkeeping, but the pool disagreed. A contract violation, not a
    /// transient backpressure condition — see `BufferFull` for that.
    #[error("write buffer expected available but pool has none free")]
    BufferFullFatal,

    /// The requested move has essentially zero length or zero duration.
    #[error("move is zero-length or zero-time")]
    ZeroLengthMove,

    /// A block section computed to under `minimum_segment_microseconds`;
    /// position still advances but nothing is emitted to the step pulser.
    #[error("block section fell below the minimum segment time and was skipped")]
    GcodeBlockSkipped,

    /// The executor reached a `RUNNING` block with no dispatchable payload.
    #[error("internal error: running block has no dispatch callback")]
    InternalError,

    /// The asymmetric head/tail iteration did not converge within
    /// `trapezoid_iteration_max` steps. Non-fatal: the last computed values
    /// are accepted (§9, second open question), this is a telemetry signal.
    #[error("head/tail trapezoid iteration did not converge after {iterations} steps")]
    NotConverged { iterations: u32 },

    /// A configuration value fails its boundary check (§10.1).
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

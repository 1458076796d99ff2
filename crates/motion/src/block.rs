//! The planning block: one ring-buffer slot (§3 "Planning Block").
//!
//! The source this planner is modeled on aliases several unrelated fields
//! onto the same storage (a dwell's seconds and a command's int/double
//! payload share a union with the trapezoid fields of a line move). §9
//! calls this out explicitly and prescribes a tagged variant instead; that
//! is `Payload` below. `Block` itself keeps only the fields every move type
//! shares — lifecycle, provenance, and ring links — with `move_type` as the
//! single discriminator driving which `Payload` arm is live.

use crate::errors::PlannerError;

/// All vectors in this crate are six-wide: X, Y, Z, A, B, C.
pub const AXES: usize = 6;

/// Lifecycle state of a ring slot (§3 "Lifecycle of a block").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockState {
    #[default]
    Empty,
    Loading,
    Queued,
    Pending,
    Running,
}

/// What a block produces when it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    #[default]
    None,
    Aline,
    Dwell,
    Command,
}

/// Executor-facing progress marker for the block as a whole. `Off` also
/// doubles as the ring-walk sentinel used by `BlockPool::first`/`last`
/// (§4.1): a slot that has never been committed reads as `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveState {
    #[default]
    Off,
    New,
    Run,
    Skip,
}

/// Callback signature for `queue_command` (§6 upward interface). Queued
/// commands run synchronously, in order, on the foreground side of the
/// executor dispatch — no allocation, so a bare function pointer plus two
/// scalar payload slots (mirroring the source's aliased `int_val`/`dbl_val`)
/// is enough to carry a canonical-machine-layer closure's arguments.
pub type CommandCallback = fn(i32, f64);

/// Trapezoid-generator inputs/outputs for an `Aline` block (§3, §4.2).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlineData {
    pub target: [f64; AXES],
    pub unit: [f64; AXES],
    pub length: f64,

    pub jerk: f64,
    pub recip_jerk: f64,
    pub cbrt_jerk: f64,

    pub entry_vmax: f64,
    pub cruise_vmax: f64,
    pub exit_vmax: f64,
    pub delta_vmax: f64,

    pub entry_velocity: f64,
    pub cruise_velocity: f64,
    pub exit_velocity: f64,
    pub braking_velocity: f64,

    pub head_length: f64,
    pub body_length: f64,
    pub tail_length: f64,

    pub time: f64,
    pub min_time: f64,
}

impl Default for AlineData {
    fn default() -> Self {
        Self {
            target: [0.0; AXES],
            unit: [0.0; AXES],
            length: 0.0,
            jerk: 0.0,
            recip_jerk: 0.0,
            cbrt_jerk: 0.0,
            entry_vmax: 0.0,
            cruise_vmax: 0.0,
            exit_vmax: 0.0,
            delta_vmax: 0.0,
            entry_velocity: 0.0,
            cruise_velocity: 0.0,
            exit_velocity: 0.0,
            braking_velocity: 0.0,
            head_length: 0.0,
            body_length: 0.0,
            tail_length: 0.0,
            time: 0.0,
            min_time: 0.0,
        }
    }
}

impl AlineData {
    /// Precomputes `recip_jerk`/`cbrt_jerk` from `jerk`. Callers skip this
    /// when consecutive blocks share a jerk value within
    /// `jerk_match_precision` (§3 "last used jerk terms").
    pub fn set_jerk(&mut self, jerk: f64) {
        self.jerk = jerk;
        self.recip_jerk = 1.0 / jerk;
        #[cfg(feature = "std")]
        {
            self.cbrt_jerk = jerk.cbrt();
        }
        #[cfg(not(feature = "std"))]
        {
            self.cbrt_jerk = libm::cbrt(jerk);
        }
    }
}

/// The tagged payload a block carries, keyed by `move_type` (§9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    None,
    Aline(AlineData),
    Dwell { seconds: f64 },
    Command {
        callback: CommandCallback,
        int_val: i32,
        dbl_val: f64,
    },
}

impl Default for Payload {
    fn default() -> Self {
        Payload::None
    }
}

impl Payload {
    pub fn as_aline(&self) -> Option<&AlineData> {
        match self {
            Payload::Aline(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_aline_mut(&mut self) -> Option<&mut AlineData> {
        match self {
            Payload::Aline(a) => Some(a),
            _ => None,
        }
    }
}

/// One ring-buffer slot. `prev`/`next` are indices into the owning
/// `BlockPool`'s fixed array rather than pointers (§9): this sidesteps
/// aliasing between the planner and the executor entirely, since Rust's
/// borrow checker can reason about index-based access the way it cannot
/// about two raw pointers into the same ring.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Block {
    pub state: BlockState,
    pub move_type: MoveType,
    pub move_state: MoveState,
    pub replannable: bool,

    pub linenum: u32,
    pub lineindex: u32,

    pub prev: usize,
    pub next: usize,

    pub payload: Payload,
}

impl Block {
    /// Resets everything except the ring links, matching `acquire_write`'s
    /// "zero the slot (preserving links)" and `free_run`'s "clear slot
    /// (preserve links)" (§4.1).
    pub fn reset_preserving_links(&mut self) {
        let (prev, next) = (self.prev, self.next);
        *self = Block::default();
        self.prev = prev;
        self.next = next;
    }

    pub fn aline(&self) -> Result<&AlineData, PlannerError> {
        self.payload.as_aline().ok_or(PlannerError::InternalError)
    }

    pub fn aline_mut(&mut self) -> Result<&mut AlineData, PlannerError> {
        self.payload.as_aline_mut().ok_or(PlannerError::InternalError)
    }
}

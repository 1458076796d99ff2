//! # Motion planning and execution core
//!
//! A deterministic, jerk-limited motion planner and executor for a 6-axis
//! G-code machine, usable on both host and MCU (`no_std`-friendly).
//!
//! - `block`/`pool`: the ring-buffered planning block and its fixed-size
//!   pool (§3, §4.1).
//! - `trapezoid`/`junction`: the jerk-limited S-curve trapezoid generator
//!   and cornering-velocity formula (§4.2).
//! - `plan`: the backward/forward block-list planner (§4.3).
//! - `runtime`: the interrupt-driven segment executor (§4.4).
//! - `feedhold`: controlled-deceleration hold/resume (§4.5).
//! - `kinematics`/`pulse`: the downward interfaces to the stepper transform
//!   and step pulser (§6).
//! - `machine`: `MotionController`, the upward-facing facade (§6, §10.5).

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod block;
pub mod config;
pub mod errors;
pub mod feedhold;
pub mod junction;
pub mod kinematics;
pub(crate) mod log;
pub mod machine;
pub mod plan;
pub mod pool;
pub mod pulse;
pub mod runtime;
pub mod trapezoid;

pub use block::{AlineData, Block, BlockState, CommandCallback, MoveState, MoveType, Payload, AXES};
pub use config::{AxisConfig, IntegrationStrategy, PlannerConfig};
pub use errors::PlannerError;
pub use feedhold::{FeedholdController, HoldState};
pub use junction::junction_velocity;
pub use kinematics::{CoreXYKinematics, IdentityKinematics, Kinematics, StepperAxis};
pub use machine::MotionController;
pub use plan::PlannerState;
pub use pool::BlockPool;
pub use pulse::{RecordingPulser, StepPulser};
pub use runtime::{ExecStatus, RuntimeState};
pub use trapezoid::TrapezoidFit;

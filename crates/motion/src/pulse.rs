//! Downward interface to the step pulser (§6, §10.5).
//!
//! `mcu-drivers::stepper::StepperController` models a per-edge
//! `StepCommand { stepper_mask, direction_mask, interval_ticks }` consumed
//! from an ISR-fed queue — the right shape for a driver that owns its own
//! timer and decides when to fire the next edge. This crate's executor
//! instead decides, on its own schedule, how many steps each axis takes
//! over a whole segment and how long that segment lasts; the receiving
//! side just needs to turn that batch into edges. `StepPulser` is that
//! narrower contract.

use crate::block::AXES;

/// Receives one segment's worth of planned motion: a signed step count per
/// axis to be walked evenly over `microseconds`.
///
/// Implementations are expected to be cheap and non-blocking — this is
/// called from the same execution context as `exec_move` (§5), which may
/// itself be an interrupt handler on an MCU target.
pub trait StepPulser {
    /// `steps[i]` is the signed number of steps axis `i` should take
    /// (positive or negative) spread evenly across `microseconds`. A zero
    /// entry means that axis is idle for this segment.
    fn prep_line(&mut self, steps: [i32; AXES], microseconds: f64);
}

/// A `StepPulser` that records every segment instead of driving hardware.
/// Used by tests, benches, and the in-process simulation harness.
#[derive(Debug, Default, Clone)]
pub struct RecordingPulser {
    pub segments: heapless::Vec<([i32; AXES], f64), 256>,
}

impl StepPulser for RecordingPulser {
    fn prep_line(&mut self, steps: [i32; AXES], microseconds: f64) {
        let _ = self.segments.push((steps, microseconds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_pulser_captures_segments_in_order() {
        let mut pulser = RecordingPulser::default();
        pulser.prep_line([1, 0, 0, 0, 0, 0], 5000.0);
        pulser.prep_line([1, 1, 0, 0, 0, 0], 5000.0);
        assert_eq!(pulser.segments.len(), 2);
        assert_eq!(pulser.segments[0].0[0], 1);
        assert_eq!(pulser.segments[1].0[1], 1);
    }
}

//! Determinism and round-trip properties of the planner and executor (§8).

use motion::{IdentityKinematics, MotionController, PlannerConfig, PlannerState};

fn target(x: f64, y: f64) -> [f64; 6] {
    [x, y, 0.0, 0.0, 0.0, 0.0]
}

/// Replanning the same queue twice in a row, with no intervening state
/// change, must leave every block's fit untouched.
#[test]
fn replanning_twice_is_idempotent() {
    let mut planner: PlannerState<8> = PlannerState::new(PlannerConfig::default()).unwrap();
    planner.aline(target(30.0, 0.0), 3000.0).unwrap();
    planner.aline(target(30.0, 30.0), 3000.0).unwrap();

    let idx = planner.pool().first().unwrap();
    let before = *planner.pool().block(idx).aline().unwrap();
    planner.replan();
    let after = *planner.pool().block(idx).aline().unwrap();
    assert_eq!(before, after);
}

/// `acquire_write` then `free_run` across a full ring cycle returns
/// `available` to its initial value, regardless of how many blocks were
/// cycled through.
#[test]
fn full_queue_cycle_restores_available_buffers() {
    let mut mc: MotionController<6, IdentityKinematics, motion::RecordingPulser> =
        MotionController::new(PlannerConfig::default(), IdentityKinematics, motion::RecordingPulser::default())
            .unwrap();
    let initial = mc.get_planner_buffers_available();

    for i in 1..=5 {
        mc.aline(target(i as f64 * 5.0, 0.0), 3000.0).unwrap();
    }

    let mut guard = 0;
    loop {
        guard += 1;
        assert!(guard < 50_000);
        if mc.exec_move().unwrap() == motion::ExecStatus::Noop {
            break;
        }
    }

    assert_eq!(mc.get_planner_buffers_available(), initial);
}

/// Every queued block out of the planner satisfies the trapezoid-length and
/// velocity-ordering invariants (§8 "Universal invariants").
#[test]
fn every_planned_block_satisfies_universal_invariants() {
    let mut planner: PlannerState<10> = PlannerState::new(PlannerConfig::default()).unwrap();
    planner.aline(target(20.0, 0.0), 4000.0).unwrap();
    planner.aline(target(20.0, 20.0), 4000.0).unwrap();
    planner.aline(target(0.0, 20.0), 4000.0).unwrap();

    let indices: heapless::Vec<usize, 10> = planner.pool().iter_queue().collect();
    for idx in indices {
        let data = planner.pool().block(idx).aline().unwrap();
        let sum = data.head_length + data.body_length + data.tail_length;
        assert!((sum - data.length).abs() < 1e-3, "length mismatch at block {idx}");
        assert!(data.entry_velocity <= data.cruise_velocity + 1e-6);
        assert!(data.exit_velocity <= data.cruise_velocity + 1e-6);
        assert!(data.entry_velocity >= 0.0);
        assert!(data.exit_velocity >= 0.0);
        assert!(data.entry_velocity <= data.entry_vmax + 1e-6);
        assert!(data.exit_velocity <= data.exit_vmax + 1e-6);
    }
}

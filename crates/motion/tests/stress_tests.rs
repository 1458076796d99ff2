//! Stress tests exercising backpressure and long-running, many-segment
//! queues (§8 "Boundary behaviors").

use motion::{IdentityKinematics, MotionController, PlannerConfig, PlannerError, RecordingPulser};

fn target(x: f64, y: f64) -> [f64; 6] {
    [x, y, 0.0, 0.0, 0.0, 0.0]
}

/// Filling the ring past its capacity reports `BufferFull` rather than
/// panicking or silently overwriting an in-use slot.
#[test]
fn queue_full_is_reported_not_panicked() {
    let mut mc: MotionController<4, IdentityKinematics, RecordingPulser> =
        MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default()).unwrap();

    let mut filled = 0;
    for i in 1..=10 {
        match mc.aline(target(i as f64 * 10.0, 0.0), 3000.0) {
            Ok(()) => filled += 1,
            Err(PlannerError::BufferFull) => break,
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
    assert!(filled > 0 && filled < 10, "expected the ring to fill before 10 moves, filled={filled}");
    assert_eq!(mc.get_planner_buffers_available(), 0);
}

/// A long run of very short, sharply-cornering segments (approximating a
/// circle) never stalls the executor and never emits a zero-duration
/// segment.
#[test]
fn many_small_cornering_segments_drain_without_stalling() {
    let mut mc: MotionController<16, IdentityKinematics, RecordingPulser> =
        MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default()).unwrap();

    let segments = 48;
    let radius = 50.0;
    let mut queued = 0;
    for i in 1..=segments {
        let angle = (i as f64 / segments as f64) * 2.0 * core::f64::consts::PI;
        let x = radius * angle.cos();
        let y = radius * angle.sin();
        loop {
            match mc.aline(target(x, y), 3000.0) {
                Ok(()) => {
                    queued += 1;
                    break;
                }
                Err(PlannerError::BufferFull) => {
                    // Drain one segment's worth and retry, simulating a
                    // producer that backs off under backpressure (§5).
                    mc.exec_move().unwrap();
                }
                Err(e) => panic!("unexpected error: {e:?}"),
            }
        }
    }
    assert_eq!(queued, segments);

    let mut guard = 0;
    loop {
        guard += 1;
        assert!(guard < 200_000, "executor never drained the queue");
        if mc.exec_move().unwrap() == motion::ExecStatus::Noop {
            break;
        }
    }
}

/// A single very high-velocity, high-jerk move still lands exactly on its
/// commanded endpoint.
#[test]
fn high_velocity_move_reconstructs_endpoint_exactly() {
    let mut cfg = PlannerConfig::default();
    for axis in cfg.axes.iter_mut() {
        axis.jerk_max = 5.0e8;
        axis.velocity_max = 200_000.0;
        axis.feedrate_max = 200_000.0;
    }
    let mut mc: MotionController<8, IdentityKinematics, RecordingPulser> =
        MotionController::new(cfg, IdentityKinematics, RecordingPulser::default()).unwrap();
    mc.aline(target(200.0, 0.0), 150_000.0).unwrap();

    let mut guard = 0;
    loop {
        guard += 1;
        assert!(guard < 200_000);
        if mc.exec_move().unwrap() == motion::ExecStatus::Noop {
            break;
        }
    }
    assert!((mc.get_runtime_work_position(0) - 200.0).abs() < 1e-3);
}

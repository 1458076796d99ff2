use criterion::{black_box, criterion_group, criterion_main, Criterion};
use motion::{IdentityKinematics, MotionController, PlannerConfig, RecordingPulser};

fn target(x: f64, y: f64, z: f64) -> [f64; 6] {
    [x, y, z, 0.0, 0.0, 0.0]
}

fn benchmark_aline_and_drain(c: &mut Criterion) {
    c.bench_function("aline_then_drain_long_move", |b| {
        b.iter(|| {
            let mut mc: MotionController<28, IdentityKinematics, RecordingPulser> =
                MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default())
                    .unwrap();
            mc.aline(black_box(target(150.0, 50.0, 20.0)), black_box(6000.0))
                .unwrap();
            loop {
                if mc.exec_move().unwrap() == motion::ExecStatus::Noop {
                    break;
                }
            }
        })
    });
}

fn benchmark_replan_under_load(c: &mut Criterion) {
    c.bench_function("replan_full_queue", |b| {
        b.iter(|| {
            let mut mc: MotionController<28, IdentityKinematics, RecordingPulser> =
                MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default())
                    .unwrap();
            for i in 1..=25 {
                let x = black_box(i as f64 * 4.0);
                let _ = mc.aline(target(x, if i % 2 == 0 { 4.0 } else { 0.0 }, 0.0), 3000.0);
            }
        })
    });
}

criterion_group!(benches, benchmark_aline_and_drain, benchmark_replan_under_load);
criterion_main!(benches);

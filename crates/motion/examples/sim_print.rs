//! Plans a short multi-segment toolpath and prints a per-segment trace to
//! stdout, in-process against a `RecordingPulser` — no socket, no external
//! MCU emulator. A minimal stand-in for what `sim`/`klipper-host::batch`
//! drive over a real transport, scoped to what this crate alone can show.

use motion::{IdentityKinematics, MotionController, PlannerConfig, RecordingPulser};

fn target(x: f64, y: f64) -> [f64; 6] {
    [x, y, 0.0, 0.0, 0.0, 0.0]
}

fn main() {
    let mut mc: MotionController<16, IdentityKinematics, RecordingPulser> =
        MotionController::new(PlannerConfig::default(), IdentityKinematics, RecordingPulser::default())
            .expect("valid default configuration");

    mc.aline(target(20.0, 0.0), 3000.0).unwrap();
    mc.aline(target(20.0, 20.0), 3000.0).unwrap();
    mc.dwell(0.25).unwrap();
    mc.aline(target(0.0, 20.0), 3000.0).unwrap();

    println!("segment#  work_x   work_y");
    let mut segment = 0;
    loop {
        let status = mc.exec_move().expect("executor error");
        if status == motion::ExecStatus::Ok {
            segment += 1;
            println!(
                "{segment:>8}  {:>6.3}  {:>6.3}",
                mc.get_runtime_work_position(0),
                mc.get_runtime_work_position(1)
            );
        }
        if status == motion::ExecStatus::Noop {
            break;
        }
    }

    println!(
        "done: {} segments, final position = ({:.3}, {:.3})",
        segment,
        mc.get_runtime_work_position(0),
        mc.get_runtime_work_position(1),
    );
}

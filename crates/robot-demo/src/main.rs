use std::process::ExitCode;

fn main() -> ExitCode {
    rumble::stdio::run_main(robot_demo::robot)
}

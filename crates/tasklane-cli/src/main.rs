use std::process::ExitCode;

fn main() -> ExitCode {
    match tasklane_core::run(std::env::args_os().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("tasklane: {err:#}");
            ExitCode::FAILURE
        }
    }
}

use std::process::ExitCode;

fn main() -> ExitCode {
    match graftd::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("graftd: {error}");
            ExitCode::FAILURE
        }
    }
}

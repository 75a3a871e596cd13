use std::process::ExitCode;

fn main() -> ExitCode {
    capebot_cli::run()
}

use colored::Colorize;
use std::process::ExitCode;

fn main() -> ExitCode {
    match log_filter::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

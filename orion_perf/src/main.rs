use std::process::ExitCode;

use orion_perf::cli;

// Main entry point
#[tokio::main]
async fn main() -> ExitCode {
    match cli::handle_calls().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

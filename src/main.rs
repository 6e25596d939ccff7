use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match asr_daemon::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Chatflow CLI
///
/// Runs flow documents as terminal conversations and validates them.
use chatflow_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

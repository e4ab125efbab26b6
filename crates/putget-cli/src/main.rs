use putget_cli::{run_cli, CliError};
use tracing::error;

#[tokio::main]
async fn main() {
    match run_cli().await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("CLI error: {}", e);
            // Logging may not be initialized yet
            eprintln!("Error: {}", e);

            // Exit with appropriate code based on error type
            let exit_code = match e {
                CliError::CommandFailed { .. } => 1,
                CliError::InvalidArgument { .. } => 2,
                CliError::Configuration(_) => 3,
                CliError::Io(_) => 5,
            };

            std::process::exit(exit_code);
        }
    }
}

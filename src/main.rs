use std::process::ExitCode;

use cli::{Args, Commands};
use error::FhError;
use settings::Settings;

mod cli;
mod commands;
mod engine;
mod error;
mod program;
mod progress;
mod settings;
mod stack;
mod values;

#[tokio::main]
async fn main() -> ExitCode {
    // Loaded before parsing so flags backed by the environment see it.
    let dotenv = dotenv::dotenv();
    let args = cli::get_cli_args();

    // Initialize the logger
    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match dotenv {
        Ok(path) => log::debug!("Loaded environment from {path:?}"),
        Err(e) => log::debug!("No .env file loaded: {e}"),
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<(), FhError> {
    let settings = Settings::try_init(args)?;
    match &args.command {
        Commands::Up(up) => commands::up::up(&settings, up).await,
        Commands::Destroy(destroy) => commands::destroy::destroy(&settings, destroy).await,
        Commands::Get => commands::get::get(&settings).await,
    }
}

//! fixloop CLI entry point.

use clap::Parser;

use fixloop::cli::commands::{config, load_config, metrics, run, workflow};
use fixloop::cli::{handle_error, Cli, Commands};
use fixloop::domain::models::LoggingConfig;
use fixloop::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config_file = cli.config.as_deref();

    // Console logging follows the configuration when it loads; warnings only otherwise.
    let logging = load_config(config_file).map_or_else(
        |_| LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        },
        |c| c.logging,
    );
    let _logger = match LoggerImpl::init(&logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err}");
            None
        }
    };

    let result = match cli.command {
        Commands::Workflows(args) => workflow::execute(args, config_file, cli.json),
        Commands::Runs(args) => run::execute(args, config_file, cli.json).await,
        Commands::Metrics(args) => metrics::execute(args, config_file, cli.json).await,
        Commands::Config(args) => config::execute(args, config_file, cli.json),
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
    }
}

use clap::Parser;

mod cli;
mod commands;
mod config;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let config = config::DepotConfig::load(&cli.config)?;
    init_tracing(cli.verbose, &config.log_level);
    commands::run_command(cli, config)
}

fn init_tracing(verbose: bool, log_level: &str) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        log_level.parse().unwrap_or(tracing::Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

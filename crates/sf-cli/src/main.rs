use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sf_cli::commands::{
    api_key, ask, classify, domains, gating, session, settings, status, tab, watch,
};
use sf_cli::{Cli, Commands, Config, daemon};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    let out = &mut stdout;
    match command {
        Commands::Daemon => daemon::run(config)?,
        Commands::Start(args) => session::start(out, &config, args)?,
        Commands::Pause => session::pause(out, &config)?,
        Commands::Resume => session::resume(out, &config)?,
        Commands::Toggle => session::toggle(out, &config)?,
        Commands::Stop => session::stop(out, &config)?,
        Commands::Status { json } => status::run(out, &config, *json)?,
        Commands::Watch => watch::run(out, &config)?,
        Commands::Domains(action) => domains::run(out, &config, action)?,
        Commands::Tab {
            url,
            tab_id,
            completed,
            background,
        } => tab::run(out, &config, tab::event(url, *tab_id, *completed, *background))?,
        Commands::Classify(action) => classify::run(out, &config, action)?,
        Commands::Settings(args) => settings::run(out, &config, args)?,
        Commands::Gating(args) => gating::run(out, &config, args)?,
        Commands::Ask { question } => ask::run(out, &config, &question.join(" "))?,
        Commands::ApiKey { key } => api_key::run(out, &config, key)?,
    }

    Ok(())
}

mod api;
mod config;
mod error;
mod logging;
mod reconcile;
mod resolver;

use std::process::ExitCode;

use clap::Parser;
use eyre::WrapErr;

use self::api::SpaceshipClient;
use self::config::{Args, Config};
use self::logging::Logger;
use self::reconcile::{Outcome, Reconciler};
use self::resolver::EchoResolver;

// Everything happens one step at a time, so a single-threaded runtime is all that's needed.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(err) = Logger::new(args.log_level, !args.no_timestamps).init() {
        eprintln!("Failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    match run(&args).await {
        Ok(outcome) => {
            log::info!("Done: {outcome}.");
            ExitCode::SUCCESS
        },
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: &Args) -> eyre::Result<Outcome> {
    let config = Config::from_args(args).wrap_err("Failed to load configuration")?;
    log::debug!("Loaded configuration: {config:?}");

    let domain = config.credentials.domain();
    log::info!("Checking AAAA record for {} in {domain}...", config.hostname);
    if config.dry_run {
        log::info!("Dry run: no changes will be made.");
    }

    let resolver = EchoResolver::new(&config.ip_url, config.timeout)?;
    let store = SpaceshipClient::new(&config.credentials, &config.api_url, config.timeout)?;

    let outcome = Reconciler::new(resolver, store, domain)
        .ttl(config.ttl)
        .dry_run(config.dry_run)
        .reconcile(&config.hostname)
        .await?;

    Ok(outcome)
}

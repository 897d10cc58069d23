mod app;
mod config;
mod effects;
mod logging;
mod render;

use std::process::ExitCode;

use importer_logging::importer_info;

use crate::cli::{Cli, Command};

pub fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::initialize(cli.log.into());

    let mut config = config::load(cli.config.as_deref());
    if let Some(server) = cli.server {
        config.server_url = server;
    }
    if let Some(interval) = cli.poll_interval_ms {
        config.poll_interval_ms = interval;
    }
    importer_info!("using server {}", config.server_url);

    let mut app = app::App::new(&config)?;
    match cli.command {
        Command::Upload { file, yes } => app.upload(&file, yes),
        Command::Lookup { key } => app.lookup(&key),
        Command::Health => app.health(),
    }
}

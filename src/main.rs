//! Parley entry point
//!
//! Wires flags and persisted settings into a model resolution, loads the
//! engine backend and hands control to the interactive session loop.

use std::io::{self, Write};

use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use parley::cli::{detect_device_name, local_id_candidates, Cli};
use parley::config;
use parley::engine::echo::EchoEngine;
use parley::engine::{ChatEngine, Device, DeviceKind, EngineError, UnknownDevice};
use parley::locator::{LocatorError, ModelLocator};
use parley::session::{write_help, Session, SessionError};

/// Startup and session failures surfaced to the user.
#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Device(#[from] UnknownDevice),
    #[error(transparent)]
    Locator(#[from] LocatorError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("terminal I/O failed: {0}")]
    Io(#[from] io::Error),
}

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(EnvFilter::from_default_env().add_directive("parley=info".parse().unwrap()))
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = config::load_settings();
    settings.validate();

    let artifact_root = cli.artifact_path.unwrap_or(settings.artifact_root);
    let model = cli.model.unwrap_or(settings.model);
    let quantization = cli.quantization.unwrap_or(settings.quantization);
    let device_name = cli.device.unwrap_or(settings.device);
    let stream_interval = cli.stream_interval.unwrap_or(settings.stream_interval);

    let kind: DeviceKind = detect_device_name(&device_name).parse()?;
    let device = Device::new(kind, cli.device_id.unwrap_or(0));
    info!("using device {}:{}", device.kind, device.id);

    let candidates = local_id_candidates(cli.local_id.as_deref(), &model, &quantization);
    let locator = ModelLocator::new(artifact_root, device.kind.name());
    let resolved = locator.resolve(&candidates)?;

    info!("initializing the chat engine");
    let mut engine = EchoEngine::new();
    engine.reload(&resolved.library_path, &resolved.model_resource_dir)?;
    info!("finish loading");

    let mut stdout = io::stdout();
    write_help(&mut stdout)?;
    stdout.flush()?;

    let mut session = Session::new(engine, locator, resolved, stream_interval);
    session.run(io::stdin().lock(), stdout)?;
    Ok(())
}

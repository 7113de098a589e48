// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Command-line driver for the Tickit tick engine.
//!
//! Only `all` is fully wired up here: it builds the declared graph,
//! spawns every component, and runs the master over the in-memory bus,
//! all in one process. `scheduler` and `components` assume a distributed
//! bus coordinating separate processes; this workspace only ships the
//! in-memory broker (a distributed one is an external collaborator, out
//! of scope for the engine itself), so both are accepted for CLI
//! compatibility but exit with a clear error rather than quietly
//! behaving like `all`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use tickit_bus::{Bus, InMemoryBus};
use tickit_config::{GraphConfig, RuntimeSettings};
use tickit_core::TickitError;
use tickit_engine::{ComponentRuntime, Device, DeviceRegistry, MasterScheduler};
use tickit_router::EventRouter;

#[derive(Parser)]
#[command(name = "tickit", version, about = "Run a Tickit device-simulation graph")]
struct Cli {
    /// Override the log level from the runtime config (error/warn/info/debug/trace).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the master plus every declared component in-process, over the in-memory bus.
    All {
        /// Graph configuration file.
        config: PathBuf,
    },
    /// Run only the master scheduler. Requires an external bus.
    Scheduler {
        /// Graph configuration file.
        config: PathBuf,
    },
    /// Run only the named components. Requires an external bus.
    Components {
        /// Graph configuration file.
        config: PathBuf,
        /// Component ids, a subset of those declared in `config`, to run in this process.
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let settings = RuntimeSettings::load(None).unwrap_or_default();
    init_logger(cli.log_level.as_deref().unwrap_or(&settings.log_level));

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start the tokio runtime")
        .block_on(dispatch(cli.command, settings.simulation_speed));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn init_logger(level: &str) {
    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Warn);
    env_logger::builder().filter_level(level).init();
}

async fn dispatch(command: Command, simulation_speed: f64) -> Result<(), TickitError> {
    match command {
        Command::All { config } => run_all(&config, simulation_speed).await,
        Command::Scheduler { config: _ } => Err(TickitError::config(
            "`scheduler` requires an external distributed bus, which this build does not ship; use `all` for an in-process run",
        )),
        Command::Components { config: _, ids: _ } => Err(TickitError::config(
            "`components` requires an external distributed bus, which this build does not ship; use `all` for an in-process run",
        )),
    }
}

/// Build the declared graph, spawn every component's runtime, and drive
/// it to completion with the master. Components run with no adapters:
/// this CLI wires up devices only, no protocol adapters (the declared
/// graph format has no adapter section to resolve them from).
async fn run_all(config_path: &std::path::Path, simulation_speed: f64) -> Result<(), TickitError> {
    let graph = GraphConfig::load(config_path)?;
    let router = Arc::new(EventRouter::new(&graph.wiring()?)?);

    let mut registry = DeviceRegistry::new();
    relay_devices::register(&mut registry);

    let bus: Arc<dyn Bus> = Arc::new(InMemoryBus::new());

    let mut component_tasks = Vec::with_capacity(graph.components.len());
    for spec in &graph.components {
        let device: Box<dyn Device> = registry.build(&spec.device, &spec.params)?;
        let runtime = ComponentRuntime::new(spec.id.clone(), device, bus.clone());
        component_tasks.push(tokio::spawn(runtime.run(Vec::new())));
    }

    let master = MasterScheduler::new(router, bus, simulation_speed);
    let outcome = master.run().await;

    for task in component_tasks {
        let _ = task.await;
    }
    outcome
}

//! Host binary: load the config, wire the simulator rig, run the loop.
//!
//! Real GPIO deployments construct a `GpioBank` from their HAL's pin
//! types instead of `SimHardware`; everything downstream of the port
//! traits is identical.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aquactl::adapters::clock::SystemClock;
use aquactl::adapters::console::{LogMessenger, spawn_console_reader};
use aquactl::adapters::hardware::SimHardware;
use aquactl::config::Config;
use aquactl::controller::Controller;
use aquactl::inbox::command_inbox;
use aquactl::ports::Clock;

#[derive(Debug, Parser)]
#[command(name = "aquactl", about = "Automated water-change controller")]
struct Args {
    /// Path to the YAML configuration.
    #[arg(long, env = "AQUACTL_CONFIG", default_value = "aquactl.yaml")]
    config: PathBuf,

    /// Log filter, e.g. `info` or `aquactl=debug`.
    #[arg(long, env = "AQUACTL_LOG", default_value = "info")]
    log: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&args.log).context("invalid log filter")?)
        .init();

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let tick = Duration::from_secs_f64(config.settings.tick_interval);

    let rig = SimHardware::new();
    // Every sensor starts exposed; flip them from another handle (or a
    // future physics script) to exercise routines.
    for sensor in config.tank_sensors.iter().map(|s| s.name.as_str()) {
        rig.set_sensor(sensor, false);
    }
    for sensor in config.error_sensors.iter().map(|s| s.name.as_str()) {
        rig.set_sensor(sensor, true);
    }

    let (submitter, inbox) = command_inbox();
    let clock = SystemClock;
    let mut controller = Controller::new(&config, inbox, LogMessenger, clock.now());
    let _console = spawn_console_reader(submitter);

    info!("aquactl started; ticking every {:.1}s", config.settings.tick_interval);
    let mut sensors = rig.clone();
    let mut actuators = rig;
    while !controller.shutdown_requested() {
        controller.tick(&mut sensors, &mut actuators, &clock);
        clock.sleep(tick);
    }
    controller.shutdown(&mut actuators);
    info!("aquactl stopped");
    Ok(())
}

mod app;
mod audio;
mod config;
mod error;
mod geometry;
mod output;
mod render;
mod wayland;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::error;

use crate::config::{Config, ConfigArgs};

#[derive(Parser)]
#[command(name = "wav")]
#[command(about = "Audio spectrum bars drawn around the edges of every Wayland output")]
#[command(version)]
struct Cli {
    /// List audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    #[command(flatten)]
    config: ConfigArgs,
}

fn list_devices() -> Result<()> {
    let devices = audio::list_devices()?;
    if devices.is_empty() {
        println!("No audio input devices found");
        return Ok(());
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        let rates = device
            .sample_rates
            .iter()
            .map(|rate| rate.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{}{marker}: {rates} Hz", device.name);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if cli.list_devices {
        return list_devices();
    }
    let config = Config::load(&cli.config)?;
    app::run(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

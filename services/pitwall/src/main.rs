mod audio_io;
mod config;
mod controller;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::fmt::time::ChronoLocal;

use pitwall_core::briefing::DEFAULT_COACH_VOICE;
use pitwall_core::telemetry::RacingDataClient;
use pitwall_realtime_types::audio::Voice;

use crate::config::Config;
use crate::controller::SessionController;

#[derive(Parser)]
#[command(name = "pitwall", about = "Voice coach for sim racing, live over the Realtime API")]
struct Cli {
    /// Output voice for the coach
    #[arg(long)]
    voice: Option<String>,

    /// Capture device name (defaults to the system input)
    #[arg(long)]
    input_device: Option<String>,

    /// Playback device name (defaults to the system output)
    #[arg(long)]
    output_device: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Failed to load application configuration")?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let args = Cli::parse();

    if args.list_devices {
        println!(
            "Input devices:\n{}",
            pitwall_native_utils::device::get_available_inputs()?
        );
        println!(
            "Output devices:\n{}",
            pitwall_native_utils::device::get_available_outputs()?
        );
        return Ok(());
    }

    let voice = args
        .voice
        .as_deref()
        .map(|v| v.parse::<Voice>().unwrap_or(DEFAULT_COACH_VOICE))
        .unwrap_or(DEFAULT_COACH_VOICE);

    tracing::info!("Configuration loaded, starting the pitwall coach...");

    let provider = Box::new(RacingDataClient::new(config.telemetry_server_url.clone()));
    let controller = SessionController::new(config, voice, args.input_device, args.output_device);
    controller.run(provider).await
}

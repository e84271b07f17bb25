use std::{
    path::PathBuf,
    sync::mpsc::{self, Receiver},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{error, info};
use race_spotter::{
    AppConfig, EventDetectorState, Spotting, SpotterError,
    publisher::{EventSink, JsonLinesEventWriter, LogEventSink, QueuedEventSink},
    telemetry::{collect_telemetry, producer::ReplayTelemetryProducer},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON Lines telemetry recording through the spotter
    Replay {
        #[arg(short, long)]
        input: PathBuf,

        /// Write events as JSON Lines instead of logging them
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Track length in meters for samples that do not carry one
        #[arg(short, long)]
        track_length: Option<f32>,

        /// Reference car index for samples that do not carry one
        #[arg(short, long)]
        player_index: Option<usize>,

        /// Delay between frames, 0 replays as fast as possible
        #[arg(short, long)]
        refresh_ms: Option<u64>,

        /// Store the track length, reference car and refresh rate as new defaults
        #[arg(long)]
        save_config: bool,
    },
}

fn report_nearby_cars(spotting_rx: Receiver<Spotting>, radius_m: f32) {
    for spotting in spotting_rx {
        for car in spotting.nearby(radius_m) {
            info!(
                "{} {:?} {:.1} m, closing at {:.1} m/s",
                car.driver_name, car.location, car.distance, car.relative_speed
            );
        }
    }
}

fn replay(
    input: &PathBuf,
    output: Option<PathBuf>,
    track_length: Option<f32>,
    player_index: Option<usize>,
    refresh_ms: Option<u64>,
    save_config: bool,
) -> Result<(), SpotterError> {
    let config = AppConfig::from_local_file()
        .unwrap_or_default()
        .with_overrides(track_length, player_index, refresh_ms);
    if save_config {
        config.save()?;
        info!("Saved config to {:?}", AppConfig::default_path());
    }

    let producer = ReplayTelemetryProducer::from_file(input)?
        .with_reference_defaults(config.track_length_m, config.player_car_index);
    let refresh_rate = Duration::from_millis(config.refresh_rate_ms);

    let inner: Box<dyn EventSink + Send> = match output {
        Some(path) => Box::new(JsonLinesEventWriter::create(path)?),
        None => Box::new(LogEventSink),
    };
    let (mut sink, sink_worker) = QueuedEventSink::spawn(config.event_queue_size, inner);

    let (spotting_tx, spotting_rx) = mpsc::channel::<Spotting>();
    let radius_m = config.spotter_radius_m;
    let spotting_worker = thread::spawn(move || report_nearby_cars(spotting_rx, radius_m));

    let mut state = EventDetectorState::new();
    let frames = collect_telemetry(
        producer,
        &mut state,
        &mut sink,
        Some(spotting_tx),
        refresh_rate,
    )?;

    drop(sink);
    let _ = sink_worker.join();
    let _ = spotting_worker.join();
    info!("Replayed {} frames", frames);
    Ok(())
}

fn main() {
    #[cfg(debug_assertions)]
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");
    match cli.command {
        Commands::Replay {
            input,
            output,
            track_length,
            player_index,
            refresh_ms,
            save_config,
        } => {
            if let Err(e) = replay(
                &input,
                output,
                track_length,
                player_index,
                refresh_ms,
                save_config,
            ) {
                error!("Error while replaying telemetry: {}", e);
                std::process::exit(1);
            }
        }
    };
}

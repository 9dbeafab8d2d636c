//! statesync-midi demo binary
//!
//! Binds a sketch state to a MIDI control surface and logs every change.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use statesync_midi::config::AppConfig;
use statesync_midi::device::{self, MidiDevice, MidiSurface};
use statesync_midi::{
    cli, MidiStateBinding, PropertyRegistry, PropertyValue, StateCurator, StateMetadata,
    StateProducer, StateType,
};

/// Drive a sketch's parameters from a MIDI control surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Start the interactive console
    #[arg(long)]
    repl: bool,
}

/// Parameters of the demo sketch
#[derive(Debug)]
struct Sketch {
    brightness: f64,
    zoom: f64,
    rotation: f64,
    invert: bool,
    label: String,
}

impl Default for Sketch {
    fn default() -> Self {
        Self {
            brightness: 0.8,
            zoom: 1.0,
            rotation: 0.0,
            invert: false,
            label: "sketch".to_string(),
        }
    }
}

impl StateType for Sketch {
    fn declare(props: &mut PropertyRegistry<Self>) {
        props
            .double("brightness", |s| s.brightness, |s, v| s.brightness = v)
            .range(0.0, 1.0);
        props
            .double("zoom", |s| s.zoom, |s, v| s.zoom = v)
            .range(0.1, 10.0);
        props
            .double("rotation", |s| s.rotation, |s, v| s.rotation = v)
            .range(-180.0, 180.0);
        props
            .boolean("invert", |s| s.invert, |s, v| s.invert = v)
            .animatable(false);
        props
            .string("label", |s| s.label.clone(), |s, v| s.label = v)
            .animatable(false);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    if args.list_ports {
        device::print_ports()?;
        return Ok(());
    }

    info!("Configuration file: {}", args.config);
    let config = AppConfig::load(&args.config).await?;
    let base_dir = Path::new(&args.config)
        .parent()
        .unwrap_or_else(|| Path::new("."));
    let mapping = config.control_mapping(base_dir).await?;
    info!("Loaded {} control mapping(s)", mapping.len());

    let metadata = StateMetadata::<Sketch>::derive()?;

    let binding = match MidiDevice::match_name(&config.midi.input_port, config.midi.output_port())? {
        Some(midi_device) => {
            let surface = Arc::new(MidiSurface::open(midi_device)?);
            MidiStateBinding::bind(surface, metadata.clone(), &mapping)?
        }
        None if config.midi.require_device => {
            anyhow::bail!("MIDI device '{}' not found", config.midi.input_port);
        }
        None => {
            warn!("Running without MIDI device '{}'", config.midi.input_port);
            MidiStateBinding::unbound(&config.midi.input_port, metadata.clone(), &mapping)?
        }
    };
    let binding = Arc::new(binding.with_channel(config.midi_channel()));

    let producers: Vec<Arc<dyn StateProducer<Sketch>>> = vec![binding.clone()];
    let curator = StateCurator::new(Sketch::default(), metadata, producers)
        .context("Failed to start state curator")?;
    curator.add_consumer(binding);
    curator.add_consumer(Arc::new(|name: &str, value: &PropertyValue| {
        info!("{} -> {}", name, value);
    }));

    if args.repl {
        let console = curator.clone();
        tokio::task::spawn_blocking(move || cli::run_repl(console)).await??;
    } else {
        info!("Listening for control changes, press Ctrl+C to exit");
        tokio::signal::ctrl_c()
            .await
            .context("Failed to install CTRL+C signal handler")?;
    }

    curator.with_state(|sketch| info!("Final state: {:?}", sketch));
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

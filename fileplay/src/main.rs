//! fileplay - command-line audio file player
//!
//! Drives one player instance from the default cpal output device. The
//! device callback plays the role of the host audio graph: it calls the
//! player's render callback once per block and interleaves the A/B pair
//! into the device's first two channels.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fileplay::audio::FileReader;
use fileplay::{
    file_tag, Error, EventKind, FileTag, NotificationTarget, PlayerRegistry, Renderer, SrcQuality, TomlConfig,
    TransportState,
};

/// Largest block handed to the render callback in one call; bigger device
/// buffers are rendered in several passes
const MAX_BLOCK_FRAMES: usize = 4096;

/// Command-line arguments for fileplay
#[derive(Parser, Debug)]
#[command(name = "fileplay")]
#[command(about = "Real-time audio file player")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "FILEPLAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a file on the default output device
    Play {
        path: PathBuf,

        /// Loop until interrupted
        #[arg(long = "loop")]
        looping: bool,

        /// Output gain (0..=2)
        #[arg(short, long, default_value_t = 1.0)]
        gain: f32,

        /// Start position in seconds
        #[arg(short, long, default_value_t = 0.0)]
        position: f32,

        /// Converter quality: name (sinc_best .. linear) or tier 0..=4
        #[arg(short, long)]
        quality: Option<SrcQuality>,

        /// Verbose streaming diagnostics
        #[arg(long)]
        debug: bool,
    },
    /// Print stream properties and tags of a file
    Info { path: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TomlConfig::load(path).context("Failed to load configuration")?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fileplay={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Play {
            path,
            looping,
            gain,
            position,
            quality,
            debug,
        } => {
            fileplay::enable_debug(debug);
            play(&config, &path, looping, gain, position, quality)
        }
        Command::Info { path } => print_info(&path),
    }
}

fn play(
    config: &TomlConfig,
    path: &Path,
    looping: bool,
    gain: f32,
    position: f32,
    quality: Option<SrcQuality>,
) -> Result<()> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No audio output device available"))?;
    info!(device_name = ?device.name().unwrap_or_else(|_| "Unknown".to_string()), "Selected audio device");

    let supported = device
        .default_output_config()
        .context("Failed to get default output config")?;
    info!(sample_rate = supported.sample_rate().0, channels = supported.channels(), "Audio config");

    let registry = PlayerRegistry::new(config.engine.clone());
    registry.set_host_sample_rate(supported.sample_rate().0);

    let handle = registry.instantiate()?;
    let player = registry
        .lookup(handle)
        .ok_or_else(|| anyhow!("Player {} vanished", handle))?;

    let target: Arc<dyn NotificationTarget> = Arc::new(|handle: usize, kind: EventKind, value: f32| {
        info!(handle, %kind, value, "Player changed");
    });
    player
        .load(path, Some(target))
        .with_context(|| format!("Failed to load {}", path.display()))?;

    player.set_gain(gain)?;
    if let Some(quality) = quality {
        player.set_src_quality(quality.tier() as u32)?;
    }
    player.enable_loop(looping)?;
    // Seeking also rebuilds the converter with the chosen quality
    player.set_position(position)?;

    let renderer = player
        .renderer()
        .ok_or_else(|| anyhow!("Player {} already has a renderer", handle))?;
    let stream = build_stream(&device, supported, renderer)?;
    stream.play().context("Failed to start cpal stream")?;

    player.start()?;
    info!(
        "Playing {} ({:.2}s, {} Hz, {} channels)",
        player.filename(),
        player.duration(),
        player.sample_rate(),
        player.channels()
    );

    while player.play_state() != TransportState::Stopped {
        std::thread::sleep(Duration::from_millis(100));
    }

    drop(stream);
    registry.destroy(handle);
    info!("Playback finished");
    Ok(())
}

fn build_stream(
    device: &cpal::Device,
    supported: cpal::SupportedStreamConfig,
    mut renderer: Renderer,
) -> Result<cpal::Stream> {
    if supported.sample_format() != cpal::SampleFormat::F32 {
        return Err(Error::AudioOutput(format!(
            "Unsupported sample format {:?}",
            supported.sample_format()
        ))
        .into());
    }
    let config: cpal::StreamConfig = supported.into();
    let channels = config.channels as usize;

    let mut out_a = vec![0.0f32; MAX_BLOCK_FRAMES];
    let mut out_b = vec![0.0f32; MAX_BLOCK_FRAMES];

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            for block in data.chunks_mut(MAX_BLOCK_FRAMES * channels) {
                let frames = block.len() / channels;
                renderer.process(&mut out_a[..frames], &mut out_b[..frames], &[]);

                for (i, frame) in block.chunks_exact_mut(channels).enumerate() {
                    frame.fill(0.0);
                    frame[0] = out_a[i];
                    if channels > 1 {
                        frame[1] = out_b[i];
                    }
                }
            }
        },
        |err| error!("Audio stream error: {}", err),
        None,
    )
    .map_err(|e| Error::AudioOutput(format!("Failed to build output stream: {}", e)))?;

    Ok(stream)
}

fn print_info(path: &Path) -> Result<()> {
    let reader = FileReader::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let info = reader.info();

    println!("File:        {}", path.display());
    println!("Duration:    {:.3}s", info.duration());
    println!("Sample rate: {} Hz", info.sample_rate);
    println!("Channels:    {}", info.channels);
    println!("Frames:      {}", info.frames);
    match info.format.bits_per_sample {
        Some(bits) => println!("Format:      {} ({} bit)", info.format.codec, bits),
        None => println!("Format:      {}", info.format.codec),
    }

    for tag in FileTag::ALL {
        let value = file_tag(path, tag);
        if !value.is_empty() {
            println!("{:<12} {}", format!("{}:", tag), value);
        }
    }
    Ok(())
}

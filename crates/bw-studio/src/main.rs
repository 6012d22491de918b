//! Brainwave Live - command-line host
//!
//! Usage:
//!   bw-studio track.wav                        - play, print meter lines
//!   bw-studio track.wav --preset fx.json       - with an effects preset
//!   bw-studio track.wav --render out.wav       - also write the processed output
//!   bw-studio track.wav --seconds 5 --json     - first 5 s, JSON meter lines

mod session;
mod wav;

use std::path::PathBuf;

use anyhow::{Context, Result};
use bw_core::{EffectsParams, LiveConfig};
use bw_live::MeterStats;
use clap::Parser;

use crate::session::{Session, SessionOptions};

#[derive(Parser)]
#[command(name = "bw-studio", about = "Live metering and effects over a WAV file")]
struct Cli {
    /// Input WAV file
    input: PathBuf,

    /// Stop after this many seconds
    #[arg(short, long)]
    seconds: Option<f64>,

    /// Session config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Effects preset (JSON); overrides the config's effects block
    #[arg(short, long)]
    preset: Option<PathBuf>,

    /// Write the processed output as 16-bit WAV (effects plus the metered
    /// dry signal)
    #[arg(short, long)]
    render: Option<PathBuf>,

    /// Print a meter line every K display frames
    #[arg(long, default_value_t = 30)]
    frames_every: u64,

    /// Meter lines as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LiveConfig::load(path).with_context(|| format!("config {}", path.display()))?,
        None => LiveConfig::default(),
    };
    let preset = match &cli.preset {
        Some(path) => {
            EffectsParams::load(path).with_context(|| format!("preset {}", path.display()))?
        }
        None => config.effects.clone(),
    };

    let clip = wav::read_mono(&cli.input)?;
    log::info!(
        "Loaded {}: {} samples, {} Hz, {} ch",
        cli.input.display(),
        clip.samples.len(),
        clip.sample_rate,
        clip.source_channels
    );
    let config = session::config_for_clip(config, clip.sample_rate)?;

    let mut session = Session::new(config, &preset, clip.samples);
    let options = SessionOptions {
        seconds: cli.seconds,
        frames_every: cli.frames_every,
        capture: cli.render.is_some(),
    };
    let json = cli.json;
    let report = session.run(&options, |t, stats| print_meter(t, stats, json))?;

    println!(
        "attach: {:?} after {} attempts, {} frames ({} failed), effects {}",
        report.attach_state,
        report.attempts,
        report.frames,
        report.frame_errors,
        if report.effects_built { "live" } else { "off" }
    );

    if let Some(path) = &cli.render {
        wav::write_pcm16(path, &report.rendered, clip.sample_rate)?;
        println!("rendered {} samples to {}", report.rendered.len(), path.display());
    }
    Ok(())
}

fn print_meter(t: f64, stats: &MeterStats, json: bool) {
    if json {
        match serde_json::to_string(stats) {
            Ok(line) => println!("{line}"),
            Err(e) => log::warn!("meter line not serializable: {}", e),
        }
        return;
    }
    println!(
        "{:7.2}s  rms {:6.1} dB ({:5.1}%)  peak {:6.1} dB ({:5.1}%)  dr {:5.1} dB  {}",
        t,
        stats.db,
        stats.rms_percent,
        stats.peak_db,
        stats.peak_percent,
        stats.dynamic_range,
        if stats.playing { "playing" } else { "paused" }
    );
}

//! chiptrack: play tones, melodies and WAV samples through the mixer, or
//! render a melody offline to a WAV file.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use chiptrack::audio::{AudioDevice, Engine, TrackId, CHANNELS};
use chiptrack::config::{ConfigError, EngineConfig};
use chiptrack::synth::Waveform;

/// How often the playback loop checks whether its track is done.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Parser)]
#[command(name = "chiptrack", version)]
#[command(about = "Chiptune tones, melodies and samples on a fixed track pool", long_about = None)]
struct Cli {
    /// Engine config file (default: ~/.chiptrack/audio.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a procedural tone
    Tone {
        /// sine, triangle, square, sawtooth, noise, binary-noise
        waveform: Waveform,
        /// Frequency in Hz
        freq: f32,
        #[arg(short, long, default_value = "1.0")]
        duration: f32,
        /// Waveform shape parameter (duty cycle, ramp peak, ...)
        #[arg(short, long)]
        timbre: Option<f32>,
        #[arg(short, long, default_value = "0.8")]
        volume: f32,
        /// -1.0 (left) to 1.0 (right)
        #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
        balance: f32,
    },
    /// Play melody text, e.g. "{w:sqr b:120} C4/4 E4/4 G4/2"
    Melody {
        text: String,
        #[arg(short, long, default_value = "0.8")]
        volume: f32,
        #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
        balance: f32,
    },
    /// Play a WAV file recorded at the engine sample rate
    Play {
        file: PathBuf,
        /// Repeat until interrupted
        #[arg(short, long = "loop")]
        looped: bool,
        /// Pitch shift in semitones (mono files only)
        #[arg(short, long, default_value = "0.0", allow_hyphen_values = true)]
        detune: f32,
        #[arg(short, long, default_value = "0.8")]
        volume: f32,
    },
    /// Render melody text to a 16-bit stereo WAV without an audio device
    Render {
        text: String,
        #[arg(short, long)]
        out: PathBuf,
        /// Stop after this many seconds even if the melody is still going
        #[arg(long, default_value = "600")]
        max_seconds: f32,
        #[arg(short, long, default_value = "0.8")]
        volume: f32,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Tone {
            waveform,
            freq,
            duration,
            timbre,
            volume,
            balance,
        } => {
            let device = AudioDevice::open(&config)?;
            let timbre = timbre.unwrap_or_else(|| waveform.default_timbre());
            let track = device
                .engine()
                .sound_with_timbre(waveform, freq, duration, timbre, volume, balance)?;
            wait_for(device.engine(), track)?;
            device.close();
        }
        Commands::Melody {
            text,
            volume,
            balance,
        } => {
            let device = AudioDevice::open(&config)?;
            let track = device.engine().melody(&text, volume, balance)?;
            wait_for(device.engine(), track)?;
            device.close();
        }
        Commands::Play {
            file,
            looped,
            detune,
            volume,
        } => {
            let device = AudioDevice::open(&config)?;
            let engine = device.engine();
            let sample = engine.upload_wav(BufReader::new(File::open(&file)?))?;
            let track = if looped {
                println!("looping {} (ctrl-c to stop)", file.display());
                engine.loop_sample(sample, volume, 0.0, detune)?
            } else {
                engine.replay(sample, volume, 0.0, detune)?
            };
            wait_for(engine, track)?;
            engine.release(sample)?;
            device.close();
        }
        Commands::Render {
            text,
            out,
            max_seconds,
            volume,
        } => {
            let engine = Engine::new(&config)?;
            let frames = render_melody(&engine, &text, volume, max_seconds, &out)?;
            println!(
                "wrote {} ({:.2}s)",
                out.display(),
                frames as f64 / engine.sample_rate() as f64
            );
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        Some(path) => EngineConfig::from_path(path),
        None => Ok(EngineConfig::load().unwrap_or_default()),
    }
}

/// Block until `track` finishes or the user presses ctrl-c.
fn wait_for(engine: &Engine, track: TrackId) -> Result<(), ctrlc::Error> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || r.store(false, Ordering::SeqCst))?;

    while running.load(Ordering::SeqCst) && engine.is_playing(track) {
        thread::sleep(POLL_INTERVAL);
        engine.reclaim();
    }
    if engine.is_playing(track) {
        // Short fade instead of a click.
        if let Err(e) = engine.fade_out(track, 0.05) {
            log::warn!("fade out failed: {e}");
        }
        thread::sleep(Duration::from_millis(60));
    }
    Ok(())
}

/// Render a melody chunk by chunk into a WAV file. Returns the frames written.
fn render_melody(
    engine: &Engine,
    text: &str,
    volume: f32,
    max_seconds: f32,
    out: &Path,
) -> Result<usize, Box<dyn std::error::Error>> {
    let track = engine.melody(text, volume, 0.0)?;
    let spec = hound::WavSpec {
        channels: CHANNELS as u16,
        sample_rate: engine.sample_rate(),
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(out, spec)?;

    let limit = (max_seconds.max(0.0) as f64 * engine.sample_rate() as f64) as usize;
    let mut chunk = vec![0i16; engine.chunk_size() * CHANNELS];
    let mut frames = 0;
    while engine.is_playing(track) && frames < limit {
        engine.render(&mut chunk);
        for &s in &chunk {
            writer.write_sample(s)?;
        }
        frames += engine.chunk_size();
        engine.reclaim();
    }
    writer.finalize()?;
    Ok(frames)
}

use clap::{Args, Parser, Subcommand};
use smf_song::engine::{EngineCommand, EngineUpdate, spawn_engine};
use smf_song::song::Song;
use smf_song::{MidirSink, MidirSource, PlaybackUpdate, PlayerConfig};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print header fields, tempo and decode warnings
    Info {
        /// Path to input MIDI file
        file: PathBuf,
    },
    /// Decode and re-encode, repairing terminators and time-zero order
    Normalize {
        input: PathBuf,
        output: PathBuf,
    },
    /// Play through a MIDI output, optionally recording from an input
    Play(PlayArgs),
}

#[derive(Args)]
struct PlayArgs {
    file: PathBuf,

    /// Player settings in RON; defaults are used if the file is missing
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record live input and save the result here when Enter is pressed
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Loop between two tick positions
    #[arg(long = "loop", num_args = 2, value_names = ["START", "END"])]
    loop_range: Option<Vec<u64>>,

    /// Metronome interval in quarter notes
    #[arg(short, long)]
    metronome: Option<f64>,
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Info { file } => print_info(&file),
        Command::Normalize { input, output } => normalize(&input, &output),
        Command::Play(args) => play(args),
    }
}

fn read_song(path: &Path) -> Result<Song, Box<dyn Error>> {
    let bytes = fs::read(path)?;
    let song = Song::decode(&bytes)?;
    for warning in song.warnings() {
        warn!("{}: {warning}", path.display());
    }
    Ok(song)
}

fn write_song(song: &mut Song, path: &Path) -> Result<(), Box<dyn Error>> {
    let bytes = song.encode()?;
    fs::write(path, &bytes)?;
    info!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

fn print_info(path: &Path) -> Result<(), Box<dyn Error>> {
    let song = read_song(path)?;
    let tempo = song.tempo(true);
    println!("format:    {}", song.format);
    println!("division:  {} ticks/qnote", song.division());
    if tempo < 0 {
        println!("tempo:     {} us/qnote (multiple tempo changes)", -tempo);
    } else {
        println!("tempo:     {tempo} us/qnote");
    }
    println!(
        "tracks:    {} declared, {} in use",
        song.declared_track_count,
        song.track_count()
    );
    println!("events:    {}", song.len());
    println!(
        "duration:  {} ticks, {:.2} qnotes, {:.2} s",
        song.duration_ticks(),
        song.duration_qnotes(),
        song.seconds_from_ticks(song.duration_ticks() as f64)
    );
    println!("warnings:  {}", song.warnings().len());
    Ok(())
}

fn normalize(input: &Path, output: &Path) -> Result<(), Box<dyn Error>> {
    let mut song = read_song(input)?;
    write_song(&mut song, output)
}

fn load_config(path: Option<&Path>) -> Result<PlayerConfig, Box<dyn Error>> {
    match path {
        Some(path) if path.exists() => Ok(PlayerConfig::load(path)?),
        Some(path) => {
            info!("{} not found, using default settings", path.display());
            Ok(PlayerConfig::default())
        }
        None => Ok(PlayerConfig::default()),
    }
}

fn play(args: PlayArgs) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_deref())?;
    let mut song = read_song(&args.file)?;
    song.combine();
    let song_end = song.duration_ticks() as f64;

    let sink = MidirSink::connect(config.output_port.as_deref())?;
    let source = match args.record {
        Some(_) => Some(MidirSource::connect(
            config.input_port.as_deref(),
            config.input_queue_capacity,
        )?),
        None => None,
    };
    let looping = args.loop_range.is_some();

    let engine = spawn_engine(&config, sink, source);
    engine.command_tx.send(EngineCommand::Load(song))?;
    if let Some([start, end]) = args.loop_range.as_deref() {
        engine.command_tx.send(EngineCommand::SetLoop {
            start: *start,
            end: *end,
        })?;
    }
    if let Some(rate) = args.metronome {
        engine.command_tx.send(EngineCommand::SetMetronome(rate))?;
    }
    if args.record.is_some() {
        engine.command_tx.send(EngineCommand::Record)?;
        info!("recording, press Enter to stop");
    } else {
        engine.command_tx.send(EngineCommand::Play)?;
        info!("playing, press Enter to stop");
    }

    let (enter_tx, enter_rx) = crossbeam::channel::bounded(1);
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        let _ = enter_tx.send(());
    });

    loop {
        crossbeam::select! {
            recv(engine.update_rx) -> update => match update? {
                EngineUpdate::Playback(PlaybackUpdate::PlayheadMoved(ticks))
                    if args.record.is_none() && !looping && ticks >= song_end =>
                {
                    break;
                }
                EngineUpdate::Stopped => return Ok(()),
                _ => {}
            },
            recv(enter_rx) -> _ => break,
        }
    }

    if let Some(path) = args.record.as_deref() {
        engine.command_tx.send(EngineCommand::TakeSong)?;
        for update in engine.update_rx.iter() {
            if let EngineUpdate::Song(mut song) = update {
                write_song(&mut song, path)?;
                break;
            }
        }
    }

    engine.command_tx.send(EngineCommand::Shutdown)?;
    for update in engine.update_rx.iter() {
        if matches!(update, EngineUpdate::Stopped) {
            break;
        }
    }
    if engine.thread.join().is_err() {
        warn!("engine thread panicked");
    }
    Ok(())
}

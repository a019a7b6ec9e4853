//! Aleator CLI - the `aleator` command.
//!
//! Thin glue around `aleator-core`: pick a MIDI destination, program
//! the demo sequence, and play until interrupted.

use aleator_core::{MidiNoteOutput, NoteOption, Sequence, Sequencer};
use anyhow::{Context, Result};
use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Aleator - probabilistic MIDI step sequencer
#[derive(Parser, Debug)]
#[command(name = "aleator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "A probabilistic MIDI step sequencer", long_about = None)]
struct Args {
    /// List MIDI destinations and exit
    #[arg(short, long)]
    list: bool,

    /// MIDI destination index (see --list)
    #[arg(short, long, default_value_t = 0)]
    port: usize,

    /// Tempo in beats per minute
    #[arg(short, long, default_value_t = 120.0)]
    bpm: f64,

    /// MIDI channel, 0..=15
    #[arg(short, long, default_value_t = 0)]
    channel: u8,

    /// Number of steps in the loop
    #[arg(short, long, default_value_t = 16)]
    steps: usize,

    /// Pin the random seed for a reproducible run
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let destinations = aleator_core::list_destinations().context("MIDI discovery failed")?;
    println!("found {} destinations", destinations.len());
    if args.list {
        for destination in &destinations {
            println!("  {}: {}", destination.index, destination.name);
        }
        return Ok(());
    }

    let output = MidiNoteOutput::connect(args.port)
        .with_context(|| format!("could not open MIDI destination {}", args.port))?;
    println!("selecting destination {} ({})", args.port, output.name());

    let mut sequencer = Sequencer::new(demo_sequence(args.steps));
    if let Some(seed) = args.seed {
        sequencer.reseed(seed);
    }
    sequencer.set_channel(args.channel)?;
    sequencer.set_bpm(args.bpm)?;

    sequencer
        .play(Box::new(output))
        .context("could not start playback")?;
    println!(
        "playing {} steps at {:.1} bpm - press Ctrl-C to stop",
        args.steps,
        sequencer.bpm()
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&interrupted))
            .context("could not install signal handler")?;
    }
    while !interrupted.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(50));
    }

    log::info!("interrupted, stopping playback");
    sequencer.stop();
    println!("stopped");
    Ok(())
}

/// The demo program: every step gambles between a wandering low note
/// and a rarer fixed pitch that always ratchets.
fn demo_sequence(steps: usize) -> Sequence {
    let mut sequence = Sequence::new(steps);
    for index in 0..steps {
        if let Some(step) = sequence.step_mut(index) {
            if let Some(option) = step.option_mut(0) {
                *option = NoteOption::default().with_weight(75).with_pitch_range(40, 60);
            }
            if let Some(option) = step.option_mut(1) {
                *option = NoteOption::default()
                    .with_weight(25)
                    .with_pitch_range(50, 50)
                    .with_ratchet_probability(100);
            }
        }
    }
    sequence
}

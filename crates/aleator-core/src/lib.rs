//! Aleator core - probabilistic MIDI step sequencer engine.
//!
//! A fixed-length loop of steps, each of which gambles between weighted
//! note options and rolls the winner's pitch, velocity, gate time and
//! ratchet/mute/tie flags, driven against a 24-PPQN clock:
//!
//! - **Chance** - the weighted-boolean and ranged draws
//! - **Sequence** - the note-option / step / sequence data model
//! - **Timing** - the 12-subticks-per-step clock arithmetic
//! - **Engine** - the Idle/Running playback state machine
//! - **Timer** - the injected clock collaborator and its thread-backed
//!   default
//! - **Output** - the note-on/note-off collaborator boundary
//!
//! # Architecture
//!
//! The [`Sequencer`] owns one [`Sequence`]. While running, a timer
//! thread fires the tick handler: twelve ticks span one step, the
//! current step's pre-resolved selection decides what to emit, and the
//! next step is resolved one subtick before the boundary so emission is
//! never blocked on randomness.
//!
//! # Feature Flags
//!
//! - `native` (default) - midir-backed MIDI destinations

pub mod chance;
pub mod engine;
pub mod error;
pub mod output;
pub mod sequence;
pub mod timer;
pub mod timing;

// Native-only module (requires system MIDI support)
#[cfg(feature = "native")]
pub mod midi;

// Re-export main types for convenience
pub use engine::{Sequencer, DEFAULT_BPM};
pub use error::{ConfigError, EngineError, TimerError};
pub use output::NoteOutput;
pub use sequence::{NoteOption, Sequence, Step, DEFAULT_OPTION_COUNT, DEFAULT_STEP_COUNT};
pub use timer::{ThreadTimer, TickFn, TickTimer, TimerHandle};
pub use timing::{tick_period, TickPosition, TICKS_PER_QUARTER, TICKS_PER_STEP};

// Native-only re-exports
#[cfg(feature = "native")]
pub use midi::{list_destinations, DestinationInfo, MidiError, MidiNoteOutput};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_constants() {
        assert_eq!(TICKS_PER_QUARTER, 24);
        assert_eq!(TICKS_PER_STEP, 12);
    }

    #[test]
    fn test_default_sequence_shape() {
        let sequence = Sequence::default();
        assert_eq!(sequence.len(), DEFAULT_STEP_COUNT);
        assert_eq!(
            sequence.step(0).unwrap().options().len(),
            DEFAULT_OPTION_COUNT
        );
    }

    #[test]
    fn test_sequencer_starts_idle() {
        let sequencer = Sequencer::new(Sequence::default());
        assert!(!sequencer.is_playing());
        assert_eq!(sequencer.tick_count(), 0);
        assert!((sequencer.bpm() - DEFAULT_BPM).abs() < f64::EPSILON);
    }
}

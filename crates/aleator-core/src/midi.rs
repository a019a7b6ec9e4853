//! MIDI output over midir (native only).
//!
//! Destination discovery plus a [`NoteOutput`] implementation that
//! writes raw channel-voice messages to a connected port. Transport
//! failures are logged and swallowed so the tick handler never observes
//! them.

use crate::output::NoteOutput;
use midir::{MidiOutput, MidiOutputConnection};
use thiserror::Error;

const CLIENT_NAME: &str = "aleator";

/// Errors raised while opening a MIDI destination.
#[derive(Error, Debug)]
pub enum MidiError {
    /// The platform MIDI service could not be initialized.
    #[error("failed to initialize MIDI output: {0}")]
    Init(String),

    /// The requested destination index does not exist.
    #[error("no MIDI destination at index {0}")]
    UnknownDestination(usize),

    /// Connecting to the destination failed.
    #[error("failed to connect MIDI destination: {0}")]
    Connect(String),
}

/// Name and position of one MIDI destination.
#[derive(Clone, Debug)]
pub struct DestinationInfo {
    /// Index to pass to [`MidiNoteOutput::connect`].
    pub index: usize,
    /// Display name reported by the platform.
    pub name: String,
}

/// List the MIDI destinations visible to this process.
pub fn list_destinations() -> Result<Vec<DestinationInfo>, MidiError> {
    let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
    Ok(midi_out
        .ports()
        .iter()
        .enumerate()
        .map(|(index, port)| DestinationInfo {
            index,
            name: midi_out
                .port_name(port)
                .unwrap_or_else(|_| format!("destination {index}")),
        })
        .collect())
}

/// A connected MIDI destination.
pub struct MidiNoteOutput {
    connection: MidiOutputConnection,
    name: String,
}

impl MidiNoteOutput {
    /// Connect to the destination at `index`, as reported by
    /// [`list_destinations`].
    pub fn connect(index: usize) -> Result<Self, MidiError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = midi_out.ports();
        let port = ports
            .get(index)
            .ok_or(MidiError::UnknownDestination(index))?;
        let name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| format!("destination {index}"));
        let connection = midi_out
            .connect(port, "aleator-out")
            .map_err(|e| MidiError::Connect(e.to_string()))?;
        log::info!("connected MIDI destination {index} ({name})");
        Ok(Self { connection, name })
    }

    /// Display name of the connected destination.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl NoteOutput for MidiNoteOutput {
    fn send_note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
        let message = [0x90 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F];
        if let Err(e) = self.connection.send(&message) {
            log::warn!("note-on send failed: {e}");
        }
    }

    fn send_note_off(&mut self, channel: u8, pitch: u8, velocity: u8) {
        let message = [0x80 | (channel & 0x0F), pitch & 0x7F, velocity & 0x7F];
        if let Err(e) = self.connection.send(&message) {
            log::warn!("note-off send failed: {e}");
        }
    }
}

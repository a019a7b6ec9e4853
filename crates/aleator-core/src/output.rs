//! Output collaborator boundary.
//!
//! The engine emits note events through this trait and never learns how
//! they reach the instrument. Sends are fire-and-forget: transport
//! failures are the collaborator's concern and must not propagate back
//! into the tick handler.

/// Destination for note-on/note-off events.
pub trait NoteOutput: Send {
    /// Emit a note-on.
    fn send_note_on(&mut self, channel: u8, pitch: u8, velocity: u8);

    /// Emit a note-off.
    fn send_note_off(&mut self, channel: u8, pitch: u8, velocity: u8);
}

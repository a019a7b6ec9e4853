//! Clock arithmetic for the fixed 24-PPQN grid.
//!
//! One step is an eighth note, twelve ticks long, so a quarter note is
//! 24 ticks - the classic MIDI clock resolution. The wall-clock length
//! of a tick is derived from tempo alone; everything else is integer
//! arithmetic on the tick counter.

use std::time::Duration;

/// Clock ticks per quarter note (MIDI clock resolution).
pub const TICKS_PER_QUARTER: u32 = 24;

/// Clock ticks per step; one step spans an eighth note.
pub const TICKS_PER_STEP: u32 = TICKS_PER_QUARTER / 2;

/// Lowest tempo accepted by the engine.
pub const MIN_BPM: f64 = 1.0;

/// Highest tempo accepted by the engine.
pub const MAX_BPM: f64 = 999.0;

/// Step/subtick coordinates of a tick within the cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPosition {
    /// Index of the step the tick falls in.
    pub step: usize,
    /// Offset within the step, `0..TICKS_PER_STEP`.
    pub subtick: u32,
}

/// Map an absolute tick count onto step/subtick coordinates.
///
/// `step_count` must be nonzero.
pub fn position_at(tick: u32, step_count: usize) -> TickPosition {
    TickPosition {
        step: (tick / TICKS_PER_STEP) as usize % step_count,
        subtick: tick % TICKS_PER_STEP,
    }
}

/// Total ticks in one pass of the loop.
pub fn cycle_ticks(step_count: usize) -> u32 {
    TICKS_PER_STEP * step_count as u32
}

/// Wall-clock duration of one tick at the given tempo.
pub fn tick_period(bpm: f64) -> Duration {
    let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    Duration::from_secs_f64(60.0 / bpm / f64::from(TICKS_PER_QUARTER))
}

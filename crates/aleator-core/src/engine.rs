//! The playback engine: an Idle/Running state machine that turns clock
//! ticks into note events.
//!
//! One controlling thread calls [`Sequencer::play`], [`Sequencer::stop`]
//! and [`Sequencer::set_bpm`]; the timer thread runs the tick handler.
//! All tick-side state lives behind one mutex, and stopping cancels the
//! timer handle - which joins the timer thread - so no note event is
//! emitted after `stop` returns.
//!
//! Each tick maps the running tick count onto a step and a subtick
//! within it. A plain note goes on at subtick 0 and off at the subtick
//! its gate percent quantizes to; a ratcheted note ignores gate time and
//! plays the fixed four-hit pattern. At the last subtick of every step
//! the next step is resolved, so a selection is always ready before its
//! first subtick comes around.

use crate::error::{ConfigError, EngineError};
use crate::output::NoteOutput;
use crate::sequence::{NoteOption, Sequence};
use crate::timer::{ThreadTimer, TickTimer, TimerHandle};
use crate::timing::{self, TickPosition, TICKS_PER_STEP};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};

/// Default tempo in beats per minute.
pub const DEFAULT_BPM: f64 = 120.0;

/// Tick-side state, shared between the controller and the timer thread.
struct Playhead {
    sequence: Sequence,
    tick_count: u32,
    channel: u8,
    rng: StdRng,
    output: Option<Box<dyn NoteOutput>>,
}

/// Probabilistic step sequencer playback engine.
///
/// Owns one [`Sequence`] and, while running, a handle on the injected
/// timer collaborator. `play` and `stop` are idempotent; the engine is
/// reentrant and can be restarted after a stop.
pub struct Sequencer {
    playhead: Arc<Mutex<Playhead>>,
    timer: Box<dyn TickTimer>,
    handle: Option<Box<dyn TimerHandle>>,
    bpm: f64,
}

impl Sequencer {
    /// Create an idle sequencer over `sequence`, clocked by the default
    /// thread-backed timer.
    pub fn new(sequence: Sequence) -> Self {
        Self::with_timer(sequence, Box::new(ThreadTimer))
    }

    /// Create an idle sequencer clocked by an injected timer.
    pub fn with_timer(sequence: Sequence, timer: Box<dyn TickTimer>) -> Self {
        Self {
            playhead: Arc::new(Mutex::new(Playhead {
                sequence,
                tick_count: 0,
                channel: 0,
                rng: StdRng::from_os_rng(),
                output: None,
            })),
            timer,
            handle: None,
            bpm: DEFAULT_BPM,
        }
    }

    /// Pin the RNG so the run is reproducible. Intended for tests and
    /// regenerable performances.
    pub fn reseed(&mut self, seed: u64) {
        self.playhead.lock().unwrap().rng = StdRng::seed_from_u64(seed);
    }

    /// Set the MIDI channel used for every emitted event.
    pub fn set_channel(&mut self, channel: u8) -> Result<(), ConfigError> {
        if channel > 15 {
            return Err(ConfigError::ChannelOutOfRange { value: channel });
        }
        self.playhead.lock().unwrap().channel = channel;
        Ok(())
    }

    /// Current tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change the tempo, clamped to the supported range.
    ///
    /// While running this reprograms the timer period in place: the tick
    /// count and step position are untouched, only the rate changes.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), EngineError> {
        let bpm = bpm.clamp(timing::MIN_BPM, timing::MAX_BPM);
        self.bpm = bpm;
        if let Some(handle) = self.handle.as_mut() {
            handle.reprogram(timing::tick_period(bpm))?;
            log::debug!("tempo changed to {bpm:.1} bpm");
        }
        Ok(())
    }

    /// Whether the engine is in the Running state.
    pub fn is_playing(&self) -> bool {
        self.handle.is_some()
    }

    /// Ticks elapsed since playback started, wrapped at the cycle length.
    pub fn tick_count(&self) -> u32 {
        self.playhead.lock().unwrap().tick_count
    }

    /// Step/subtick coordinates of the current tick.
    pub fn position(&self) -> TickPosition {
        let playhead = self.playhead.lock().unwrap();
        timing::position_at(playhead.tick_count, playhead.sequence.len().max(1))
    }

    /// Reconfigure the sequence. The edit runs under the playback lock,
    /// so it never interleaves with a tick.
    pub fn edit_sequence<F, R>(&mut self, edit: F) -> R
    where
        F: FnOnce(&mut Sequence) -> R,
    {
        edit(&mut self.playhead.lock().unwrap().sequence)
    }

    /// Start playback, emitting through `output`.
    ///
    /// Validates the sequence, rewinds to tick zero, resolves step 0 so
    /// the first tick has a ready selection, then arms the timer. A
    /// `play` while already running is a no-op. On any failure the
    /// engine stays idle and nothing has been emitted.
    pub fn play(&mut self, output: Box<dyn NoteOutput>) -> Result<(), EngineError> {
        if self.handle.is_some() {
            log::warn!("play ignored: sequencer is already running");
            return Ok(());
        }

        {
            let mut guard = self.playhead.lock().unwrap();
            let playhead = &mut *guard;
            playhead.sequence.validate()?;
            playhead.tick_count = 0;
            playhead.sequence.resolve_step(0, &mut playhead.rng);
            playhead.output = Some(output);
        }

        let playhead = Arc::clone(&self.playhead);
        let tick = Box::new(move || {
            let mut guard = playhead.lock().unwrap();
            advance(&mut guard);
        });

        match self.timer.start(timing::tick_period(self.bpm), tick) {
            Ok(handle) => {
                self.handle = Some(handle);
                log::debug!("playback started at {:.1} bpm", self.bpm);
                Ok(())
            }
            Err(e) => {
                self.playhead.lock().unwrap().output = None;
                Err(EngineError::Timer(e))
            }
        }
    }

    /// Stop playback.
    ///
    /// Blocks until any in-flight tick has finished, so no note event is
    /// emitted after this returns. A `stop` while idle is a no-op.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            log::debug!("stop ignored: sequencer is idle");
            return;
        };
        handle.cancel();
        self.playhead.lock().unwrap().output = None;
        log::debug!("playback stopped");
    }
}

/// One clock tick: emit for the current step, look ahead at the step
/// boundary, advance and wrap the tick counter.
fn advance(playhead: &mut Playhead) {
    let step_count = playhead.sequence.len();
    if step_count == 0 {
        return;
    }

    let TickPosition { step, subtick } = timing::position_at(playhead.tick_count, step_count);

    if let (Some(option), Some(output)) = (
        playhead.sequence.selected(step).copied(),
        playhead.output.as_deref_mut(),
    ) {
        emit(output, playhead.channel, &option, subtick);
    }

    // resolve the next step one subtick early so its selection is ready
    // before it becomes current
    if subtick == TICKS_PER_STEP - 1 {
        let next = (step + 1) % step_count;
        playhead.sequence.resolve_step(next, &mut playhead.rng);
    }

    playhead.tick_count = (playhead.tick_count + 1) % timing::cycle_ticks(step_count);
}

fn emit(output: &mut dyn NoteOutput, channel: u8, option: &NoteOption, subtick: u32) {
    if option.ratchet_active {
        // four hits: on every third subtick, each released two later
        match subtick {
            0 | 3 | 6 | 9 => output.send_note_on(channel, option.pitch, option.velocity),
            2 | 5 | 8 | 11 => output.send_note_off(channel, option.pitch, option.velocity),
            _ => {}
        }
    } else {
        if subtick == 0 {
            output.send_note_on(channel, option.pitch, option.velocity);
        }
        if subtick == option.gate_off_subtick() {
            output.send_note_off(channel, option.pitch, option.velocity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimerError;
    use crate::sequence::NoteOption;
    use crate::timer::TickFn;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum Event {
        On(u8, u8, u8),
        Off(u8, u8, u8),
    }

    #[derive(Clone, Default)]
    struct RecordingOutput(Arc<Mutex<Vec<Event>>>);

    impl RecordingOutput {
        fn events(&self) -> Vec<Event> {
            self.0.lock().unwrap().clone()
        }

        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    impl NoteOutput for RecordingOutput {
        fn send_note_on(&mut self, channel: u8, pitch: u8, velocity: u8) {
            self.0.lock().unwrap().push(Event::On(channel, pitch, velocity));
        }

        fn send_note_off(&mut self, channel: u8, pitch: u8, velocity: u8) {
            self.0.lock().unwrap().push(Event::Off(channel, pitch, velocity));
        }
    }

    /// Timer that only ticks when the test fires it by hand.
    #[derive(Clone, Default)]
    struct ManualTimer {
        tick: Arc<Mutex<Option<TickFn>>>,
        starts: Arc<AtomicU32>,
        reprograms: Arc<AtomicU32>,
    }

    impl ManualTimer {
        fn fire(&self) {
            let mut tick = self.tick.lock().unwrap();
            if let Some(tick) = tick.as_mut() {
                tick();
            }
        }

        fn fire_n(&self, n: usize) {
            for _ in 0..n {
                self.fire();
            }
        }
    }

    impl TickTimer for ManualTimer {
        fn start(&self, _period: Duration, tick: TickFn) -> Result<Box<dyn TimerHandle>, TimerError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            *self.tick.lock().unwrap() = Some(tick);
            Ok(Box::new(ManualHandle {
                tick: Arc::clone(&self.tick),
                reprograms: Arc::clone(&self.reprograms),
            }))
        }
    }

    struct ManualHandle {
        tick: Arc<Mutex<Option<TickFn>>>,
        reprograms: Arc<AtomicU32>,
    }

    impl TimerHandle for ManualHandle {
        fn reprogram(&mut self, _period: Duration) -> Result<(), TimerError> {
            self.reprograms.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn cancel(self: Box<Self>) {
            *self.tick.lock().unwrap() = None;
        }
    }

    /// Timer whose start always fails.
    struct BrokenTimer;

    impl TickTimer for BrokenTimer {
        fn start(&self, _period: Duration, _tick: TickFn) -> Result<Box<dyn TimerHandle>, TimerError> {
            Err(TimerError::Arm("no timer backend".into()))
        }
    }

    fn fixed_option(pitch: u8, velocity: u8, gate: i8) -> NoteOption {
        NoteOption::default()
            .with_pitch_range(pitch, pitch)
            .with_velocity_range(velocity, velocity)
            .with_gate_time_range(gate, gate)
    }

    fn silent_step() -> NoteOption {
        NoteOption::default().with_weight(0)
    }

    /// A two-step sequence: step 0 forced to `option`, step 1 silent.
    fn one_note_sequence(option: NoteOption) -> Sequence {
        let mut sequence = Sequence::new(2);
        for index in 0..2 {
            let step = sequence.step_mut(index).unwrap();
            *step.option_mut(0).unwrap() = silent_step();
            *step.option_mut(1).unwrap() = silent_step();
        }
        *sequence.step_mut(0).unwrap().option_mut(0).unwrap() = option;
        sequence
    }

    fn manual_sequencer(sequence: Sequence) -> (Sequencer, ManualTimer) {
        let timer = ManualTimer::default();
        let mut sequencer = Sequencer::with_timer(sequence, Box::new(timer.clone()));
        sequencer.reseed(42);
        (sequencer, timer)
    }

    #[test]
    fn test_gate_time_maps_onto_subticks() {
        let (mut sequencer, timer) =
            manual_sequencer(one_note_sequence(fixed_option(60, 100, 84)));
        let output = RecordingOutput::default();
        sequencer.play(Box::new(output.clone())).unwrap();

        timer.fire();
        assert_eq!(output.events(), vec![Event::On(0, 60, 100)]);

        // subticks 1..=6: nothing
        timer.fire_n(6);
        assert_eq!(output.len(), 1);

        // subtick 7 = 84 / 12
        timer.fire();
        assert_eq!(
            output.events(),
            vec![Event::On(0, 60, 100), Event::Off(0, 60, 100)]
        );

        timer.fire_n(4);
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_ratchet_pattern_emission() {
        let option = fixed_option(50, 100, 50).with_ratchet_probability(100);
        let (mut sequencer, timer) = manual_sequencer(one_note_sequence(option));
        let output = RecordingOutput::default();
        sequencer.play(Box::new(output.clone())).unwrap();

        // event count after each subtick of the step
        let expected_counts = [1, 1, 2, 3, 3, 4, 5, 5, 6, 7, 7, 8];
        for (subtick, expected) in expected_counts.iter().enumerate() {
            timer.fire();
            assert_eq!(output.len(), *expected, "after subtick {subtick}");
        }

        let events = output.events();
        let ons = events.iter().filter(|e| matches!(e, Event::On(..))).count();
        let offs = events.iter().filter(|e| matches!(e, Event::Off(..))).count();
        assert_eq!((ons, offs), (4, 4));
        assert!(events.iter().all(|e| matches!(
            e,
            Event::On(0, 50, 100) | Event::Off(0, 50, 100)
        )));
    }

    #[test]
    fn test_silent_step_emits_nothing() {
        let mut sequence = Sequence::new(2);
        for index in 0..2 {
            let step = sequence.step_mut(index).unwrap();
            *step.option_mut(0).unwrap() = silent_step();
            *step.option_mut(1).unwrap() = silent_step();
        }
        let (mut sequencer, timer) = manual_sequencer(sequence);
        let output = RecordingOutput::default();
        sequencer.play(Box::new(output.clone())).unwrap();

        timer.fire_n(48);
        assert_eq!(output.len(), 0);
    }

    #[test]
    fn test_tick_count_wraps_at_cycle_end() {
        let mut sequence = Sequence::new(16);
        for index in 0..16 {
            let step = sequence.step_mut(index).unwrap();
            *step.option_mut(0).unwrap() = silent_step();
            *step.option_mut(1).unwrap() = silent_step();
        }
        let (mut sequencer, timer) = manual_sequencer(sequence);
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();

        timer.fire_n(191);
        assert_eq!(sequencer.tick_count(), 191);
        assert_eq!(sequencer.position(), TickPosition { step: 15, subtick: 11 });

        timer.fire();
        assert_eq!(sequencer.tick_count(), 0);
        assert_eq!(sequencer.position(), TickPosition { step: 0, subtick: 0 });
    }

    #[test]
    fn test_lookahead_resolves_next_step_before_boundary() {
        let (mut sequencer, timer) = manual_sequencer(Sequence::new(4));
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();

        // step 0 was resolved synchronously by play
        assert!(sequencer.edit_sequence(|s| s.step(0).unwrap().selected_index().is_some()));
        assert!(sequencer.edit_sequence(|s| s.step(1).unwrap().selected_index().is_none()));

        // subticks 0..=10 leave the next step untouched
        timer.fire_n(11);
        assert!(sequencer.edit_sequence(|s| s.step(1).unwrap().selected_index().is_none()));

        // subtick 11 resolves it, before step 1 becomes current
        timer.fire();
        assert!(sequencer.edit_sequence(|s| s.step(1).unwrap().selected_index().is_some()));
        assert_eq!(sequencer.position(), TickPosition { step: 1, subtick: 0 });
    }

    #[test]
    fn test_play_while_running_is_noop() {
        let (mut sequencer, timer) = manual_sequencer(Sequence::new(2));
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();

        assert!(sequencer.is_playing());
        assert_eq!(timer.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_is_idempotent_and_restartable() {
        let (mut sequencer, timer) = manual_sequencer(Sequence::new(2));
        sequencer.stop();
        assert!(!sequencer.is_playing());

        sequencer.play(Box::new(RecordingOutput::default())).unwrap();
        timer.fire_n(5);
        sequencer.stop();
        sequencer.stop();
        assert!(!sequencer.is_playing());

        // restart rewinds to tick zero
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();
        assert_eq!(sequencer.tick_count(), 0);
        assert!(sequencer.is_playing());
    }

    #[test]
    fn test_play_rejects_invalid_configuration() {
        let mut sequence = Sequence::new(2);
        sequence.step_mut(0).unwrap().option_mut(0).unwrap().pitch_high = 200;
        let (mut sequencer, _timer) = manual_sequencer(sequence);

        let result = sequencer.play(Box::new(RecordingOutput::default()));
        assert!(matches!(
            result,
            Err(EngineError::Config(ConfigError::PitchOutOfRange { value: 200 }))
        ));
        assert!(!sequencer.is_playing());
    }

    #[test]
    fn test_timer_failure_leaves_engine_idle() {
        let mut sequencer = Sequencer::with_timer(Sequence::new(2), Box::new(BrokenTimer));
        let output = RecordingOutput::default();

        let result = sequencer.play(Box::new(output.clone()));
        assert!(matches!(result, Err(EngineError::Timer(_))));
        assert!(!sequencer.is_playing());
        assert_eq!(output.len(), 0);
    }

    #[test]
    fn test_set_bpm_keeps_phase_while_running() {
        let (mut sequencer, timer) = manual_sequencer(Sequence::new(2));
        sequencer.play(Box::new(RecordingOutput::default())).unwrap();
        timer.fire_n(5);

        sequencer.set_bpm(90.0).unwrap();
        assert_eq!(sequencer.tick_count(), 5);
        assert_eq!(timer.reprograms.load(Ordering::SeqCst), 1);
        assert!((sequencer.bpm() - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_bpm_clamps_while_idle() {
        let (mut sequencer, timer) = manual_sequencer(Sequence::new(2));
        sequencer.set_bpm(0.0).unwrap();
        assert!((sequencer.bpm() - timing::MIN_BPM).abs() < f64::EPSILON);
        assert_eq!(timer.reprograms.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_channel_is_validated_and_used() {
        let (mut sequencer, timer) =
            manual_sequencer(one_note_sequence(fixed_option(60, 100, 50)));
        assert!(sequencer.set_channel(16).is_err());
        sequencer.set_channel(9).unwrap();

        let output = RecordingOutput::default();
        sequencer.play(Box::new(output.clone())).unwrap();
        timer.fire();
        assert_eq!(output.events(), vec![Event::On(9, 60, 100)]);
    }

    /// Output that parks its first note-on so the test can race a stop
    /// against an in-flight tick.
    struct BlockingOutput {
        rendezvous: Arc<Barrier>,
        finished: Arc<AtomicBool>,
        blocked_once: bool,
    }

    impl NoteOutput for BlockingOutput {
        fn send_note_on(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {
            if !self.blocked_once {
                self.blocked_once = true;
                self.rendezvous.wait();
                thread::sleep(Duration::from_millis(40));
                self.finished.store(true, Ordering::SeqCst);
            }
        }

        fn send_note_off(&mut self, _channel: u8, _pitch: u8, _velocity: u8) {}
    }

    #[test]
    fn test_stop_drains_in_flight_tick() {
        let _ = env_logger::builder().is_test(true).try_init();

        let rendezvous = Arc::new(Barrier::new(2));
        let finished = Arc::new(AtomicBool::new(false));
        let output = BlockingOutput {
            rendezvous: Arc::clone(&rendezvous),
            finished: Arc::clone(&finished),
            blocked_once: false,
        };

        let mut sequencer = Sequencer::new(one_note_sequence(fixed_option(60, 100, 50)));
        sequencer.reseed(1);
        sequencer.set_bpm(999.0).unwrap();
        sequencer.play(Box::new(output)).unwrap();

        // the first tick is now inside send_note_on
        rendezvous.wait();
        sequencer.stop();
        assert!(finished.load(Ordering::SeqCst));
        assert!(!sequencer.is_playing());
    }
}

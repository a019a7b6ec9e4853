//! Step and note-option data model.
//!
//! A [`Sequence`] is a fixed loop of [`Step`]s. Each step holds a small
//! set of weighted [`NoteOption`]s; once per cycle the step is resolved,
//! picking at most one option by weighted lottery and rolling that
//! option's randomized pitch, velocity, gate time and ratchet/mute/tie
//! flags. Silence is a legitimate outcome: when the weights sum below
//! 100 the roll can land in the uncovered remainder and the step
//! selects nothing.

use crate::chance::{draw_bool, draw_ranged};
use crate::error::ConfigError;
use crate::timing::TICKS_PER_STEP;
use rand::Rng;

/// Number of steps in the reference sequence.
pub const DEFAULT_STEP_COUNT: usize = 16;

/// Number of note options each step starts with.
pub const DEFAULT_OPTION_COUNT: usize = 2;

/// One weighted candidate outcome for a step.
///
/// The `*_low`/`*_high` pairs are draw ranges; `pitch`, `velocity`,
/// `gate_time_percent` and the three `*_active` flags hold whatever the
/// most recent resolution rolled. Range bounds may be given in either
/// order - the draw treats them as an unordered pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoteOption {
    /// Relative selection weight within the step, 0..=100. Weights in a
    /// step need not sum to 100; any uncovered remainder is silence.
    pub weight: u8,

    /// Pitch rolled by the last resolution.
    pub pitch: u8,
    pub pitch_low: u8,
    pub pitch_high: u8,

    /// Velocity rolled by the last resolution.
    pub velocity: u8,
    pub velocity_low: u8,
    pub velocity_high: u8,

    /// Gate length as percent of the step duration, rolled by the last
    /// resolution. Ignored while the ratchet flag is set.
    pub gate_time_percent: i8,
    pub gate_time_low: i8,
    pub gate_time_high: i8,

    /// Whether the last resolution armed the four-hit ratchet.
    pub ratchet_active: bool,
    pub ratchet_probability: u8,

    /// Whether the last resolution muted the step.
    pub mute_active: bool,
    pub mute_probability: u8,

    /// Whether the last resolution tied the step to the next.
    pub tie_active: bool,
    pub tie_probability: u8,
}

impl Default for NoteOption {
    fn default() -> Self {
        Self {
            weight: 100,
            pitch: 64,
            pitch_low: 64,
            pitch_high: 64,
            velocity: 100,
            velocity_low: 100,
            velocity_high: 100,
            gate_time_percent: 50,
            gate_time_low: 50,
            gate_time_high: 50,
            ratchet_active: false,
            ratchet_probability: 0,
            mute_active: false,
            mute_probability: 0,
            tie_active: false,
            tie_probability: 0,
        }
    }
}

impl NoteOption {
    /// Set the selection weight.
    pub fn with_weight(mut self, weight: u8) -> Self {
        self.weight = weight;
        self
    }

    /// Set the pitch draw range.
    pub fn with_pitch_range(mut self, low: u8, high: u8) -> Self {
        self.pitch_low = low;
        self.pitch_high = high;
        self
    }

    /// Set the velocity draw range.
    pub fn with_velocity_range(mut self, low: u8, high: u8) -> Self {
        self.velocity_low = low;
        self.velocity_high = high;
        self
    }

    /// Set the gate-time draw range in percent of the step duration.
    pub fn with_gate_time_range(mut self, low: i8, high: i8) -> Self {
        self.gate_time_low = low;
        self.gate_time_high = high;
        self
    }

    /// Set the ratchet probability in percent.
    pub fn with_ratchet_probability(mut self, percent: u8) -> Self {
        self.ratchet_probability = percent;
        self
    }

    /// Set the mute probability in percent.
    pub fn with_mute_probability(mut self, percent: u8) -> Self {
        self.mute_probability = percent;
        self
    }

    /// Set the tie probability in percent.
    pub fn with_tie_probability(mut self, percent: u8) -> Self {
        self.tie_probability = percent;
        self
    }

    /// Subtick at which a non-ratcheted note releases: the 0..=100 gate
    /// percent quantized onto the twelve subtick slots.
    pub fn gate_off_subtick(&self) -> u32 {
        self.gate_time_percent.max(0) as u32 / TICKS_PER_STEP
    }

    /// Check every bound against its value domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for value in [self.pitch_low, self.pitch_high] {
            if value > 127 {
                return Err(ConfigError::PitchOutOfRange { value });
            }
        }
        for value in [self.velocity_low, self.velocity_high] {
            if value > 127 {
                return Err(ConfigError::VelocityOutOfRange { value });
            }
        }
        for value in [self.gate_time_low, self.gate_time_high] {
            if !(0..=100).contains(&value) {
                return Err(ConfigError::GateTimeOutOfRange { value });
            }
        }
        for (name, value) in [
            ("weight", self.weight),
            ("ratchet probability", self.ratchet_probability),
            ("mute probability", self.mute_probability),
            ("tie probability", self.tie_probability),
        ] {
            if value > 100 {
                return Err(ConfigError::PercentOutOfRange { name, value });
            }
        }
        Ok(())
    }

    /// Roll the randomized sub-fields. The order is fixed so a pinned
    /// seed reproduces the same stream.
    fn resolve<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.mute_active = draw_bool(rng, self.mute_probability);
        self.tie_active = draw_bool(rng, self.tie_probability);
        self.gate_time_percent = draw_ranged(rng, self.gate_time_low, self.gate_time_high);
        self.pitch = draw_ranged(rng, self.pitch_low, self.pitch_high);
        self.velocity = draw_ranged(rng, self.velocity_low, self.velocity_high);
        self.ratchet_active = draw_bool(rng, self.ratchet_probability);
    }
}

/// One slot in the sequence loop.
///
/// The selection is an index into the step's own option list, replaced
/// wholesale by every resolution.
#[derive(Clone, Debug)]
pub struct Step {
    options: Vec<NoteOption>,
    selected: Option<usize>,
}

impl Default for Step {
    fn default() -> Self {
        Self::new(DEFAULT_OPTION_COUNT)
    }
}

impl Step {
    /// Create a step with `option_count` default options.
    pub fn new(option_count: usize) -> Self {
        Self {
            options: vec![NoteOption::default(); option_count],
            selected: None,
        }
    }

    /// All options in stored (lottery) order.
    pub fn options(&self) -> &[NoteOption] {
        &self.options
    }

    /// Option at `index`, if present.
    pub fn option(&self, index: usize) -> Option<&NoteOption> {
        self.options.get(index)
    }

    /// Mutable option at `index`, if present.
    pub fn option_mut(&mut self, index: usize) -> Option<&mut NoteOption> {
        self.options.get_mut(index)
    }

    /// Append an option. Invalidates the current selection.
    pub fn push_option(&mut self, option: NoteOption) {
        self.options.push(option);
        self.selected = None;
    }

    /// The option chosen by the most recent resolution, or `None` for a
    /// silent step.
    pub fn selected(&self) -> Option<&NoteOption> {
        self.selected.and_then(|index| self.options.get(index))
    }

    /// Index of the selected option within the step.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Run one full resolution, replacing any prior selection.
    ///
    /// A single roll in 0..100 walks the options in stored order against
    /// their cumulative weights; the first option whose threshold covers
    /// the roll wins. If the weights leave the roll uncovered the step
    /// stays silent for this cycle. The winner's randomized sub-fields
    /// are then rolled in a fixed order: mute, tie, gate, pitch,
    /// velocity, ratchet.
    pub fn resolve<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.selected = None;

        let roll = u32::from(rng.random_range(0..100u8));
        let mut cumulative = 0u32;
        for (index, option) in self.options.iter().enumerate() {
            cumulative += u32::from(option.weight);
            if roll < cumulative {
                self.selected = Some(index);
                break;
            }
        }

        let Some(index) = self.selected else {
            return; // silence this cycle
        };
        self.options[index].resolve(rng);
    }

    /// Check every option against its value domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.options.is_empty() {
            return Err(ConfigError::EmptyStep);
        }
        self.options.iter().try_for_each(NoteOption::validate)
    }
}

/// A fixed-length ordered loop of steps.
#[derive(Clone, Debug)]
pub struct Sequence {
    steps: Vec<Step>,
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_COUNT)
    }
}

impl Sequence {
    /// Create a sequence of `step_count` default steps.
    pub fn new(step_count: usize) -> Self {
        Self {
            steps: vec![Step::default(); step_count],
        }
    }

    /// Number of steps in the loop.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the sequence has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All steps in loop order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step at `index`, if present.
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Mutable step at `index`, if present.
    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    /// Resolve the step at `index`. Out-of-range indices are ignored.
    pub fn resolve_step<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) {
        if let Some(step) = self.steps.get_mut(index) {
            step.resolve(rng);
        }
    }

    /// Selected option of the step at `index`, or `None` for a silent or
    /// unresolved step.
    pub fn selected(&self, index: usize) -> Option<&NoteOption> {
        self.steps.get(index).and_then(Step::selected)
    }

    /// Check the whole loop against its value domains.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.steps.is_empty() {
            return Err(ConfigError::EmptySequence);
        }
        self.steps.iter().try_for_each(Step::validate)
    }
}

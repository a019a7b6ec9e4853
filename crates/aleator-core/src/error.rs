//! Error types for the aleator-core crate.

use thiserror::Error;

/// Errors raised when a sequence or option is configured outside its
/// value domain.
///
/// Configuration is validated before playback starts, never inside the
/// tick handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A MIDI pitch bound is above 127.
    #[error("pitch {value} out of range 0..=127")]
    PitchOutOfRange { value: u8 },

    /// A MIDI velocity bound is above 127.
    #[error("velocity {value} out of range 0..=127")]
    VelocityOutOfRange { value: u8 },

    /// A gate-time bound is outside 0..=100 percent.
    #[error("gate time {value}% out of range 0..=100")]
    GateTimeOutOfRange { value: i8 },

    /// A weight or probability is above 100 percent.
    #[error("{name} {value} out of range 0..=100")]
    PercentOutOfRange { name: &'static str, value: u8 },

    /// A MIDI channel is above 15.
    #[error("channel {value} out of range 0..=15")]
    ChannelOutOfRange { value: u8 },

    /// A sequence was built with no steps.
    #[error("sequence must contain at least one step")]
    EmptySequence,

    /// A step was built with no note options.
    #[error("step must contain at least one note option")]
    EmptyStep,
}

/// Errors raised by a timer collaborator.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The timer could not be created or armed.
    #[error("failed to arm timer: {0}")]
    Arm(String),

    /// A zero tick period was requested.
    #[error("tick period must be non-zero")]
    ZeroPeriod,

    /// The timer worker is gone and no longer accepts commands.
    #[error("timer worker is gone")]
    Disconnected,
}

/// Errors surfaced by the playback engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The sequence failed configuration validation before playback.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The timer collaborator failed to start or reprogram.
    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Result type alias using EngineError.
pub type Result<T> = std::result::Result<T, EngineError>;

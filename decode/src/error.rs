use thiserror::Error;

/// Minimum number of level changes needed before UART timing inference has
/// anything to work with.
pub const MIN_TRANSITIONS: usize = 5;

/// Minimum number of clock samples needed before SPI inference has anything
/// to work with.
pub const MIN_CLOCK_SAMPLES: usize = 10;

/// Structural failures. These abort the whole analysis call; no partial
/// result is returned. Invalid settings are caught at construction, the
/// rest are raised by the inference/decode entry points.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("channel {0:?} not found in capture")]
    ChannelNotFound(String),

    #[error("only {got} level transitions; need at least 5 to estimate bit timing")]
    InsufficientTransitions { got: usize },

    #[error("no transition interval survived the plausible bit-time band; cannot estimate bit time")]
    CannotEstimateBitTime,

    #[error("channel has only {got} samples; not enough to decode")]
    InsufficientSamples { got: usize },

    #[error("chip-select channel never goes active")]
    NoActiveTransferFound,

    #[error("no clock edges inside the transfer window")]
    NoClockEdgesInWindow,
}

/// In-frame anomalies. Never fatal: they are recorded on the offending
/// decoded byte and the run continues. A single byte can carry several
/// (e.g. a bad start bit usually drags a parity error along with it).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid start bit")]
    InvalidStartBit,

    #[error("parity error")]
    ParityError,

    #[error("stop bit error")]
    StopBitError,

    #[error("incomplete byte")]
    IncompleteWord,

    #[error("no transitions (inactive clock)")]
    InactiveClock,

    #[error("{edges} clock edges but no sampled bits")]
    EdgeMismatch { edges: usize },
}

/// Render a tag list the way the UI and the exporter show it: empty string
/// for a clean byte, tags joined with " + " otherwise.
pub fn errors_text(errors: &[FrameError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(" + ")
}

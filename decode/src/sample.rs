use std::collections::HashMap;

use crate::error::DecodeError;

/// What the ingestion side hands us: channel name to ordered (time, value)
/// pairs. Timestamps are non-decreasing within a channel; nothing can be
/// assumed across channels without re-sampling.
pub type Capture = HashMap<String, Vec<(f64, f64)>>;

/// One logic-level sample. Time is in seconds.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub level: bool,
}

/// Rough shape of a raw channel, used by callers to decide which channels
/// to even offer for protocol decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignalClass {
    Digital,
    Analog,
}

/// Fraction of the observed full range a sample may sit away from a rail
/// and still count as "on" that rail. Heuristic, tunable.
const RAIL_BAND: f64 = 0.1;

/// Classify a raw channel as digital or analog. A channel is digital when
/// every sample sits within [`RAIL_BAND`] of either the lowest or highest
/// observed level, i.e. the waveform is two-valued up to rail noise.
/// Constant channels count as digital.
pub fn classify(raw: &[(f64, f64)]) -> SignalClass {
    let Some(&(_, first)) = raw.first() else {
        return SignalClass::Digital;
    };
    let (min, max) = raw.iter().fold((first, first), |(lo, hi), &(_, v)| {
        (lo.min(v), hi.max(v))
    });
    let range = max - min;
    if range == 0.0 {
        return SignalClass::Digital;
    }
    let band = range * RAIL_BAND;
    let two_valued = raw
        .iter()
        .all(|&(_, v)| v - min <= band || max - v <= band);
    if two_valued {
        SignalClass::Digital
    } else {
        SignalClass::Analog
    }
}

/// One channel's samples coerced to logic levels.
///
/// The value-to-bool threshold (> 0 means high) is a one-way, lossy step
/// and happens exactly once per channel per analysis, here.
#[derive(Clone, Debug)]
pub struct DigitalChannel {
    pub name: String,
    pub samples: Vec<Sample>,
}

impl DigitalChannel {
    pub fn from_capture(capture: &Capture, name: &str) -> Result<Self, DecodeError> {
        let raw = capture
            .get(name)
            .ok_or_else(|| DecodeError::ChannelNotFound(name.to_owned()))?;
        Ok(Self {
            name: name.to_owned(),
            samples: raw
                .iter()
                .map(|&(time, value)| Sample {
                    time,
                    level: value > 0.0,
                })
                .collect(),
        })
    }
}

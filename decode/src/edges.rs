//! Edge and segment extraction over a sample stream.
//!
//! Every consumer (parameter inference, both decoders) goes through these
//! two functions so there is exactly one definition of what a transition
//! is. The timestamp of a transition is the time of the first sample at
//! the *new* level.

use crate::sample::Sample;

/// A logic-level change between two adjacent samples. `from != to` always.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transition {
    pub time: f64,
    pub from: bool,
    pub to: bool,
}

/// A maximal run of constant level. Segments partition the sampled range:
/// contiguous, non-overlapping, covering first to last sample exactly once.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LevelSegment {
    pub start: f64,
    pub end: f64,
    pub level: bool,
}

impl LevelSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Lazy scan over adjacent sample pairs. Zero or one sample yields nothing.
/// The iterator is restartable: call again to scan again.
pub fn transitions(samples: &[Sample]) -> impl Iterator<Item = Transition> + '_ {
    samples.windows(2).filter_map(|pair| {
        (pair[0].level != pair[1].level).then(|| Transition {
            time: pair[1].time,
            from: pair[0].level,
            to: pair[1].level,
        })
    })
}

/// Same scan, accumulating runs instead of point changes. The final
/// segment always closes at the last sample's timestamp, even when no
/// trailing transition exists. Empty input gives an empty list (not an
/// error); a single sample gives one degenerate zero-length segment.
pub fn segments(samples: &[Sample]) -> Vec<LevelSegment> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut start = first.time;
    let mut level = first.level;
    for t in transitions(samples) {
        out.push(LevelSegment {
            start,
            end: t.time,
            level,
        });
        start = t.time;
        level = t.to;
    }
    // `first()` succeeded, so `last()` does too.
    out.push(LevelSegment {
        start,
        end: samples.last().unwrap().time,
        level,
    });
    out
}

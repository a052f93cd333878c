//! SPI: parameter inference and transfer decoding.
//!
//! Decoding is driven by the chip-select line: each CS-active (low)
//! segment is one transfer window, and words are clocked out of the
//! sampling edges inside it. Without a mapped CS the whole capture is
//! treated as a single window.

use log::{debug, info};
use tinyvec::TinyVec;

use crate::edges::{segments, transitions, Transition};
use crate::error::{DecodeError, FrameError, MIN_CLOCK_SAMPLES};
use crate::reader::{level_at, LevelReader};
use crate::sample::{Capture, DigitalChannel};
use crate::search::SearchRecord;

/// Which capture channels play which SPI roles. Clock and MOSI are
/// required; chip-select and MISO are optional. All names must reference
/// channels present in the capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpiRoles {
    pub clock: String,
    pub chip_select: Option<String>,
    pub mosi: String,
    pub miso: Option<String>,
}

/// Validated SPI parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpiSettings {
    cpol: bool,
    cpha: bool,
    bits_per_word: u8,
    msb_first: bool,
}

impl SpiSettings {
    pub fn new(cpol: bool, cpha: bool, bits_per_word: u8, msb_first: bool) -> Result<Self, DecodeError> {
        if bits_per_word == 0 || bits_per_word > 32 {
            return Err(DecodeError::InvalidSettings(format!(
                "bits per word must be 1..=32, got {bits_per_word}"
            )));
        }
        Ok(Self {
            cpol,
            cpha,
            bits_per_word,
            msb_first,
        })
    }

    pub fn cpol(&self) -> bool {
        self.cpol
    }

    pub fn cpha(&self) -> bool {
        self.cpha
    }

    pub fn bits_per_word(&self) -> u8 {
        self.bits_per_word
    }

    pub fn msb_first(&self) -> bool {
        self.msb_first
    }

    /// Data is latched on the rising edge for modes 0 and 3, falling for
    /// 1 and 2 (i.e. whenever CPOL == CPHA).
    pub fn samples_on_rising(&self) -> bool {
        self.cpol == self.cpha
    }
}

/// One decoded word, complete or not. MISO is present only when a MISO
/// channel is mapped.
#[derive(Clone, Debug, PartialEq)]
pub struct SpiWord {
    pub timestamp: f64,
    pub start: f64,
    pub end: f64,
    pub mosi: u32,
    pub miso: Option<u32>,
    pub errors: Vec<FrameError>,
}

impl SpiWord {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl SearchRecord for SpiWord {
    /// A position matches when either direction carries the expected value.
    fn value_matches(&self, expected: u8) -> bool {
        self.mosi == expected as u32 || self.miso == Some(expected as u32)
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Per-capture transfer accounting, computed in its own pass over the
/// windows. Reporting only; decoding never reads these.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpiStats {
    pub transfer_count: usize,
    pub avg_transfer_duration: f64,
    /// Mean gap between one CS deassertion and the next assertion.
    /// Zero with fewer than two windows.
    pub avg_cs_gap: f64,
    /// Mean delay from CS assertion to the first clock edge inside the
    /// window, over windows that have any.
    pub avg_first_edge_delay: f64,
}

impl SpiStats {
    fn compute(windows: &[(f64, f64)], clock_edges: &[Transition]) -> Self {
        let transfer_count = windows.len();
        let total_duration: f64 = windows.iter().map(|&(s, e)| e - s).sum();

        let mut gap_sum = 0.0;
        for pair in windows.windows(2) {
            gap_sum += pair[1].0 - pair[0].1;
        }

        let mut delay_sum = 0.0;
        let mut delay_count = 0usize;
        for &(start, end) in windows {
            if let Some(first) = clock_edges
                .iter()
                .find(|t| t.time > start && t.time < end)
            {
                delay_sum += first.time - start;
                delay_count += 1;
            }
        }

        Self {
            transfer_count,
            avg_transfer_duration: if transfer_count > 0 {
                total_duration / transfer_count as f64
            } else {
                0.0
            },
            avg_cs_gap: if transfer_count > 1 {
                gap_sum / (transfer_count - 1) as f64
            } else {
                0.0
            },
            avg_first_edge_delay: if delay_count > 0 {
                delay_sum / delay_count as f64
            } else {
                0.0
            },
        }
    }
}

/// Coarse word width from the number of clock edges in the first window.
/// Favours common widths over precision; breakpoints preserved verbatim
/// from the reference behaviour. Tunable.
fn word_width_from_edges(edges: usize) -> u8 {
    match edges {
        0..=4 => 4,
        5..=24 => 8,
        25..=32 => 16,
        _ => 8,
    }
}

/// A CPHA transfer's first edge arrives later than one half-bit into the
/// window; this is the multiplier on (window / word-width) that decides
/// "meaningfully later". Preserved verbatim; tunable.
const CPHA_DELAY_FACTOR: f64 = 1.5;

fn clock_channel(capture: &Capture, roles: &SpiRoles) -> Result<DigitalChannel, DecodeError> {
    let clock = DigitalChannel::from_capture(capture, &roles.clock)?;
    if clock.samples.len() < MIN_CLOCK_SAMPLES {
        return Err(DecodeError::InsufficientSamples {
            got: clock.samples.len(),
        });
    }
    Ok(clock)
}

/// Active transfer windows: the chip-select channel's low segments, or
/// the whole clock capture when no CS is mapped.
fn transfer_windows(
    capture: &Capture,
    roles: &SpiRoles,
    clock: &DigitalChannel,
) -> Result<Vec<(f64, f64)>, DecodeError> {
    match roles.chip_select.as_deref() {
        Some(name) => {
            let cs = DigitalChannel::from_capture(capture, name)?;
            let windows: Vec<(f64, f64)> = segments(&cs.samples)
                .iter()
                .filter(|seg| !seg.level)
                .map(|seg| (seg.start, seg.end))
                .collect();
            if windows.is_empty() {
                return Err(DecodeError::NoActiveTransferFound);
            }
            Ok(windows)
        }
        None => {
            // `clock_channel` guarantees samples exist.
            let first = clock.samples.first().unwrap().time;
            let last = clock.samples.last().unwrap().time;
            Ok(vec![(first, last)])
        }
    }
}

/// Recover CPOL, CPHA and word width from clock/chip-select timing.
///
/// The bit order cannot be observed from timing at all, so the inferred
/// settings default to the LSB-first packing the decoder uses.
pub fn infer(capture: &Capture, roles: &SpiRoles) -> Result<SpiSettings, DecodeError> {
    let clock = clock_channel(capture, roles)?;
    let (start, end) = transfer_windows(capture, roles, &clock)?[0];

    let edges: Vec<Transition> = transitions(&clock.samples)
        .filter(|t| t.time > start && t.time < end)
        .collect();
    if edges.is_empty() {
        return Err(DecodeError::NoClockEdgesInWindow);
    }

    let bits_per_word = word_width_from_edges(edges.len());
    let cpol = level_at(&clock.samples, start);
    let half_bit = (end - start) / bits_per_word as f64;
    let cpha = edges[0].time - start > CPHA_DELAY_FACTOR * half_bit;

    info!(
        "inferred SPI on {:?}: CPOL={} CPHA={} {} bits/word ({} edges in window)",
        roles.clock,
        cpol as u8,
        cpha as u8,
        bits_per_word,
        edges.len(),
    );

    SpiSettings::new(cpol, cpha, bits_per_word, false)
}

fn pack(bits: &[bool], bits_per_word: u8, msb_first: bool) -> u32 {
    bits.iter().enumerate().fold(0u32, |acc, (i, &b)| {
        if b {
            let shift = if msb_first {
                bits_per_word as usize - 1 - i
            } else {
                i
            };
            acc | 1 << shift
        } else {
            acc
        }
    })
}

fn data_channel(capture: &Capture, name: &str) -> Result<DigitalChannel, DecodeError> {
    let ch = DigitalChannel::from_capture(capture, name)?;
    if ch.samples.is_empty() {
        return Err(DecodeError::InsufficientSamples { got: 0 });
    }
    Ok(ch)
}

/// Decode every transfer window in the capture.
///
/// Windows that cannot produce data still produce exactly one word, with
/// the failure recorded as a tag, so nothing is silently dropped.
pub fn decode(
    capture: &Capture,
    roles: &SpiRoles,
    settings: &SpiSettings,
) -> Result<(Vec<SpiWord>, SpiStats), DecodeError> {
    let clock = clock_channel(capture, roles)?;
    let mosi = data_channel(capture, &roles.mosi)?;
    let miso = roles
        .miso
        .as_deref()
        .map(|name| data_channel(capture, name))
        .transpose()?;

    let windows = transfer_windows(capture, roles, &clock)?;
    let clock_edges: Vec<Transition> = transitions(&clock.samples).collect();

    let rising = settings.samples_on_rising();
    let bits_per_word = settings.bits_per_word() as usize;

    // Sampling times advance monotonically across windows, so one reader
    // per data line serves the whole capture.
    let mut mosi_reader = LevelReader::new(&mosi.samples);
    let mut miso_reader = miso.as_ref().map(|ch| LevelReader::new(&ch.samples));
    let has_miso = miso_reader.is_some();

    let mut words = Vec::new();

    for &(wstart, wend) in &windows {
        let window_edges: Vec<&Transition> = clock_edges
            .iter()
            .filter(|t| t.time > wstart && t.time < wend)
            .collect();

        if window_edges.is_empty() {
            words.push(SpiWord {
                timestamp: wstart,
                start: wstart,
                end: wend,
                mosi: 0,
                miso: has_miso.then_some(0),
                errors: vec![FrameError::InactiveClock],
            });
            continue;
        }

        let mut mosi_bits: TinyVec<[bool; 32]> = TinyVec::new();
        let mut miso_bits: TinyVec<[bool; 32]> = TinyVec::new();
        let mut word_start = None;
        let mut emitted = 0usize;

        for edge in window_edges.iter().filter(|t| t.to == rising) {
            if word_start.is_none() {
                word_start = Some(edge.time);
            }
            mosi_bits.push(mosi_reader.level_at(edge.time));
            if let Some(reader) = &mut miso_reader {
                miso_bits.push(reader.level_at(edge.time));
            }

            if mosi_bits.len() == bits_per_word {
                let start = word_start.unwrap();
                words.push(SpiWord {
                    timestamp: start,
                    start,
                    end: edge.time,
                    mosi: pack(&mosi_bits, settings.bits_per_word(), settings.msb_first()),
                    miso: has_miso
                        .then(|| pack(&miso_bits, settings.bits_per_word(), settings.msb_first())),
                    errors: Vec::new(),
                });
                mosi_bits.clear();
                miso_bits.clear();
                word_start = None;
                emitted += 1;
            }
        }

        if !mosi_bits.is_empty() {
            // The window closed mid-word; keep what was clocked in.
            let start = word_start.unwrap();
            words.push(SpiWord {
                timestamp: start,
                start,
                end: wend,
                mosi: pack(&mosi_bits, settings.bits_per_word(), settings.msb_first()),
                miso: has_miso
                    .then(|| pack(&miso_bits, settings.bits_per_word(), settings.msb_first())),
                errors: vec![FrameError::IncompleteWord],
            });
        } else if emitted == 0 {
            // Clock moved, but never through a sampling edge.
            words.push(SpiWord {
                timestamp: wstart,
                start: wstart,
                end: wend,
                mosi: 0,
                miso: has_miso.then_some(0),
                errors: vec![FrameError::EdgeMismatch {
                    edges: window_edges.len(),
                }],
            });
        }

        debug!(
            "window {wstart:.9}..{wend:.9}: {} edges, {emitted} complete words",
            window_edges.len()
        );
    }

    let stats = SpiStats::compute(&windows, &clock_edges);
    Ok((words, stats))
}

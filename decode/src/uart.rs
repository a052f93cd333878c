//! UART: parameter inference and frame decoding.
//!
//! Inference recovers baud rate, data bits, parity, stop bits and idle
//! polarity from nothing but the transition timing of one channel. Every
//! estimate is an independent majority/average vote over the same
//! transition set, so no single frame (or glitch) decides the result.
//!
//! Note that some configurations are indistinguishable on the wire: an
//! 8E1 stream whose bytes all have odd ones-counts reads equally well as
//! 8N2, and a general 8E1 stream as 9N1. The votes below resolve those
//! ties towards the no-parity interpretation, which decodes the same
//! frames at the same boundaries.

use log::{debug, info};

use crate::edges::{transitions, Transition};
use crate::error::{DecodeError, FrameError, MIN_TRANSITIONS};
use crate::reader::{level_at, LevelReader};
use crate::sample::{DigitalChannel, Sample};
use crate::search::SearchRecord;

/// Transition intervals outside this band are glitches or idle stretches,
/// not bit cells: 1 us (1 Mbaud) up to 10 ms (100 baud). Tunable.
const SHORTEST_BIT_TIME: f64 = 1.0e-6;
const LONGEST_BIT_TIME: f64 = 1.0e-2;

/// Cap on the number of frames the parity and stop-bit votes look at, to
/// bound inference cost on huge captures.
const MAX_VOTE_FRAMES: usize = 100;

/// Real frames use 1-2 stop bits; the counter never walks further than 3.
const MAX_STOP_BITS: u8 = 3;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Validated UART framing parameters. Construction is the only place
/// values are checked; invalid input is rejected, never clamped.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UartSettings {
    baud_rate: u32,
    data_bits: u8,
    parity: Parity,
    stop_bits: u8,
    idle_high: bool,
}

impl UartSettings {
    pub fn new(
        baud_rate: u32,
        data_bits: u8,
        parity: Parity,
        stop_bits: u8,
        idle_high: bool,
    ) -> Result<Self, DecodeError> {
        if baud_rate == 0 {
            return Err(DecodeError::InvalidSettings(
                "baud rate must be positive".to_owned(),
            ));
        }
        if !(5..=9).contains(&data_bits) {
            return Err(DecodeError::InvalidSettings(format!(
                "data bits must be 5..=9, got {data_bits}"
            )));
        }
        if stop_bits == 0 {
            return Err(DecodeError::InvalidSettings(
                "at least one stop bit is required".to_owned(),
            ));
        }
        Ok(Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
            idle_high,
        })
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn data_bits(&self) -> u8 {
        self.data_bits
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn stop_bits(&self) -> u8 {
        self.stop_bits
    }

    pub fn idle_high(&self) -> bool {
        self.idle_high
    }

    pub fn bit_time(&self) -> f64 {
        1.0 / self.baud_rate as f64
    }

    /// Total bits in one frame: start + data + parity + stop.
    pub fn frame_bits(&self) -> u32 {
        1 + self.data_bits as u32
            + if self.parity == Parity::None { 0 } else { 1 }
            + self.stop_bits as u32
    }
}

/// One decoded frame. Created once by the decoder, immutable afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct UartByte {
    pub timestamp: f64,
    pub start: f64,
    pub end: f64,
    pub channel: String,
    pub value: u8,
    pub errors: Vec<FrameError>,
}

impl UartByte {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

impl SearchRecord for UartByte {
    fn value_matches(&self, expected: u8) -> bool {
        self.value == expected
    }

    fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn timestamp(&self) -> f64 {
        self.timestamp
    }
}

/// Recover UART settings from one channel's transition timing.
pub fn infer(channel: &DigitalChannel) -> Result<UartSettings, DecodeError> {
    let samples = &channel.samples;
    let trans: Vec<_> = transitions(samples).collect();
    if trans.len() < MIN_TRANSITIONS {
        return Err(DecodeError::InsufficientTransitions { got: trans.len() });
    }

    let bit_time = estimate_bit_time(&trans)?;
    let baud_rate = (1.0 / bit_time).round() as u32;

    // Idle polarity: whichever level the majority of samples sits at.
    let highs = samples.iter().filter(|s| s.level).count();
    let idle = highs * 2 >= samples.len();

    // Candidate frame starts: every transition away from idle.
    let starts: Vec<f64> = trans
        .iter()
        .filter(|t| t.from == idle)
        .map(|t| t.time)
        .collect();

    let data_bits = vote_data_bits(samples, &starts, bit_time, idle);
    let parity = vote_parity(samples, &starts, bit_time, idle, data_bits);
    let stop_bits = vote_stop_bits(samples, &starts, bit_time, idle, data_bits, parity);

    info!(
        "inferred {:?}: {} baud, {} data bits, {:?} parity, {} stop, idle {}",
        channel.name,
        baud_rate,
        data_bits,
        parity,
        stop_bits,
        if idle { "high" } else { "low" },
    );

    UartSettings::new(baud_rate, data_bits, parity, stop_bits, idle)
}

/// Mean interval between consecutive transitions, restricted to the
/// plausible bit-time band so glitches and idle stretches don't skew it.
fn estimate_bit_time(trans: &[Transition]) -> Result<f64, DecodeError> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for pair in trans.windows(2) {
        let interval = pair[1].time - pair[0].time;
        if (SHORTEST_BIT_TIME..=LONGEST_BIT_TIME).contains(&interval) {
            sum += interval;
            count += 1;
        }
    }
    if count == 0 {
        return Err(DecodeError::CannotEstimateBitTime);
    }
    Ok(sum / count as f64)
}

/// For each candidate width, sample where the stop bit would have to sit
/// (`start + (n + 1.5) * bit`) in every frame, and count idle-level hits.
/// Highest count wins; ties prefer the width nearest the conventional 8.
fn vote_data_bits(samples: &[Sample], starts: &[f64], bit_time: f64, idle: bool) -> u8 {
    (5u8..=9)
        .map(|n| {
            let hits = starts
                .iter()
                .filter(|&&start| {
                    level_at(samples, start + (n as f64 + 1.5) * bit_time) == idle
                })
                .count();
            (n, hits)
        })
        .max_by_key(|&(n, hits)| (hits, std::cmp::Reverse(n.abs_diff(8))))
        .map(|(n, _)| n)
        .unwrap_or(8)
}

/// Score Even/Odd/None by the level observed right after the data bits.
/// A parity hypothesis wins only with strictly more agreement than the
/// stop-bit (None) interpretation of the same position.
fn vote_parity(samples: &[Sample], starts: &[f64], bit_time: f64, idle: bool, data_bits: u8) -> Parity {
    let mut even = 0usize;
    let mut odd = 0usize;
    let mut none = 0usize;
    for &start in starts.iter().take(MAX_VOTE_FRAMES) {
        let ones = (0..data_bits)
            .filter(|&i| level_at(samples, start + (i as f64 + 1.5) * bit_time) == idle)
            .count();
        let ones_odd = ones % 2 == 1;
        // Logical bit value at the would-be parity position.
        let observed = level_at(samples, start + (data_bits as f64 + 1.5) * bit_time) == idle;
        if observed == ones_odd {
            even += 1;
        } else {
            odd += 1;
        }
        if observed {
            // The position reads as idle, i.e. as a stop bit.
            none += 1;
        }
    }
    debug!("parity vote: even {even}, odd {odd}, none {none}");
    if even > none || odd > none {
        if even >= odd {
            Parity::Even
        } else {
            Parity::Odd
        }
    } else {
        Parity::None
    }
}

/// Walk past data (and parity) in bit steps counting consecutive
/// idle-level positions, up to [`MAX_STOP_BITS`]. Most frequent count
/// wins; 1 when no frame yields a count in range.
fn vote_stop_bits(
    samples: &[Sample],
    starts: &[f64],
    bit_time: f64,
    idle: bool,
    data_bits: u8,
    parity: Parity,
) -> u8 {
    let payload = data_bits as f64 + if parity == Parity::None { 0.0 } else { 1.0 };
    let mut tally = [0usize; MAX_STOP_BITS as usize];
    for &start in starts.iter().take(MAX_VOTE_FRAMES) {
        let mut run = 0usize;
        for k in 0..MAX_STOP_BITS {
            if level_at(samples, start + (payload + 1.5 + k as f64) * bit_time) == idle {
                run += 1;
            } else {
                break;
            }
        }
        if run > 0 {
            tally[run - 1] += 1;
        }
    }
    let mut best = 1u8;
    let mut best_hits = 0usize;
    for (i, &hits) in tally.iter().enumerate() {
        if hits > best_hits {
            best = i as u8 + 1;
            best_hits = hits;
        }
    }
    best
}

/// Decode every frame on one channel.
///
/// The scan looks for idle-to-active transitions, decodes one frame by
/// mid-bit sampling, then skips to the end of the stop bits before
/// resuming, so frames can never overlap. In-frame anomalies are tagged
/// on the output byte and never abort the run.
pub fn decode_channel(channel: &DigitalChannel, settings: &UartSettings) -> Vec<UartByte> {
    let samples = &channel.samples;
    if samples.is_empty() {
        return Vec::new();
    }
    let bit = settings.bit_time();
    let idle = settings.idle_high();
    let frame_time = settings.frame_bits() as f64 * bit;
    let mut reader = LevelReader::new(samples);
    let mut out = Vec::new();
    let mut resume_at = f64::NEG_INFINITY;

    for t in transitions(samples) {
        if t.time < resume_at || t.from != idle {
            continue;
        }
        let start = t.time;
        let mut errors = Vec::new();

        // The start bit should read as the active level at its centre.
        // A mismatch is recorded but the frame is still decoded
        // best-effort.
        if reader.level_at(start + 0.5 * bit) == idle {
            errors.push(FrameError::InvalidStartBit);
        }

        // Data bits, LSB first. A bit is 1 when the line sits at the
        // idle level (mark), for either idle polarity.
        let mut raw: u16 = 0;
        for i in 0..settings.data_bits() {
            if reader.level_at(start + (i as f64 + 1.5) * bit) == idle {
                raw |= 1 << i;
            }
        }

        let mut slot = settings.data_bits() as f64;
        if settings.parity() != Parity::None {
            let observed = reader.level_at(start + (slot + 1.5) * bit) == idle;
            let ones_odd = raw.count_ones() % 2 == 1;
            let expected = match settings.parity() {
                Parity::Even => ones_odd,
                Parity::Odd => !ones_odd,
                Parity::None => unreachable!(),
            };
            if observed != expected {
                errors.push(FrameError::ParityError);
            }
            slot += 1.0;
        }

        let mut stop_ok = true;
        for k in 0..settings.stop_bits() {
            if reader.level_at(start + (slot + 1.5 + k as f64) * bit) != idle {
                stop_ok = false;
            }
        }
        if !stop_ok {
            errors.push(FrameError::StopBitError);
        }

        let end = start + frame_time;
        out.push(UartByte {
            timestamp: start,
            start,
            end,
            channel: channel.name.clone(),
            // Nine-bit words keep their ninth bit for the parity check
            // above but the stored value is the low byte.
            value: (raw & 0xFF) as u8,
            errors,
        });
        // A quarter bit of slack: float rounding must never push the
        // resume point past a back-to-back frame's start transition. Any
        // genuine in-frame transition sits at least one full bit earlier.
        resume_at = end - 0.25 * bit;
    }

    debug!(
        "decoded {} frames on {:?}",
        out.len(),
        channel.name
    );
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sample::Sample;

    fn settings_8n1(baud: u32) -> UartSettings {
        UartSettings::new(baud, 8, Parity::None, 1, true).unwrap()
    }

    /// Render bytes as a level sequence (one entry per bit cell), framed
    /// per the settings, with idle padding on both ends.
    fn frame_levels(bytes: &[u8], settings: &UartSettings, lead: usize, trail: usize) -> Vec<bool> {
        let idle = settings.idle_high();
        let mut bits = vec![idle; lead];
        for &b in bytes {
            bits.push(!idle); // start
            for i in 0..settings.data_bits() {
                let one = (b >> i) & 1 == 1;
                bits.push(one == idle);
            }
            match settings.parity() {
                Parity::None => {}
                Parity::Even => {
                    let ones_odd = (b as u16).count_ones() % 2 == 1;
                    bits.push(ones_odd == idle);
                }
                Parity::Odd => {
                    let ones_odd = (b as u16).count_ones() % 2 == 1;
                    bits.push(!ones_odd == idle);
                }
            }
            for _ in 0..settings.stop_bits() {
                bits.push(idle);
            }
        }
        bits.extend(std::iter::repeat(idle).take(trail));
        bits
    }

    /// Sample a level sequence the way a scope would: `per_bit` evenly
    /// spaced samples per bit cell.
    fn sampled(bits: &[bool], bit_time: f64, per_bit: usize) -> Vec<Sample> {
        (0..bits.len() * per_bit)
            .map(|k| Sample {
                time: k as f64 * bit_time / per_bit as f64,
                level: bits[k / per_bit],
            })
            .collect()
    }

    fn channel(bytes: &[u8], settings: &UartSettings, lead: usize, trail: usize) -> DigitalChannel {
        DigitalChannel {
            name: "rx".to_owned(),
            samples: sampled(
                &frame_levels(bytes, settings, lead, trail),
                settings.bit_time(),
                8,
            ),
        }
    }

    #[test]
    fn test_settings_validation() {
        assert!(UartSettings::new(0, 8, Parity::None, 1, true).is_err());
        assert!(UartSettings::new(9600, 4, Parity::None, 1, true).is_err());
        assert!(UartSettings::new(9600, 10, Parity::None, 1, true).is_err());
        assert!(UartSettings::new(9600, 8, Parity::None, 0, true).is_err());
        assert!(UartSettings::new(9600, 9, Parity::Odd, 2, false).is_ok());
    }

    #[test]
    fn test_roundtrip_8n1_0x55() {
        let settings = settings_8n1(9600);
        let ch = channel(&[0x55, 0x55, 0x55], &settings, 4, 4);
        let bytes = decode_channel(&ch, &settings);
        assert_eq!(bytes.len(), 3);
        for b in &bytes {
            assert_eq!(b.value, 0x55);
            assert!(b.errors.is_empty(), "unexpected errors: {:?}", b.errors);
            // start + 8 data + 1 stop.
            let expected = 10.0 * settings.bit_time();
            assert!((b.duration() - expected).abs() < 1e-9);
            assert_eq!(b.channel, "rx");
        }
    }

    #[test]
    fn test_decode_idle_low() {
        let settings = UartSettings::new(115200, 8, Parity::None, 1, false).unwrap();
        let ch = channel(&[0xC3, 0x00, 0xFF], &settings, 2, 2);
        let values: Vec<u8> = decode_channel(&ch, &settings)
            .iter()
            .map(|b| b.value)
            .collect();
        assert_eq!(values, [0xC3, 0x00, 0xFF]);
    }

    #[test]
    fn test_parity_decode_and_mismatch() {
        let even = UartSettings::new(9600, 8, Parity::Even, 1, true).unwrap();
        let ch = channel(&[0x03, 0x07], &even, 2, 2);

        let ok = decode_channel(&ch, &even);
        assert!(ok.iter().all(|b| b.errors.is_empty()));
        assert_eq!(ok[0].value, 0x03);

        // The same wave read with the opposite parity setting flags every
        // frame but still yields the values.
        let odd = UartSettings::new(9600, 8, Parity::Odd, 1, true).unwrap();
        let bad = decode_channel(&ch, &odd);
        assert_eq!(bad.len(), 2);
        for b in &bad {
            assert_eq!(b.errors, [FrameError::ParityError]);
        }
    }

    #[test]
    fn test_invalid_start_bit_is_tagged_not_dropped() {
        let settings = settings_8n1(9600);
        let bit = settings.bit_time();
        // A glitch: the line dips for a fifth of a bit, then reads idle at
        // the start-bit centre. All later positions read idle too, so the
        // frame decodes as 0xFF with a bad start bit.
        let samples = vec![
            Sample { time: 0.0, level: true },
            Sample { time: 10.0 * bit, level: false },
            Sample { time: 10.2 * bit, level: true },
            Sample { time: 30.0 * bit, level: true },
        ];
        let ch = DigitalChannel {
            name: "rx".to_owned(),
            samples,
        };
        let bytes = decode_channel(&ch, &settings);
        assert_eq!(bytes.len(), 1);
        assert_eq!(bytes[0].value, 0xFF);
        assert!(bytes[0].errors.contains(&FrameError::InvalidStartBit));
    }

    #[test]
    fn test_stop_bit_error() {
        let settings = settings_8n1(9600);
        let bit = settings.bit_time();
        // start + 0x00 data, then the line stays active through the stop
        // position instead of returning to idle.
        let mut levels = vec![true, true];
        levels.extend(std::iter::repeat(false).take(10)); // start + 8 data + bad stop
        levels.extend([true, true]);
        let ch = DigitalChannel {
            name: "rx".to_owned(),
            samples: sampled(&levels, bit, 8),
        };
        let bytes = decode_channel(&ch, &settings);
        assert_eq!(bytes.len(), 1);
        assert_eq!(bytes[0].value, 0x00);
        assert!(bytes[0].errors.contains(&FrameError::StopBitError));
    }

    #[test]
    fn test_frames_never_overlap() {
        let settings = settings_8n1(9600);
        let ch = channel(&[0x00, 0x00, 0x00, 0x00], &settings, 2, 2);
        let bytes = decode_channel(&ch, &settings);
        assert_eq!(bytes.len(), 4);
        for pair in bytes.windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-12);
        }
    }

    #[test]
    fn test_inference_recovers_9600_8n1() {
        let settings = settings_8n1(9600);
        let ch = channel(&[0x55; 12], &settings, 8, 8);
        let inferred = infer(&ch).unwrap();
        let baud = inferred.baud_rate() as f64;
        assert!((baud - 9600.0).abs() / 9600.0 < 0.02, "baud {baud}");
        assert_eq!(inferred.data_bits(), 8);
        assert_eq!(inferred.parity(), Parity::None);
        assert_eq!(inferred.stop_bits(), 1);
        assert!(inferred.idle_high());
    }

    #[test]
    fn test_inference_detects_idle_low() {
        let settings = UartSettings::new(115200, 8, Parity::None, 1, false).unwrap();
        let ch = channel(&[0x55; 12], &settings, 8, 8);
        let inferred = infer(&ch).unwrap();
        assert!(!inferred.idle_high());
        assert_eq!(inferred.data_bits(), 8);
        let baud = inferred.baud_rate() as f64;
        assert!((baud - 115200.0).abs() / 115200.0 < 0.02, "baud {baud}");
    }

    #[test]
    fn test_inference_insufficient_transitions() {
        let ch = DigitalChannel {
            name: "rx".to_owned(),
            samples: sampled(&[true, true, false, false, true], 1e-4, 4),
        };
        assert_eq!(
            infer(&ch).unwrap_err(),
            DecodeError::InsufficientTransitions { got: 2 }
        );
    }

    #[test]
    fn test_inference_rejects_out_of_band_timing() {
        // Toggling every 100 ms: plenty of transitions, none plausibly a
        // serial bit cell.
        let levels: Vec<bool> = (0..12).map(|i| i % 2 == 0).collect();
        let ch = DigitalChannel {
            name: "rx".to_owned(),
            samples: sampled(&levels, 0.1, 2),
        };
        assert_eq!(infer(&ch).unwrap_err(), DecodeError::CannotEstimateBitTime);
    }
}

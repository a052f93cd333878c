#![no_main]

use libfuzzer_sys::fuzz_target;

use decode::edges::{segments, transitions};
use decode::reader::{level_at, LevelReader};
use decode::sample::{DigitalChannel, Sample};
use decode::uart::{self, Parity, UartSettings};

// Ugh this only works on Unix.

// Build an arbitrary (but valid: non-decreasing timestamps) sample stream
// from the fuzz input, then check the structural invariants and that the
// inference/decode paths never panic on it.

fuzz_target!(|data: &[u8]| {
    let mut time = 0.0f64;
    let samples: Vec<Sample> = data
        .iter()
        .map(|&b| {
            time += (b >> 1) as f64 * 1e-5;
            Sample {
                time,
                level: b & 1 == 1,
            }
        })
        .collect();

    let n_transitions = transitions(&samples).count();
    let segs = segments(&samples);
    if samples.is_empty() {
        assert!(segs.is_empty());
    } else {
        assert_eq!(segs.len(), n_transitions + 1);
        for pair in segs.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert_ne!(pair[0].level, pair[1].level);
        }
        // Cursor lookups agree with binary search on a monotonic sweep.
        let mut reader = LevelReader::new(&samples);
        let last = samples.last().unwrap().time;
        let mut t = -1e-5;
        while t <= last {
            assert_eq!(reader.level_at(t), level_at(&samples, t));
            t += 3.7e-5;
        }
    }

    let channel = DigitalChannel {
        name: "fuzz".to_owned(),
        samples,
    };
    // Inference may reject the input, but must not panic; whatever it
    // returns must decode without panicking too.
    let settings = match uart::infer(&channel) {
        Ok(s) => s,
        Err(_) => UartSettings::new(9600, 8, Parity::None, 1, true).unwrap(),
    };
    let bytes = uart::decode_channel(&channel, &settings);
    for b in &bytes {
        assert!(b.start <= b.end);
    }
});

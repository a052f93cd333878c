//! The analyzer surface the UI and exporter sit on.
//!
//! UART and SPI behave completely differently inside, so they share a
//! trait rather than any implementation: analyze a capture, search the
//! decoded bytes, export them as text. Each `analyze` call clears and
//! rebuilds the output list from scratch, so re-analyzing with changed
//! settings is idempotent and leaves nothing behind from earlier runs.

use typed_index_collections::TiVec;

use crate::error::DecodeError;
use crate::export;
use crate::sample::{Capture, DigitalChannel};
use crate::search::{ByteIndex, MatchResult, SearchFilter, SearchIndex};
use crate::spi::{self, SpiRoles, SpiSettings, SpiStats, SpiWord};
use crate::uart::{self, UartByte, UartSettings};

/// Immutable roll-up of one analysis run, computed once from the final
/// decoded list and returned alongside it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub total_bytes: usize,
    pub error_bytes: usize,
    pub min_duration: f64,
    pub avg_duration: f64,
    pub max_duration: f64,
    /// Bits per second implied by the average byte duration.
    pub bit_rate: f64,
}

impl Summary {
    fn over(items: impl Iterator<Item = (f64, bool)>, bits_per_frame: f64) -> Self {
        let mut total = 0usize;
        let mut errors = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = 0.0f64;
        for (duration, has_errors) in items {
            total += 1;
            if has_errors {
                errors += 1;
            }
            sum += duration;
            min = min.min(duration);
            max = max.max(duration);
        }
        if total == 0 {
            return Self::default();
        }
        let avg = sum / total as f64;
        Self {
            total_bytes: total,
            error_bytes: errors,
            min_duration: min,
            avg_duration: avg,
            max_duration: max,
            bit_rate: if avg > 0.0 { bits_per_frame / avg } else { 0.0 },
        }
    }
}

/// One search hit rendered for the UI: a timestamp to navigate to and a
/// display line.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub timestamp: f64,
    pub display: String,
}

pub trait Analyzer {
    /// Decode the capture with the current settings. Replaces any
    /// previous output; structural failures leave the analyzer empty.
    fn analyze(&mut self, capture: &Capture) -> Result<Summary, DecodeError>;

    /// Find `pattern` in the decoded bytes. Returns the match count;
    /// previous results are discarded.
    fn search(&mut self, pattern: &[u8], filter: SearchFilter) -> usize;

    fn has_matches(&self) -> bool;

    /// The most recent search's hits, rendered for display.
    fn search_hits(&self) -> Vec<SearchHit>;

    /// Semicolon-delimited rows for the decoded list, one line per byte.
    fn export(&self) -> String;
}

pub struct UartAnalyzer {
    channels: Vec<String>,
    settings: UartSettings,
    bytes: TiVec<ByteIndex, UartByte>,
    search: SearchIndex,
}

impl UartAnalyzer {
    pub fn new(channels: Vec<String>, settings: UartSettings) -> Self {
        Self {
            channels,
            settings,
            bytes: TiVec::new(),
            search: SearchIndex::default(),
        }
    }

    pub fn bytes(&self) -> &TiVec<ByteIndex, UartByte> {
        &self.bytes
    }

    pub fn settings(&self) -> &UartSettings {
        &self.settings
    }

    pub fn matches(&self) -> &[MatchResult] {
        self.search.matches()
    }
}

impl Analyzer for UartAnalyzer {
    fn analyze(&mut self, capture: &Capture) -> Result<Summary, DecodeError> {
        self.bytes.clear();
        self.search = SearchIndex::default();

        let mut all = Vec::new();
        for name in &self.channels {
            let channel = DigitalChannel::from_capture(capture, name)?;
            all.extend(uart::decode_channel(&channel, &self.settings));
        }
        // Independent channels merge into one stream ordered by time.
        all.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        self.bytes = all.into();

        Ok(Summary::over(
            self.bytes.iter().map(|b| (b.duration(), !b.errors.is_empty())),
            self.settings.frame_bits() as f64,
        ))
    }

    fn search(&mut self, pattern: &[u8], filter: SearchFilter) -> usize {
        self.search.search(&self.bytes, pattern, filter)
    }

    fn has_matches(&self) -> bool {
        self.search.has_matches()
    }

    fn search_hits(&self) -> Vec<SearchHit> {
        self.search
            .matches()
            .iter()
            .map(|m| SearchHit {
                timestamp: m.timestamp,
                display: export::uart_display(&self.bytes[m.index]),
            })
            .collect()
    }

    fn export(&self) -> String {
        export::uart_rows(&self.bytes)
    }
}

pub struct SpiAnalyzer {
    roles: SpiRoles,
    settings: SpiSettings,
    words: TiVec<ByteIndex, SpiWord>,
    stats: Option<SpiStats>,
    search: SearchIndex,
}

impl SpiAnalyzer {
    pub fn new(roles: SpiRoles, settings: SpiSettings) -> Self {
        Self {
            roles,
            settings,
            words: TiVec::new(),
            stats: None,
            search: SearchIndex::default(),
        }
    }

    pub fn words(&self) -> &TiVec<ByteIndex, SpiWord> {
        &self.words
    }

    pub fn settings(&self) -> &SpiSettings {
        &self.settings
    }

    /// Transfer accounting from the most recent analysis.
    pub fn stats(&self) -> Option<&SpiStats> {
        self.stats.as_ref()
    }

    pub fn matches(&self) -> &[MatchResult] {
        self.search.matches()
    }
}

impl Analyzer for SpiAnalyzer {
    fn analyze(&mut self, capture: &Capture) -> Result<Summary, DecodeError> {
        self.words.clear();
        self.stats = None;
        self.search = SearchIndex::default();

        let (words, stats) = spi::decode(capture, &self.roles, &self.settings)?;
        self.words = words.into();
        self.stats = Some(stats);

        Ok(Summary::over(
            self.words.iter().map(|w| (w.duration(), !w.errors.is_empty())),
            self.settings.bits_per_word() as f64,
        ))
    }

    fn search(&mut self, pattern: &[u8], filter: SearchFilter) -> usize {
        self.search.search(&self.words, pattern, filter)
    }

    fn has_matches(&self) -> bool {
        self.search.has_matches()
    }

    fn search_hits(&self) -> Vec<SearchHit> {
        self.search
            .matches()
            .iter()
            .map(|m| SearchHit {
                timestamp: m.timestamp,
                display: export::spi_display(&self.words[m.index]),
            })
            .collect()
    }

    fn export(&self) -> String {
        export::spi_rows(&self.words, self.roles.miso.is_some())
    }
}

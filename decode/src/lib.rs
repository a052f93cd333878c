//! Protocol decoding for logic-analyzer captures.
//!
//! Takes named channels of (time, level) samples, already loaded and
//! materialized by the caller, and turns them into decoded UART bytes or
//! SPI words with per-frame error tags, plus searchable/exportable views
//! of the result. When the user doesn't know the line parameters, the
//! inference routines recover them from the raw transition timing alone.
//!
//! The decode core is synchronous and allocation-light; file loading,
//! progress reporting and the UI all live elsewhere.

pub mod analyzer;
pub mod edges;
pub mod error;
pub mod export;
pub mod reader;
pub mod sample;
pub mod search;
pub mod spi;
pub mod uart;

pub use analyzer::{Analyzer, SearchHit, SpiAnalyzer, Summary, UartAnalyzer};
pub use error::{DecodeError, FrameError};
pub use sample::{Capture, DigitalChannel, Sample, SignalClass};
pub use search::{ByteIndex, MatchResult, SearchFilter};
pub use spi::{SpiRoles, SpiSettings, SpiWord};
pub use uart::{Parity, UartByte, UartSettings};

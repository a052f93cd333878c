//! Text renderings of decoded output: per-byte display strings for the
//! search UI and semicolon-delimited export rows.

use std::fmt::Write;

use typed_index_collections::TiVec;

use crate::error::errors_text;
use crate::search::ByteIndex;
use crate::spi::SpiWord;
use crate::uart::UartByte;

/// Printable ASCII as itself, everything else escaped.
pub fn ascii(value: u8) -> String {
    if (0x20..=0x7E).contains(&value) {
        (value as char).to_string()
    } else {
        format!("\\x{value:02X}")
    }
}

/// Timestamps are exported with 9 decimal places (nanosecond text
/// precision), which round-trips every capture source we have seen.
pub fn timestamp(t: f64) -> String {
    format!("{t:.9}")
}

pub fn uart_display(b: &UartByte) -> String {
    let mut s = format!(
        "{} {}: 0x{:02X} ({}) {}",
        timestamp(b.timestamp),
        b.channel,
        b.value,
        b.value,
        ascii(b.value),
    );
    if !b.errors.is_empty() {
        write!(s, " [{}]", errors_text(&b.errors)).unwrap();
    }
    s
}

pub fn spi_display(w: &SpiWord) -> String {
    let mut s = format!("{} MOSI 0x{:02X}", timestamp(w.timestamp), w.mosi);
    if let Some(miso) = w.miso {
        write!(s, " MISO 0x{miso:02X}").unwrap();
    }
    if !w.errors.is_empty() {
        write!(s, " [{}]", errors_text(&w.errors)).unwrap();
    }
    s
}

pub fn uart_rows(bytes: &TiVec<ByteIndex, UartByte>) -> String {
    let mut out = String::from("Time [s];Channel;Hex;Dec;ASCII;Error\n");
    for b in bytes {
        writeln!(
            out,
            "{};{};0x{:02X};{};{};{}",
            timestamp(b.timestamp),
            b.channel,
            b.value,
            b.value,
            ascii(b.value),
            errors_text(&b.errors),
        )
        .unwrap();
    }
    out
}

pub fn spi_rows(words: &TiVec<ByteIndex, SpiWord>, has_miso: bool) -> String {
    let mut out = if has_miso {
        String::from("Time [s];MOSI Hex;MOSI Dec;MOSI ASCII;MISO Hex;MISO Dec;MISO ASCII;Error\n")
    } else {
        String::from("Time [s];MOSI Hex;MOSI Dec;MOSI ASCII;Error\n")
    };
    for w in words {
        write!(
            out,
            "{};0x{:02X};{};{}",
            timestamp(w.timestamp),
            w.mosi,
            w.mosi,
            ascii((w.mosi & 0xFF) as u8),
        )
        .unwrap();
        if has_miso {
            let miso = w.miso.unwrap_or(0);
            write!(out, ";0x{:02X};{};{}", miso, miso, ascii((miso & 0xFF) as u8)).unwrap();
        }
        writeln!(out, ";{}", errors_text(&w.errors)).unwrap();
    }
    out
}

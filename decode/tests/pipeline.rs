//! End-to-end runs over the public surface: capture in, decoded bytes,
//! search hits and export rows out.

use anyhow::Result;

use decode::{
    Analyzer, Capture, DecodeError, SearchFilter, SpiAnalyzer, SpiRoles, SpiSettings, Parity,
    UartAnalyzer, UartSettings,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 8N1 idle-high wave for `bytes` at `baud`, eight samples per bit.
fn uart_capture(bytes: &[u8], baud: u32) -> Capture {
    let bit = 1.0 / baud as f64;
    let mut cells = vec![true, true, true];
    for &b in bytes {
        cells.push(false);
        for i in 0..8 {
            cells.push((b >> i) & 1 == 1);
        }
        cells.push(true);
    }
    cells.extend([true, true, true]);
    let raw: Vec<(f64, f64)> = (0..cells.len() * 8)
        .map(|k| (k as f64 * bit / 8.0, if cells[k / 8] { 3.3 } else { 0.0 }))
        .collect();
    let mut capture = Capture::new();
    capture.insert("rx".to_owned(), raw);
    capture
}

/// Mode-0 capture clocking one byte through a single CS-low window.
fn spi_capture(mosi_byte: u8, miso_byte: u8) -> Capture {
    let bit = 1.0e-6;
    let ws = 2.0e-6;
    let wend = ws + 9.0 * bit;
    let mut clk = vec![(0.0, 0.0)];
    let mut mosi = vec![(0.0, 0.0)];
    let mut miso = vec![(0.0, 0.0)];
    for j in 0..8 {
        let cell = ws + j as f64 * bit;
        mosi.push((cell, if mosi_byte >> j & 1 == 1 { 3.3 } else { 0.0 }));
        miso.push((cell, if miso_byte >> j & 1 == 1 { 3.3 } else { 0.0 }));
        clk.push((cell + 0.5 * bit, 3.3));
        clk.push((cell + bit, 0.0));
    }
    clk.push((wend + bit, 0.0));
    mosi.push((wend + bit, 0.0));
    miso.push((wend + bit, 0.0));
    let mut capture = Capture::new();
    capture.insert("clk".to_owned(), clk);
    capture.insert("cs".to_owned(), vec![(0.0, 3.3), (ws, 0.0), (wend, 3.3)]);
    capture.insert("mosi".to_owned(), mosi);
    capture.insert("miso".to_owned(), miso);
    capture
}

#[test]
fn uart_analyze_search_export() -> Result<()> {
    init_logging();
    let capture = uart_capture(b"SYNC SYNC", 9600);
    let settings = UartSettings::new(9600, 8, Parity::None, 1, true)?;
    let mut analyzer = UartAnalyzer::new(vec!["rx".to_owned()], settings);

    let summary = analyzer.analyze(&capture)?;
    assert_eq!(summary.total_bytes, 9);
    assert_eq!(summary.error_bytes, 0);
    assert!((summary.bit_rate - 9600.0).abs() < 1.0);

    assert_eq!(analyzer.search(b"SYNC", SearchFilter::All), 2);
    let hits = analyzer.search_hits();
    assert_eq!(hits.len(), 2);
    assert!(hits[0].timestamp < hits[1].timestamp);
    assert!(hits[0].display.contains("0x53"));

    // No clean byte carries errors, so the error-only view is empty.
    assert_eq!(analyzer.search(b"SYNC", SearchFilter::OnlyErrors), 0);
    assert!(!analyzer.has_matches());

    let rows = analyzer.export();
    assert_eq!(rows.lines().count(), 10); // header + 9 bytes
    assert!(rows.lines().nth(1).unwrap().contains(";0x53;83;S;"));
    Ok(())
}

#[test]
fn uart_inferred_settings_decode_their_own_stream() -> Result<()> {
    init_logging();
    let capture = uart_capture(&[0x55; 10], 9600);
    let channel = decode::DigitalChannel::from_capture(&capture, "rx")?;
    let inferred = decode::uart::infer(&channel)?;

    let mut analyzer = UartAnalyzer::new(vec!["rx".to_owned()], inferred);
    let summary = analyzer.analyze(&capture)?;
    assert_eq!(summary.total_bytes, 10);
    assert_eq!(summary.error_bytes, 0);
    assert!(analyzer.bytes().iter().all(|b| b.value == 0x55));
    Ok(())
}

#[test]
fn spi_analyze_and_export() -> Result<()> {
    init_logging();
    let capture = spi_capture(0xA3, 0x41);
    let roles = SpiRoles {
        clock: "clk".to_owned(),
        chip_select: Some("cs".to_owned()),
        mosi: "mosi".to_owned(),
        miso: Some("miso".to_owned()),
    };
    let settings = SpiSettings::new(false, false, 8, false)?;
    let mut analyzer = SpiAnalyzer::new(roles, settings);

    let summary = analyzer.analyze(&capture)?;
    assert_eq!(summary.total_bytes, 1);
    assert_eq!(summary.error_bytes, 0);
    assert_eq!(analyzer.stats().unwrap().transfer_count, 1);

    // The MISO value is searchable too.
    assert_eq!(analyzer.search(&[0x41], SearchFilter::All), 1);

    let rows = analyzer.export();
    assert!(rows.starts_with("Time [s];MOSI Hex;MOSI Dec;MOSI ASCII;MISO Hex"));
    assert!(rows.contains(";0xA3;163;\\xA3;0x41;65;A;"));
    Ok(())
}

#[test]
fn structural_failure_is_a_named_error() {
    init_logging();
    let capture = uart_capture(&[0x00], 9600);
    let settings = UartSettings::new(9600, 8, Parity::None, 1, true).unwrap();
    let mut analyzer = UartAnalyzer::new(vec!["missing".to_owned()], settings);
    assert_eq!(
        analyzer.analyze(&capture).unwrap_err(),
        DecodeError::ChannelNotFound("missing".to_owned())
    );
}

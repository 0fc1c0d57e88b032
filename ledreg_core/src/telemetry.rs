//! Tab-separated telemetry with a periodically reprinted header.

use std::io::Write;

use crate::controller::Measurement;
use crate::error::Result;
use crate::util::ms_to_secs;

pub const HEADER: [&str; 7] = [
    "DAC",
    "DAC_V",
    "Uptime_s",
    "Bus_V",
    "Shunt_mV",
    "Current_mA",
    "Power_mW",
];

/// Header cadence bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryCursor {
    pub lines_since_header: u32,
    pub header_printed: bool,
}

impl TelemetryCursor {
    /// Whether a header goes out before the next data line.
    pub fn header_due(&self, every: u32) -> bool {
        !self.header_printed || self.lines_since_header >= every
    }
}

pub struct TelemetryReporter<W: Write> {
    out: csv::Writer<W>,
    cursor: TelemetryCursor,
    header_every: u32,
}

impl<W: Write> TelemetryReporter<W> {
    pub fn new(out: W, header_every: u32) -> Self {
        let out = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(out);
        Self {
            out,
            cursor: TelemetryCursor::default(),
            header_every: header_every.max(1),
        }
    }

    pub fn cursor(&self) -> TelemetryCursor {
        self.cursor
    }

    /// Start over so the next line is preceded by a header.
    pub fn reset(&mut self) {
        self.cursor = TelemetryCursor::default();
    }

    /// Emit one data line for `m`, preceded by the header when due.
    pub fn record(&mut self, dac: u16, m: &Measurement) -> Result<()> {
        if self.cursor.header_due(self.header_every) {
            self.out.write_record(HEADER)?;
            self.cursor.header_printed = true;
            self.cursor.lines_since_header = 0;
        }
        let dac_v = m
            .dac_voltage_v
            .map_or_else(|| "-".to_string(), |v| format!("{v:.3}"));
        self.out.write_record([
            dac.to_string(),
            dac_v,
            format!("{:.2}", ms_to_secs(m.uptime_ms)),
            format!("{:.3}", m.bus_voltage_v),
            format!("{:.3}", m.shunt_voltage_mv),
            format!("{:.2}", m.current_ma),
            format!("{:.2}", m.power_mw),
        ])?;
        self.out.flush()?;
        self.cursor.lines_since_header += 1;
        Ok(())
    }

    /// Flush and hand back the sink.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| eyre::eyre!("flushing telemetry: {}", e.error()))
    }
}

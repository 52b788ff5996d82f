//! Output formatting for envelope sequences.
//!
//! Supports structured (JSON lines), text and table output. Rendering never
//! reorders envelopes; ordering is the producer's job.

use std::fmt::Write as _;
use std::io::Write;

use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tail::EnvelopeSink;
use crate::types::{Envelope, Payload};

/// How envelopes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// One JSON object per line, written as envelopes arrive.
    Json,
    /// One human-readable line per envelope, written as envelopes arrive.
    #[default]
    Text,
    /// Column-aligned table, written once at the end.
    Table,
}

/// Formats a nanosecond timestamp as RFC 3339 with nanoseconds.
#[must_use]
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp_nanos(timestamp).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Returns the type label and type-specific detail for an envelope.
#[must_use]
pub fn describe(envelope: &Envelope) -> (String, String) {
    let label = envelope.envelope_type().label();
    match &envelope.payload {
        Payload::Log { body, stream } => (format!("{label}/{}", stream.label()), body.clone()),
        Payload::Counter { name, total, .. } => (label.to_string(), format!("{name}:{total}")),
        Payload::Gauge { metrics } => {
            let mut detail = String::new();
            for (name, value) in metrics {
                if !detail.is_empty() {
                    detail.push(' ');
                }
                let _ = write!(detail, "{name}:{}", value.value);
                if !value.unit.is_empty() {
                    let _ = write!(detail, " {}", value.unit);
                }
            }
            (label.to_string(), detail)
        }
        Payload::Timer { name, start, stop } => {
            let millis = stop.saturating_sub(*start) as f64 / 1_000_000.0;
            (label.to_string(), format!("{name}:{millis:.2} ms"))
        }
        Payload::Event { title, body } => (label.to_string(), format!("{title}:{body}")),
    }
}

/// Sink that formats envelopes onto a writer.
#[derive(Debug)]
pub struct Renderer<W: Write> {
    writer: W,
    mode: RenderMode,
    rows: Vec<[String; 5]>,
}

impl<W: Write> Renderer<W> {
    /// Creates a renderer.
    #[must_use]
    pub const fn new(writer: W, mode: RenderMode) -> Self {
        Self {
            writer,
            mode,
            rows: Vec::new(),
        }
    }

    fn write_json(&mut self, envelope: &Envelope) -> Result<()> {
        serde_json::to_writer(&mut self.writer, envelope)?;
        writeln!(self.writer)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_text(&mut self, envelope: &Envelope) -> Result<()> {
        let (label, detail) = describe(envelope);
        writeln!(
            self.writer,
            "{} [{}/{}] {} {}",
            format_timestamp(envelope.timestamp),
            envelope.source_id,
            envelope.instance_id,
            label,
            detail
        )?;
        self.writer.flush()?;
        Ok(())
    }

    /// Writes buffered table rows, if any, and flushes the writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn finish(&mut self) -> Result<()> {
        if self.mode == RenderMode::Table {
            self.write_table()?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the renderer and returns the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_table(&mut self) -> Result<()> {
        if self.rows.is_empty() {
            writeln!(self.writer, "No envelopes found")?;
            return Ok(());
        }

        let header = ["TIMESTAMP", "SOURCE", "INSTANCE", "TYPE", "DETAIL"];
        let mut widths = header.map(str::len);
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let rows = std::mem::take(&mut self.rows);
        write_row(&mut self.writer, &header, &widths)?;
        for row in &rows {
            write_row(&mut self.writer, row, &widths)?;
        }
        writeln!(self.writer)?;
        writeln!(self.writer, "Total: {} envelope(s)", rows.len())?;
        Ok(())
    }
}

fn write_row<W: Write, S: AsRef<str>>(writer: &mut W, cells: &[S; 5], widths: &[usize; 5]) -> Result<()> {
    let [ts, source, instance, kind, detail] = cells;
    writeln!(
        writer,
        "{:<w0$}  {:<w1$}  {:<w2$}  {:<w3$}  {}",
        ts.as_ref(),
        source.as_ref(),
        instance.as_ref(),
        kind.as_ref(),
        detail.as_ref(),
        w0 = widths[0],
        w1 = widths[1],
        w2 = widths[2],
        w3 = widths[3],
    )?;
    Ok(())
}

impl<W: Write> EnvelopeSink for Renderer<W> {
    fn emit(&mut self, envelope: &Envelope) -> Result<()> {
        match self.mode {
            RenderMode::Json => self.write_json(envelope),
            RenderMode::Text => self.write_text(envelope),
            RenderMode::Table => {
                let (label, detail) = describe(envelope);
                self.rows.push([
                    format_timestamp(envelope.timestamp),
                    envelope.source_id.clone(),
                    envelope.instance_id.clone(),
                    label,
                    detail,
                ]);
                Ok(())
            }
        }
    }
}

/// Renders a complete sequence onto `writer`.
///
/// # Errors
///
/// Returns an error if writing or serialization fails.
pub fn render<W: Write>(envelopes: &[Envelope], mode: RenderMode, writer: W) -> Result<W> {
    let mut renderer = Renderer::new(writer, mode);
    for envelope in envelopes {
        renderer.emit(envelope)?;
    }
    renderer.finish()?;
    Ok(renderer.into_inner())
}

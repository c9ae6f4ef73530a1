//! Command-line front end pieces.

mod args;

pub use args::{Args, OutputChoice};

use std::io::Write;

use crate::dissect::{Dissection, FieldValue};
use crate::frame::FrameRecord;
use crate::pipeline::OutputMode;

/// Prints emitted records according to the output mode.
pub struct RecordPrinter {
    mode: OutputMode,
}

impl RecordPrinter {
    pub fn new(mode: OutputMode) -> Self {
        Self { mode }
    }

    /// Write one emitted record.
    pub fn write<W: Write>(
        &self,
        record: &FrameRecord,
        dissection: Option<&Dissection<'_>>,
        out: &mut W,
    ) -> std::io::Result<()> {
        match self.mode {
            OutputMode::None => Ok(()),
            OutputMode::Summary => self.write_summary(record, dissection, out),
            OutputMode::Detail => self.write_detail(record, dissection, out),
        }
    }

    fn write_summary<W: Write>(
        &self,
        record: &FrameRecord,
        dissection: Option<&Dissection<'_>>,
        out: &mut W,
    ) -> std::io::Result<()> {
        let rel = record.rel_time_us as f64 / 1_000_000.0;
        let marker = if record.flags.dependent_of_displayed && !record.flags.passed_display_filter
        {
            "  (dependency)"
        } else {
            ""
        };

        match dissection.and_then(|d| d.columns.as_ref()) {
            Some(columns) => writeln!(
                out,
                "{:>6} {:>11.6} {:<17} {:<17} {:<5} {}{}",
                record.number,
                rel,
                columns.source,
                columns.destination,
                columns.protocol,
                columns.info,
                marker,
            ),
            None => writeln!(
                out,
                "{:>6} {:>11.6} {} bytes{}",
                record.number, rel, record.captured_len, marker,
            ),
        }
    }

    fn write_detail<W: Write>(
        &self,
        record: &FrameRecord,
        dissection: Option<&Dissection<'_>>,
        out: &mut W,
    ) -> std::io::Result<()> {
        writeln!(
            out,
            "Frame {}: {} bytes on wire, {} bytes captured, total {} bytes",
            record.number, record.original_len, record.captured_len, record.cumulative_bytes,
        )?;
        writeln!(
            out,
            "  Time: rel {:.6}s, delta-captured {:.6}s, delta-displayed {:.6}s",
            record.rel_time_us as f64 / 1_000_000.0,
            record.delta_captured_us as f64 / 1_000_000.0,
            record.delta_displayed_us as f64 / 1_000_000.0,
        )?;
        if record.flags.dependent_of_displayed && !record.flags.passed_display_filter {
            writeln!(out, "  Emitted as a dependency of a displayed record")?;
        }

        let Some(dissection) = dissection else {
            return Ok(());
        };
        for annotation in &dissection.annotations {
            writeln!(out, "  [{}: {}]", annotation.layer, annotation.message)?;
        }
        for (name, layer) in &dissection.layers {
            writeln!(out, "  {name}")?;
            for (field, value) in &layer.fields {
                writeln!(out, "    {field}: {}", render_value(value))?;
            }
        }
        Ok(())
    }
}

/// Human rendering of a field value.
fn render_value(value: &FieldValue<'_>) -> String {
    if let Some(b) = value.as_bool() {
        return b.to_string();
    }
    if let Some(s) = value.as_string() {
        return s;
    }
    if let Some(v) = value.as_i64() {
        return v.to_string();
    }
    match value {
        FieldValue::Bytes(bytes) => format!("{} bytes", bytes.len()),
        FieldValue::Null => "-".to_string(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dissect::test_utils::{dissect_for_test, eth_ipv4_tcp_packet};

    #[test]
    fn test_summary_line() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let dissection = dissect_for_test(&packet);
        let record = FrameRecord::new(7, 0, packet.len() as u32, packet.len() as u32, 0);

        let printer = RecordPrinter::new(OutputMode::Summary);
        let mut out = Vec::new();
        printer.write(&record, Some(&dissection), &mut out).unwrap();

        let line = String::from_utf8(out).unwrap();
        assert!(line.contains("192.168.1.1"));
        assert!(line.contains("TCP"));
        assert!(line.trim_start().starts_with('7'));
    }

    #[test]
    fn test_none_mode_prints_nothing() {
        let record = FrameRecord::new(1, 0, 10, 10, 0);
        let printer = RecordPrinter::new(OutputMode::None);
        let mut out = Vec::new();
        printer.write(&record, None, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_detail_lists_fields() {
        let packet = eth_ipv4_tcp_packet(1234, 80);
        let dissection = dissect_for_test(&packet);
        let record = FrameRecord::new(1, 0, packet.len() as u32, packet.len() as u32, 0);

        let printer = RecordPrinter::new(OutputMode::Detail);
        let mut out = Vec::new();
        printer.write(&record, Some(&dissection), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Frame 1:"));
        assert!(text.contains("tcp"));
        assert!(text.contains("dst_port: 80"));
    }
}

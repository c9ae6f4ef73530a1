//! Built-in statistics taps.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use hdrhistogram::Histogram;

use crate::capture::MAX_RECORD_BYTES;
use crate::dissect::{Dissection, Requirements};
use crate::frame::FrameRecord;

use super::Tap;

/// Counts records per protocol layer.
#[derive(Default)]
pub struct ProtocolHierarchyTap {
    counts: BTreeMap<&'static str, u64>,
    total: u64,
}

impl ProtocolHierarchyTap {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tap for ProtocolHierarchyTap {
    fn name(&self) -> &'static str {
        "protocol-hierarchy"
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            tree: true,
            ..Requirements::default()
        }
    }

    fn consume(&mut self, _frame: &FrameRecord, dissection: Option<&Dissection<'_>>) {
        let Some(dissection) = dissection else {
            return;
        };
        self.total += 1;
        for (name, _) in &dissection.layers {
            *self.counts.entry(*name).or_insert(0) += 1;
        }
    }

    fn report(&self) -> String {
        let mut out = format!("{} records\n", self.total);
        for (name, count) in &self.counts {
            let _ = writeln!(out, "  {name:<10} {count}");
        }
        out
    }
}

/// Frame size distribution over captured lengths.
pub struct SizeHistogramTap {
    histogram: Histogram<u64>,
}

impl SizeHistogramTap {
    pub fn new() -> Self {
        // Bounds are static and valid; construction cannot fail.
        let histogram = Histogram::new_with_bounds(1, MAX_RECORD_BYTES as u64, 3)
            .expect("static histogram bounds");
        Self { histogram }
    }
}

impl Default for SizeHistogramTap {
    fn default() -> Self {
        Self::new()
    }
}

impl Tap for SizeHistogramTap {
    fn name(&self) -> &'static str {
        "frame-sizes"
    }

    fn consume(&mut self, frame: &FrameRecord, _dissection: Option<&Dissection<'_>>) {
        // Values above the bound are clamped by saturating recording.
        self.histogram.saturating_record(frame.captured_len.max(1) as u64);
    }

    fn report(&self) -> String {
        if self.histogram.is_empty() {
            return "no records".to_string();
        }
        format!(
            "{} records, min {} / mean {:.1} / p50 {} / p99 {} / max {} bytes",
            self.histogram.len(),
            self.histogram.min(),
            self.histogram.mean(),
            self.histogram.value_at_quantile(0.50),
            self.histogram.value_at_quantile(0.99),
            self.histogram.max(),
        )
    }
}

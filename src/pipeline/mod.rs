//! Pipeline orchestration.
//!
//! The orchestrator owns the per-record state machine and is the only
//! component that mutates shared run state (the frame store, the time
//! anchors, the fragment ledger). Dissection, filtering and taps are all
//! pure consumers of the state committed here.
//!
//! Two modes:
//! - **one-pass**: read, dissect, filter, emit, in one streaming sweep;
//!   records that pass no filter and are not depended upon are destroyed
//!   eagerly to bound memory. Dependency marking can only reach backward,
//!   onto records still resident - a documented limitation of streaming
//!   mode, not a bug to fix here.
//! - **two-pass**: a collecting pass fills the store and resolves
//!   dependency links, the store seals, then a replaying pass walks
//!   records in number order, re-fetches raw bytes by offset, fully
//!   dissects, filters again and emits. Anchors and ledger are reset
//!   between passes so both passes commit against consistent state.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::capture::{
    CaptureReader, RandomAccessCapture, RawRecord, DEFAULT_SNAPLEN,
};
use crate::dissect::{
    dissect_record, Dissection, DissectorRegistry, FragmentLedger, Requirements,
};
use crate::error::Result;
use crate::filter::CompiledFilter;
use crate::frame::{FrameRecord, FrameStore, Retention, TimeAnchors};
use crate::sink::{OutputFormat, OutputSink, SinkParams};
use crate::tap::{Tap, TapRegistry};

/// What the run prints per emitted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Nothing per record (counting / rewriting runs)
    None,
    /// One summary line per record
    #[default]
    Summary,
    /// Full field detail per record
    Detail,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    /// Scan the whole capture before emitting (two-pass mode)
    pub two_pass: bool,
    /// Stop after this many records (soft stop, checked between records)
    pub max_records: Option<u64>,
    /// Stop once cumulative captured bytes reach this limit (inclusive)
    pub max_bytes: Option<u64>,
    /// Per-record output
    pub output: OutputMode,
    /// Re-emit passing records into this capture file
    pub write_path: Option<PathBuf>,
    /// Format for `write_path`
    pub write_format: OutputFormat,
    /// Request color classification on emitted records
    pub color: bool,
}

/// Totals reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Raw records read from the source (pass 1 in two-pass mode)
    pub records_read: u64,
    /// Records that passed the display filter
    pub records_passed: u64,
    /// Records written to the output sink (passing + dependencies)
    pub records_written: u64,
}

/// Processing phase of the orchestrator.
///
/// One-pass runs stay in `Single`; two-pass runs walk
/// `Collecting -> Sealed -> Replaying`. Transitions out of order are
/// programming errors, checked by debug assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassPhase {
    #[default]
    Single,
    Collecting,
    Sealed,
    Replaying,
}

/// The record-processing pipeline.
pub struct Pipeline {
    registry: DissectorRegistry,
    taps: TapRegistry,
    read_filter: Option<CompiledFilter>,
    display_filter: Option<CompiledFilter>,
    config: RunConfig,
    phase: PassPhase,
}

impl Pipeline {
    /// Create a pipeline over the given dissector registry.
    pub fn new(registry: DissectorRegistry, config: RunConfig) -> Self {
        Pipeline {
            registry,
            taps: TapRegistry::new(),
            read_filter: None,
            display_filter: None,
            config,
            phase: PassPhase::default(),
        }
    }

    /// Set the read filter (applied before a record joins the working set).
    pub fn set_read_filter(&mut self, filter: CompiledFilter) {
        self.read_filter = Some(filter);
    }

    /// Set the display filter.
    pub fn set_display_filter(&mut self, filter: CompiledFilter) {
        self.display_filter = Some(filter);
    }

    /// Register a tap listener with an optional filter expression.
    /// A filter syntax error rejects the listener.
    pub fn register_tap(&mut self, tap: Box<dyn Tap>, filter_expr: Option<&str>) -> Result<()> {
        self.taps.register(tap, filter_expr)?;
        Ok(())
    }

    /// Tap reports after a run.
    pub fn tap_reports(&self) -> Vec<(&'static str, String)> {
        self.taps.reports()
    }

    /// Current processing phase.
    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    /// Capabilities this run needs from dissection: the union of the
    /// requested output, every tap's declared needs, and tree
    /// construction whenever any filter exists (including tap filters).
    fn requirements(&self) -> Requirements {
        let mut req = match self.config.output {
            OutputMode::None => Requirements::default(),
            OutputMode::Summary => Requirements {
                columns: true,
                ..Requirements::default()
            },
            OutputMode::Detail => Requirements {
                columns: true,
                tree: true,
                tree_visible: true,
                ..Requirements::default()
            },
        };
        if self.config.color {
            req.color = true;
        }
        req = req.union(self.taps.union_requirements());
        if self.read_filter.is_some() || self.display_filter.is_some() || self.taps.has_filtered()
        {
            req.tree = true;
        }
        req
    }

    /// Run the pipeline over a capture file.
    ///
    /// `emit` is called once per emitted record with the committed frame
    /// metadata and the dissection, if one was materialized (the
    /// nothing-to-filter fast path emits without dissecting).
    pub fn run<F>(&mut self, path: &Path, emit: &mut F) -> Result<RunSummary>
    where
        F: FnMut(&FrameRecord, Option<&Dissection<'_>>),
    {
        if self.config.two_pass {
            self.run_two_pass(path, emit)
        } else {
            self.run_one_pass(path, emit)
        }
    }

    fn open_sink(&self, params: SinkParams) -> Result<Option<OutputSink>> {
        match &self.config.write_path {
            Some(path) => Ok(Some(OutputSink::open(
                path,
                self.config.write_format,
                params,
            )?)),
            None => Ok(None),
        }
    }

    /// Soft stop conditions, checked between records.
    fn reached_stop(&self, summary: &RunSummary, cumulative_bytes: u64) -> bool {
        if let Some(max) = self.config.max_records {
            if summary.records_read >= max {
                info!(limit = max, "record-count limit reached");
                return true;
            }
        }
        if let Some(max) = self.config.max_bytes {
            // Inclusive boundary: the record that reaches the limit is
            // the last one counted.
            if cumulative_bytes >= max {
                info!(limit = max, "byte-count limit reached");
                return true;
            }
        }
        false
    }

    // =========================================================================
    // One-pass mode
    // =========================================================================

    fn run_one_pass<F>(&mut self, path: &Path, emit: &mut F) -> Result<RunSummary>
    where
        F: FnMut(&FrameRecord, Option<&Dissection<'_>>),
    {
        self.phase = PassPhase::Single;

        let mut reader = CaptureReader::open(path)?;
        let requirements = self.requirements();

        let mut sink = self.open_sink(SinkParams {
            link_type: reader.link_type(),
            snaplen: DEFAULT_SNAPLEN,
            nanosecond: reader.format().is_nanosecond(),
        })?;

        let mut store = FrameStore::new(Retention::Streaming);
        let mut anchors = TimeAnchors::new();
        let mut fragments = FragmentLedger::new();
        let mut summary = RunSummary::default();

        loop {
            let raw = match reader.next_record() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => {
                    // Keep whatever was already written, then report.
                    self.flush_sink_on_error(&mut sink, &mut summary);
                    return Err(e.into());
                }
            };

            let passed = self.process_record_single(
                &raw,
                &mut store,
                &mut anchors,
                &mut fragments,
                &requirements,
                &mut sink,
                emit,
            )?;

            summary.records_read += 1;
            if passed {
                summary.records_passed += 1;
            }

            if self.reached_stop(&summary, store.cumulative_bytes()) {
                break;
            }
        }

        if let Some(sink) = sink.take() {
            summary.records_written = sink.close()?;
        }

        info!(
            read = summary.records_read,
            passed = summary.records_passed,
            written = summary.records_written,
            "one-pass run complete"
        );
        Ok(summary)
    }

    /// Per-record step for one-pass mode.
    ///
    /// Returns whether the record passed the display filter.
    #[allow(clippy::too_many_arguments)]
    fn process_record_single<F>(
        &mut self,
        raw: &RawRecord,
        store: &mut FrameStore,
        anchors: &mut TimeAnchors,
        fragments: &mut FragmentLedger,
        requirements: &Requirements,
        sink: &mut Option<OutputSink>,
        emit: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&FrameRecord, Option<&Dissection<'_>>),
    {
        let number = store.append(raw);

        // Commit-before-dissect: the first record becomes the time
        // reference, then derived times are fixed against the anchors so
        // every consumer sees the same committed state.
        if anchors.time_ref.is_none() {
            anchors.set_reference(number, raw.timestamp_us);
            if let Some(rec) = store.get_mut(number) {
                rec.flags.time_reference = true;
            }
        }
        if let Some(rec) = store.get_mut(number) {
            rec.fix_times(anchors);
        }

        // Nothing to filter, nothing to print: skip structured decoding
        // entirely and treat the record as passing.
        let dissection = if requirements.needs_dissection() {
            Some(dissect_record(
                &self.registry,
                number,
                raw.link_type,
                &raw.data,
                fragments,
                requirements,
            )?)
        } else {
            None
        };

        // Commit fragment sightings discovered by this dissection.
        if let Some(obs) = dissection.as_ref().and_then(|d| d.fragment.as_ref()) {
            fragments.observe(obs.key.clone(), number);
        }

        // Read filter: a failing record leaves the working set entirely.
        let read_pass = match (&self.read_filter, &dissection) {
            (Some(filter), Some(d)) => {
                let rec = store.get(number).expect("appended record is resident");
                filter.matches(rec, d)
            }
            _ => true,
        };
        if !read_pass {
            anchors.observe_captured(number, raw.timestamp_us);
            store.destroy_one(number);
            return Ok(false);
        }
        if let Some(rec) = store.get_mut(number) {
            rec.flags.passed_read_filter = true;
        }

        let display_pass = match (&self.display_filter, &dissection) {
            (Some(filter), Some(d)) => {
                let rec = store.get(number).expect("appended record is resident");
                filter.matches(rec, d)
            }
            _ => true,
        };

        if display_pass {
            // Mark backward dependencies. A dependency already evicted
            // cannot be resurrected; streaming mode is best-effort here.
            if let Some(d) = &dissection {
                for dep in &d.dependent_frames {
                    match store.get_mut(*dep) {
                        Some(dep_rec) => dep_rec.flags.dependent_of_displayed = true,
                        None => debug!(
                            frame = number,
                            dependency = dep,
                            "dependency no longer resident, cannot mark"
                        ),
                    }
                }
            }

            {
                let rec = store.get_mut(number).expect("appended record is resident");
                rec.flags.passed_display_filter = true;
                if requirements.color {
                    rec.flags.needs_colorization = true;
                }
            }

            let rec = store.get(number).expect("appended record is resident");
            emit(rec, dissection.as_ref());
            if let Some(sink) = sink.as_mut() {
                sink.write(rec, raw)?;
            }
            self.taps.dispatch(rec, dissection.as_ref());
            anchors.observe_displayed(number, raw.timestamp_us);
        }

        anchors.observe_captured(number, raw.timestamp_us);

        // Eager cleanup: completed records that passed no filter and are
        // not depended upon do not stay resident in streaming mode.
        let keep = store
            .get(number)
            .map(|r| r.flags.passed_display_filter || r.flags.dependent_of_displayed)
            .unwrap_or(false);
        if !keep {
            store.destroy_one(number);
        }

        Ok(display_pass)
    }

    // =========================================================================
    // Two-pass mode
    // =========================================================================

    fn run_two_pass<F>(&mut self, path: &Path, emit: &mut F) -> Result<RunSummary>
    where
        F: FnMut(&FrameRecord, Option<&Dissection<'_>>),
    {
        // Fail before reading anything if the source cannot seek; the
        // replay pass depends on offset re-reads.
        let random = RandomAccessCapture::open(path)?;

        self.phase = PassPhase::Collecting;

        let full_requirements = self.requirements();
        // Pass 1 dissects only enough to evaluate filters and discover
        // dependencies: the tree when a filter exists, never columns.
        let pass1_requirements = Requirements {
            tree: self.read_filter.is_some() || self.display_filter.is_some(),
            ..Requirements::default()
        };

        let mut reader = CaptureReader::open(path)?;
        let mut store = FrameStore::new(Retention::RetainAll);
        let mut anchors = TimeAnchors::new();
        let mut fragments = FragmentLedger::new();
        let mut summary = RunSummary::default();
        // Dependency links aimed at frames not yet appended in pass 1.
        let mut pending_marks: Vec<u64> = Vec::new();
        let mut max_captured_len: u32 = 0;

        loop {
            let raw = match reader.next_record() {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(e) => return Err(e.into()),
            };

            self.process_record_first_pass(
                &raw,
                &mut store,
                &mut anchors,
                &mut fragments,
                &pass1_requirements,
                &mut pending_marks,
            )?;

            summary.records_read += 1;
            max_captured_len = max_captured_len.max(raw.captured_len);

            if self.reached_stop(&summary, store.cumulative_bytes()) {
                break;
            }
        }

        let link_type = reader.link_type();
        let nanosecond = reader.format().is_nanosecond();
        // Release the sequential handle before sealing.
        drop(reader);

        debug_assert_eq!(self.phase, PassPhase::Collecting);
        store.seal();
        self.phase = PassPhase::Sealed;

        for number in pending_marks {
            match store.find_mut(number) {
                Some(rec) => rec.flags.dependent_of_displayed = true,
                None => warn!(frame = number, "dependency on a frame that was never read"),
            }
        }

        // Stage output-header parameters from what pass 1 observed.
        let mut sink = self.open_sink(SinkParams {
            link_type,
            snaplen: max_captured_len.max(DEFAULT_SNAPLEN),
            nanosecond,
        })?;

        debug_assert_eq!(self.phase, PassPhase::Sealed);
        self.phase = PassPhase::Replaying;
        anchors.reset();
        fragments.clear();

        for number in 1..=store.total_appended() {
            let (passed_read, file_offset) = {
                let rec = store
                    .find(number)
                    .expect("retaining store keeps every record");
                (rec.flags.passed_read_filter, rec.file_offset)
            };
            // Read-filter failures are outside the working set; they are
            // not replayed even when marked as dependencies.
            if !passed_read {
                continue;
            }

            let raw = match random.read_at(file_offset) {
                Ok(raw) => raw,
                Err(e) => {
                    // A replay read error is tolerated once at least one
                    // record made it through; an immediate failure means
                    // the capture changed under us.
                    if summary.records_passed == 0 {
                        self.flush_sink_on_error(&mut sink, &mut summary);
                        return Err(e.into());
                    }
                    warn!(frame = number, error = %e, "replay read failed, skipping record");
                    continue;
                }
            };

            let passed = self.process_record_second_pass(
                number,
                &raw,
                &mut store,
                &mut anchors,
                &mut fragments,
                &full_requirements,
                &mut sink,
                emit,
            )?;
            if passed {
                summary.records_passed += 1;
            }
        }

        if let Some(sink) = sink.take() {
            summary.records_written = sink.close()?;
        }

        info!(
            read = summary.records_read,
            passed = summary.records_passed,
            written = summary.records_written,
            "two-pass run complete"
        );
        Ok(summary)
    }

    /// Per-record step for the collecting pass.
    ///
    /// Every record is retained; filter outcomes land in flags, and
    /// dependency links are resolved here (deferring forward links to
    /// seal time), so the replay pass starts with the full closure.
    fn process_record_first_pass(
        &mut self,
        raw: &RawRecord,
        store: &mut FrameStore,
        anchors: &mut TimeAnchors,
        fragments: &mut FragmentLedger,
        requirements: &Requirements,
        pending_marks: &mut Vec<u64>,
    ) -> Result<()> {
        let number = store.append(raw);

        if anchors.time_ref.is_none() {
            anchors.set_reference(number, raw.timestamp_us);
            if let Some(rec) = store.get_mut(number) {
                rec.flags.time_reference = true;
            }
        }
        if let Some(rec) = store.get_mut(number) {
            rec.fix_times(anchors);
        }

        let dissection = if requirements.needs_dissection() {
            Some(dissect_record(
                &self.registry,
                number,
                raw.link_type,
                &raw.data,
                fragments,
                requirements,
            )?)
        } else {
            None
        };

        if let Some(obs) = dissection.as_ref().and_then(|d| d.fragment.as_ref()) {
            fragments.observe(obs.key.clone(), number);
        }

        let read_pass = match (&self.read_filter, &dissection) {
            (Some(filter), Some(d)) => {
                let rec = store.get(number).expect("appended record is resident");
                filter.matches(rec, d)
            }
            _ => true,
        };

        let mut display_pass = false;
        if read_pass {
            if let Some(rec) = store.get_mut(number) {
                rec.flags.passed_read_filter = true;
            }

            display_pass = match (&self.display_filter, &dissection) {
                (Some(filter), Some(d)) => {
                    let rec = store.get(number).expect("appended record is resident");
                    filter.matches(rec, d)
                }
                _ => true,
            };

            if display_pass {
                if let Some(rec) = store.get_mut(number) {
                    rec.flags.passed_display_filter = true;
                }
                if let Some(d) = &dissection {
                    for dep in &d.dependent_frames {
                        if *dep <= store.total_appended() {
                            if let Some(dep_rec) = store.get_mut(*dep) {
                                dep_rec.flags.dependent_of_displayed = true;
                            }
                        } else {
                            pending_marks.push(*dep);
                        }
                    }
                }
            }
        }

        if display_pass {
            anchors.observe_displayed(number, raw.timestamp_us);
        }
        anchors.observe_captured(number, raw.timestamp_us);
        Ok(())
    }

    /// Per-record step for the replay pass.
    ///
    /// Returns whether the record passed the display filter (a
    /// dependency-only emission returns false and must not move
    /// `prev_displayed`).
    #[allow(clippy::too_many_arguments)]
    fn process_record_second_pass<F>(
        &mut self,
        number: u64,
        raw: &RawRecord,
        store: &mut FrameStore,
        anchors: &mut TimeAnchors,
        fragments: &mut FragmentLedger,
        requirements: &Requirements,
        sink: &mut Option<OutputSink>,
        emit: &mut F,
    ) -> Result<bool>
    where
        F: FnMut(&FrameRecord, Option<&Dissection<'_>>),
    {
        debug_assert_eq!(self.phase, PassPhase::Replaying);

        {
            let rec = store
                .find_mut(number)
                .expect("retaining store keeps every record");
            if anchors.time_ref.is_none() {
                anchors.set_reference(number, rec.timestamp_us);
                rec.flags.time_reference = true;
            }
            rec.fix_times(anchors);
        }

        let dissection = if requirements.needs_dissection() {
            Some(dissect_record(
                &self.registry,
                number,
                raw.link_type,
                &raw.data,
                fragments,
                requirements,
            )?)
        } else {
            None
        };

        if let Some(obs) = dissection.as_ref().and_then(|d| d.fragment.as_ref()) {
            fragments.observe(obs.key.clone(), number);
        }

        // Filtered again with the final requirements; dissection is
        // deterministic, so the outcome matches pass 1.
        let display_pass = match (&self.display_filter, &dissection) {
            (Some(filter), Some(d)) => {
                let rec = store
                    .find(number)
                    .expect("retaining store keeps every record");
                filter.matches(rec, d)
            }
            _ => true,
        };

        let dependent = store
            .find(number)
            .map(|r| r.flags.dependent_of_displayed)
            .unwrap_or(false);

        if display_pass || dependent {
            {
                let rec = store
                    .find_mut(number)
                    .expect("retaining store keeps every record");
                rec.flags.passed_display_filter = display_pass;
                if requirements.color {
                    rec.flags.needs_colorization = true;
                }
            }

            let rec = store
                .find(number)
                .expect("retaining store keeps every record");
            emit(rec, dissection.as_ref());
            if let Some(sink) = sink.as_mut() {
                sink.write(rec, raw)?;
            }
            self.taps.dispatch(rec, dissection.as_ref());

            if display_pass {
                anchors.observe_displayed(number, raw.timestamp_us);
            }
        }

        anchors.observe_captured(number, raw.timestamp_us);
        Ok(display_pass)
    }

    /// Persist what the sink already holds before reporting a fatal
    /// read error.
    fn flush_sink_on_error(&self, sink: &mut Option<OutputSink>, summary: &mut RunSummary) {
        if let Some(sink) = sink.take() {
            match sink.close() {
                Ok(written) => summary.records_written = written,
                Err(e) => warn!(error = %e, "could not finalize output after read error"),
            }
        }
    }
}

//! pcapflow CLI entry point.

use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pcapflow::cli::{Args, RecordPrinter};
use pcapflow::config::EnabledDissectors;
use pcapflow::dissect::default_registry;
use pcapflow::filter;
use pcapflow::pipeline::{Pipeline, RunConfig};
use pcapflow::sink::OutputFormat;
use pcapflow::tap::stats::{ProtocolHierarchyTap, SizeHistogramTap};

fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into()))
        .init();

    // Resolve the enabled-dissector set before the run starts.
    let enabled = match &args.enabled_dissectors {
        Some(path) => EnabledDissectors::load(path).with_context(|| {
            format!("failed to read enabled-dissector list: {}", path.display())
        })?,
        None => EnabledDissectors::all(),
    };
    let mut registry = default_registry();
    enabled.warn_unknown(|name| registry.knows(name));
    registry.retain_enabled(|name| enabled.is_enabled(name));

    let config = RunConfig {
        two_pass: args.two_pass,
        max_records: args.count,
        max_bytes: args.max_bytes,
        output: args.output.into(),
        write_path: args.write.clone(),
        write_format: OutputFormat::Pcap,
        color: args.color,
    };
    let mut pipeline = Pipeline::new(registry, config);

    // Filter syntax errors are reported here, before the run begins.
    if let Some(expr) = &args.read_filter {
        let compiled = filter::compile(expr).with_context(|| format!("bad read filter: {expr}"))?;
        pipeline.set_read_filter(compiled);
    }
    if let Some(expr) = &args.display_filter {
        let compiled =
            filter::compile(expr).with_context(|| format!("bad display filter: {expr}"))?;
        pipeline.set_display_filter(compiled);
    }

    if args.stats {
        pipeline
            .register_tap(Box::new(ProtocolHierarchyTap::new()), None)
            .context("registering protocol-hierarchy tap")?;
        pipeline
            .register_tap(Box::new(SizeHistogramTap::new()), None)
            .context("registering frame-size tap")?;
    }

    let printer = RecordPrinter::new(args.output.into());
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let summary = pipeline
        .run(&args.file, &mut |record, dissection| {
            if let Err(e) = printer.write(record, dissection, &mut out) {
                tracing::debug!(error = %e, "record output failed");
            }
        })
        .with_context(|| format!("processing {}", args.file.display()))?;

    let _ = out.flush();

    if args.stats {
        for (name, report) in pipeline.tap_reports() {
            eprintln!("--- {name} ---");
            eprintln!("{report}");
        }
    }

    eprintln!(
        "{} records read, {} passed, {} written",
        summary.records_read, summary.records_passed, summary.records_written
    );

    Ok(())
}

use std::any::Any;
use std::io::{Cursor, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use anyhow::Context;
use rayon::prelude::*;

use crate::config::AnalyzerConfig;
use crate::protocol::ProtocolRegistry;
use crate::replay::Replay;
use crate::source::{discover, ReplaySource};
use crate::stats::Processor;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.processed + self.failed
    }
}

fn process_source<P: Processor>(
    source: &ReplaySource,
    registry: &ProtocolRegistry,
) -> anyhow::Result<P::Stats> {
    let data = source.load()?;
    let mut replay = Replay::open(Cursor::new(data), registry)?;
    Ok(P::process_replay(&mut replay)?)
}

/// Runs [`process_source`], turning a panic in a decoder or processor into
/// an error for that replay alone.
fn process_isolated<P: Processor>(
    source: &ReplaySource,
    registry: &ProtocolRegistry,
) -> anyhow::Result<P::Stats> {
    panic::catch_unwind(AssertUnwindSafe(|| process_source::<P>(source, registry)))
        .unwrap_or_else(|payload| {
            Err(anyhow::anyhow!("panicked: {}", panic_message(&*payload)))
        })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn failure_message(source: &ReplaySource, err: &anyhow::Error) -> String {
    match source {
        ReplaySource::File(path) => format!("{}: {err:#}", path.display()),
        ReplaySource::Packed { pack, entry } => {
            format!("Failed to load {entry} from {}: {err:#}", pack.display())
        }
    }
}

fn show_progress(done: usize, total: usize) {
    let percent = done * 100 / total.max(1);
    let mut stdout = std::io::stdout().lock();
    // ignore a closed stdout
    let _ = write!(stdout, "\x08\x08\x08\x08{percent:>3}%");
    let _ = stdout.flush();
}

/// Runs processor `P` over every replay found in the configured paths and
/// writes the aggregated CSV.
pub fn run<P: Processor>(
    config: &AnalyzerConfig,
    registry: &ProtocolRegistry,
) -> anyhow::Result<RunSummary> {
    let mut sources = Vec::new();
    for path in &config.paths {
        log::info!("Looking for replays in {}", path.display());
        sources.extend(discover(path));
    }

    let total = sources.len();
    log::info!("Processing {total} replays with the {} processor", P::NAME);

    let mut writer = csv::Writer::from_path(&config.output)
        .with_context(|| format!("failed to create {}", config.output.display()))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.cpus)
        .build()
        .context("failed to start worker pool")?;

    let mut processor = P::default();
    let mut summary = RunSummary::default();
    let (tx, rx) = mpsc::channel();

    if config.progress {
        show_progress(0, total);
    }

    std::thread::scope(|scope| {
        scope.spawn(move || {
            pool.install(|| {
                sources.into_par_iter().for_each_with(tx, |tx, source| {
                    let result = process_isolated::<P>(&source, registry);
                    // the receiver only goes away if the caller panicked
                    let _ = tx.send((source, result));
                });
            });
        });

        for (source, result) in rx {
            match result {
                Ok(stats) => {
                    processor.aggregate(stats);
                    summary.processed += 1;
                }
                Err(err) => {
                    log::warn!("{}", failure_message(&source, &err));
                    summary.failed += 1;
                }
            }

            if config.progress {
                show_progress(summary.total(), total);
            }
        }
    });

    if config.progress {
        println!();
    }

    log::info!(
        "Processed {} replays, {} failed",
        summary.processed,
        summary.failed
    );

    processor
        .write_csv(&mut writer)
        .with_context(|| format!("failed to write {}", config.output.display()))?;
    writer.flush()?;

    log::info!("Wrote {}", config.output.display());
    Ok(summary)
}

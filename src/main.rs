//! table-traverse - Parallel Segmented Table Traversal
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use table_traverse::config::{CliArgs, TraversalConfig};
use table_traverse::progress::{print_header, print_summary, ProgressReporter};
use table_traverse::store::MemoryStore;
use table_traverse::traverse::{Cardinality, SharedCounter, TraversalCoordinator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Items generated when neither --input nor --generate is given
const DEFAULT_GENERATED_ITEMS: usize = 10_000;

/// Progress refresh interval
const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = TraversalConfig::from_args(&args).context("Invalid configuration")?;
    let store = load_store(&args)?;

    if !args.quiet {
        print_header(
            &args.table,
            &config.producer.mode.to_string(),
            config.producer.segments,
            config.consumer.workers,
        );
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create async runtime")?;

    runtime.block_on(run_traversal(config, store, !args.quiet))
}

/// Build the in-memory table from --input or --generate
fn load_store(args: &CliArgs) -> Result<Arc<MemoryStore>> {
    let store = MemoryStore::new();
    store.create_table(args.table_schema());

    match &args.input {
        Some(path) => {
            let loaded = store
                .load_json_lines(&args.table, path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            info!(table = %args.table, loaded, "Loaded items");
        }
        None => {
            let count = args.generate.unwrap_or(DEFAULT_GENERATED_ITEMS);
            store
                .generate(&args.table, count)
                .context("Failed to generate items")?;
            info!(table = %args.table, count, "Generated items");
        }
    }

    Ok(Arc::new(store))
}

async fn run_traversal(
    config: TraversalConfig,
    store: Arc<MemoryStore>,
    show_progress: bool,
) -> Result<()> {
    let counter = SharedCounter::new();
    let coordinator = TraversalCoordinator::new(
        store,
        config,
        Arc::new(Cardinality::new(counter.clone())),
    )
    .context("Failed to initialize traversal")?;

    // Setup signal handler for graceful shutdown
    let cancel = coordinator.cancellation_token();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        cancel.cancel();
    })
    .context("Failed to set signal handler")?;

    let progress = show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Starting producers...");
    }

    let probe = coordinator.progress_probe();
    let traversal = coordinator.run();
    tokio::pin!(traversal);
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);

    let result = loop {
        tokio::select! {
            result = &mut traversal => break result,
            _ = ticker.tick() => {
                if let Some(ref p) = progress {
                    p.update(&probe.snapshot());
                }
            }
        }
    };

    if let Some(ref p) = progress {
        match &result {
            Ok(report) if report.completed => p.finish("Traverse completed"),
            Ok(_) => p.finish("Traverse incomplete"),
            Err(_) => p.finish("Traverse failed"),
        }
    }

    let report = result.context("Traversal failed")?;

    print_summary(&report, counter.get());

    if !report.completed {
        info!(
            unprocessed = report.pages_unprocessed,
            "Traversal did not complete"
        );
    }

    if report.pages_failed > 0 {
        info!(
            pages = report.pages_failed,
            items = report.items_dropped,
            "Traversal completed with dropped pages"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("table_traverse=debug,warn")
    } else {
        EnvFilter::new("table_traverse=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

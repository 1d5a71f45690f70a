//! order-insights - ranked summaries of an e-commerce order-lines CSV
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (config, load failure, bad arguments, etc.)
//!   2 - At least one requested view referenced a missing or mistyped column

mod cli;
mod config;
mod session;

use anyhow::{Context, Result};
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use order_insights::{GroupSpec, QueryCache};
use std::io::{IsTerminal, Write};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);

    debug!("Arguments: {:?}", args);

    match run(args) {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .order-insights.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("Created {} with default settings.", DEFAULT_CONFIG_FILE);
    Ok(())
}

/// Initialize logging on stderr; `RUST_LOG` wins over -v/-q when set.
fn init_logging(args: &Args) {
    let builder = FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(
            builder.with_max_level(args.log_level()).finish(),
        ),
    };
    if let Err(e) = result {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?.unwrap_or_default(),
    };
    Ok(config)
}

/// Load, compute and print. Returns the exit code (0 or 2).
fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    let dataset = Rc::new(session::load_dataset(&config, args.fallback.as_deref())?);
    let cache = Rc::new(QueryCache::with_capacity(config.analysis.cache_capacity));
    let range = args.date_range();

    if let Some(n) = args.preview {
        let preview = session::format_preview(&dataset, n);
        match args.format {
            OutputFormat::Text => println!("{}", preview),
            // keep stdout parseable
            OutputFormat::Json => eprint!("{}", preview),
        }
    }

    let report = match (&args.dimension, &args.measure) {
        (Some(dimension), Some(measure)) => {
            let spec = GroupSpec {
                dimension: dimension.clone(),
                measure: measure.clone(),
                op: args.agg,
            };
            session::build_group_report(&spec, &dataset, &cache, &config, range)
        }
        _ => {
            let views = args
                .selected_analyses(&config.default_views())
                .map_err(anyhow::Error::msg)?;
            session::build_report(&views, &dataset, &cache, &config, range)
        }
    };

    let rendered = report.render(args.format, &config.theme)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    info!(
        "{} chart(s), {} failed view(s) in {:.2}s",
        report.charts.len(),
        report.failures,
        start_time.elapsed().as_secs_f64()
    );

    if args.interactive {
        let mut interactive = session::Session::new(
            Rc::clone(&dataset),
            Rc::clone(&cache),
            config,
            range,
            args.format,
        );
        let stdin = std::io::stdin();
        if stdin.is_terminal() {
            interactive.run_terminal()?;
        } else {
            let mut stdout = std::io::stdout();
            interactive.run(stdin.lock(), &mut stdout)?;
        }
    }

    Ok(if report.schema_failures > 0 { 2 } else { 0 })
}

//! CLI definition and dispatch.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::cached_price_source::CachedPriceSource;
use crate::adapters::csv_adapter::{CsvLedgerAdapter, CsvPriceAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::system_clock::{FixedClock, SystemClock};
use crate::domain::config_validation::{build_service_settings, LedgerBackend, ServiceSettings};
use crate::domain::error::FoliotrackError;
use crate::domain::instant::parse_instant;
use crate::domain::performance::PerformanceReport;
use crate::ports::clock_port::Clock;
use crate::ports::config_port::ConfigPort;
use crate::ports::ledger_port::LedgerSource;
use crate::service::PerformanceService;

#[derive(Parser, Debug)]
#[command(name = "foliotrack", about = "Portfolio performance time series")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compute a portfolio's performance series
    Performance {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        portfolio: String,
        /// One of 1D, 1W, 1M, YTD, 1Y, ALL
        #[arg(short, long, default_value = "ALL")]
        window: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Resolve the window against this instant instead of the wall clock
        #[arg(long)]
        now: Option<String>,
    },
    /// Show the resolved range and bar descriptor for a window
    Window {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        portfolio: String,
        #[arg(short, long, default_value = "ALL")]
        window: String,
        #[arg(long)]
        now: Option<String>,
    },
    /// Validate a service configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Performance {
            config,
            user,
            portfolio,
            window,
            format,
            output,
            now,
        } => run_performance(
            &config,
            &user,
            &portfolio,
            &window,
            format,
            output.as_ref(),
            now.as_deref(),
        ),
        Command::Window {
            config,
            user,
            portfolio,
            window,
            now,
        } => run_window(&config, &user, &portfolio, &window, now.as_deref()),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(err: &FoliotrackError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn parse_clock(now: Option<&str>) -> Result<Arc<dyn Clock>, FoliotrackError> {
    match now {
        None => Ok(Arc::new(SystemClock)),
        Some(raw) => parse_instant(raw)
            .map(|t| Arc::new(FixedClock(t)) as Arc<dyn Clock>)
            .ok_or_else(|| FoliotrackError::validation(format!("cannot parse --now '{raw}'"))),
    }
}

pub fn build_ledger(
    settings: &ServiceSettings,
    config: &dyn ConfigPort,
) -> Result<Arc<dyn LedgerSource>, FoliotrackError> {
    match &settings.ledger {
        LedgerBackend::Csv { path } => Ok(Arc::new(CsvLedgerAdapter::new(path.clone()))),
        LedgerBackend::Sqlite { .. } => {
            #[cfg(feature = "sqlite")]
            {
                use crate::adapters::sqlite_adapter::SqliteLedgerAdapter;
                let adapter = SqliteLedgerAdapter::from_config(config)?;
                adapter.initialize_schema()?;
                Ok(Arc::new(adapter))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                let _ = config;
                Err(FoliotrackError::ConfigInvalid {
                    section: "ledger".into(),
                    key: "source".into(),
                    reason: "sqlite feature is required for source = sqlite".into(),
                })
            }
        }
    }
}

pub fn build_service(
    config: &dyn ConfigPort,
    clock: Arc<dyn Clock>,
) -> Result<PerformanceService, FoliotrackError> {
    let settings = build_service_settings(config)?;
    let ledger = build_ledger(&settings, config)?;
    let prices = CachedPriceSource::new(
        CsvPriceAdapter::new(settings.prices_path.clone()),
        settings.cache_ttl,
    );
    Ok(PerformanceService::new(ledger, Arc::new(prices), clock).with_settings(&settings))
}

fn runtime() -> Result<tokio::runtime::Runtime, FoliotrackError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(FoliotrackError::Io)
}

pub fn write_report<W: Write>(
    report: &PerformanceReport,
    format: OutputFormat,
    mut out: W,
) -> Result<(), FoliotrackError> {
    match format {
        OutputFormat::Csv => report.series.write_csv(out),
        OutputFormat::Json => {
            serde_json::to_writer(&mut out, &report.series)
                .map_err(|e| FoliotrackError::Io(io::Error::other(e)))?;
            writeln!(out)?;
            Ok(())
        }
    }
}

fn print_summary(report: &PerformanceReport) {
    let w = &report.window;
    eprintln!("Window:       {} ({})", w.label, w.descriptor);
    eprintln!("Range:        {} .. {}", w.start, w.end);
    eprintln!("Bars:         {}", report.series.len());
    eprintln!("Final value:  {:.2}", report.final_value());
    eprintln!("Total return: {:.2}%", report.total_return() * 100.0);
    if !report.order_sides.is_empty() {
        let sides: Vec<String> = report
            .order_sides
            .iter()
            .map(|(side, n)| format!("{n} {side}"))
            .collect();
        eprintln!("Orders:       {}", sides.join(", "));
    }
    if report.excluded_orders > 0 {
        eprintln!("Orders after window: {}", report.excluded_orders);
    }
    if report.quality.is_degraded() {
        eprintln!(
            "warning: degraded data (unpriced bars: {}, dropped price rows: {}, bad order rows: {})",
            report.quality.unpriced_bars,
            report.quality.unusable_price_rows,
            report.quality.unparseable_timestamps
                + report.quality.non_numeric_quantities
                + report.quality.non_numeric_prices
                + report.quality.reserved_tickers
        );
    }
}

fn run_performance(
    config_path: &PathBuf,
    user: &str,
    portfolio: &str,
    window: &str,
    format: OutputFormat,
    output_path: Option<&PathBuf>,
    now: Option<&str>,
) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = parse_clock(now)
        .and_then(|clock| build_service(&config, clock))
        .and_then(|service| {
            runtime()?.block_on(service.get_performance(user, portfolio, window))
        });
    let report = match result {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    print_summary(&report);

    let written = match output_path {
        Some(path) => File::create(path)
            .map_err(FoliotrackError::Io)
            .and_then(|f| write_report(&report, format, f)),
        None => write_report(&report, format, io::stdout().lock()),
    };
    if let Err(e) = written {
        return fail(&e);
    }
    if let Some(path) = output_path {
        eprintln!("Series written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_window(
    config_path: &PathBuf,
    user: &str,
    portfolio: &str,
    window: &str,
    now: Option<&str>,
) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = parse_clock(now)
        .and_then(|clock| build_service(&config, clock))
        .and_then(|service| runtime()?.block_on(service.resolve(user, portfolio, window)));
    match result {
        Ok(w) => {
            println!("window:    {}", w.label);
            println!("interval:  {}", w.descriptor.interval);
            println!("period:    {}", w.descriptor.period);
            println!("start:     {}", w.start);
            println!("end:       {}", w.end);
            match w.inception {
                Some(t) => println!("inception: {t}"),
                None => println!("inception: none"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

pub fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    match build_service_settings(&config) {
        Ok(settings) => {
            eprintln!("Config validated successfully");
            eprintln!("  ledger:    {:?}", settings.ledger);
            eprintln!("  prices:    {}", settings.prices_path.display());
            eprintln!(
                "  timeout:   {}s, cache ttl {}s, batch size {}",
                settings.timeout.as_secs(),
                settings.cache_ttl.as_secs(),
                settings.batch_size
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

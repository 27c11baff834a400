//! Configuration validation and service settings.
//!
//! Validates all config fields before any ledger or price I/O.

use chrono::Duration;
use std::path::PathBuf;

use crate::domain::error::FoliotrackError;
use crate::domain::series::SerializeOptions;
use crate::domain::window::{BarInterval, VendorLimits};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_TIMEOUT_SECS: i64 = 10;
pub const DEFAULT_CACHE_TTL_SECS: i64 = 30;
pub const DEFAULT_BATCH_SIZE: i64 = 8;
pub const DEFAULT_DECIMALS: i64 = 4;
pub const DEFAULT_POOL_SIZE: i64 = 4;
const MAX_DECIMALS: i64 = 12;
const MAX_TIMEOUT_SECS: i64 = 240;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerBackend {
    /// Directory holding `portfolios.csv` and `orders.csv`.
    Csv { path: PathBuf },
    Sqlite { path: PathBuf, pool_size: u32 },
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub ledger: LedgerBackend,
    /// Directory of per-ticker price histories.
    pub prices_path: PathBuf,
    pub timeout: std::time::Duration,
    pub cache_ttl: std::time::Duration,
    pub batch_size: usize,
    pub limits: VendorLimits,
    pub output: SerializeOptions,
}

pub fn validate_service_config(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    validate_ledger(config)?;
    require(config, "prices", "path")?;
    validate_timeout(config)?;
    validate_cache_ttl(config)?;
    validate_batch_size(config)?;
    validate_decimals(config)?;
    vendor_limits(config)?;
    Ok(())
}

/// Validate and then read the full settings.
pub fn build_service_settings(config: &dyn ConfigPort) -> Result<ServiceSettings, FoliotrackError> {
    validate_service_config(config)?;

    let ledger = match ledger_source(config).as_str() {
        "sqlite" => LedgerBackend::Sqlite {
            path: PathBuf::from(require(config, "sqlite", "path")?),
            pool_size: pool_size(config)?,
        },
        _ => LedgerBackend::Csv {
            path: PathBuf::from(require(config, "csv", "path")?),
        },
    };

    Ok(ServiceSettings {
        ledger,
        prices_path: PathBuf::from(require(config, "prices", "path")?),
        timeout: std::time::Duration::from_secs(
            config.get_int("prices", "timeout_secs", DEFAULT_TIMEOUT_SECS) as u64,
        ),
        cache_ttl: std::time::Duration::from_secs(
            config.get_int("prices", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS) as u64,
        ),
        batch_size: config.get_int("prices", "batch_size", DEFAULT_BATCH_SIZE) as usize,
        limits: vendor_limits(config)?,
        output: SerializeOptions {
            include_tickers: config.get_bool("output", "include_tickers", true),
            include_returns: config.get_bool("output", "include_returns", false),
            include_holdings: config.get_bool("output", "include_holdings", false),
            include_weights: config.get_bool("output", "include_weights", false),
            decimals: Some(config.get_int("output", "decimals", DEFAULT_DECIMALS) as u32),
        },
    })
}

fn ledger_source(config: &dyn ConfigPort) -> String {
    config
        .get_string("ledger", "source")
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "csv".to_string())
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, FoliotrackError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(FoliotrackError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FoliotrackError {
    FoliotrackError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_ledger(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    match ledger_source(config).as_str() {
        "csv" => {
            require(config, "csv", "path")?;
        }
        "sqlite" => {
            require(config, "sqlite", "path")?;
            pool_size(config)?;
        }
        other => {
            return Err(invalid(
                "ledger",
                "source",
                format!("unknown ledger source '{other}', expected csv or sqlite"),
            ));
        }
    }
    Ok(())
}

/// `[sqlite] pool_size`, between 1 and `u32::MAX`.
pub fn pool_size(config: &dyn ConfigPort) -> Result<u32, FoliotrackError> {
    let raw = config.get_int("sqlite", "pool_size", DEFAULT_POOL_SIZE);
    match u32::try_from(raw) {
        Ok(size) if size >= 1 => Ok(size),
        _ => Err(invalid(
            "sqlite",
            "pool_size",
            format!("pool_size must be between 1 and {}", u32::MAX),
        )),
    }
}

fn validate_timeout(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    let value = config.get_int("prices", "timeout_secs", DEFAULT_TIMEOUT_SECS);
    if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
        return Err(invalid(
            "prices",
            "timeout_secs",
            format!("timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"),
        ));
    }
    Ok(())
}

fn validate_cache_ttl(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    if config.get_int("prices", "cache_ttl_secs", DEFAULT_CACHE_TTL_SECS) < 0 {
        return Err(invalid(
            "prices",
            "cache_ttl_secs",
            "cache_ttl_secs must be non-negative",
        ));
    }
    Ok(())
}

fn validate_batch_size(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    if config.get_int("prices", "batch_size", DEFAULT_BATCH_SIZE) < 1 {
        return Err(invalid("prices", "batch_size", "batch_size must be at least 1"));
    }
    Ok(())
}

fn validate_decimals(config: &dyn ConfigPort) -> Result<(), FoliotrackError> {
    let value = config.get_int("output", "decimals", DEFAULT_DECIMALS);
    if !(0..=MAX_DECIMALS).contains(&value) {
        return Err(invalid(
            "output",
            "decimals",
            format!("decimals must be between 0 and {MAX_DECIMALS}"),
        ));
    }
    Ok(())
}

/// Default vendor limits with `[vendor] max_span_days_<interval>` overrides.
pub fn vendor_limits(config: &dyn ConfigPort) -> Result<VendorLimits, FoliotrackError> {
    let mut limits = VendorLimits::default();
    for interval in BarInterval::ALL {
        let key = format!("max_span_days_{}", interval.code());
        let Some(raw) = config.get_string("vendor", &key) else {
            continue;
        };
        let days: i64 = raw
            .trim()
            .parse()
            .map_err(|_| invalid("vendor", &key, "expected a whole number of days"))?;
        if days < 1 {
            return Err(invalid("vendor", &key, "span must be at least 1 day"));
        }
        let span = Duration::try_days(days)
            .ok_or_else(|| invalid("vendor", &key, "span is too large"))?;
        limits = limits.with_limit(interval, span);
    }
    Ok(limits)
}

//! Reporting windows: label parsing, bar-density choice under vendor limits,
//! and absolute range resolution with inception clamping.

use chrono::{DateTime, Duration, Months, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::FoliotrackError;
use super::instant::{day_floor, next_day, same_day, session_start, year_start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowLabel {
    OneDay,
    OneWeek,
    OneMonth,
    YearToDate,
    OneYear,
    All,
}

impl WindowLabel {
    pub const ALL: [WindowLabel; 6] = [
        WindowLabel::OneDay,
        WindowLabel::OneWeek,
        WindowLabel::OneMonth,
        WindowLabel::YearToDate,
        WindowLabel::OneYear,
        WindowLabel::All,
    ];

    /// Bar density asked of the vendor before limits are applied.
    pub fn requested_interval(self) -> BarInterval {
        match self {
            WindowLabel::OneDay => BarInterval::OneMinute,
            WindowLabel::OneWeek => BarInterval::FiveMinutes,
            WindowLabel::OneMonth => BarInterval::ThirtyMinutes,
            WindowLabel::YearToDate | WindowLabel::OneYear | WindowLabel::All => {
                BarInterval::OneDay
            }
        }
    }

    fn raw_start(self, now: DateTime<Utc>, inception: Option<DateTime<Utc>>) -> DateTime<Utc> {
        match self {
            WindowLabel::OneDay => session_start(now),
            WindowLabel::OneWeek => now - Duration::days(7),
            WindowLabel::OneMonth => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
            WindowLabel::YearToDate => year_start(now),
            WindowLabel::OneYear => now
                .checked_sub_months(Months::new(12))
                .unwrap_or(now - Duration::days(365)),
            WindowLabel::All => inception.unwrap_or(now),
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WindowLabel::OneDay => "1D",
            WindowLabel::OneWeek => "1W",
            WindowLabel::OneMonth => "1M",
            WindowLabel::YearToDate => "YTD",
            WindowLabel::OneYear => "1Y",
            WindowLabel::All => "ALL",
        };
        write!(f, "{s}")
    }
}

impl FromStr for WindowLabel {
    type Err = FoliotrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(WindowLabel::OneDay),
            "1W" => Ok(WindowLabel::OneWeek),
            "1M" => Ok(WindowLabel::OneMonth),
            "YTD" => Ok(WindowLabel::YearToDate),
            "1Y" => Ok(WindowLabel::OneYear),
            "ALL" => Ok(WindowLabel::All),
            _ => Err(FoliotrackError::validation(format!(
                "unknown window label '{s}' (expected one of 1D, 1W, 1M, YTD, 1Y, ALL)"
            ))),
        }
    }
}

/// Vendor bar sizes, finest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarInterval {
    OneMinute,
    TwoMinutes,
    FiveMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    SixtyMinutes,
    NinetyMinutes,
    OneDay,
    FiveDays,
    OneWeek,
    OneMonth,
    ThreeMonths,
}

impl BarInterval {
    pub const ALL: [BarInterval; 12] = [
        BarInterval::OneMinute,
        BarInterval::TwoMinutes,
        BarInterval::FiveMinutes,
        BarInterval::FifteenMinutes,
        BarInterval::ThirtyMinutes,
        BarInterval::SixtyMinutes,
        BarInterval::NinetyMinutes,
        BarInterval::OneDay,
        BarInterval::FiveDays,
        BarInterval::OneWeek,
        BarInterval::OneMonth,
        BarInterval::ThreeMonths,
    ];

    pub fn code(self) -> &'static str {
        match self {
            BarInterval::OneMinute => "1m",
            BarInterval::TwoMinutes => "2m",
            BarInterval::FiveMinutes => "5m",
            BarInterval::FifteenMinutes => "15m",
            BarInterval::ThirtyMinutes => "30m",
            BarInterval::SixtyMinutes => "60m",
            BarInterval::NinetyMinutes => "90m",
            BarInterval::OneDay => "1d",
            BarInterval::FiveDays => "5d",
            BarInterval::OneWeek => "1wk",
            BarInterval::OneMonth => "1mo",
            BarInterval::ThreeMonths => "3mo",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.code() == code)
    }

    /// Nominal bar length; months count as 30 days.
    pub fn duration(self) -> Duration {
        match self {
            BarInterval::OneMinute => Duration::minutes(1),
            BarInterval::TwoMinutes => Duration::minutes(2),
            BarInterval::FiveMinutes => Duration::minutes(5),
            BarInterval::FifteenMinutes => Duration::minutes(15),
            BarInterval::ThirtyMinutes => Duration::minutes(30),
            BarInterval::SixtyMinutes => Duration::minutes(60),
            BarInterval::NinetyMinutes => Duration::minutes(90),
            BarInterval::OneDay => Duration::days(1),
            BarInterval::FiveDays => Duration::days(5),
            BarInterval::OneWeek => Duration::weeks(1),
            BarInterval::OneMonth => Duration::days(30),
            BarInterval::ThreeMonths => Duration::days(90),
        }
    }

    pub fn is_intraday(self) -> bool {
        self < BarInterval::OneDay
    }
}

impl fmt::Display for BarInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Vendor range presets, shortest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VendorPeriod {
    OneDay,
    FiveDays,
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    TenYears,
    Max,
}

impl VendorPeriod {
    const BOUNDED: [(VendorPeriod, i64); 9] = [
        (VendorPeriod::OneDay, 1),
        (VendorPeriod::FiveDays, 5),
        (VendorPeriod::OneMonth, 30),
        (VendorPeriod::ThreeMonths, 90),
        (VendorPeriod::SixMonths, 180),
        (VendorPeriod::OneYear, 365),
        (VendorPeriod::TwoYears, 730),
        (VendorPeriod::FiveYears, 1825),
        (VendorPeriod::TenYears, 3650),
    ];

    /// Shortest preset covering `span`.
    pub fn covering(span: Duration) -> Self {
        Self::BOUNDED
            .iter()
            .find(|(_, days)| span <= Duration::days(*days))
            .map(|(p, _)| *p)
            .unwrap_or(VendorPeriod::Max)
    }

    pub fn code(self) -> &'static str {
        match self {
            VendorPeriod::OneDay => "1d",
            VendorPeriod::FiveDays => "5d",
            VendorPeriod::OneMonth => "1mo",
            VendorPeriod::ThreeMonths => "3mo",
            VendorPeriod::SixMonths => "6mo",
            VendorPeriod::OneYear => "1y",
            VendorPeriod::TwoYears => "2y",
            VendorPeriod::FiveYears => "5y",
            VendorPeriod::TenYears => "10y",
            VendorPeriod::Max => "max",
        }
    }
}

impl fmt::Display for VendorPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// What the price collaborator is asked for. Also the price cache key
/// together with the ticker set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BarDescriptor {
    pub interval: BarInterval,
    pub period: VendorPeriod,
}

impl fmt::Display for BarDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "interval={} period={}", self.interval, self.period)
    }
}

/// Longest span the vendor serves at each bar size. Sizes without an
/// entry are unlimited.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorLimits {
    max_span: BTreeMap<BarInterval, Duration>,
}

impl Default for VendorLimits {
    fn default() -> Self {
        let mut max_span = BTreeMap::new();
        max_span.insert(BarInterval::OneMinute, Duration::days(7));
        for interval in [
            BarInterval::TwoMinutes,
            BarInterval::FiveMinutes,
            BarInterval::FifteenMinutes,
            BarInterval::ThirtyMinutes,
            BarInterval::NinetyMinutes,
        ] {
            max_span.insert(interval, Duration::days(60));
        }
        max_span.insert(BarInterval::SixtyMinutes, Duration::days(730));
        Self { max_span }
    }
}

impl VendorLimits {
    pub fn unlimited() -> Self {
        Self {
            max_span: BTreeMap::new(),
        }
    }

    pub fn with_limit(mut self, interval: BarInterval, span: Duration) -> Self {
        self.max_span.insert(interval, span);
        self
    }

    pub fn accepts(&self, interval: BarInterval, span: Duration) -> bool {
        self.max_span.get(&interval).is_none_or(|max| span <= *max)
    }

    /// Finest bar size no finer than `requested` that the vendor serves for
    /// `span`. Falls back to the coarsest size.
    pub fn finest_accepted(&self, requested: BarInterval, span: Duration) -> BarInterval {
        BarInterval::ALL
            .into_iter()
            .filter(|i| *i >= requested)
            .find(|i| self.accepts(*i, span))
            .unwrap_or(BarInterval::ThreeMonths)
    }
}

/// A window label bound to absolute instants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedWindow {
    pub label: WindowLabel,
    pub descriptor: BarDescriptor,
    /// First instant shown, inclusive.
    pub start: DateTime<Utc>,
    /// The resolution instant ("now"), exclusive for vendor bars.
    pub end: DateTime<Utc>,
    pub inception: Option<DateTime<Utc>>,
}

impl ResolvedWindow {
    pub fn interval(&self) -> BarInterval {
        self.descriptor.interval
    }

    pub fn is_daily(&self) -> bool {
        !self.descriptor.interval.is_intraday()
    }
}

/// Resolve `label` against `now` and the portfolio's inception.
///
/// The start never precedes inception. Density is downgraded, never the
/// window, when the vendor cannot serve the requested bar size for the
/// window's length. On daily-or-coarser grids the start is aligned to a
/// day boundary, and moves to the next day when it shares a day with
/// inception so that the first bar already carries the opening orders.
pub fn resolve_window(
    label: WindowLabel,
    now: DateTime<Utc>,
    inception: Option<DateTime<Utc>>,
    limits: &VendorLimits,
) -> ResolvedWindow {
    let mut start = label.raw_start(now, inception);
    if let Some(inc) = inception {
        start = start.max(inc);
    }
    start = start.min(now);

    let span = now - start;
    let interval = limits.finest_accepted(label.requested_interval(), span);

    if !interval.is_intraday() {
        start = match inception {
            Some(inc) if same_day(inc, start) => next_day(start),
            _ => day_floor(start),
        };
        start = start.min(now);
    }

    let fetch_span = now - start.min(label.raw_start(now, inception));
    let descriptor = BarDescriptor {
        interval,
        period: VendorPeriod::covering(fetch_span),
    };

    tracing::debug!(
        window = %label,
        %descriptor,
        start = %start,
        end = %now,
        "resolved window"
    );

    ResolvedWindow {
        label,
        descriptor,
        start,
        end: now,
        inception,
    }
}

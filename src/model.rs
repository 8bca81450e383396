use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A single temperature record returned by the data service.
///
/// Temperatures are stored in degrees Fahrenheit; conversion happens at
/// ingestion time.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: DateTime<Utc>,
    pub temperature_f: f64,
    pub depth_m: f64,
}

/// A monitoring site resolved from the site lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Nominal logging rate of a site's instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingClass {
    /// Hourly loggers.
    Standard,
    /// Loggers recording every two hours.
    Reduced,
}

impl SamplingClass {
    /// Classify a site by the first three characters of its code.
    pub fn for_site<S: AsRef<str>>(code: &str, reduced_prefixes: &[S]) -> Self {
        let prefix = code.get(..3).unwrap_or(code);
        if reduced_prefixes.iter().any(|p| p.as_ref() == prefix) {
            SamplingClass::Reduced
        } else {
            SamplingClass::Standard
        }
    }
}

/// Per-class sample expectations used by the daily and monthly gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SamplingThresholds {
    pub samples_per_day: usize,
    pub min_daily_samples: usize,
}

impl SamplingThresholds {
    pub const STANDARD: Self = Self {
        samples_per_day: 24,
        min_daily_samples: 18,
    };

    pub const REDUCED: Self = Self {
        samples_per_day: 12,
        min_daily_samples: 10,
    };
}

/// One emitted line of a summary table.
///
/// `None` in any statistic is the missing marker; `count` always holds the
/// number of values that fell into the period.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub count: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Daily,
    Monthly,
    Annual,
    DailyClimatology,
    MonthlyClimatology,
}

impl TableKind {
    pub const ALL: [TableKind; 5] = [
        TableKind::Daily,
        TableKind::Monthly,
        TableKind::Annual,
        TableKind::DailyClimatology,
        TableKind::MonthlyClimatology,
    ];

    /// Short tag used in output file names.
    pub fn tag(self) -> &'static str {
        match self {
            TableKind::Daily => "da",
            TableKind::Monthly => "ma",
            TableKind::Annual => "ya",
            TableKind::DailyClimatology => "dc",
            TableKind::MonthlyClimatology => "mc",
        }
    }
}

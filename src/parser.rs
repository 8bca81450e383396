use crate::error::{AppError, Result};
use crate::model::Observation;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::warn;

const TIME_COLUMN: &str = "time (UTC)";
const DEPTH_COLUMN: &str = "depth (m)";
const TEMPERATURE_COLUMN: &str = "sea_water_temperature (degree_C)";

/// Value of the time column on the units row of a plain `.csv` response.
const UNITS_ROW_MARKER: &str = "UTC";

/// Default failure threshold - fail if more than 10% of rows fail to parse
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Default)]
pub struct ParseStats {
    pub total_rows: usize,
    pub parsed_successfully: usize,
    /// Rows with a valid timestamp but no usable temperature.
    pub missing_values: usize,
    pub parse_failures: usize,
    pub failure_rate: f64,
}

impl ParseStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize(&mut self) {
        self.failure_rate = if self.total_rows > 0 {
            self.parse_failures as f64 / self.total_rows as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }

    /// Rows that carried a valid timestamp, with or without a temperature.
    pub fn data_rows(&self) -> usize {
        self.parsed_successfully + self.missing_values
    }
}

struct Columns {
    time: usize,
    depth: usize,
    temperature: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| AppError::Parse(format!("Missing column '{}'", name)))
        };

        Ok(Self {
            time: find(TIME_COLUMN)?,
            depth: find(DEPTH_COLUMN)?,
            temperature: find(TEMPERATURE_COLUMN)?,
        })
    }
}

pub struct Parser;

impl Parser {
    /// Parse an ERDDAP temperature response into observations sorted by time
    pub fn parse_observations(content: &str) -> Result<(Vec<Observation>, ParseStats)> {
        Self::parse_observations_with_threshold(content, DEFAULT_FAILURE_THRESHOLD)
    }

    /// Parse an ERDDAP temperature response with a custom failure threshold
    pub fn parse_observations_with_threshold(
        content: &str,
        failure_threshold: f64,
    ) -> Result<(Vec<Observation>, ParseStats)> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let columns = Columns::locate(reader.headers()?)?;

        let mut observations = Vec::new();
        let mut stats = ParseStats::new();

        for (row_num, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    stats.total_rows += 1;
                    stats.parse_failures += 1;
                    warn!("Failed to read row {}: {}", row_num + 1, e);
                    continue;
                }
            };

            if row_num == 0 && record.get(columns.time) == Some(UNITS_ROW_MARKER) {
                continue;
            }

            stats.total_rows += 1;

            match parse_row(&record, &columns) {
                Ok(Some(obs)) => {
                    observations.push(obs);
                    stats.parsed_successfully += 1;
                }
                Ok(None) => {
                    stats.missing_values += 1;
                }
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!(
                        "Failed to parse row {} (failure {}/{}): {}",
                        row_num + 1,
                        stats.parse_failures,
                        stats.total_rows,
                        e
                    );
                }
            }
        }

        stats.finalize();

        if stats.exceeds_threshold(failure_threshold) {
            return Err(AppError::Parse(format!(
                "Parse failure rate {:.1}% exceeds threshold {:.1}%: {} failures out of {} rows",
                stats.failure_rate * 100.0,
                failure_threshold * 100.0,
                stats.parse_failures,
                stats.total_rows
            )));
        }

        // The service orders by time, but nothing downstream may rely on it.
        observations.sort_by_key(|o| o.time);

        Ok((observations, stats))
    }
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<Option<Observation>> {
    let field = |idx: usize, name: &str| {
        record
            .get(idx)
            .ok_or_else(|| AppError::Parse(format!("Row has no '{}' field", name)))
    };

    let time = parse_time(field(columns.time, TIME_COLUMN)?)?;
    let depth_m = parse_optional_float(field(columns.depth, DEPTH_COLUMN)?).unwrap_or(f64::NAN);

    let temperature_c = match parse_optional_float(field(columns.temperature, TEMPERATURE_COLUMN)?) {
        Some(t) if t.is_finite() => t,
        _ => return Ok(None),
    };

    Ok(Some(Observation {
        time,
        temperature_f: celsius_to_fahrenheit(temperature_c),
        depth_m,
    }))
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    1.8 * celsius + 32.0
}

fn parse_optional_float(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok()
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(AppError::Parse(format!("Invalid timestamp '{}'", s)))
}

/// Mean instrument depth in whole metres, truncated toward zero.
///
/// Non-finite depths are ignored; `None` when no depth is usable.
pub fn mean_depth(observations: &[Observation]) -> Option<i64> {
    let depths: Vec<f64> = observations
        .iter()
        .map(|o| o.depth_m)
        .filter(|d| d.is_finite())
        .collect();

    if depths.is_empty() {
        return None;
    }

    let mean = depths.iter().sum::<f64>() / depths.len() as f64;
    Some(mean.trunc() as i64)
}

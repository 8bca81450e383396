use crate::model::{Observation, SamplingThresholds, SummaryRow, TableKind};
use crate::stats::Summary;
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Year value written on climatology rows.
pub const CLIMATOLOGY_YEAR: i32 = 0;

/// Day written on monthly rows.
pub const MID_MONTH_DAY: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Month,
    Year,
}

impl Period {
    fn key(self, date: NaiveDate) -> i32 {
        match self {
            Period::Day => date.num_days_from_ce(),
            Period::Month => date.year() * 12 + date.month0() as i32,
            Period::Year => date.year(),
        }
    }

    fn start(self, key: i32) -> Option<NaiveDate> {
        match self {
            Period::Day => NaiveDate::from_num_days_from_ce_opt(key),
            Period::Month => {
                NaiveDate::from_ymd_opt(key.div_euclid(12), key.rem_euclid(12) as u32 + 1, 1)
            }
            Period::Year => NaiveDate::from_ymd_opt(key, 1, 1),
        }
    }
}

/// Values that fell into one calendar period.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub start: NaiveDate,
    pub values: Vec<f64>,
}

/// Group samples into a contiguous run of periods.
///
/// The run spans the earliest to the latest sample; periods without samples
/// are emitted empty. Undefined values extend the span but are not counted.
pub fn bucketize<I>(samples: I, period: Period) -> Vec<Bucket>
where
    I: IntoIterator<Item = (NaiveDate, Option<f64>)>,
{
    let mut grouped: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for (date, value) in samples {
        let values = grouped.entry(period.key(date)).or_default();
        if let Some(v) = value {
            values.push(v);
        }
    }

    let (first, last) = match (grouped.keys().next(), grouped.keys().next_back()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Vec::new(),
    };

    (first..=last)
        .filter_map(|key| {
            let start = period.start(key)?;
            Some(Bucket {
                start,
                values: grouped.remove(&key).unwrap_or_default(),
            })
        })
        .collect()
}

/// Inclusive range of years sharing one annual minimum count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct YearRegime {
    #[serde(default)]
    pub from_year: Option<i32>,
    #[serde(default)]
    pub to_year: Option<i32>,
    pub min_count: usize,
}

impl YearRegime {
    pub fn contains(&self, year: i32) -> bool {
        self.from_year.map_or(true, |from| year >= from)
            && self.to_year.map_or(true, |to| year <= to)
    }
}

/// How the annual coverage threshold is chosen for a site.
///
/// Years covered by a regime use its fixed count; all other years need at
/// least `fraction_of_max` of the busiest year's count.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualRule {
    pub fraction_of_max: f64,
    pub regimes: Vec<YearRegime>,
}

impl AnnualRule {
    pub fn from_fraction(fraction: f64) -> Self {
        Self {
            fraction_of_max: fraction,
            regimes: Vec::new(),
        }
    }

    pub fn threshold_for(&self, year: i32, max_count: usize) -> f64 {
        self.regimes
            .iter()
            .find(|r| r.contains(year))
            .map(|r| r.min_count as f64)
            .unwrap_or(self.fraction_of_max * max_count as f64)
    }
}

/// Every threshold needed to aggregate one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePolicy {
    pub sampling: SamplingThresholds,
    pub min_days_per_month: usize,
    pub annual: AnnualRule,
    pub reference_year: i32,
}

impl SitePolicy {
    pub fn min_monthly_samples(&self) -> usize {
        self.min_days_per_month * self.sampling.samples_per_day
    }
}

/// The five tables produced for a site.
#[derive(Debug, Clone, PartialEq)]
pub struct ClimatologyTables {
    pub daily: Vec<SummaryRow>,
    pub monthly: Vec<SummaryRow>,
    pub annual: Vec<SummaryRow>,
    pub daily_climatology: Vec<SummaryRow>,
    pub monthly_climatology: Vec<SummaryRow>,
}

impl ClimatologyTables {
    pub fn table(&self, kind: TableKind) -> &[SummaryRow] {
        match kind {
            TableKind::Daily => &self.daily,
            TableKind::Monthly => &self.monthly,
            TableKind::Annual => &self.annual,
            TableKind::DailyClimatology => &self.daily_climatology,
            TableKind::MonthlyClimatology => &self.monthly_climatology,
        }
    }
}

fn make_row(year: i32, month: u32, day: u32, summary: Summary) -> SummaryRow {
    SummaryRow {
        year,
        month,
        day,
        count: summary.count,
        mean: summary.mean,
        median: summary.median,
        min: summary.min,
        max: summary.max,
        std: summary.std,
    }
}

fn raw_samples(observations: &[Observation]) -> impl Iterator<Item = (NaiveDate, Option<f64>)> + '_ {
    observations
        .iter()
        .map(|o| (o.time.date_naive(), Some(o.temperature_f)))
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    match month {
        2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Daily means, masked below the site's minimum samples per day.
pub fn daily(observations: &[Observation], policy: &SitePolicy) -> Vec<SummaryRow> {
    let min_count = policy.sampling.min_daily_samples;
    bucketize(raw_samples(observations), Period::Day)
        .into_iter()
        .map(|b| {
            let summary = Summary::of(&b.values).gate(min_count);
            make_row(b.start.year(), b.start.month(), b.start.day(), summary)
        })
        .collect()
}

/// Monthly means, masked below `min_days_per_month * samples_per_day`.
pub fn monthly(observations: &[Observation], policy: &SitePolicy) -> Vec<SummaryRow> {
    let min_count = policy.min_monthly_samples();
    bucketize(raw_samples(observations), Period::Month)
        .into_iter()
        .map(|b| {
            let summary = Summary::of(&b.values).gate(min_count);
            make_row(b.start.year(), b.start.month(), MID_MONTH_DAY, summary)
        })
        .collect()
}

/// Annual means gated by the site's annual rule.
pub fn annual(observations: &[Observation], policy: &SitePolicy) -> Vec<SummaryRow> {
    let buckets = bucketize(raw_samples(observations), Period::Year);
    let max_count = buckets.iter().map(|b| b.values.len()).max().unwrap_or(0);

    buckets
        .into_iter()
        .map(|b| {
            let year = b.start.year();
            let threshold = policy.annual.threshold_for(year, max_count);
            let summary = Summary::of(&b.values);
            let summary = if (summary.count as f64) < threshold {
                summary.masked()
            } else {
                summary
            };
            make_row(year, 12, 31, summary)
        })
        .collect()
}

/// Move a row's month/day onto the reference year.
///
/// Returns `None` for 29 February when the reference year is not a leap year.
fn normalize(row: &SummaryRow, reference_year: i32, day: u32) -> Option<(NaiveDate, Option<f64>)> {
    NaiveDate::from_ymd_opt(reference_year, row.month, day).map(|date| (date, row.mean))
}

/// Day-of-year climatology built from the gated daily means.
///
/// Masked days are not counted: a row's count is the number of defined daily
/// means folded onto that day, though masked days still extend the span.
pub fn daily_climatology(daily_rows: &[SummaryRow], reference_year: i32) -> Vec<SummaryRow> {
    let samples: Vec<_> = daily_rows
        .iter()
        .filter_map(|row| normalize(row, reference_year, row.day))
        .collect();

    let dropped = daily_rows.len() - samples.len();
    if dropped > 0 {
        warn!(
            "Dropped {} daily values that do not exist in reference year {}",
            dropped, reference_year
        );
    }

    bucketize(samples, Period::Day)
        .into_iter()
        .map(|b| {
            make_row(
                CLIMATOLOGY_YEAR,
                b.start.month(),
                b.start.day(),
                Summary::of(&b.values),
            )
        })
        .collect()
}

/// Month-of-year climatology built from the gated monthly means.
///
/// Rows are labelled with the last day of the month in the reference year.
pub fn monthly_climatology(monthly_rows: &[SummaryRow], reference_year: i32) -> Vec<SummaryRow> {
    let samples: Vec<_> = monthly_rows
        .iter()
        .filter_map(|row| normalize(row, reference_year, 1))
        .collect();

    bucketize(samples, Period::Month)
        .into_iter()
        .map(|b| {
            let month = b.start.month();
            make_row(
                CLIMATOLOGY_YEAR,
                month,
                last_day_of_month(reference_year, month),
                Summary::of(&b.values),
            )
        })
        .collect()
}

/// Run all five aggregations for one site.
pub fn compute_all(observations: &[Observation], policy: &SitePolicy) -> ClimatologyTables {
    let daily = daily(observations, policy);
    let monthly = monthly(observations, policy);
    let annual = annual(observations, policy);
    let daily_climatology = daily_climatology(&daily, policy.reference_year);
    let monthly_climatology = monthly_climatology(&monthly, policy.reference_year);

    debug!(
        "Aggregated {} observations into {} days, {} months, {} years",
        observations.len(),
        daily.len(),
        monthly.len(),
        annual.len()
    );

    ClimatologyTables {
        daily,
        monthly,
        annual,
        daily_climatology,
        monthly_climatology,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn standard_policy() -> SitePolicy {
        SitePolicy {
            sampling: SamplingThresholds::STANDARD,
            min_days_per_month: 25,
            annual: AnnualRule::from_fraction(0.8),
            reference_year: 2000,
        }
    }

    fn hourly(y: i32, m: u32, d: u32, hours: i64, temp: f64) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap();
        (0..hours)
            .map(|h| Observation {
                time: start + Duration::hours(h),
                temperature_f: temp,
                depth_m: 10.0,
            })
            .collect()
    }

    fn daily_series(y: i32, m: u32, d: u32, days: i64, temp: f64) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        (0..days)
            .map(|i| Observation {
                time: start + Duration::days(i),
                temperature_f: temp,
                depth_m: 10.0,
            })
            .collect()
    }

    fn row(year: i32, month: u32, day: u32, mean: Option<f64>) -> SummaryRow {
        SummaryRow {
            year,
            month,
            day,
            count: 1,
            mean,
            median: mean,
            min: mean,
            max: mean,
            std: None,
        }
    }

    #[test]
    fn test_bucketize_fills_gaps() {
        let d = |day| NaiveDate::from_ymd_opt(2023, 5, day).unwrap();
        let buckets = bucketize(
            vec![(d(4), Some(2.0)), (d(1), Some(1.0)), (d(1), None)],
            Period::Day,
        );
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].values, vec![1.0]);
        assert!(buckets[1].values.is_empty());
        assert!(buckets[2].values.is_empty());
        assert_eq!(buckets[3].start, d(4));
    }

    #[test]
    fn test_bucketize_months_across_year_boundary() {
        let buckets = bucketize(
            vec![
                (NaiveDate::from_ymd_opt(2022, 11, 3).unwrap(), Some(1.0)),
                (NaiveDate::from_ymd_opt(2023, 2, 9).unwrap(), Some(2.0)),
            ],
            Period::Month,
        );
        let starts: Vec<(i32, u32)> = buckets.iter().map(|b| (b.start.year(), b.start.month())).collect();
        assert_eq!(starts, vec![(2022, 11), (2022, 12), (2023, 1), (2023, 2)]);
    }

    #[test]
    fn test_bucketize_empty() {
        assert!(bucketize(Vec::<(NaiveDate, Option<f64>)>::new(), Period::Year).is_empty());
    }

    #[test]
    fn test_daily_gate_at_threshold() {
        let mut obs = hourly(2023, 5, 1, 18, 50.0);
        obs.extend(hourly(2023, 5, 2, 17, 52.0));

        let rows = daily(&obs, &standard_policy());
        assert_eq!(rows.len(), 2);

        assert_eq!((rows[0].year, rows[0].month, rows[0].day), (2023, 5, 1));
        assert_eq!(rows[0].count, 18);
        assert_eq!(rows[0].mean, Some(50.0));
        assert_eq!(rows[0].std, Some(0.0));

        assert_eq!((rows[1].month, rows[1].day), (5, 2));
        assert_eq!(rows[1].count, 17);
        assert_eq!(rows[1].mean, None);
        assert_eq!(rows[1].median, None);
        assert_eq!(rows[1].min, None);
        assert_eq!(rows[1].max, None);
        assert_eq!(rows[1].std, None);
    }

    #[test]
    fn test_daily_reduced_rate_gate() {
        let policy = SitePolicy {
            sampling: SamplingThresholds::REDUCED,
            ..standard_policy()
        };
        let rows = daily(&hourly(2023, 5, 1, 10, 50.0), &policy);
        assert_eq!(rows[0].mean, Some(50.0));
        let rows = daily(&hourly(2023, 5, 1, 9, 50.0), &policy);
        assert_eq!(rows[0].mean, None);
    }

    #[test]
    fn test_monthly_gate_and_mid_month_day() {
        // 25 full days of hourly data passes a standard site, 24 does not.
        let mut obs = hourly(2023, 1, 1, 25 * 24, 40.0);
        obs.extend(hourly(2023, 2, 1, 24 * 24, 41.0));

        let rows = monthly(&obs, &standard_policy());
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].year, rows[0].month, rows[0].day), (2023, 1, 15));
        assert_eq!(rows[0].count, 600);
        assert_eq!(rows[0].mean, Some(40.0));
        assert_eq!(rows[1].count, 576);
        assert_eq!(rows[1].mean, None);
    }

    #[test]
    fn test_annual_fraction_of_max() {
        let mut obs = hourly(2001, 1, 1, 100, 45.0);
        obs.extend(hourly(2002, 1, 1, 8200, 46.0));
        obs.extend(hourly(2003, 1, 1, 8100, 47.0));
        obs.extend(hourly(2004, 1, 1, 50, 48.0));

        let rows = annual(&obs, &standard_policy());
        let counts: Vec<usize> = rows.iter().map(|r| r.count).collect();
        assert_eq!(counts, vec![100, 8200, 8100, 50]);
        assert_eq!(rows[0].mean, None);
        assert_eq!(rows[1].mean, Some(46.0));
        assert_eq!(rows[2].mean, Some(47.0));
        assert_eq!(rows[3].mean, None);
        assert!(rows.iter().all(|r| r.month == 12 && r.day == 31));
    }

    #[test]
    fn test_annual_regimes() {
        let policy = SitePolicy {
            annual: AnnualRule {
                fraction_of_max: 0.8,
                regimes: vec![
                    YearRegime { from_year: None, to_year: Some(1961), min_count: 12 },
                    YearRegime { from_year: Some(1962), to_year: Some(2000), min_count: 350 },
                    YearRegime { from_year: Some(2001), to_year: None, min_count: 8000 },
                ],
            },
            ..standard_policy()
        };

        let mut obs = daily_series(1960, 1, 1, 11, 50.0);
        obs.extend(daily_series(1965, 1, 1, 360, 51.0));

        let rows = annual(&obs, &policy);
        assert_eq!(rows.len(), 6);
        assert_eq!((rows[0].year, rows[0].count, rows[0].mean), (1960, 11, None));
        assert_eq!(rows[5].year, 1965);
        assert_eq!(rows[5].count, 360);
        assert_eq!(rows[5].mean, Some(51.0));
    }

    #[test]
    fn test_year_regime_falls_back_to_fraction() {
        let rule = AnnualRule {
            fraction_of_max: 0.5,
            regimes: vec![YearRegime { from_year: Some(2001), to_year: None, min_count: 8000 }],
        };
        assert_eq!(rule.threshold_for(2005, 100), 8000.0);
        assert_eq!(rule.threshold_for(1999, 100), 50.0);
    }

    #[test]
    fn test_daily_climatology_collapses_years_and_skips_masked() {
        let daily_rows = vec![
            row(2019, 7, 4, Some(60.0)),
            row(2020, 7, 4, Some(62.0)),
            row(2021, 7, 4, None),
            row(2021, 7, 5, Some(61.0)),
        ];

        let rows = daily_climatology(&daily_rows, 2000);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].year, rows[0].month, rows[0].day), (0, 7, 4));
        assert_eq!(rows[0].count, 2);
        assert_eq!(rows[0].mean, Some(61.0));
        assert_eq!(rows[1].count, 1);
        assert_eq!(rows[1].std, None);
    }

    #[test]
    fn test_daily_climatology_is_independent_of_source_years() {
        let a = vec![row(2010, 3, 1, Some(40.0)), row(2011, 3, 1, Some(42.0))];
        let b = vec![row(1990, 3, 1, Some(42.0)), row(2022, 3, 1, Some(40.0))];
        assert_eq!(daily_climatology(&a, 2000), daily_climatology(&b, 2000));
    }

    #[test]
    fn test_leap_day_kept_in_leap_reference_year() {
        let daily_rows = vec![row(2020, 2, 29, Some(35.0))];
        let rows = daily_climatology(&daily_rows, 2000);
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].month, rows[0].day), (2, 29));

        assert!(daily_climatology(&daily_rows, 2001).is_empty());
    }

    #[test]
    fn test_monthly_climatology_single_year_round_trip() {
        let monthly_rows: Vec<SummaryRow> = (1..=12)
            .map(|m| row(2021, m, MID_MONTH_DAY, Some(40.0 + m as f64)))
            .collect();

        let rows = monthly_climatology(&monthly_rows, 2000);
        assert_eq!(rows.len(), 12);
        for (m, r) in rows.iter().enumerate() {
            assert_eq!(r.year, CLIMATOLOGY_YEAR);
            assert_eq!(r.month, m as u32 + 1);
            assert_eq!(r.count, 1);
            assert_eq!(r.mean, Some(40.0 + (m + 1) as f64));
        }
        assert_eq!(rows[1].day, 29);
        assert_eq!(rows[3].day, 30);
        assert_eq!(rows[11].day, 31);
    }

    #[test]
    fn test_compute_all_is_deterministic() {
        let mut obs = hourly(2022, 12, 30, 24 * 40, 44.0);
        obs.extend(hourly(2023, 6, 1, 24 * 3, 58.0));

        let first = compute_all(&obs, &standard_policy());
        let second = compute_all(&obs, &standard_policy());
        assert_eq!(first, second);
        assert_eq!(first.annual.len(), 2);
        assert_eq!(first.table(TableKind::Daily).len(), first.daily.len());
    }
}

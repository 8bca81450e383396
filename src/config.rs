use crate::climatology::{AnnualRule, SitePolicy, YearRegime};
use crate::error::{AppError, Result};
use crate::model::{SamplingClass, SamplingThresholds};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    pub sites: Vec<String>,
    pub site_lookup: PathBuf,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub base_url: String,
    #[serde(default = "default_dataset")]
    pub dataset: String,
    #[serde(
        default = "default_timeout_seconds",
        deserialize_with = "deserialize_u64"
    )]
    pub timeout_seconds: u64,
}

fn default_dataset() -> String {
    "eMOLT".to_string()
}

fn default_timeout_seconds() -> u64 {
    120
}

/// Custom deserializer that handles a number given either bare or quoted
///
/// Accepts:
/// - `timeout_seconds: 120` (number)
/// - `timeout_seconds: "120"` (string that parses to number)
/// - `timeout_seconds: ${ERDDAP_TIMEOUT}` (env var substituted to either)
fn deserialize_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberValue {
        Number(u64),
        String(String),
    }

    match NumberValue::deserialize(deserializer)? {
        NumberValue::Number(n) => Ok(n),
        NumberValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid number: '{}'", s))),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_survey_file")]
    pub survey_file: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./output/")
}

fn default_survey_file() -> PathBuf {
    PathBuf::from("getemolt_mostdata.csv")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            survey_file: default_survey_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThresholdConfig {
    #[serde(default = "default_standard")]
    pub standard: SamplingThresholds,
    #[serde(default = "default_reduced")]
    pub reduced: SamplingThresholds,
    /// Site code prefixes (first three characters) of two-hourly loggers.
    #[serde(default = "default_reduced_prefixes")]
    pub reduced_prefixes: Vec<String>,
    #[serde(default = "default_min_days_per_month")]
    pub min_days_per_month: usize,
    #[serde(default = "default_annual_fraction")]
    pub annual_fraction_of_max: f64,
    #[serde(default = "default_reference_year")]
    pub reference_year: i32,
    /// Sites whose sampling frequency changed over their record.
    #[serde(default = "default_annual_regimes")]
    pub annual_regimes: BTreeMap<String, Vec<YearRegime>>,
}

fn default_standard() -> SamplingThresholds {
    SamplingThresholds::STANDARD
}

fn default_reduced() -> SamplingThresholds {
    SamplingThresholds::REDUCED
}

fn default_reduced_prefixes() -> Vec<String> {
    vec!["DMF".to_string(), "MA1".to_string()]
}

fn default_min_days_per_month() -> usize {
    25
}

fn default_annual_fraction() -> f64 {
    0.8
}

fn default_reference_year() -> i32 {
    2000
}

fn default_annual_regimes() -> BTreeMap<String, Vec<YearRegime>> {
    let regime = |from_year, to_year, min_count| YearRegime {
        from_year,
        to_year,
        min_count,
    };

    let mut regimes = BTreeMap::new();
    // Daily sampling until 2001, hourly since.
    regimes.insert(
        "NARR".to_string(),
        vec![regime(None, Some(2000), 350), regime(Some(2001), None, 8000)],
    );
    // Monthly until 1962, then daily, then hourly.
    regimes.insert(
        "WHAQ".to_string(),
        vec![
            regime(None, Some(1961), 12),
            regime(Some(1962), Some(2000), 350),
            regime(Some(2001), None, 8000),
        ],
    );
    regimes
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            standard: default_standard(),
            reduced: default_reduced(),
            reduced_prefixes: default_reduced_prefixes(),
            min_days_per_month: default_min_days_per_month(),
            annual_fraction_of_max: default_annual_fraction(),
            reference_year: default_reference_year(),
            annual_regimes: default_annual_regimes(),
        }
    }
}

impl ThresholdConfig {
    pub fn sampling_class(&self, site: &str) -> SamplingClass {
        SamplingClass::for_site(site, &self.reduced_prefixes)
    }

    /// Build the aggregation thresholds for one site.
    pub fn policy_for(&self, site: &str) -> SitePolicy {
        let sampling = match self.sampling_class(site) {
            SamplingClass::Standard => self.standard,
            SamplingClass::Reduced => self.reduced,
        };

        SitePolicy {
            sampling,
            min_days_per_month: self.min_days_per_month,
            annual: AnnualRule {
                fraction_of_max: self.annual_fraction_of_max,
                regimes: self.annual_regimes.get(site).cloned().unwrap_or_default(),
            },
            reference_year: self.reference_year,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // Substitute environment variables
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Valid HTTPS base URL
    /// - Non-empty site list of 4-character codes
    /// - Usable thresholds and regime ranges
    fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.source.base_url) {
            return Err(AppError::Config(format!(
                "Invalid source base_url '{}': {}",
                self.source.base_url, e
            )));
        }

        if let Ok(parsed) = url::Url::parse(&self.source.base_url) {
            if parsed.scheme() != "https" {
                return Err(AppError::Config(format!(
                    "Source base_url must use HTTPS, got: {}",
                    parsed.scheme()
                )));
            }
        }

        if self.source.dataset.is_empty() {
            return Err(AppError::Config("Source dataset cannot be empty".to_string()));
        }

        if self.source.timeout_seconds == 0 {
            return Err(AppError::Config(
                "Source timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.sites.is_empty() {
            return Err(AppError::Config("At least one site must be configured".to_string()));
        }

        for site in &self.sites {
            if site.len() != 4 {
                return Err(AppError::Config(format!(
                    "Site code '{}' must be exactly 4 characters (e.g., 'BN01', 'DMF4')",
                    site
                )));
            }
        }

        if self.site_lookup.as_os_str().is_empty() {
            return Err(AppError::Config("site_lookup path cannot be empty".to_string()));
        }

        let t = &self.thresholds;
        for (name, sampling) in [("standard", &t.standard), ("reduced", &t.reduced)] {
            if sampling.samples_per_day == 0 {
                return Err(AppError::Config(format!(
                    "{} samples_per_day must be greater than 0",
                    name
                )));
            }
            if sampling.min_daily_samples > sampling.samples_per_day {
                return Err(AppError::Config(format!(
                    "{} min_daily_samples {} exceeds samples_per_day {}",
                    name, sampling.min_daily_samples, sampling.samples_per_day
                )));
            }
        }

        for prefix in &t.reduced_prefixes {
            if prefix.len() != 3 {
                return Err(AppError::Config(format!(
                    "Reduced-rate prefix '{}' must be exactly 3 characters",
                    prefix
                )));
            }
        }

        if t.min_days_per_month == 0 || t.min_days_per_month > 31 {
            return Err(AppError::Config(format!(
                "min_days_per_month must be between 1 and 31, got {}",
                t.min_days_per_month
            )));
        }

        if !(t.annual_fraction_of_max > 0.0 && t.annual_fraction_of_max <= 1.0) {
            return Err(AppError::Config(format!(
                "annual_fraction_of_max must be in (0, 1], got {}",
                t.annual_fraction_of_max
            )));
        }

        if NaiveDate::from_ymd_opt(t.reference_year, 2, 29).is_none() {
            tracing::warn!(
                "Reference year {} is not a leap year, 29 February values will be dropped from climatologies",
                t.reference_year
            );
        }

        for (site, regimes) in &t.annual_regimes {
            for regime in regimes {
                if let (Some(from), Some(to)) = (regime.from_year, regime.to_year) {
                    if from > to {
                        return Err(AppError::Config(format!(
                            "Annual regime for {} has from_year {} after to_year {}",
                            site, from, to
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid env var pattern: {}", e)))?;

    let mut missing_vars = Vec::new();
    let mut lines = Vec::new();

    for line in content.lines() {
        // Comment lines are passed through untouched
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut expanded = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    expanded = expanded.replace(&cap[0], &value);
                }
                Err(_) => {
                    missing_vars.push(var_name.to_string());
                }
            }
        }
        lines.push(expanded);
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root\n\
             2. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

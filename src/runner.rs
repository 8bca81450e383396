use crate::climatology::{self, ClimatologyTables};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::Fetcher;
use crate::model::{Observation, Site};
use crate::output;
use crate::parser::{self, Parser};
use crate::sites::SiteDirectory;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of one processed site.
#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub depth: i64,
    pub observations: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub processed: Vec<SiteReport>,
    pub skipped: Vec<(String, String)>,
}

/// Drives the per-site climatology batch, one site at a time.
pub struct Runner {
    config: Config,
    fetcher: Fetcher,
    directory: SiteDirectory,
}

impl Runner {
    pub fn new(config: Config) -> Result<Self> {
        let directory = SiteDirectory::load(&config.site_lookup)?;
        Self::with_directory(config, directory)
    }

    pub fn with_directory(config: Config, directory: SiteDirectory) -> Result<Self> {
        let fetcher = Fetcher::new(
            &config.source.base_url,
            &config.source.dataset,
            Duration::from_secs(config.source.timeout_seconds),
        )?;

        Ok(Self {
            config,
            fetcher,
            directory,
        })
    }

    /// Process every configured site. Failures skip the site and never abort the run.
    pub async fn run(&self) -> RunSummary {
        info!("Starting climatology run for {} sites", self.config.sites.len());

        let mut summary = RunSummary::default();

        for code in &self.config.sites {
            match self.process_site(code).await {
                Ok(report) => {
                    info!(
                        "Processed {}: {} observations at {} m",
                        report.site, report.observations, report.depth
                    );
                    summary.processed.push(report);
                }
                Err(e) => {
                    match &e {
                        AppError::SiteNotFound(_) | AppError::NoData(_) => {
                            warn!("Skipping {}: {}", code, e)
                        }
                        _ => error!("Error processing {}: {}", code, e),
                    }
                    summary.skipped.push((code.clone(), e.to_string()));
                }
            }
        }

        info!(
            "Run completed: {} sites processed, {} skipped",
            summary.processed.len(),
            summary.skipped.len()
        );
        summary
    }

    async fn process_site(&self, code: &str) -> Result<SiteReport> {
        let site = self.directory.lookup(code)?;
        info!(
            "Getting data for {} ({}, {}) from ERDDAP",
            code, site.latitude, site.longitude
        );

        let content = self.fetcher.fetch_site(site.latitude, site.longitude).await?;
        let (observations, stats) = Parser::parse_observations(&content)?;

        info!(
            "Parsed {} rows for {}: {} usable, {} missing temperature, {} failures",
            stats.total_rows, code, stats.parsed_successfully, stats.missing_values, stats.parse_failures
        );

        if observations.is_empty() {
            return Err(AppError::NoData(format!("no usable observations for {}", code)));
        }

        let depth = parser::mean_depth(&observations)
            .ok_or_else(|| AppError::NoData(format!("no instrument depth reported for {}", code)))?;

        let tables = self.aggregate(site, &observations);
        let files = output::write_tables(&self.config.output.directory, code, depth, &tables)?;

        Ok(SiteReport {
            site: code.to_string(),
            depth,
            observations: observations.len(),
            files,
        })
    }

    fn aggregate(&self, site: &Site, observations: &[Observation]) -> ClimatologyTables {
        let thresholds = &self.config.thresholds;
        let class = thresholds.sampling_class(&site.code);
        let policy = thresholds.policy_for(&site.code);
        info!(
            "Aggregating {} as {:?} site (min {} samples/day, {} samples/month)",
            site.code,
            class,
            policy.sampling.min_daily_samples,
            policy.min_monthly_samples()
        );
        climatology::compute_all(observations, &policy)
    }
}

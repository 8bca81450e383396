use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::model::{Observation, Site};
use crate::output::SurveyRecord;
use crate::parser::Parser;
use crate::sites::SiteDirectory;
use chrono::Datelike;
use tracing::{info, warn};

/// Sites spanning more than this many years are reported.
const LONG_RECORD_YEARS: f64 = 10.0;

/// Build a survey record from a site's parsed series.
pub fn summarize(site: &Site, observations: &[Observation], data_rows: usize) -> SurveyRecord {
    let (nyrs, maxyrs) = match (observations.first(), observations.last()) {
        (Some(first), Some(last)) => (
            (last.time - first.time).num_days() as f64 / 365.0,
            last.time.year(),
        ),
        _ => (0.0, 0),
    };

    SurveyRecord {
        site: site.code.clone(),
        lat: site.latitude,
        lon: site.longitude,
        npts: data_rows,
        nyrs,
        maxyrs,
    }
}

fn empty_record(site: &Site) -> SurveyRecord {
    summarize(site, &[], 0)
}

async fn survey_site(fetcher: &Fetcher, site: &Site) -> Result<SurveyRecord> {
    let content = fetcher.fetch_site(site.latitude, site.longitude).await?;
    let (observations, stats) = Parser::parse_observations(&content)?;
    Ok(summarize(site, &observations, stats.data_rows()))
}

/// Survey every site in the directory, one request at a time.
///
/// A site whose request fails is recorded with zero points and years.
pub async fn survey_sites(fetcher: &Fetcher, directory: &SiteDirectory) -> Vec<SurveyRecord> {
    let mut records = Vec::with_capacity(directory.sites().len());

    for site in directory.sites() {
        let record = match survey_site(fetcher, site).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Survey of {} failed: {}", site.code, e);
                empty_record(site)
            }
        };

        if record.nyrs > LONG_RECORD_YEARS {
            info!(
                "{} ({}, {}) spans {:.1} years",
                record.site, record.lat, record.lon, record.nyrs
            );
        }
        records.push(record);
    }

    records
}

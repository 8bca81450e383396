use crate::error::{AppError, Result};
use crate::model::Site;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct SiteRecord {
    #[serde(rename = "SITE")]
    site: String,
    #[serde(rename = "LAT_DDMM")]
    latitude: f64,
    #[serde(rename = "LON_DDMM")]
    longitude: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    sites: Vec<Site>,
}

impl SiteDirectory {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read site lookup table {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_csv(&content)
    }

    /// Parse the lookup CSV; rows without usable coordinates are skipped.
    pub fn from_csv(content: &str) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_reader(content.as_bytes());

        let mut sites = Vec::new();
        for (row_num, record) in reader.deserialize::<SiteRecord>().enumerate() {
            match record {
                Ok(r) => sites.push(Site {
                    code: r.site,
                    latitude: r.latitude,
                    longitude: r.longitude,
                }),
                Err(e) => warn!("Skipping site lookup row {}: {}", row_num + 1, e),
            }
        }

        debug!("Loaded {} sites from lookup table", sites.len());
        Ok(Self { sites })
    }

    /// First entry matching `code` exactly.
    pub fn lookup(&self, code: &str) -> Result<&Site> {
        self.sites
            .iter()
            .find(|s| s.code == code)
            .ok_or_else(|| AppError::SiteNotFound(code.to_string()))
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }
}

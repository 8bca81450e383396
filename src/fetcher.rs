use crate::error::{AppError, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

const VARIABLES: &str = "time,depth,sea_water_temperature";

/// Client for the ERDDAP tabledap endpoint serving eMOLT temperatures.
pub struct Fetcher {
    client: Client,
    base_url: String,
    dataset: String,
}

impl Fetcher {
    pub fn new(base_url: &str, dataset: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("emolt-clim/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            dataset: dataset.to_string(),
        })
    }

    /// Request URL for all temperatures recorded at one position.
    pub fn site_url(&self, latitude: f64, longitude: f64) -> String {
        format!(
            "{}/tabledap/{}.csvp?{}&latitude={}&longitude={}&orderBy(%22time%22)",
            self.base_url, self.dataset, VARIABLES, latitude, longitude
        )
    }

    /// Download the raw CSV time series for one position.
    ///
    /// ERDDAP answers 404 when a query matches no rows; that is reported as
    /// [`AppError::NoData`].
    pub async fn fetch_site(&self, latitude: f64, longitude: f64) -> Result<String> {
        let url = self.site_url(latitude, longitude);
        debug!("Fetching observations from {}", url);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NoData(format!(
                "no observations at latitude={} longitude={}",
                latitude, longitude
            )));
        }

        let content = response.error_for_status()?.text().await?;
        debug!("Received {} bytes", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_url() {
        let fetcher = Fetcher::new(
            "https://comet.nefsc.noaa.gov/erddap/",
            "eMOLT",
            Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            fetcher.site_url(41.5, -70.25),
            "https://comet.nefsc.noaa.gov/erddap/tabledap/eMOLT.csvp?\
             time,depth,sea_water_temperature&latitude=41.5&longitude=-70.25&orderBy(%22time%22)"
        );
    }
}

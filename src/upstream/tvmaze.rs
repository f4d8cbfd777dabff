//! TVMaze REST client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::de::DeserializeOwned;
use url::Url;

use super::{CatalogSource, EpisodeRecord, SeasonRecord, ShowRecord, UpdatePeriod, UpstreamError};
use crate::config::UpstreamConfig;

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// HTTP client for the public TVMaze API.
#[derive(Debug, Clone)]
pub struct TvMazeClient {
    http: Client,
    base_url: Url,
}

impl TvMazeClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(&config.base_url)?;
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, UpstreamError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path.trim_start_matches('/')))?)
    }

    /// GETs `url` and decodes the body. `Ok(None)` means 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        resource: &str,
    ) -> Result<Option<T>, UpstreamError> {
        tracing::debug!(%url, resource, "Fetching upstream resource");
        let response = self.http.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            tracing::warn!(resource, retry_after, "Upstream rate limit hit");
            return Err(UpstreamError::RateLimited {
                retry_after: Some(retry_after),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|err| UpstreamError::Malformed {
                resource: resource.to_string(),
                message: err.to_string(),
            })
    }

    async fn get_required<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: String,
    ) -> Result<T, UpstreamError> {
        let url = self.endpoint(path)?;
        self.get_json(url, &resource)
            .await?
            .ok_or(UpstreamError::NotFound { resource })
    }
}

#[async_trait]
impl CatalogSource for TvMazeClient {
    async fn show_index_page(&self, page: u32) -> Result<Vec<ShowRecord>, UpstreamError> {
        let mut url = self.endpoint("shows")?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        // The index answers 404 once `page` runs past the last page
        Ok(self
            .get_json(url, &format!("show index page {}", page))
            .await?
            .unwrap_or_default())
    }

    async fn show(&self, show_id: i64) -> Result<ShowRecord, UpstreamError> {
        self.get_required(&format!("shows/{}", show_id), format!("show {}", show_id))
            .await
    }

    async fn seasons(&self, show_id: i64) -> Result<Vec<SeasonRecord>, UpstreamError> {
        self.get_required(
            &format!("shows/{}/seasons", show_id),
            format!("seasons of show {}", show_id),
        )
        .await
    }

    async fn episodes(&self, show_id: i64) -> Result<Vec<EpisodeRecord>, UpstreamError> {
        self.get_required(
            &format!("shows/{}/episodes", show_id),
            format!("episodes of show {}", show_id),
        )
        .await
    }

    async fn updates(&self, period: UpdatePeriod) -> Result<BTreeMap<i64, i64>, UpstreamError> {
        let mut url = self.endpoint("updates/shows")?;
        url.query_pairs_mut().append_pair("since", period.as_str());
        // Keys arrive as JSON object keys, i.e. strings
        let raw: BTreeMap<String, i64> = self
            .get_json(url, "show updates")
            .await?
            .unwrap_or_default();

        raw.into_iter()
            .map(|(id, changed_at)| {
                id.parse::<i64>()
                    .map(|id| (id, changed_at))
                    .map_err(|_| UpstreamError::Malformed {
                        resource: "show updates".to_string(),
                        message: format!("non-numeric show id '{}'", id),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> TvMazeClient {
        TvMazeClient::new(&UpstreamConfig {
            base_url: base_url.to_string(),
            ..UpstreamConfig::default()
        })
        .expect("client")
    }

    #[test]
    fn endpoint_tolerates_trailing_slashes() {
        let with_slash = client("https://api.tvmaze.com/");
        let without = client("https://api.tvmaze.com");
        assert_eq!(
            with_slash.endpoint("shows/1").unwrap().as_str(),
            "https://api.tvmaze.com/shows/1"
        );
        assert_eq!(
            without.endpoint("/shows/1/seasons").unwrap().as_str(),
            "https://api.tvmaze.com/shows/1/seasons"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let proxied = client("http://localhost:8080/tvmaze");
        assert_eq!(
            proxied.endpoint("updates/shows").unwrap().as_str(),
            "http://localhost:8080/tvmaze/updates/shows"
        );
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = TvMazeClient::new(&UpstreamConfig {
            base_url: "not a url".to_string(),
            ..UpstreamConfig::default()
        });
        assert!(matches!(result, Err(UpstreamError::InvalidUrl(_))));
    }
}

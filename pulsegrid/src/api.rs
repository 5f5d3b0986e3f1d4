//! Read side of the backend: directory listing and historical rows.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::types::{MetricRow, SeriesKey, ServerRow};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait MetricsApi: Send + Sync {
    /// All known (server, tag) pairs, in the order the backend lists them.
    async fn list_series(&self) -> Result<Vec<SeriesKey>>;

    /// The most recent `limit` rows for one series, in whatever order the backend uses.
    async fn fetch_history(&self, key: &SeriesKey, limit: usize) -> Result<Vec<MetricRow>>;
}

/// `MetricsApi` over the backend's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base: Url,
}

impl HttpApi {
    pub fn new(base: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Self::with_client(client, base)
    }

    pub fn with_client(client: Client, base: &str) -> Result<Self> {
        let mut base = Url::parse(base)?;
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::Scheme {
                    scheme: other.to_string(),
                    what: "history API",
                })
            }
        }
        // endpoints join relative to the base, so a path prefix must end in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        // decode separately so a bad body reports as a JSON error, not a transport one
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl MetricsApi for HttpApi {
    async fn list_series(&self) -> Result<Vec<SeriesKey>> {
        let url = self.endpoint("api/list_servers")?;
        // the backend encodes an empty listing as `null`
        let rows: Option<Vec<ServerRow>> = self.get_json(url).await?;
        Ok(rows.unwrap_or_default().into_iter().map(SeriesKey::from).collect())
    }

    async fn fetch_history(&self, key: &SeriesKey, limit: usize) -> Result<Vec<MetricRow>> {
        let mut url = self.endpoint("api/metrics")?;
        url.query_pairs_mut()
            .append_pair("server_id", &key.server_id)
            .append_pair("tag", &key.tag)
            .append_pair("limit", &limit.to_string());
        let rows: Option<Vec<MetricRow>> = self.get_json(url).await?;
        Ok(rows.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            HttpApi::new("ws://localhost:8080"),
            Err(Error::Scheme { .. })
        ));
        assert!(HttpApi::new("not a url").is_err());
    }

    #[test]
    fn history_url_carries_query() {
        let api = HttpApi::new("http://example:8080").unwrap();
        let mut url = api.endpoint("api/metrics").unwrap();
        url.query_pairs_mut()
            .append_pair("server_id", "s 1")
            .append_pair("tag", "prod");
        assert_eq!(
            url.as_str(),
            "http://example:8080/api/metrics?server_id=s+1&tag=prod"
        );
    }

    #[test]
    fn base_path_prefix_is_kept() {
        for base in ["http://example:8080/dash", "http://example:8080/dash/"] {
            let api = HttpApi::new(base).unwrap();
            assert_eq!(
                api.endpoint("api/list_servers").unwrap().as_str(),
                "http://example:8080/dash/api/list_servers",
                "{base}"
            );
        }
    }
}

use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::de::DeserializeOwned;
use shared::domain::InstanceId;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// All resource requests are rooted here, matching the REST API mount point.
pub const API_BASE_PATH: &str = "/api/v1";

const REQUESTED_WITH_HEADER: &str = "X-Requested-With";
const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

#[derive(Debug, Error)]
pub enum ApiClientError {
    #[error("invalid server url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Thin wrapper over the dashboard REST API. Every request is prefixed with
/// the fixed base path and carries the programmatic-request header. No retry,
/// no caching: each call is a fresh round trip, and any non-success outcome
/// is returned to the caller untouched.
pub struct ResourceClient {
    http: Client,
    base_url: String,
}

impl ResourceClient {
    pub fn new(server_url: &str) -> Result<Self, ApiClientError> {
        let parsed = Url::parse(server_url)?;
        let base_url = format!(
            "{}{}",
            parsed.as_str().trim_end_matches('/'),
            API_BASE_PATH
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            REQUESTED_WITH_HEADER,
            HeaderValue::from_static(REQUESTED_WITH_VALUE),
        );
        let http = Client::builder().default_headers(headers).build()?;

        Ok(Self { http, base_url })
    }

    /// `GET <base>/<collection>/`, decoded as a JSON array.
    pub async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<Vec<T>, ApiClientError> {
        let url = format!("{}/{collection}/", self.base_url);
        debug!(%url, "listing collection");
        let records = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }

    /// `GET <base>/<collection>/<pk>/`, the detail endpoint next to the list.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        pk: InstanceId,
    ) -> Result<T, ApiClientError> {
        let url = format!("{}/{collection}/{}/", self.base_url, pk.0);
        debug!(%url, "fetching resource");
        let record = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(record)
    }
}

pub mod error;
pub mod extract;

pub use error::{Result, SnapshotError};
pub use extract::extract_image_url;

use std::time::Duration;

use url::Url;

/// Ad library endpoint that renders one ad's snapshot.
pub const DEFAULT_SNAPSHOT_BASE_URL: &str = "https://www.facebook.com/ads/archive/render_ad/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SnapshotClient {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SnapshotClient {
    pub fn new(access_token: &str) -> Result<Self> {
        Self::builder(access_token).build()
    }

    pub fn builder(access_token: &str) -> SnapshotClientBuilder {
        SnapshotClientBuilder {
            access_token: access_token.to_string(),
            base_url: DEFAULT_SNAPSHOT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Snapshot URL for an archive ID, with `id` and `access_token` query parameters.
    pub fn snapshot_url(&self, archive_id: &str) -> Result<String> {
        self.build_url(archive_id, &self.access_token)
    }

    /// Same as [`snapshot_url`](Self::snapshot_url) with the token cut down
    /// to a short prefix, for logs.
    pub fn redacted_snapshot_url(&self, archive_id: &str) -> Result<String> {
        let n = self
            .access_token
            .char_indices()
            .nth(5)
            .map(|(i, _)| i)
            .unwrap_or(self.access_token.len());
        self.build_url(archive_id, &format!("{}...", &self.access_token[..n]))
    }

    fn build_url(&self, archive_id: &str, access_token: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)?;
        url.query_pairs_mut()
            .append_pair("id", archive_id)
            .append_pair("access_token", access_token);
        Ok(url.into())
    }

    /// Fetch the raw snapshot body. Non-2xx responses are errors.
    pub async fn fetch(&self, archive_id: &str) -> Result<String> {
        let url = self.snapshot_url(archive_id)?;
        tracing::debug!(
            archive_id,
            url = %self.redacted_snapshot_url(archive_id)?,
            "Fetching ad snapshot"
        );

        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SnapshotError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Fetch the snapshot and extract its image URL.
    ///
    /// `Ok(None)` means the snapshot was fetched but carries no usable image
    /// URL. Transport failures and non-2xx responses are errors.
    pub async fn resolve_image_url(&self, archive_id: &str) -> Result<Option<String>> {
        let body = self.fetch(archive_id).await?;
        let image_url = extract_image_url(&body);
        match &image_url {
            Some(url) => tracing::debug!(archive_id, image_url = %url, "Resolved image URL"),
            None => tracing::info!(archive_id, "No image URL in snapshot"),
        }
        Ok(image_url)
    }
}

pub struct SnapshotClientBuilder {
    access_token: String,
    base_url: String,
    timeout: Duration,
}

impl SnapshotClientBuilder {
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.to_string();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<SnapshotClient> {
        Url::parse(&self.base_url)?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SnapshotError::Network(e.to_string()))?;

        Ok(SnapshotClient {
            client,
            base_url: self.base_url,
            access_token: self.access_token,
        })
    }
}

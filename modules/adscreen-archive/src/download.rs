use std::time::Duration;

use adscreen_common::{FetchStatus, ImageFetch};
use reqwest::StatusCode;
use tracing::{debug, warn};

/// Downloads creative images. Every failure is classified into a
/// [`FetchStatus`]; nothing here is retried.
pub struct ImageDownloader {
    client: reqwest::Client,
}

impl ImageDownloader {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub async fn download(&self, url: &str) -> ImageFetch {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "Image request failed");
                return ImageFetch::Failed(classify_error(&e));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            warn!(url, status = status.as_u16(), "Image request returned non-success status");
            return ImageFetch::Failed(classify_status(status));
        }

        match resp.bytes().await {
            Ok(bytes) => {
                debug!(url, bytes = bytes.len(), "Downloaded image");
                ImageFetch::Fetched(bytes)
            }
            Err(e) => {
                warn!(url, error = %e, "Failed reading image body");
                ImageFetch::Failed(classify_error(&e))
            }
        }
    }
}

fn classify_error(err: &reqwest::Error) -> FetchStatus {
    if err.is_timeout() {
        FetchStatus::Timeout
    } else {
        FetchStatus::UnknownError
    }
}

fn classify_status(status: StatusCode) -> FetchStatus {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchStatus::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FetchStatus::Timeout,
        _ => FetchStatus::UnknownError,
    }
}

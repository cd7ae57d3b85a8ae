//! HTTP plumbing shared by the extractors.
//!
//! Every request goes through an [`HttpClient`] so that credentials can be
//! layered on with wrappers such as [`auth::UrlParam`].

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use reqwest::Url;

/// Issues a GET for `url` and returns the response body as text.
///
/// # Errors
///
/// Fails on transport errors (including timeouts) and on any non-2xx status.
/// Errors never carry the request URL, since client wrappers may have put
/// credentials in it.
pub async fn fetch_text<C: HttpClient>(client: &C, url: Url) -> Result<String> {
    let req = reqwest::Request::new(reqwest::Method::GET, url);

    let resp = client
        .execute(req)
        .await
        .map_err(reqwest::Error::without_url)
        .context("request failed")?
        .error_for_status()
        .map_err(reqwest::Error::without_url)
        .context("API returned an error status")?;

    resp.text()
        .await
        .map_err(reqwest::Error::without_url)
        .context("failed to read response body")
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fetch_text_connection_refused() {
        let client = BasicClient::with_timeout(Duration::from_secs(2)).unwrap();
        let url = Url::parse("http://127.0.0.1:9/unreachable").unwrap();

        let result = fetch_text(&client, url).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_fetch_text_error_hides_key() {
        let client = auth::UrlParam::new(
            BasicClient::with_timeout(Duration::from_secs(2)).unwrap(),
            "key",
            "SUPERSECRET",
        );
        let url = Url::parse("http://127.0.0.1:9/flow?point=1.0%2C2.0").unwrap();

        let err = fetch_text(&client, url).await.unwrap_err();

        let logged = format!("{err:#}");
        assert!(!logged.contains("SUPERSECRET"), "{logged}");
    }

    #[tokio::test]
    async fn test_fetch_text_ok_body() {
        let client = canned::CannedClient::ok("<flowSegmentData/>");
        let url = Url::parse("http://example.test/flow").unwrap();

        assert_eq!(fetch_text(&client, url).await.unwrap(), "<flowSegmentData/>");
    }

    #[tokio::test]
    async fn test_fetch_text_error_status() {
        let client = auth::UrlParam::new(
            canned::CannedClient::new(500, "boom"),
            "key",
            "SUPERSECRET",
        );
        let url = Url::parse("http://example.test/flow").unwrap();

        let err = fetch_text(&client, url).await.unwrap_err();

        let logged = format!("{err:#}");
        assert!(logged.contains("500"), "{logged}");
        assert!(!logged.contains("SUPERSECRET"), "{logged}");
        assert_eq!(
            client.inner.requested.lock().unwrap()[0].query(),
            Some("key=SUPERSECRET")
        );
    }
}

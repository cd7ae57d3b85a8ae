use async_trait::async_trait;
use reqwest::{Request, Response};

/// Sends a prepared request. Extractors are generic over this so the API key
/// wrapper and timeouts stay out of the URL-building and decoding code.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

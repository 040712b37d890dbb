pub mod http_fetcher;

use async_trait::async_trait;

use crate::app::Result;

/// A successful (2xx) response.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Retrieves raw documents over HTTP.
///
/// Non-2xx responses and transport failures are both reported as
/// [`TubeshelfError::Fetch`](crate::app::TubeshelfError::Fetch). No retry
/// is performed at this layer.
#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse>;
}

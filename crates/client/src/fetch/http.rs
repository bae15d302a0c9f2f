//! reqwest-backed transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use pagewarp_core::Error;
use pagewarp_core::config::RequestConfig;

use super::{Request, Response, Transport, TransportError};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// HTTP transport with redirect, size and timeout limits.
pub struct HttpTransport {
    http: Client,
    max_bytes: usize,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a new transport from the session's request settings.
    pub fn new(config: &RequestConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, max_bytes: config.max_bytes, timeout: config.timeout() })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: Request) -> Result<Response, TransportError> {
        let start = Instant::now();

        let mut builder = self.http.get(request.url.as_str());
        builder = builder.header("Accept", "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8");
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await.map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let bytes = response.bytes().await.map_or(0, |body| body.len() as u64);
            return Err(TransportError::Status { status: status.as_u16(), bytes });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.max_bytes
        {
            return Err(TransportError::TooLarge { size: len, limit: self.max_bytes as u64 });
        }

        let final_url = response.url().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Network(format!("failed to read response: {}", e)))?;

        if body.len() > self.max_bytes {
            return Err(TransportError::TooLarge { size: body.len() as u64, limit: self.max_bytes as u64 });
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", request.url, final_url, fetch_ms, body.len());

        Ok(Response { final_url, status: status.as_u16(), body, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_transport_new() {
        let transport = HttpTransport::new(&RequestConfig::default());
        assert!(transport.is_ok());
        assert_eq!(transport.unwrap().timeout(), Duration::from_millis(30_000));
    }
}

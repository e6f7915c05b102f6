//! Remote URL fetching over HTTP(S).

use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::config::DownloadConfig;
use crate::error::{Error, Result};

use super::{BoxedReader, FetchSource};

/// Streams remote media with a fixed `User-Agent`
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build the HTTP client from the download settings
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Issue a GET and expose the body as a byte stream
    ///
    /// Non-success status codes are errors. The declared length is the
    /// `Content-Length` header, or 0 when absent.
    pub async fn open_url(&self, url: &str) -> Result<FetchSource> {
        let response = self.client.get(url).send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                format!("timed out fetching '{}'", url)
            } else if e.is_connect() {
                format!("connection failed for '{}': {}", url, e)
            } else {
                format!("failed to fetch '{}': {}", url, e)
            };
            Error::Io(std::io::Error::other(reason))
        })?;

        if !response.status().is_success() {
            return Err(Error::Io(std::io::Error::other(format!(
                "HTTP error {} fetching '{}'",
                response.status(),
                url
            ))));
        }

        let declared_len = response.content_length().unwrap_or(0);
        let body = response.bytes_stream().map_err(std::io::Error::other);
        let reader: BoxedReader = Box::pin(StreamReader::new(body));

        tracing::debug!(url, declared_len, "Opened remote media stream");

        Ok(FetchSource::Stream {
            reader,
            declared_len,
        })
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_streams_body_with_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/clip.mp4"))
            .and(header("user-agent", "media-dl-test/1.0"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = DownloadConfig {
            user_agent: "media-dl-test/1.0".to_string(),
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&config).unwrap();
        let source = fetcher
            .open_url(&format!("{}/media/clip.mp4", mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(source.declared_len(), 4096);
        let FetchSource::Stream { mut reader, .. } = source else {
            panic!("expected a stream");
        };
        let mut body = Vec::new();
        reader.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_error_status_fails() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(&DownloadConfig::default()).unwrap();
        let err = fetcher
            .open_url(&format!("{}/gone", mock_server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails() {
        let fetcher = HttpFetcher::new(&DownloadConfig::default()).unwrap();
        // Port 9 (discard) on localhost is not expected to accept HTTP
        assert!(fetcher.open_url("http://127.0.0.1:9/clip").await.is_err());
    }
}

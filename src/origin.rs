use crate::{config::Config, errors::WhoisError};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};
use url::Url;

/// Raw result of one origin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginResponse {
    pub status: u16,
    pub body: String,
}

/// Fetches the WHOIS result page for a domain.
#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, domain: &str) -> Result<OriginResponse, WhoisError>;
}

/// `POST <origin_url>?q=<domain>` against the ps.kz result page.
pub struct HttpOrigin {
    client: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    max_response_size: usize,
}

impl HttpOrigin {
    pub fn new(config: Arc<Config>) -> Result<Self, WhoisError> {
        let base_url = Url::parse(&config.origin_url)
            .map_err(|e| WhoisError::Internal(format!("Invalid origin URL {}: {}", config.origin_url, e)))?;
        let timeout = Duration::from_secs(config.origin_timeout_seconds);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kz-whois/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("HttpOrigin initialized for {} (timeout {}s)", base_url, config.origin_timeout_seconds);

        Ok(Self {
            client,
            base_url,
            timeout,
            max_response_size: config.max_response_size,
        })
    }

    /// Read the body chunk by chunk, giving up as soon as it outgrows
    /// `max_response_size`.
    async fn read_capped(&self, mut response: reqwest::Response) -> Result<Vec<u8>, WhoisError> {
        let mut body = Vec::new();

        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            if body.len() + chunk.len() > self.max_response_size {
                return Err(WhoisError::ResponseTooLarge);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    fn request_url(&self, domain: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut().append_pair("q", domain);
        url
    }
}

fn request_error(e: reqwest::Error) -> WhoisError {
    if e.is_timeout() {
        WhoisError::Timeout
    } else {
        WhoisError::HttpError(e)
    }
}

#[async_trait]
impl OriginClient for HttpOrigin {
    async fn fetch(&self, domain: &str) -> Result<OriginResponse, WhoisError> {
        let url = self.request_url(domain);
        debug!("Fetching origin page: {}", url);

        let response = tokio::time::timeout(self.timeout, self.client.post(url).send())
            .await?
            .map_err(request_error)?;

        let status = response.status().as_u16();

        let bytes = tokio::time::timeout(self.timeout, self.read_capped(response)).await??;
        let body = String::from_utf8_lossy(&bytes).into_owned();

        debug!("Origin answered {} with {} bytes for {}", status, body.len(), domain);
        Ok(OriginResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn config_for(server: &MockServer) -> Arc<Config> {
        Arc::new(Config {
            origin_url: format!("{}/domains/whois/result", server.uri()),
            origin_timeout_seconds: 2,
            max_response_size: 1024,
            ..Config::default()
        })
    }

    #[tokio::test]
    async fn test_posts_domain_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/domains/whois/result"))
            .and(query_param("q", "example.kz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<td>Статус:</td>"))
            .expect(1)
            .mount(&server)
            .await;

        let origin = HttpOrigin::new(config_for(&server)).unwrap();
        let response = origin.fetch("example.kz").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<td>Статус:</td>");
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let origin = HttpOrigin::new(config_for(&server)).unwrap();
        let response = origin.fetch("example.kz").await.unwrap();
        assert_eq!(response.status, 502);
    }

    #[tokio::test]
    async fn test_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
            .mount(&server)
            .await;

        let origin = HttpOrigin::new(config_for(&server)).unwrap();
        let result = origin.fetch("example.kz").await;
        assert!(matches!(result, Err(WhoisError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_body_at_cap_is_read() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("y".repeat(1024)))
            .mount(&server)
            .await;

        let origin = HttpOrigin::new(config_for(&server)).unwrap();
        let response = origin.fetch("example.kz").await.unwrap();
        assert_eq!(response.body.len(), 1024);
    }

    #[tokio::test]
    async fn test_large_stream_stops_at_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; 8 * 1024 * 1024]))
            .mount(&server)
            .await;

        let config = Arc::new(Config {
            max_response_size: 64 * 1024,
            ..(*config_for(&server)).clone()
        });
        let origin = HttpOrigin::new(config).unwrap();
        let result = origin.fetch("example.kz").await;
        assert!(matches!(result, Err(WhoisError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_slow_origin_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let config = Arc::new(Config {
            origin_timeout_seconds: 1,
            ..(*config_for(&server)).clone()
        });
        let origin = HttpOrigin::new(config).unwrap();
        let result = origin.fetch("example.kz").await;
        assert!(matches!(result, Err(WhoisError::Timeout)));
    }

    #[test]
    fn test_invalid_origin_url() {
        let config = Arc::new(Config {
            origin_url: "not a url".to_string(),
            ..Config::default()
        });
        assert!(matches!(HttpOrigin::new(config), Err(WhoisError::Internal(_))));
    }
}

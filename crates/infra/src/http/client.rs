use std::time::Duration;

use fieldsync_domain::constants::DEFAULT_USER_AGENT;
use fieldsync_domain::FieldSyncError;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use tracing::debug;
use url::Url;

use crate::errors::InfraError;

/// HTTP client bound to one backend base URL.
///
/// A single attempt per call; retry and backoff belong to the sync
/// coordinator so that every attempt is counted against the queue entry.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: ReqwestClient,
    base_url: Url,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder(base_url: impl Into<String>) -> HttpClientBuilder {
        HttpClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an endpoint path such as `/api/tasks/complete`.
    ///
    /// The endpoint is appended to the base path rather than replacing it,
    /// so `https://host/v1` + `/tasks` yields `https://host/v1/tasks`.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// Create a request builder for `endpoint` relative to the base URL.
    pub fn request(&self, method: Method, endpoint: &str) -> RequestBuilder {
        self.client.request(method, self.url_for(endpoint))
    }

    /// Execute the request once.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, FieldSyncError> {
        let request = builder.build().map_err(|err| FieldSyncError::from(InfraError::from(err)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(InfraError::from(err).into())
            }
        }
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    user_agent: String,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl HttpClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(fieldsync_domain::constants::DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            default_headers: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient, FieldSyncError> {
        let base_url = Url::parse(&self.base_url).map_err(|err| {
            FieldSyncError::Config(format!("invalid base URL '{}': {err}", self.base_url))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(FieldSyncError::Config(format!(
                "base URL must use http or https, got '{}'",
                base_url.scheme()
            )));
        }

        let mut builder =
            ReqwestClient::builder().timeout(self.timeout).user_agent(self.user_agent).no_proxy();

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| FieldSyncError::from(InfraError::from(err)))?;

        Ok(HttpClient { client, base_url })
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use reqwest::StatusCode;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn url_for_appends_to_base_path() {
        let client = HttpClient::builder("https://api.example.com/v1/").build().unwrap();
        assert_eq!(client.url_for("/tasks/complete"), "https://api.example.com/v1/tasks/complete");
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(matches!(
            HttpClient::builder("ftp://example.com").build(),
            Err(FieldSyncError::Config(_))
        ));
        assert!(HttpClient::builder("not a url").build().is_err());
    }

    #[tokio::test]
    async fn sends_single_request_with_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpClient::builder(server.uri()).build().unwrap();
        let response = client.send(client.request(Method::GET, "/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::builder(format!("http://{addr}")).build().unwrap();
        let result = client.send(client.request(Method::GET, "/health")).await;
        match result {
            Err(FieldSyncError::Network(msg)) => {
                assert!(msg.to_lowercase().contains("http"));
            }
            other => panic!("expected network error, got {other:?}"),
        }
    }
}

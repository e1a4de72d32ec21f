//! HTTP transport backed by `reqwest`.

use crate::backend::ChunkStream;
use crate::error::{ErrorKind, Result};
use crate::ScanTransport;
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use std::time::Duration;
use tfscan_protocol::{JobId, ScanConfig, StatusSnapshot};
use tracing::instrument;

const EVENT_STREAM: &str = "text/event-stream";

/// Request paths, resolved against the transport's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// `POST`, answered with an event stream.
    pub stream: String,
    /// `POST`, answered with `{"job_id": "..."}`.
    pub start: String,
    /// `GET <status>/<job_id>`, answered with a status snapshot.
    pub status: String,
}
impl Default for Endpoints {
    fn default() -> Self {
        Self {
            stream: "/api/scan/stream".to_string(),
            start: "/api/scan".to_string(),
            status: "/api/scan/status".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct StartResponse {
    job_id: JobId,
}

/// Production transport.
///
/// A connect timeout applies to every request. The optional request timeout
/// applies to the start and status requests only: the event stream of a scan
/// may legitimately stay open for many minutes.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use tfscan_transport::backend::{Endpoints, HttpTransport};
///
/// # fn example() -> tfscan_transport::error::Result<()> {
/// let transport = HttpTransport::new("api", "https://scanner.internal", Endpoints::default(), Duration::from_secs(10))?
///     .with_request_timeout(Duration::from_secs(30))
///     .with_api_token("s3cr3t");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    name: String,
    client: Client,
    base: Url,
    endpoints: Endpoints,
    request_timeout: Option<Duration>,
    api_token: Option<String>,
}

impl HttpTransport {
    pub fn new(
        name: impl Into<String>,
        base_url: impl AsRef<str>,
        endpoints: Endpoints,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.as_ref();
        let base = Url::parse(base_url).or_raise(|| ErrorKind::InvalidEndpoint(base_url.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            exn::bail!(ErrorKind::InvalidEndpoint(base_url.to_string()));
        }
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("tfscan/", env!("CARGO_PKG_VERSION")))
            .build()
            .or_raise(|| ErrorKind::Connect)?;
        Ok(Self {
            name: name.into(),
            client,
            base,
            endpoints,
            request_timeout: None,
            api_token: None,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).or_raise(|| ErrorKind::InvalidEndpoint(path.to_string()))
    }

    fn status_url(&self, job_id: &JobId) -> Result<Url> {
        let mut url = self.url(&self.endpoints.status)?;
        {
            let mut segments = url
                .path_segments_mut()
                .ok()
                .ok_or_raise(|| ErrorKind::InvalidEndpoint(self.endpoints.status.clone()))?;
            // Segments are percent-encoded by `push`.
            segments.pop_if_empty().push(job_id.as_str());
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn with_timeout(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status(status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl ScanTransport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip_all, fields(transport = %self.name))]
    async fn open_stream(&self, config: &ScanConfig) -> Result<ChunkStream> {
        let url = self.url(&self.endpoints.stream)?;
        let response = self
            .request(Method::POST, url)
            .header(ACCEPT, EVENT_STREAM)
            .json(config)
            .send()
            .await
            .or_raise(|| ErrorKind::Connect)?;
        let response = Self::check_status(response)?;
        // A missing content type is given the benefit of the doubt; anything
        // else means the server ignored the Accept header.
        let content_type = response.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok());
        if let Some(content_type) = content_type
            && !content_type.trim_start().starts_with(EVENT_STREAM)
        {
            tracing::debug!(content_type, "Stream endpoint answered without an event stream");
            exn::bail!(ErrorKind::Unsupported);
        }
        tracing::debug!(status = response.status().as_u16(), "Event stream opened");
        Ok(Box::pin(
            response.bytes_stream().map(|chunk| chunk.map(|bytes| bytes.to_vec()).or_raise(|| ErrorKind::Network)),
        ))
    }

    #[instrument(skip_all, fields(transport = %self.name))]
    async fn start_job(&self, config: &ScanConfig) -> Result<JobId> {
        let url = self.url(&self.endpoints.start)?;
        let response = self
            .with_timeout(self.request(Method::POST, url))
            .json(config)
            .send()
            .await
            .or_raise(|| ErrorKind::Connect)?;
        let started: StartResponse =
            Self::check_status(response)?.json().await.or_raise(|| ErrorKind::InvalidResponse)?;
        tracing::debug!(job_id = %started.job_id, "Scan job started without streaming");
        Ok(started.job_id)
    }

    #[instrument(level = "debug", skip_all, fields(transport = %self.name, job_id = %job_id))]
    async fn status(&self, job_id: &JobId) -> Result<StatusSnapshot> {
        let url = self.status_url(job_id)?;
        let response =
            self.with_timeout(self.request(Method::GET, url)).send().await.or_raise(|| ErrorKind::Connect)?;
        Self::check_status(response)?.json().await.or_raise(|| ErrorKind::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        HttpTransport::new("test", base, Endpoints::default(), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_base() {
        let timeout = Duration::from_secs(1);
        assert!(HttpTransport::new("test", "not a url", Endpoints::default(), timeout).is_err());
        assert!(HttpTransport::new("test", "ftp://example.com", Endpoints::default(), timeout).is_err());
    }

    #[test]
    fn test_url() {
        let transport = transport("http://localhost:8000");
        assert_eq!(transport.url("/api/scan/stream").unwrap().as_str(), "http://localhost:8000/api/scan/stream");
    }

    #[test]
    fn test_status_url() {
        let transport = transport("https://scanner.example.com");
        assert_eq!(
            transport.status_url(&JobId::new("job-42")).unwrap().as_str(),
            "https://scanner.example.com/api/scan/status/job-42"
        );
    }

    #[test]
    fn test_status_url_encodes_job_id() {
        let transport = transport("https://scanner.example.com");
        assert_eq!(
            transport.status_url(&JobId::new("a/b c")).unwrap().as_str(),
            "https://scanner.example.com/api/scan/status/a%2Fb%20c"
        );
    }

    #[test]
    fn test_status_url_trailing_slash() {
        let endpoints = Endpoints { status: "/status/".to_string(), ..Endpoints::default() };
        let transport = HttpTransport::new("test", "http://localhost", endpoints, Duration::from_secs(1)).unwrap();
        assert_eq!(transport.status_url(&JobId::new("x")).unwrap().as_str(), "http://localhost/status/x");
    }
}

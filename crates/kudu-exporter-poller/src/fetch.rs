//! Upstream fetch.
//!
//! One blocking-style request/response per poll: `GET <url>` over plain
//! HTTP/1.1, the whole body collected into memory. Non-2xx answers,
//! transport errors and timeouts are all fetch failures.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use crate::error::FetchError;

/// Source of raw snapshot bodies.
pub trait Fetch: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

/// Fetches the snapshot from a fixed HTTP URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    uri: Uri,
    address: String,
    timeout: Duration,
}

impl HttpFetcher {
    /// Validate `url` and build a fetcher for it.
    ///
    /// Only `http://` URLs are accepted.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let invalid = |reason: &str| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        match uri.scheme_str() {
            Some("http") => {}
            Some(other) => return Err(invalid(&format!("unsupported scheme {other}"))),
            None => return Err(invalid("missing scheme")),
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let address = format!("{}:{}", authority.host(), authority.port_u16().unwrap_or(80));

        Ok(Self {
            uri,
            address,
            timeout,
        })
    }

    pub fn url(&self) -> &Uri {
        &self.uri
    }

    async fn get(&self) -> Result<Bytes, FetchError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|source| FetchError::Connect {
                address: self.address.clone(),
                source,
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "upstream connection closed with error");
            }
        });

        let host = self
            .uri
            .authority()
            .map(|a| a.as_str().to_string())
            .unwrap_or_else(|| self.address.clone());
        let path = self
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let req = http::Request::builder()
            .method("GET")
            .uri(path)
            .header("host", host)
            .header("accept", "application/json")
            .header("user-agent", concat!("kudu-exporter/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())?;

        let resp = sender.send_request(req).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = resp.into_body().collect().await?.to_bytes();
        debug!(uri = %self.uri, bytes = body.len(), "snapshot fetched");
        Ok(body)
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self) -> Result<Bytes, FetchError> {
        tokio::time::timeout(self.timeout, self.get())
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/metrics")
    }

    #[test]
    fn rejects_non_http_urls() {
        let timeout = Duration::from_secs(1);
        assert!(matches!(
            HttpFetcher::new("https://kudu:8050/metrics", timeout),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpFetcher::new("/metrics", timeout),
            Err(FetchError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpFetcher::new("not a url", timeout),
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn default_port_is_80() {
        let fetcher = HttpFetcher::new("http://kudu-master/metrics", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.address, "kudu-master:80");
        assert_eq!(fetcher.url().path(), "/metrics");
    }

    #[tokio::test]
    async fn fetches_body() {
        let url = serve(Router::new().route("/metrics", get(|| async { r#"[{"id":"t1"}]"# }))).await;
        let fetcher = HttpFetcher::new(&url, Duration::from_secs(5)).unwrap();

        let body = fetcher.fetch().await.unwrap();
        assert_eq!(&body[..], br#"[{"id":"t1"}]"#);
    }

    #[tokio::test]
    async fn non_2xx_is_an_error() {
        let url = serve(Router::new().route(
            "/metrics",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        ))
        .await;
        let fetcher = HttpFetcher::new(&url, Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)));
    }

    #[tokio::test]
    async fn connection_refused_is_an_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher = HttpFetcher::new(&format!("http://{addr}/metrics"), Duration::from_secs(5)).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Connect { .. }));
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let url = serve(Router::new().route(
            "/metrics",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "[]"
            }),
        ))
        .await;
        let fetcher = HttpFetcher::new(&url, Duration::from_millis(100)).unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)));
    }
}

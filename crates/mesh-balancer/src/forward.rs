//! Forwarding one unit of work to one worker.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tracing::debug;

use crate::cache::CachedWorker;
use crate::error::ForwardError;

/// An opaque unit of work: body bytes and their declared content type.
#[derive(Debug, Clone, Default)]
pub struct WorkRequest {
    pub body: Bytes,
    pub content_type: Option<String>,
}

impl WorkRequest {
    pub fn new(body: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            body: body.into(),
            content_type,
        }
    }

    /// Short description for the audit log.
    pub fn summary(&self) -> String {
        format!(
            "{} bytes ({})",
            self.body.len(),
            self.content_type.as_deref().unwrap_or("no content type")
        )
    }
}

/// A worker's successful result.
#[derive(Debug, Clone)]
pub struct WorkResponse {
    pub worker_id: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// `POST {path}` the work to a worker and collect its 2xx response.
///
/// The whole exchange, body included, is bounded by `timeout`.
pub async fn forward(
    worker: &CachedWorker,
    path: &str,
    work: &WorkRequest,
    timeout: Duration,
) -> Result<WorkResponse, ForwardError> {
    match tokio::time::timeout(timeout, exchange(worker, path, work)).await {
        Ok(result) => result,
        Err(_) => Err(ForwardError::Timeout(timeout)),
    }
}

async fn exchange(
    worker: &CachedWorker,
    path: &str,
    work: &WorkRequest,
) -> Result<WorkResponse, ForwardError> {
    let authority = format!("{}:{}", worker.address, worker.port);
    let stream = tokio::net::TcpStream::connect((worker.address.as_str(), worker.port)).await?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut req = http::Request::builder()
        .method(http::Method::POST)
        .uri(path)
        .header(http::header::HOST, &authority)
        .header(http::header::USER_AGENT, "mesh-balancer/0.1");
    if let Some(ct) = &work.content_type {
        req = req.header(http::header::CONTENT_TYPE, ct);
    }
    let req = req.body(Full::new(work.body.clone()))?;

    let resp = sender.send_request(req).await?;
    let status = resp.status();
    if !status.is_success() {
        debug!(worker_id = %worker.id, %status, "worker rejected work");
        return Err(ForwardError::BadStatus(status.as_u16()));
    }

    let content_type = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.into_body().collect().await?.to_bytes();

    Ok(WorkResponse {
        worker_id: worker.id.clone(),
        status: status.as_u16(),
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::post;

    async fn serve(router: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn worker(port: u16) -> CachedWorker {
        CachedWorker {
            id: format!("w-{port}"),
            address: "127.0.0.1".to_string(),
            port,
            url: format!("http://127.0.0.1:{port}"),
        }
    }

    #[tokio::test]
    async fn relays_body_and_content_type() {
        let port = serve(Router::new().route(
            "/process",
            post(|headers: HeaderMap, body: Bytes| async move {
                let ct = headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let mut out = b"marked:".to_vec();
                out.extend_from_slice(&body);
                ([(header::CONTENT_TYPE, "image/png")], format!("{ct}|{}", String::from_utf8_lossy(&out)))
            }),
        ))
        .await;

        let work = WorkRequest::new("pixels", Some("image/jpeg".to_string()));
        let resp = forward(&worker(port), "/process", &work, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.content_type.as_deref(), Some("image/png"));
        assert_eq!(resp.body, Bytes::from("image/jpeg|marked:pixels"));
        assert_eq!(resp.worker_id, format!("w-{port}"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let port = serve(Router::new().route(
            "/process",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        ))
        .await;

        let err = forward(&worker(port), "/process", &WorkRequest::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::BadStatus(500)));
    }

    #[tokio::test]
    async fn unreachable_worker_is_a_connect_error() {
        let err = forward(&worker(1), "/process", &WorkRequest::default(), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Connect(_)));
    }

    #[tokio::test]
    async fn slow_worker_times_out() {
        let port = serve(Router::new().route(
            "/process",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            }),
        ))
        .await;

        let err = forward(&worker(port), "/process", &WorkRequest::default(), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, ForwardError::Timeout(_)));
    }

    #[test]
    fn summary_mentions_size_and_type() {
        let work = WorkRequest::new(vec![0u8; 12], Some("image/png".to_string()));
        assert_eq!(work.summary(), "12 bytes (image/png)");
        assert_eq!(WorkRequest::default().summary(), "0 bytes (no content type)");
    }
}

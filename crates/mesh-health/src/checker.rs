//! Health probe and classification.
//!
//! `http_probe` performs one bounded `GET` against a worker and reports
//! what happened plus how long it took. `classify` turns that into a
//! [`HealthStatus`] and is a pure function of its inputs.

use std::time::{Duration, Instant};

use tracing::debug;

use mesh_registry::HealthStatus;

/// Transport-level result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// The endpoint answered 2xx.
    Success,
    /// The endpoint answered with a non-2xx status code.
    BadStatus(u16),
    /// Connection, handshake or request failure, or timeout.
    Failed,
}

/// A probe result and its wall-clock duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub result: ProbeResult,
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Healthy iff the probe succeeded and took no longer than `threshold`.
pub fn classify(outcome: &ProbeOutcome, threshold: Duration) -> HealthStatus {
    match outcome.result {
        ProbeResult::Success if outcome.elapsed <= threshold => HealthStatus::Healthy,
        _ => HealthStatus::Unhealthy,
    }
}

/// Perform an HTTP `GET {path}` against `address:port`.
///
/// Never fails: every error is folded into [`ProbeResult::Failed`].
pub async fn http_probe(address: &str, port: u16, path: &str, timeout: Duration) -> ProbeOutcome {
    let authority = format!("{address}:{port}");
    let started = Instant::now();

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect((address, port)).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %authority, "health probe connection failed");
                return ProbeResult::Failed;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %authority, "health probe handshake failed");
                return ProbeResult::Failed;
            }
        };

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method(http::Method::GET)
            .uri(path)
            .header(http::header::HOST, &authority)
            .header(http::header::USER_AGENT, "mesh-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %authority, path, "invalid health probe request");
                return ProbeResult::Failed;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) if resp.status().is_success() => ProbeResult::Success,
            Ok(resp) => {
                debug!(status = %resp.status(), %authority, "health probe non-2xx");
                ProbeResult::BadStatus(resp.status().as_u16())
            }
            Err(e) => {
                debug!(error = %e, %authority, "health probe request failed");
                ProbeResult::Failed
            }
        }
    })
    .await;

    let result = result.unwrap_or_else(|_| {
        debug!(%authority, ?timeout, "health probe timed out");
        ProbeResult::Failed
    });

    ProbeOutcome {
        result,
        elapsed: started.elapsed(),
    }
}

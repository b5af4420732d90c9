use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::http::{HttpParseError, is_http_request, parse_request};
use crate::discovery::Discovery;
use crate::model::CapturedRequest;
use crate::sanitize::sanitize_headers;
use crate::target::Target;

/// Turns TCP payloads into target-bound, sanitized requests.
pub struct CaptureEngine {
    target: Target,
    verbose: bool,
}

impl CaptureEngine {
    pub fn new(target: Target, verbose: bool) -> Self {
        Self { target, verbose }
    }

    /// Classify, parse, match and sanitize one payload.
    ///
    /// Every rejection is silent apart from debug logging.
    pub fn extract(&self, payload: &[u8]) -> Option<CapturedRequest> {
        if !is_http_request(payload) {
            return None;
        }

        let parsed = match parse_request(payload) {
            Ok(parsed) => parsed,
            Err(HttpParseError::Incomplete) => {
                log::debug!("Skipping request split across packets");
                return None;
            }
            Err(e) => {
                log::debug!("Skipping unparseable request: {e}");
                return None;
            }
        };

        let host = parsed.host.as_deref().unwrap_or_default();
        if !self.target.matches_host(host) {
            if self.verbose {
                log::debug!("Ignoring {} {} for host {host:?}", parsed.method, parsed.path);
            }
            return None;
        }

        if self.verbose {
            log::info!("Captured request: {} {}", parsed.method, parsed.path);
        }

        Some(CapturedRequest {
            method: parsed.method,
            path: parsed.path,
            query: parsed.query,
            headers: sanitize_headers(parsed.headers),
            body: parsed.body,
        })
    }

    /// Drain payloads until cancelled or the reader hangs up.
    ///
    /// Returns how many requests were handed to discovery.
    pub async fn run(
        &self,
        mut payloads: mpsc::Receiver<Vec<u8>>,
        discovery: &Discovery,
        shutdown: CancellationToken,
    ) -> u64 {
        log::info!("Capturing HTTP traffic for {} on port {}", self.target.as_str(), self.target.port());

        let mut observed = 0u64;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                payload = payloads.recv() => {
                    let Some(payload) = payload else { break };
                    if let Some(request) = self.extract(&payload) {
                        discovery.observe(request);
                        observed += 1;
                    }
                }
            }
        }

        log::debug!("Capture loop finished after {observed} requests");
        observed
    }
}

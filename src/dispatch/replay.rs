use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::DispatchError;
use crate::model::Tool;

/// Every replayed request gets this long to complete, body included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Framing headers the HTTP client derives itself; replaying the captured
/// values would describe the wrong message.
const FRAMING_HEADERS: &[&str] = &["host", "content-length", "transfer-encoding", "connection"];

/// Status and body of a replayed request. Any status code counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status: {}\nResponse: {}", self.status, self.body)
    }
}

/// Executes outbound calls for invoked tools. At most once, never retried.
#[derive(Clone)]
pub struct ReplayEngine {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReplayEngine {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, timeout })
    }

    /// Replay `tool`, optionally replacing its body and overlaying headers.
    ///
    /// An empty `override_body` counts as absent. Caller headers win over
    /// captured ones regardless of case.
    pub async fn invoke(
        &self,
        tool: &Tool,
        override_body: Option<&str>,
        caller_headers: Option<&BTreeMap<String, String>>,
    ) -> Result<Reply, DispatchError> {
        let method = Method::from_bytes(tool.method.as_bytes())
            .map_err(|e| DispatchError::Build(format!("invalid method {:?}: {e}", tool.method)))?;
        let url = Url::parse(&tool.url)
            .map_err(|e| DispatchError::Build(format!("invalid url {:?}: {e}", tool.url)))?;

        let mut headers = HeaderMap::new();
        merge_headers(&mut headers, &tool.headers)?;
        if let Some(caller_headers) = caller_headers {
            merge_headers(&mut headers, caller_headers)?;
        }

        let body = match override_body {
            Some(body) if !body.is_empty() => body,
            _ => tool.body.as_str(),
        };

        let mut request = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            request = request.body(body.to_string());
        }

        log::debug!("Replaying {} {} for tool {}", tool.method, tool.url, tool.name);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.timeout)
            } else {
                DispatchError::Transport(e)
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.timeout)
            } else {
                DispatchError::ReadBody(e)
            }
        })?;

        Ok(Reply {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn merge_headers(target: &mut HeaderMap, source: &BTreeMap<String, String>) -> Result<(), DispatchError> {
    for (name, value) in source {
        if FRAMING_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| DispatchError::Build(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| DispatchError::Build(format!("invalid value for header {name}: {e}")))?;
        target.insert(name, value);
    }
    Ok(())
}

//! Reconstruction of a single HTTP request from one TCP payload.
//!
//! There is no stream reassembly: a request is only recovered when its
//! headers and its whole body sit in the same packet.

use std::collections::BTreeMap;
use thiserror::Error;

const HTTP_VERBS: &[&[u8]] = &[
    b"GET ",
    b"POST ",
    b"PUT ",
    b"DELETE ",
    b"PATCH ",
    b"HEAD ",
    b"OPTIONS ",
];

const MAX_HEADERS: usize = 100;

#[derive(Debug, Error)]
pub enum HttpParseError {
    #[error("malformed request: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("request continues in a later packet")]
    Incomplete,

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("invalid Content-Length")]
    InvalidLength,

    #[error("invalid request target {0:?}")]
    InvalidTarget(String),
}

/// A request as it appeared on the wire, before target matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Host header, or the authority of an absolute-form target.
    pub host: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Cheap classification: does the payload start with a request line?
pub fn is_http_request(payload: &[u8]) -> bool {
    HTTP_VERBS.iter().any(|verb| payload.starts_with(verb))
}

pub fn parse_request(payload: &[u8]) -> Result<ParsedRequest, HttpParseError> {
    let mut raw_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut raw_headers);

    let offset = match req.parse(payload)? {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => return Err(HttpParseError::Incomplete),
    };

    let method = req.method.unwrap_or_default().to_string();
    let request_target = req.path.unwrap_or_default();

    // First value wins for repeated names, compared case-insensitively.
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for header in req.headers.iter() {
        if headers.keys().any(|k| k.eq_ignore_ascii_case(header.name)) {
            continue;
        }
        headers.insert(
            header.name.to_string(),
            String::from_utf8_lossy(header.value).trim().to_string(),
        );
    }

    let (path, query, absolute_host) = split_target(request_target)?;
    let host = absolute_host.or_else(|| header_value(&headers, "host").map(str::to_string));
    let body = read_body(&headers, &payload[offset..])?;

    Ok(ParsedRequest {
        method,
        path,
        query,
        host,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

fn header_value<'a>(headers: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Split a request target into path, query and (for absolute-form) authority.
fn split_target(target: &str) -> Result<(String, Option<String>, Option<String>), HttpParseError> {
    if target.starts_with("http://") || target.starts_with("https://") {
        let url = url::Url::parse(target)
            .map_err(|_| HttpParseError::InvalidTarget(target.to_string()))?;
        let authority = url.host_str().map(|host| match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        });
        return Ok((
            url.path().to_string(),
            url.query().map(str::to_string),
            authority,
        ));
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };
    Ok((path.to_string(), query, None))
}

fn read_body(headers: &BTreeMap<String, String>, rest: &[u8]) -> Result<Vec<u8>, HttpParseError> {
    let chunked = header_value(headers, "transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
    if chunked {
        return decode_chunked(rest);
    }

    match header_value(headers, "content-length") {
        Some(len) => {
            let len: usize = len.parse().map_err(|_| HttpParseError::InvalidLength)?;
            if rest.len() < len {
                return Err(HttpParseError::Incomplete);
            }
            Ok(rest[..len].to_vec())
        }
        None => Ok(Vec::new()),
    }
}

fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, HttpParseError> {
    let mut body = Vec::new();

    loop {
        let (consumed, size) = match httparse::parse_chunk_size(rest) {
            Ok(httparse::Status::Complete(parsed)) => parsed,
            Ok(httparse::Status::Partial) => return Err(HttpParseError::Incomplete),
            Err(_) => return Err(HttpParseError::InvalidChunk),
        };
        rest = &rest[consumed..];

        if size == 0 {
            return Ok(body);
        }

        let size = usize::try_from(size).map_err(|_| HttpParseError::InvalidChunk)?;
        let end = size.checked_add(2).ok_or(HttpParseError::InvalidChunk)?;
        if rest.len() < end {
            return Err(HttpParseError::Incomplete);
        }
        body.extend_from_slice(&rest[..size]);
        if &rest[size..end] != b"\r\n" {
            return Err(HttpParseError::InvalidChunk);
        }
        rest = &rest[end..];
    }
}

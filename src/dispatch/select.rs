use super::SelectError;
use crate::model::Tool;

/// Resolve a grouped invocation to exactly one member tool.
///
/// Members are scanned in stored order and the first match wins. `path` is a
/// substring hint against the member URL, so callers can target an endpoint
/// without reproducing embedded ids or query strings. An empty path is
/// treated as absent.
pub fn select_tool<'a>(
    members: &'a [Tool],
    method: &str,
    path: Option<&str>,
) -> Result<&'a Tool, SelectError> {
    if method.is_empty() {
        return Err(SelectError::MissingMethod);
    }

    match path.filter(|p| !p.is_empty()) {
        Some(path) => members
            .iter()
            .find(|tool| tool.method.eq_ignore_ascii_case(method) && tool.url.contains(path))
            .ok_or_else(|| SelectError::NoMatchForPath {
                method: method.to_string(),
                path: path.to_string(),
            }),
        None => members
            .iter()
            .find(|tool| tool.method.eq_ignore_ascii_case(method))
            .ok_or_else(|| SelectError::NoMatchForMethod {
                method: method.to_string(),
            }),
    }
}

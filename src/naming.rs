//! Tool naming: deterministic by default, classifier-backed on request.

use std::sync::Arc;

use crate::classifier::{Classifier, NameRequest};
use crate::model::CapturedCall;
use crate::server::INTROSPECTION_TOOL;

/// Deterministic name for an endpoint.
///
/// `GET /users/42/orders?x=1` becomes `get_users_42_orders`; an empty path
/// becomes `root`.
pub fn generate_tool_name(method: &str, path: &str) -> String {
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    let safe_path = path.replace('/', "_");
    let safe_path = safe_path.trim_matches('_');
    let safe_path = if safe_path.is_empty() { "root" } else { safe_path };

    format!("{}_{}", method.to_lowercase(), safe_path)
}

#[derive(Clone)]
pub enum NamingStrategy {
    Deterministic,
    Classifier(Arc<dyn Classifier>),
}

impl NamingStrategy {
    pub async fn name_for(&self, call: &CapturedCall) -> String {
        match self {
            Self::Deterministic => generate_tool_name(&call.method, &call.path),
            Self::Classifier(classifier) => {
                log::debug!("Generating tool name with LLM for {} {}", call.method, call.path);
                let request = NameRequest {
                    method: &call.method,
                    path: &call.path,
                    body: &call.body,
                    headers: &call.headers,
                };
                match classifier.name_tool(request).await {
                    Ok(name) if name == INTROSPECTION_TOOL => {
                        log::warn!("LLM picked reserved name {name} for {} {}, using fallback", call.method, call.path);
                        generate_tool_name(&call.method, &call.path)
                    }
                    Ok(name) => {
                        log::debug!("Generated tool name: {name}");
                        name
                    }
                    Err(e) => {
                        log::warn!(
                            "LLM naming failed for {} {} ({e}), using fallback",
                            call.method,
                            call.path
                        );
                        generate_tool_name(&call.method, &call.path)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierError, GroupCandidate, GroupPlan};
    use chrono::Utc;
    use futures::future::BoxFuture;
    use std::collections::BTreeMap;

    struct FixedReply(Result<&'static str, ()>);

    impl Classifier for FixedReply {
        fn name_tool<'a>(&'a self, _request: NameRequest<'a>) -> BoxFuture<'a, Result<String, ClassifierError>> {
            let reply = match self.0 {
                Ok(name) => crate::classifier::validate_tool_name(name),
                Err(()) => Err(ClassifierError::EmptyResponse),
            };
            Box::pin(async move { reply })
        }

        fn group_tools<'a>(
            &'a self,
            _tools: &'a [GroupCandidate],
        ) -> BoxFuture<'a, Result<GroupPlan, ClassifierError>> {
            Box::pin(async { Ok(GroupPlan::default()) })
        }
    }

    fn call(method: &str, path: &str) -> CapturedCall {
        let now = Utc::now();
        CapturedCall {
            method: method.to_string(),
            path: path.to_string(),
            query: None,
            headers: BTreeMap::new(),
            body: String::new(),
            first_seen: now,
            last_seen: now,
            call_count: 1,
        }
    }

    #[test]
    fn test_generate_tool_name() {
        assert_eq!(generate_tool_name("GET", "/users/42/orders?x=1"), "get_users_42_orders");
        assert_eq!(generate_tool_name("POST", "/users/"), "post_users");
        assert_eq!(generate_tool_name("DELETE", "/"), "delete_root");
        assert_eq!(generate_tool_name("GET", ""), "get_root");
        assert_eq!(generate_tool_name("GET", "/?page=2"), "get_root");
    }

    #[tokio::test]
    async fn test_classifier_name_is_used() {
        let strategy = NamingStrategy::Classifier(Arc::new(FixedReply(Ok("list_users"))));
        assert_eq!(strategy.name_for(&call("GET", "/users")).await, "list_users");
    }

    #[tokio::test]
    async fn test_malformed_classifier_output_falls_back() {
        let strategy = NamingStrategy::Classifier(Arc::new(FixedReply(Ok("List Users"))));
        assert_eq!(strategy.name_for(&call("GET", "/users")).await, "get_users");

        let strategy = NamingStrategy::Classifier(Arc::new(FixedReply(Err(()))));
        assert_eq!(strategy.name_for(&call("PUT", "/users/7")).await, "put_users_7");
    }

    #[tokio::test]
    async fn test_reserved_name_falls_back() {
        let strategy = NamingStrategy::Classifier(Arc::new(FixedReply(Ok("registry_info"))));
        assert_eq!(strategy.name_for(&call("GET", "/info")).await, "get_info");
    }
}

use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Arguments of a per-endpoint tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ReplayArgs {
    /// Raw request body to send instead of the captured one
    #[serde(default)]
    pub override_body: Option<String>,
}

/// Arguments of a group tool.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct GroupCallArgs {
    /// HTTP method of the endpoint to call (GET, POST, PUT, DELETE, ...)
    #[serde(default)]
    pub method: String,

    /// Part of the endpoint path, used to pick between endpoints sharing a method
    #[serde(default)]
    pub path: Option<String>,

    /// Raw request body to send instead of the captured one
    #[serde(default)]
    pub request_body: Option<String>,

    /// Extra request headers, replacing captured headers of the same name
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Arguments of the introspection tool (none).
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

/// Input schema for `T` in the shape MCP tool listings expect.
pub fn input_schema<T: JsonSchema>() -> Arc<JsonObject> {
    let schema = schemars::schema_for!(T);
    match serde_json::to_value(schema) {
        Ok(serde_json::Value::Object(obj)) => Arc::new(obj),
        _ => Arc::new(JsonObject::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_schema_lists_parameters() {
        let schema = input_schema::<GroupCallArgs>();
        let properties = schema["properties"].as_object().unwrap();
        for key in ["method", "path", "request_body", "headers"] {
            assert!(properties.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_replay_args_tolerate_missing_fields() {
        let args: ReplayArgs = serde_json::from_value(json!({})).unwrap();
        assert!(args.override_body.is_none());

        let args: GroupCallArgs = serde_json::from_value(json!({"method": "GET"})).unwrap();
        assert_eq!(args.method, "GET");
        assert!(args.headers.is_none());
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        assert!(serde_json::from_value::<ReplayArgs>(json!({"override_body": 5})).is_err());
        assert!(serde_json::from_value::<GroupCallArgs>(json!({"headers": "x"})).is_err());
    }
}

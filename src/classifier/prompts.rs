pub const NAME_SYSTEM_PROMPT: &str = "\
You name HTTP API endpoints. Reply with one snake_case tool name and nothing else: \
no quotes, no punctuation, no explanation.

Rules:
- 2 to 4 lowercase words joined by underscores, using only a-z, 0-9 and _.
- Take the resource from the path. Ignore headers; ignore the body for GET and DELETE.
- GET on a collection is list_<resources>; GET on an item is get_<resource>.
- POST on a collection is create_<resource>; PUT or PATCH on an item is update_<resource>; \
DELETE on an item is delete_<resource>.
- Nested resources combine parent and child: GET /users/{id}/orders is list_user_orders.
- A trailing verb segment names the action: POST /orders/{id}/cancel is cancel_order.
- /login, /logout, /health and /status map to login, logout and health_check.
- Paths containing /search, or queries with q, query or search, use search_<resources>.
- /bulk or /batch paths get a bulk_ prefix.
- Drop version segments such as /v1 and file extensions such as .json.
- Numeric ids, UUIDs, {id} and :id are identifiers; the segment before them is singular.
- Never answer with generic names like api_call, http_request or endpoint.";

pub const GROUP_SYSTEM_PROMPT: &str = r#"You organise API endpoints into workflow-oriented tools.

Rules:
1. Produce between 3 and 7 groups no matter how many endpoints there are.
2. Group by business capability, not by HTTP method or URL shape.
3. Each group should describe something a user wants to get done.
4. Fewer, broader groups beat many narrow ones.
5. Standalone endpoints such as health checks or webhooks may form their own group.
6. Group names are snake_case. Use tool names exactly as given in the input.

Reply with JSON only, in exactly this shape:
{
  "groups": [
    {
      "name": "user_management",
      "description": "Create, inspect, update and remove users",
      "tool_names": ["create_user", "get_user", "list_users"]
    }
  ]
}"#;

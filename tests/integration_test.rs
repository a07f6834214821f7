//! API-level tests for the toolmesh service.
//!
//! Everything runs in-process against a recording transport, so no network
//! access is needed.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use toolmesh::{
    handlers::{health_handler, router},
    load_tools, AppState, PreparedRequest, Result, ToolSet, ToolSetConfig, Transport,
    TransportResponse,
};
use tower::ServiceExt;

/// Answers every request with the same canned response and records it.
struct Recording {
    status: u16,
    body: Value,
    seen: Mutex<Vec<PreparedRequest>>,
}

impl Recording {
    fn new(status: u16, body: Value) -> Arc<Self> {
        Arc::new(Self {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<PreparedRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for Recording {
    async fn send(&self, request: &PreparedRequest) -> Result<TransportResponse> {
        self.seen.lock().unwrap().push(request.clone());
        Ok(TransportResponse {
            status: self.status,
            body: self.body.to_string(),
        })
    }
}

fn tool_document() -> Value {
    json!({
        "connector": "hris",
        "tools": [
            {
                "name": "hris_list_employees",
                "description": "List all employees in the HR system",
                "execute": {
                    "method": "GET",
                    "url": "https://api.example.com/employees",
                    "params": [{ "name": "page_size", "location": "query" }]
                }
            },
            {
                "name": "hris_get_employee",
                "description": "Get a single employee by id",
                "parameters": {
                    "type": "object",
                    "properties": { "id": { "type": "string" } },
                    "required": ["id"]
                },
                "execute": {
                    "method": "GET",
                    "url": "https://api.example.com/employees/{id}",
                    "params": [{ "name": "id", "location": "path" }]
                }
            },
            {
                "name": "hris_upload_employee_document",
                "description": "Upload a document for an employee",
                "execute": {
                    "method": "POST",
                    "url": "https://api.example.com/employees/{id}/documents",
                    "params": [
                        { "name": "id", "location": "path" },
                        { "name": "file_path", "location": "body" }
                    ]
                }
            }
        ]
    })
}

fn create_test_state(config: ToolSetConfig, transport: Arc<dyn Transport>) -> Arc<AppState> {
    let toolset = ToolSet::builder(config)
        .definitions(load_tools(&tool_document()).unwrap())
        .transport(transport)
        .build()
        .unwrap();
    Arc::new(AppState::from_toolset(toolset))
}

fn create_test_app(config: ToolSetConfig, transport: Arc<dyn Transport>) -> Router {
    let state = create_test_state(config, transport);
    state.mark_ready();
    router(state)
}

/// Helper to make a JSON request to the router.
async fn json_request(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = match method {
        "GET" => Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
        "POST" => Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.unwrap_or(json!({})).to_string()))
            .unwrap(),
        _ => panic!("Unsupported method"),
    };

    let response = app.oneshot(req).await.unwrap();
    let status = response.status();

    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    (status, body)
}

fn config() -> ToolSetConfig {
    ToolSetConfig::new().with_api_key("test-key").with_account_id("acc-1")
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint_returns_200() {
    use axum::routing::get;

    let app = Router::new().route("/health", get(health_handler));
    let (status, body) = json_request(app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_ready_only_after_marked_ready() {
    let state = create_test_state(config(), Recording::new(200, json!({})));

    let (status, body) = json_request(router(state.clone()), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "not_ready");

    state.mark_ready();
    let (status, body) = json_request(router(state.clone()), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");

    state.mark_not_ready();
    let (status, _) = json_request(router(state), "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_dry_run_substitutes_path_param() {
    let transport = Recording::new(200, json!({}));
    let app = create_test_app(config(), transport.clone());

    let (status, body) = json_request(
        app,
        "POST",
        "/tools/hris_get_employee/execute",
        Some(json!({ "arguments": { "id": "123" }, "dry_run": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dry_run"], true);
    assert_eq!(body["request"]["url"], "https://api.example.com/employees/123");
    assert_eq!(body["request"]["method"], "GET");
    assert!(body["request"].get("body").is_none());
    assert_eq!(body["request"]["headers"]["x-account-id"], "acc-1");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_live_call_sends_same_request_as_dry_run() {
    let transport = Recording::new(200, json!({ "data": [{ "id": "e1" }] }));
    let app = create_test_app(config(), transport.clone());
    let args = json!({ "page_size": 25 });

    let (_, dry) = json_request(
        app.clone(),
        "POST",
        "/tools/hris_list_employees/execute",
        Some(json!({ "arguments": args, "dry_run": true })),
    )
    .await;
    let (status, live) = json_request(
        app,
        "POST",
        "/tools/hris_list_employees/execute",
        Some(json!({ "arguments": args })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(live["result"]["data"][0]["id"], "e1");

    let sent = transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(serde_json::to_value(&sent[0]).unwrap(), dry["request"]);
    assert_eq!(sent[0].url, "https://api.example.com/employees?page_size=25");
}

#[tokio::test]
async fn test_call_headers_override_tool_set_headers() {
    let app = create_test_app(config(), Recording::new(200, json!({})));

    let (_, body) = json_request(
        app,
        "POST",
        "/tools/hris_list_employees/execute",
        Some(json!({
            "arguments": {},
            "dry_run": true,
            "headers": { "X-Account-Id": "acc-override" }
        })),
    )
    .await;

    let headers = body["request"]["headers"].as_object().unwrap();
    assert_eq!(headers["X-Account-Id"], "acc-override");
    assert!(!headers.contains_key("x-account-id"));
    assert_eq!(headers["Authorization"], "Basic dGVzdC1rZXk6");
}

#[tokio::test]
async fn test_file_path_derives_upload_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("contract.PDF");
    std::fs::write(&path, b"hello").unwrap();

    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, body) = json_request(
        app,
        "POST",
        "/tools/hris_upload_employee_document/execute",
        Some(json!({
            "arguments": { "id": "e1", "file_path": path.to_str().unwrap() },
            "dry_run": true
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let sent: Value = serde_json::from_str(body["request"]["body"].as_str().unwrap()).unwrap();
    assert_eq!(sent["content"], "aGVsbG8=");
    assert_eq!(sent["name"], "contract.PDF");
    assert_eq!(sent["file_format"], "pdf");
    assert_eq!(sent["file_path"], path.to_str().unwrap());
}

#[tokio::test]
async fn test_openai_string_arguments_accepted() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, body) = json_request(
        app,
        "POST",
        "/tools/hris_get_employee/execute",
        Some(json!({ "arguments": "{\"id\":\"a b\"}", "target": "openai", "dry_run": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["url"], "https://api.example.com/employees/a%20b");
}

#[tokio::test]
async fn test_invalid_arguments_return_400() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, _) = json_request(
        app,
        "POST",
        "/tools/hris_get_employee/execute",
        Some(json!({ "arguments": "not json", "dry_run": true })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_error_returns_502() {
    let app = create_test_app(config(), Recording::new(404, json!({ "error": "no such employee" })));
    let (status, body) = json_request(
        app,
        "POST",
        "/tools/hris_get_employee/execute",
        Some(json!({ "arguments": { "id": "missing" } })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn test_unknown_tool_returns_404() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, _) = json_request(app, "POST", "/tools/nope/execute", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// Listing and rendering
// ============================================================================

#[tokio::test]
async fn test_list_tools_rendered_for_openai() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, body) = json_request(app, "GET", "/tools?target=openai", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["target"], "openai");
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 3);
    assert_eq!(tools[0]["schema"]["type"], "function");
    assert_eq!(tools[0]["schema"]["function"]["name"], "hris_list_employees");
}

#[tokio::test]
async fn test_rendered_targets_share_fingerprint() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (_, mcp) = json_request(app.clone(), "GET", "/tools/hris_get_employee?target=mcp", None).await;
    let (_, anthropic) =
        json_request(app, "GET", "/tools/hris_get_employee?target=anthropic", None).await;

    assert_eq!(mcp["fingerprint"], anthropic["fingerprint"]);
    assert_eq!(mcp["schema"]["inputSchema"], anthropic["schema"]["input_schema"]);
}

#[tokio::test]
async fn test_unknown_render_target_returns_400() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, _) = json_request(app, "GET", "/tools?target=langchain", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Search
// ============================================================================

#[tokio::test]
async fn test_search_empty_query_returns_400() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, _) = json_request(app, "POST", "/search", Some(json!({ "query": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_zero_top_k_returns_400() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, _) = json_request(
        app,
        "POST",
        "/search",
        Some(json!({ "query": "employees", "top_k": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_without_discovery_is_local() {
    let app = create_test_app(config(), Recording::new(200, json!({})));
    let (status, body) = json_request(
        app,
        "POST",
        "/search",
        Some(json!({ "query": "list employees", "top_k": 2 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "local");
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty() && results.len() <= 2);
    assert_eq!(results[0]["name"], "hris_list_employees");
}

#[tokio::test]
async fn test_search_discovery_unavailable_without_fallback_returns_503() {
    let app = create_test_app(
        config().with_discovery_url("https://search.example.com/actions/search"),
        Recording::new(503, json!({ "error": "down" })),
    );
    let (status, _) = json_request(
        app,
        "POST",
        "/search",
        Some(json!({ "query": "list employees", "fallback_to_local": false })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_search_discovery_unavailable_falls_back_to_local() {
    let app = create_test_app(
        config().with_discovery_url("https://search.example.com/actions/search"),
        Recording::new(503, json!({ "error": "down" })),
    );
    let (status, body) = json_request(
        app,
        "POST",
        "/search",
        Some(json!({ "query": "upload employee document" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "local");
    assert_eq!(body["results"][0]["name"], "hris_upload_employee_document");
}

#[tokio::test]
async fn test_search_remote_results_normalized() {
    let app = create_test_app(
        config().with_discovery_url("https://search.example.com/actions/search"),
        Recording::new(
            200,
            json!({
                "results": [
                    { "action_name": "hris_1.0.0_hris_get_employee_global", "connector_key": "hris", "similarity_score": 0.88 },
                    { "action_name": "hris_2.1.0_hris_get_employee_global", "connector_key": "hris", "similarity_score": 0.93 },
                    { "action_name": "ats_1.0.0_ats_get_candidate_global", "connector_key": "ats", "similarity_score": 0.99 }
                ],
                "total_count": 3,
                "query": "employee by id"
            }),
        ),
    );
    let (status, body) = json_request(
        app,
        "POST",
        "/search",
        Some(json!({ "query": "employee by id" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "remote");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "hris_get_employee");
    assert_eq!(results[0]["score"], 0.93);
}

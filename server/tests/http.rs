//! End-to-end tests of the HTTP surface, driven through the router.

use std::sync::Arc;

use arbor_server::{create_app, create_test_state, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use engine_config::CentralConfig;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

const START: &str = r#"state -> state is root ? [("start", 0.5)] : []"#;

/// Helper to make a GET request and return the status and JSON body
async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

/// Helper to call a tool and return the status and JSON body
async fn call(state: &Arc<AppState>, tool: &str, args: Value) -> (StatusCode, Value) {
    let response = create_app(Arc::clone(state))
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/tools/{}", tool))
                .header("content-type", "application/json")
                .body(Body::from(args.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn init(state: &Arc<AppState>, algorithm: &str) -> String {
    let (status, body) = call(state, "init_tree", json!({"algorithm": algorithm})).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let state = create_test_state();
    let (status, body) = get(create_app(state), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_sessions"], 0);
}

#[tokio::test]
async fn test_tool_catalogue() {
    let state = create_test_state();
    let (status, body) = get(create_app(state), "/tools").await;
    assert_eq!(status, StatusCode::OK);
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 7);
    assert!(tools.iter().any(|t| t["name"] == "get_tree_visualization"));
}

#[tokio::test]
async fn test_init_step_rank() {
    let state = create_test_state();
    let (status, created) = call(
        &state,
        "init_tree",
        json!({"algorithm": "StandardMCTS", "params": {"exploration_weight": 1.4}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["parameters"]["exploration_weight"], 1.4);
    let id = created["session_id"].as_str().unwrap();

    let (status, step) = call(
        &state,
        "step_tree",
        json!({"session_id": id, "generate_functions": {"expand": START}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", step);
    assert_eq!(step["tree_size"], 2);
    assert_eq!(step["step_count"], 1);

    let (status, ranked) = call(&state, "rank_nodes", json!({"session_id": id, "k": 1})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ranked["actual_results"], 1);
    assert_eq!(ranked["ranked_nodes"][0]["state"], "start");
    assert_eq!(ranked["ranked_nodes"][0]["score"], 0.5);
}

#[tokio::test]
async fn test_non_numeric_score_leaves_tree_unchanged() {
    let state = create_test_state();
    let id = init(&state, "ABMCTSA").await;

    let (status, body) = call(
        &state,
        "step_tree",
        json!({"session_id": id, "generate_functions": {"expand": "s -> [('a', 'high')]"}}),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "InvalidOutput");
    assert_eq!(body["error"]["function"], "expand");

    let (status, tree) = call(&state, "get_tree_state", json!({"session_id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tree["total_nodes"], 1);
    assert_eq!(tree["step_count"], 0);
}

#[tokio::test]
async fn test_infinite_loop_is_timeout() {
    let mut config = CentralConfig::default();
    config.executor.timeout_ms = 100;
    config.executor.max_instructions = u64::MAX;
    let state = Arc::new(AppState::new(config));
    let id = init(&state, "StandardMCTS").await;

    let (status, body) = call(
        &state,
        "step_tree",
        json!({
            "session_id": id,
            "generate_functions": {"spin": "s -> iterate(0, x -> true, x -> x + 1)"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "Timeout");
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() {
    let state = create_test_state();
    let id = init(&state, "ABMCTSM").await;

    let (status, body) = call(&state, "delete_session", json!({"session_id": id})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "deleted");

    let (status, body) = call(&state, "get_tree_state", json!({"session_id": id})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "NotFoundError");
}

#[tokio::test]
async fn test_invalid_params_are_rejected() {
    let state = create_test_state();
    let (status, body) = call(
        &state,
        "init_tree",
        json!({"algorithm": "StandardMCTS", "params": {"exploration_weight": -1.0}}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "ValidationError");

    let (status, _) = call(&state, "init_tree", json!({"algorithm": "AlphaZero"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let id = init(&state, "StandardMCTS").await;
    let (status, body) = call(&state, "step_tree", json!({"session_id": id})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["field"], "generate_functions");
}

#[tokio::test]
async fn test_dot_visualization() {
    let state = create_test_state();
    let id = init(&state, "StandardMCTS").await;
    call(
        &state,
        "step_tree",
        json!({"session_id": id, "generate_functions": {"expand": START}}),
    )
    .await;

    let (status, body) = call(
        &state,
        "get_tree_visualization",
        json!({"session_id": id, "format": "dot", "title": "Demo"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["format"], "dot");
    let source = body["source"].as_str().unwrap();
    assert!(source.contains("digraph SearchTree"));
    assert!(source.contains("ROOT"));
    assert!(source.contains("0 -> 1"));
    assert_eq!(body["metadata"]["node_count"], 2);
    assert!(body.get("image_base64").is_none());

    let (status, _) = call(
        &state,
        "get_tree_visualization",
        json!({"session_id": id, "format": "gif"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_tool_is_not_found() {
    let state = create_test_state();
    let (status, body) = call(&state, "grow_tree", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"]["hint"].as_str().unwrap().contains("step_tree"));
}

#[tokio::test]
async fn test_sessions_listing() {
    let state = create_test_state();
    let first = init(&state, "StandardMCTS").await;
    let second = init(&state, "ABMCTSA").await;

    let (status, body) = get(create_app(Arc::clone(&state)), "/sessions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active_sessions"], 2);
    assert_eq!(body["sessions"][0]["session_id"], first.as_str());
    assert_eq!(body["sessions"][1]["session_id"], second.as_str());
    assert_eq!(body["sessions"][1]["algorithm"], "ABMCTSA");
}

//! End-to-end HTTP contract tests against a server on an ephemeral port.

use std::net::SocketAddr;

use serde_json::{Value, json};

use patchlog::server::{AppState, create_router};

async fn spawn_server() -> SocketAddr {
    let state = AppState::in_memory().await.expect("state init");
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let _server = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn detail(response: reqwest::Response) -> String {
    let body: Value = response.json().await.expect("error body");
    body["detail"].as_str().expect("detail string").to_string()
}

#[tokio::test]
async fn health_endpoints_respond() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .expect("health request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("health body");
    assert_eq!(body["status"], json!("ok"));

    let response = client
        .get(format!("http://{addr}/health/db"))
        .send()
        .await
        .expect("health/db request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("health/db body");
    assert_eq!(body["store"], json!("ok"));
}

#[tokio::test]
async fn conversation_step_log_end_to_end() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    // Create with no title: a generated one comes back, log starts empty.
    let created: Value = client
        .post(format!("http://{addr}/conversations"))
        .json(&json!({}))
        .send()
        .await
        .expect("create")
        .json()
        .await
        .expect("create body");
    let id = created["id"].as_str().expect("id").to_string();
    assert!(!created["title"].as_str().expect("title").is_empty());
    assert_eq!(created["steps"], json!([]));
    assert_eq!(created["pendingSteps"], json!([]));
    assert_eq!(created["sessionState"], json!({}));

    // Append one step.
    let response = client
        .post(format!("http://{addr}/conversations/{id}/appendStep"))
        .json(&json!({
            "templatePath": "t1",
            "mode": "explicit",
            "ops": [{"op": "add", "path": "/n", "value": 1}]
        }))
        .send()
        .await
        .expect("appendStep");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("appendStep body");
    assert_eq!(body, json!({"ok": true}));

    // The step is in the log with matching content and a timestamp.
    let fetched: Value = client
        .get(format!("http://{addr}/conversations/{id}"))
        .send()
        .await
        .expect("get")
        .json()
        .await
        .expect("get body");
    let steps = fetched["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0]["templatePath"], json!("t1"));
    assert_eq!(steps[0]["mode"], json!("explicit"));
    assert_eq!(steps[0]["ops"], json!([{"op": "add", "path": "/n", "value": 1}]));
    assert!(steps[0]["at"].is_string());

    // Undo brings the log back to empty.
    client
        .post(format!("http://{addr}/conversations/{id}/undo"))
        .send()
        .await
        .expect("undo");
    let fetched: Value = client
        .get(format!("http://{addr}/conversations/{id}"))
        .send()
        .await
        .expect("get after undo")
        .json()
        .await
        .expect("get after undo body");
    assert_eq!(fetched["steps"], json!([]));
}

#[tokio::test]
async fn conversation_state_is_replaced_wholesale() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("http://{addr}/conversations"))
        .json(&json!({"title": "state"}))
        .send()
        .await
        .expect("create")
        .json()
        .await
        .expect("create body");
    let id = created["id"].as_str().expect("id").to_string();

    for payload in [
        json!({
            "pendingSteps": [{"templatePath": "t1", "mode": "diff"}],
            "sessionState": {"cursor": 3}
        }),
        json!({
            "pendingSteps": [{"templatePath": "t2", "mode": "explicit"}],
            "sessionState": {"zoom": 1.5}
        }),
    ] {
        let response = client
            .patch(format!("http://{addr}/conversations/{id}/state"))
            .json(&payload)
            .send()
            .await
            .expect("state update");
        assert!(response.status().is_success());
    }

    let fetched: Value = client
        .get(format!("http://{addr}/conversations/{id}"))
        .send()
        .await
        .expect("get")
        .json()
        .await
        .expect("get body");
    assert_eq!(
        fetched["pendingSteps"],
        json!([{"templatePath": "t2", "mode": "explicit"}])
    );
    assert_eq!(fetched["sessionState"], json!({"zoom": 1.5}));
}

#[tokio::test]
async fn list_puts_most_recently_updated_first() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let mut ids = Vec::new();
    for title in ["a", "b"] {
        let created: Value = client
            .post(format!("http://{addr}/conversations"))
            .json(&json!({"title": title}))
            .send()
            .await
            .expect("create")
            .json()
            .await
            .expect("create body");
        ids.push(created["id"].as_str().expect("id").to_string());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    // Renaming A refreshes its updated_at and moves it to the front.
    client
        .patch(format!("http://{addr}/conversations/{}/title", ids[0]))
        .json(&json!({"title": "a2"}))
        .send()
        .await
        .expect("rename");

    let listed: Value = client
        .get(format!("http://{addr}/conversations"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("list body");
    let items = listed["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"].as_str(), Some(ids[0].as_str()));
    assert_eq!(items[1]["id"].as_str(), Some(ids[1].as_str()));
    assert_eq!(items[0]["title"], json!("a2"));
}

#[tokio::test]
async fn apply_patch_round_trip_and_failure_atomicity() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("http://{addr}/objects"))
        .json(&json!({"doc": {}}))
        .send()
        .await
        .expect("create object")
        .json()
        .await
        .expect("create object body");
    let id = created["id"].as_str().expect("id").to_string();

    // add then remove returns the document to {}.
    let patched: Value = client
        .post(format!("http://{addr}/objects/{id}/applyPatch"))
        .json(&json!({"patch": [{"op": "add", "path": "/x", "value": 1}]}))
        .send()
        .await
        .expect("applyPatch add")
        .json()
        .await
        .expect("applyPatch add body");
    assert_eq!(patched["doc"], json!({"x": 1}));

    let patched: Value = client
        .post(format!("http://{addr}/objects/{id}/applyPatch"))
        .json(&json!({"patch": [{"op": "remove", "path": "/x"}]}))
        .send()
        .await
        .expect("applyPatch remove")
        .json()
        .await
        .expect("applyPatch remove body");
    assert_eq!(patched["doc"], json!({}));

    // A failing patch leaves the stored document untouched.
    client
        .post(format!("http://{addr}/objects/{id}/applyPatch"))
        .json(&json!({"patch": [{"op": "add", "path": "/a", "value": 1}]}))
        .send()
        .await
        .expect("applyPatch seed");
    let response = client
        .post(format!("http://{addr}/objects/{id}/applyPatch"))
        .json(&json!({"patch": [
            {"op": "replace", "path": "/a", "value": 2},
            {"op": "replace", "path": "/missing", "value": 3}
        ]}))
        .send()
        .await
        .expect("applyPatch failing");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(detail(response).await.starts_with("patch_error:"));

    let fetched: Value = client
        .get(format!("http://{addr}/objects/{id}"))
        .send()
        .await
        .expect("get object")
        .json()
        .await
        .expect("get object body");
    assert_eq!(fetched["doc"], json!({"a": 1}));
}

#[tokio::test]
async fn template_store_and_fetch() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("http://{addr}/templates"))
        .json(&json!({"yaml": "kind: demo\n", "name": "demo"}))
        .send()
        .await
        .expect("create template")
        .json()
        .await
        .expect("create template body");
    let id = created["id"].as_str().expect("id").to_string();
    assert_eq!(created["yaml"], json!("kind: demo\n"));

    let fetched: Value = client
        .get(format!("http://{addr}/templates/{id}"))
        .send()
        .await
        .expect("get template")
        .json()
        .await
        .expect("get template body");
    assert_eq!(fetched["yaml"], json!("kind: demo\n"));
    assert_eq!(fetched["name"], json!("demo"));
}

#[tokio::test]
async fn error_codes_are_machine_readable() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    // Malformed id.
    let response = client
        .get(format!("http://{addr}/conversations/not-an-id"))
        .send()
        .await
        .expect("malformed id request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(detail(response).await, "invalid_id");

    // Well-formed but absent ids.
    let absent = uuid::Uuid::new_v4();
    for path in [
        format!("/conversations/{absent}"),
        format!("/objects/{absent}"),
        format!("/templates/{absent}"),
    ] {
        let response = client
            .get(format!("http://{addr}{path}"))
            .send()
            .await
            .expect("absent id request");
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        assert_eq!(detail(response).await, "not_found");
    }

    // Mutations against an absent conversation.
    let response = client
        .post(format!("http://{addr}/conversations/{absent}/undo"))
        .send()
        .await
        .expect("undo absent");
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // Rejected rename.
    let created: Value = client
        .post(format!("http://{addr}/conversations"))
        .json(&json!({}))
        .send()
        .await
        .expect("create")
        .json()
        .await
        .expect("create body");
    let id = created["id"].as_str().expect("id").to_string();
    let response = client
        .patch(format!("http://{addr}/conversations/{id}/title"))
        .json(&json!({"title": "  "}))
        .send()
        .await
        .expect("rename empty");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(detail(response).await.starts_with("invalid_input:"));
}

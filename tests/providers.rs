//! Provider backends against a local stand-in for the Gemini and
//! OpenAI-compatible HTTP APIs.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use atelier::completion::CompletionGateway;
use atelier::config::CompletionConfig;

#[derive(Clone, Default)]
struct Upstream {
    gemini_fails: bool,
    gemini_answer: String,
    openai_answer: String,
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn gemini(
    State(up): State<Upstream>,
    Path(call): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.seen.lock().unwrap().push((format!("gemini:{}", call), body));
    if headers.get("x-goog-api-key").and_then(|v| v.to_str().ok()) != Some("g-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
    }
    if up.gemini_fails {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": { "message": "quota exceeded" } })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "candidates": [{ "content": { "parts": [{ "text": up.gemini_answer }] } }]
        })),
    )
}

async fn openai(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    up.seen.lock().unwrap().push(("openai".to_string(), body));
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer o-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
    }
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": up.openai_answer } }]
        })),
    )
}

/// Serve the stand-in on an ephemeral port and return a completion config
/// pointing at it with both keys set.
async fn serve(up: Upstream) -> CompletionConfig {
    let app = Router::new()
        .route("/gemini/models/{call}", post(gemini))
        .route("/openai/chat/completions", post(openai))
        .with_state(up);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = CompletionConfig::default();
    config.gemini.base_url = format!("http://{}/gemini", addr);
    config.gemini.model = "gemini-test".to_string();
    config.openai.base_url = format!("http://{}/openai", addr);
    config.openai.model = "chat-test".to_string();
    config.openai.max_tokens = 64;
    config.resolve_credentials(|name| match name {
        "GEMINI_API_KEY" => Some("g-key".to_string()),
        "OPENAI_API_KEY" => Some("o-key".to_string()),
        _ => None,
    });
    config
}

#[tokio::test]
async fn gemini_answers_first() {
    let up = Upstream {
        gemini_answer: "from gemini".to_string(),
        openai_answer: "from openai".to_string(),
        ..Upstream::default()
    };
    let seen = up.seen.clone();
    let gateway = CompletionGateway::from_config(&serve(up).await).unwrap();
    assert_eq!(gateway.providers(), vec!["gemini", "openai"]);

    let out = gateway.generate_text("hello").await.unwrap();
    assert_eq!(out.text, "from gemini");
    assert_eq!(out.provider, "gemini");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "gemini:gemini-test:generateContent");
    assert_eq!(seen[0].1["contents"][0]["parts"][0]["text"], "hello");
}

#[tokio::test]
async fn quota_error_falls_back_to_openai() {
    let up = Upstream {
        gemini_fails: true,
        openai_answer: "from openai".to_string(),
        ..Upstream::default()
    };
    let seen = up.seen.clone();
    let gateway = CompletionGateway::from_config(&serve(up).await).unwrap();

    let out = gateway.generate_text("hello").await.unwrap();
    assert_eq!(out.provider, "openai");
    assert_eq!(out.text, "from openai");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    let (_, chat) = &seen[1];
    assert_eq!(chat["model"], "chat-test");
    assert_eq!(chat["max_tokens"], 64);
    assert_eq!(chat["messages"], json!([{ "role": "user", "content": "hello" }]));
}

#[tokio::test]
async fn json_mode_sends_structured_output_switches() {
    let up = Upstream {
        gemini_answer: "not json at all".to_string(),
        openai_answer: "```json\n{\"tags\": [\"ml\"]}\n```".to_string(),
        ..Upstream::default()
    };
    let seen = up.seen.clone();
    let gateway = CompletionGateway::from_config(&serve(up).await).unwrap();

    let out = gateway.generate_json("tags?").await.unwrap();
    assert_eq!(out.provider, "openai");
    assert_eq!(out.json, json!({ "tags": ["ml"] }));

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0].1["generationConfig"]["responseMimeType"],
        "application/json"
    );
    assert_eq!(seen[1].1["response_format"], json!({ "type": "json_object" }));
}

#[tokio::test]
async fn empty_answers_everywhere_yield_none() {
    let up = Upstream::default();
    let gateway = CompletionGateway::from_config(&serve(up).await).unwrap();
    assert!(gateway.generate_text("hello").await.is_none());
}

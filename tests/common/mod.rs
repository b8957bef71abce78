//! A small in-process stand-in for the chat API, served by axum.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::{Json, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::Router;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

pub const TOKEN: &str = "test-token";

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// A response every request gets instead of the normal routing.
#[derive(Debug, Clone)]
pub struct Canned {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Default)]
pub struct ApiState {
    pub chats: Vec<(String, String)>,
    pub next_id: u32,
    pub requests: Vec<Recorded>,
    pub canned: Option<Canned>,
    /// Replaces the generated SSE frames for completions.
    pub frames: Option<Vec<String>>,
}

type Shared = Arc<Mutex<ApiState>>;

pub struct FakeApi {
    pub base_url: String,
    pub state: Shared,
}

impl FakeApi {
    pub async fn start() -> Self {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/v1/chats/new", post(create_chat))
            .route("/api/v1/chats/", get(list_chats))
            .route("/api/v1/chats/{id}", delete(delete_chat))
            .route("/api/chat/completions", post(completions))
            .fallback(|| async { (StatusCode::NOT_FOUND, Json(json!({"detail": "Not Found"}))) })
            .layer(middleware::from_fn_with_state(state.clone(), record_and_authorize))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    /// Answer every request with `status` and `body`.
    pub fn respond_with(&self, status: u16, headers: &[(&str, &str)], body: &str) {
        self.state.lock().unwrap().canned = Some(Canned {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: body.to_string(),
        });
    }

    /// Stream exactly these SSE frames (each already terminated) for completions.
    pub fn stream_frames(&self, frames: &[&str]) {
        self.state.lock().unwrap().frames = Some(frames.iter().map(|f| f.to_string()).collect());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> Recorded {
        self.requests().pop().unwrap()
    }
}

/// Record every request, then answer canned or unauthorized ones directly.
async fn record_and_authorize(State(state): State<Shared>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let recorded = Recorded {
        method: parts.method.to_string(),
        target: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        headers: parts
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect(),
        body: String::from_utf8_lossy(&bytes).to_string(),
    };

    let canned = {
        let mut state = state.lock().unwrap();
        state.requests.push(recorded.clone());
        state.canned.clone()
    };
    if let Some(canned) = canned {
        let mut response = Response::builder()
            .status(canned.status)
            .header(header::CONTENT_TYPE, "application/json");
        for (key, value) in canned.headers {
            response = response.header(key, value);
        }
        return response.body(Body::from(canned.body)).unwrap();
    }

    let expected = format!("Bearer {TOKEN}");
    if recorded.header("authorization") != Some(expected.as_str()) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "Invalid token"}))).into_response();
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn create_chat(State(state): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    let mut chat = body["chat"].clone();
    let mut state = state.lock().unwrap();
    state.next_id += 1;
    let id = format!("chat-{}", state.next_id);
    let title = chat["title"].as_str().unwrap_or("New Chat").to_string();
    chat["id"] = json!(id);
    state.chats.push((id, title));
    Json(json!({"chat": chat}))
}

#[derive(Deserialize)]
struct PageQuery {
    page: u32,
}

async fn list_chats(State(state): State<Shared>, Query(query): Query<PageQuery>) -> Json<Value> {
    if query.page != 1 {
        return Json(json!([]));
    }
    let chats: Vec<Value> = state
        .lock()
        .unwrap()
        .chats
        .iter()
        .map(|(id, title)| json!({"id": id, "title": title, "updated_at": 1742265411}))
        .collect();
    Json(Value::Array(chats))
}

async fn delete_chat(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    let mut state = state.lock().unwrap();
    match state.chats.iter().position(|(chat_id, _)| *chat_id == id) {
        Some(pos) => {
            state.chats.remove(pos);
            Json(json!(true)).into_response()
        }
        None => chat_not_found(),
    }
}

async fn completions(State(state): State<Shared>, Json(body): Json<Value>) -> Response {
    let frames = {
        let state = state.lock().unwrap();
        let chat_id = body["chat_id"].as_str().unwrap_or_default();
        if !state.chats.iter().any(|(id, _)| id == chat_id) {
            return chat_not_found();
        }
        state.frames.clone()
    };
    let frames = frames.unwrap_or_else(|| {
        let question = body["messages"]
            .as_array()
            .and_then(|m| m.last())
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default();
        answer_frames(&answer(question))
    });

    let body = futures::stream::iter(frames).then(|frame| async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok::<_, Infallible>(Bytes::from(frame))
    });
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(body),
    )
        .into_response()
}

fn chat_not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Chat not found"}))).into_response()
}

pub fn answer(question: &str) -> String {
    match question {
        "2+2?" => "2 + 2 = 4".to_string(),
        other => format!("You said: {other}"),
    }
}

fn answer_frames(answer: &str) -> Vec<String> {
    let mut frames: Vec<String> = answer
        .split_inclusive(' ')
        .map(|piece| {
            let chunk = json!({
                "id": "cmpl-1",
                "object": "chat.completion.chunk",
                "created": 1742265411,
                "model": "lambda.mercury-coder-small",
                "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}]
            });
            format!("data: {chunk}\n\n")
        })
        .collect();
    let finish = json!({
        "id": "cmpl-1",
        "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    });
    frames.push(format!("data: {finish}\n\n"));
    frames.push("data: [DONE]\n\n".to_string());
    frames
}

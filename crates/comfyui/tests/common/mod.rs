use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// How the stub answers `POST /prompt`.
#[derive(Clone)]
pub enum SubmitMode {
    /// Accept and hand out `prompt_id`.
    Accept { prompt_id: String },
    /// Reply with this status and raw body.
    Reject { status: StatusCode, body: String },
}

/// Scripted stand-in for a ComfyUI server.
pub struct StubState {
    pub submit: SubmitMode,
    /// History becomes available on this tick (1-based).
    pub complete_on_tick: u32,
    pub artifact: String,
    pub history_queries: u32,
    pub received: Vec<Value>,
}

pub type SharedStub = Arc<Mutex<StubState>>;

pub fn accepting(prompt_id: &str, complete_on_tick: u32, artifact: &str) -> SharedStub {
    Arc::new(Mutex::new(StubState {
        submit: SubmitMode::Accept {
            prompt_id: prompt_id.to_string(),
        },
        complete_on_tick,
        artifact: artifact.to_string(),
        history_queries: 0,
        received: Vec::new(),
    }))
}

pub fn rejecting(status: StatusCode, body: &str) -> SharedStub {
    Arc::new(Mutex::new(StubState {
        submit: SubmitMode::Reject {
            status,
            body: body.to_string(),
        },
        complete_on_tick: u32::MAX,
        artifact: String::new(),
        history_queries: 0,
        received: Vec::new(),
    }))
}

async fn submit(State(stub): State<SharedStub>, Json(body): Json<Value>) -> Response {
    let mut stub = stub.lock().unwrap();
    stub.received.push(body);
    match stub.submit.clone() {
        SubmitMode::Accept { prompt_id } => Json(json!({
            "prompt_id": prompt_id,
            "number": stub.received.len(),
            "node_errors": {}
        }))
        .into_response(),
        SubmitMode::Reject { status, body } => (status, body).into_response(),
    }
}

async fn history(State(stub): State<SharedStub>, Path(prompt_id): Path<String>) -> Json<Value> {
    let mut stub = stub.lock().unwrap();
    stub.history_queries += 1;
    if stub.history_queries < stub.complete_on_tick {
        return Json(json!({}));
    }
    let mut body = serde_json::Map::new();
    body.insert(
        prompt_id,
        json!({
            "outputs": {
                "9": { "images": [{ "filename": stub.artifact, "subfolder": "", "type": "output" }] }
            },
            "status": { "status_str": "success", "completed": true, "messages": [] }
        }),
    );
    Json(Value::Object(body))
}

/// Serve the stub on an ephemeral port and return its base URL.
pub async fn spawn_stub(stub: SharedStub) -> String {
    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{prompt_id}", get(history))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

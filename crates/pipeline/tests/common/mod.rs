use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

/// Scripted stand-in for a ComfyUI server.
///
/// Accepted prompts complete on their `complete_on_tick`-th history query
/// with `<filename_prefix>_00001_.png`. Prompts whose prefix is listed in
/// `reject_prefixes` are refused with `reject_status`/`reject_body`.
pub struct StubComfy {
    pub complete_on_tick: u32,
    pub reject_prefixes: Vec<String>,
    pub reject_status: StatusCode,
    pub reject_body: String,
    pub submissions: u32,
    /// prompt_id -> (filename_prefix, history queries so far)
    pub jobs: HashMap<String, (String, u32)>,
}

pub type SharedStub = Arc<Mutex<StubComfy>>;

pub fn stub(complete_on_tick: u32) -> SharedStub {
    Arc::new(Mutex::new(StubComfy {
        complete_on_tick,
        reject_prefixes: Vec::new(),
        reject_status: StatusCode::BAD_REQUEST,
        reject_body: String::new(),
        submissions: 0,
        jobs: HashMap::new(),
    }))
}

async fn submit(State(stub): State<SharedStub>, Json(body): Json<Value>) -> Response {
    let mut stub = stub.lock().unwrap();
    stub.submissions += 1;

    let prefix = body["prompt"]["9"]["inputs"]["filename_prefix"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    if stub.reject_prefixes.contains(&prefix) {
        return (stub.reject_status, stub.reject_body.clone()).into_response();
    }

    let prompt_id = format!("prompt-{}", stub.submissions);
    stub.jobs.insert(prompt_id.clone(), (prefix, 0));
    Json(json!({ "prompt_id": prompt_id, "number": stub.submissions, "node_errors": {} }))
        .into_response()
}

async fn history(State(stub): State<SharedStub>, Path(prompt_id): Path<String>) -> Json<Value> {
    let mut stub = stub.lock().unwrap();
    let complete_on_tick = stub.complete_on_tick;
    let Some((prefix, queries)) = stub.jobs.get_mut(&prompt_id) else {
        return Json(json!({}));
    };
    *queries += 1;
    if *queries < complete_on_tick {
        return Json(json!({}));
    }

    let filename = format!("{prefix}_00001_.png");
    let mut body = serde_json::Map::new();
    body.insert(
        prompt_id,
        json!({
            "outputs": { "9": { "images": [{ "filename": filename, "subfolder": "", "type": "output" }] } },
            "status": { "status_str": "success", "completed": true, "messages": [] }
        }),
    );
    Json(Value::Object(body))
}

/// Serve the stub on an ephemeral port and return its base URL.
pub async fn spawn(stub: SharedStub) -> String {
    let app = Router::new()
        .route("/prompt", post(submit))
        .route("/history/{prompt_id}", get(history))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

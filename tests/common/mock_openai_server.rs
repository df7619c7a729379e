//! Mock OpenAI chat completions server

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, dev::ServerHandle, http::StatusCode, web,
};
use bytes::Bytes;
use futures_util::stream;
use serde_json::{Value, json};

/// What the mock answers to the next completion requests.
#[derive(Debug, Clone)]
pub enum MockCompletion {
    /// Stream these content deltas, then `[DONE]`. Every frame is cut in two
    /// transport chunks at its byte midpoint.
    Stream(Vec<String>),
    /// Stream these deltas, then an in-stream error event.
    StreamThenError(Vec<String>, String),
    /// Reply with this status and JSON body.
    Fail { status: u16, body: Value },
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub organization: Option<String>,
    pub accept: Option<String>,
    pub body: Value,
}

struct MockOpenAIState {
    behavior: Mutex<MockCompletion>,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockOpenAIServer {
    addr: SocketAddr,
    state: Arc<MockOpenAIState>,
    handle: ServerHandle,
}

impl MockOpenAIServer {
    pub async fn start(behavior: MockCompletion) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(MockOpenAIState {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
        });

        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/v1/chat/completions", web::post().to(chat_completions))
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Stream the given deltas.
    pub async fn streaming(chunks: &[&str]) -> Self {
        Self::start(MockCompletion::Stream(
            chunks.iter().map(|c| c.to_string()).collect(),
        ))
        .await
    }

    /// Base URL including the `/v1` prefix, as the OpenAI API uses it.
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    pub fn set_behavior(&self, behavior: MockCompletion) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub async fn stop(&self) {
        self.handle.stop(true).await;
    }
}

fn header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn delta_frame(content: &str) -> String {
    let chunk = json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "model": "gpt-3.5-turbo",
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
    });
    format!("data: {}\n\n", chunk)
}

/// Cut each frame in two at its byte midpoint, which may fall inside a
/// multi-byte character.
fn split_frames(frames: Vec<String>) -> Vec<Result<Bytes, actix_web::Error>> {
    frames
        .into_iter()
        .flat_map(|frame| {
            let bytes = Bytes::from(frame);
            let mid = bytes.len() / 2;
            [Ok(bytes.slice(..mid)), Ok(bytes.slice(mid..))]
        })
        .collect()
}

async fn chat_completions(
    req: HttpRequest,
    body: web::Json<Value>,
    state: web::Data<MockOpenAIState>,
) -> HttpResponse {
    state.requests.lock().unwrap().push(RecordedRequest {
        authorization: header(&req, "authorization"),
        organization: header(&req, "openai-organization"),
        accept: header(&req, "accept"),
        body: body.into_inner(),
    });

    let behavior = state.behavior.lock().unwrap().clone();
    let frames = match behavior {
        MockCompletion::Fail { status, body } => {
            return HttpResponse::build(StatusCode::from_u16(status).unwrap()).json(body);
        }
        MockCompletion::Stream(chunks) => {
            let mut frames: Vec<String> = chunks.iter().map(|c| delta_frame(c)).collect();
            frames.push("data: [DONE]\n\n".to_string());
            frames
        }
        MockCompletion::StreamThenError(chunks, message) => {
            let mut frames: Vec<String> = chunks.iter().map(|c| delta_frame(c)).collect();
            frames.push(format!(
                "data: {}\n\n",
                json!({"error": {"message": message, "type": "server_error"}})
            ));
            frames
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .streaming(stream::iter(split_frames(frames)))
}

//! Mock Clerk backend API: JWKS, user lookup and metadata updates

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, dev::ServerHandle, http::StatusCode, web,
};
use serde_json::{Map, Value, json};

use super::{TEST_CLERK_SECRET, TEST_KEY_MODULUS, TEST_KID};

#[derive(Default)]
struct MockClerkState {
    users: Mutex<HashMap<String, Map<String, Value>>>,
    metadata_patches: Mutex<Vec<(String, Value)>>,
    fail_updates: AtomicBool,
    jwks_fetches: AtomicUsize,
    jwks_padding: AtomicUsize,
}

pub struct MockClerkServer {
    addr: SocketAddr,
    state: Arc<MockClerkState>,
    handle: ServerHandle,
}

impl MockClerkServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockClerkState::default());

        let data = web::Data::from(state.clone());
        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/v1/jwks", web::get().to(jwks))
                .route("/v1/users/{user_id}", web::get().to(get_user))
                .route(
                    "/v1/users/{user_id}/metadata",
                    web::patch().to(update_metadata),
                )
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

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Add or replace a user with the given public metadata.
    pub fn insert_user(&self, user_id: &str, public_metadata: Value) {
        let metadata = match public_metadata {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.state
            .users
            .lock()
            .unwrap()
            .insert(user_id.to_string(), metadata);
    }

    pub fn public_metadata(&self, user_id: &str) -> Option<Value> {
        self.state
            .users
            .lock()
            .unwrap()
            .get(user_id)
            .map(|m| Value::Object(m.clone()))
    }

    pub fn credits(&self, user_id: &str) -> Option<Value> {
        self.public_metadata(user_id)
            .and_then(|m| m.get("credits").cloned())
    }

    /// Metadata PATCH bodies received, with the user they targeted.
    pub fn metadata_patches(&self) -> Vec<(String, Value)> {
        self.state.metadata_patches.lock().unwrap().clone()
    }

    pub fn fail_updates(&self, fail: bool) {
        self.state.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Inflate the JWKS response by this many bytes of filler.
    pub fn pad_jwks(&self, bytes: usize) {
        self.state.jwks_padding.store(bytes, Ordering::SeqCst);
    }

    pub fn jwks_fetches(&self) -> usize {
        self.state.jwks_fetches.load(Ordering::SeqCst)
    }

    pub async fn stop(&self) {
        self.handle.stop(true).await;
    }
}

fn authorized(req: &HttpRequest) -> bool {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TEST_CLERK_SECRET))
}

fn clerk_error(status: StatusCode, code: &str, long_message: &str) -> HttpResponse {
    HttpResponse::build(status).json(json!({
        "errors": [{
            "message": code.replace('_', " "),
            "long_message": long_message,
            "code": code
        }]
    }))
}

fn unauthorized() -> HttpResponse {
    clerk_error(
        StatusCode::UNAUTHORIZED,
        "authentication_invalid",
        "The provided secret key is invalid",
    )
}

fn user_json(user_id: &str, metadata: &Map<String, Value>) -> Value {
    json!({
        "id": user_id,
        "object": "user",
        "public_metadata": metadata,
        "private_metadata": {},
        "unsafe_metadata": {}
    })
}

async fn jwks(req: HttpRequest, state: web::Data<MockClerkState>) -> HttpResponse {
    if !authorized(&req) {
        return unauthorized();
    }
    state.jwks_fetches.fetch_add(1, Ordering::SeqCst);
    let mut body = json!({
        "keys": [{
            "use": "sig",
            "kty": "RSA",
            "kid": TEST_KID,
            "alg": "RS256",
            "n": TEST_KEY_MODULUS,
            "e": "AQAB"
        }]
    });
    let padding = state.jwks_padding.load(Ordering::SeqCst);
    if padding > 0 {
        body["padding"] = json!("x".repeat(padding));
    }
    HttpResponse::Ok().json(body)
}

async fn get_user(
    req: HttpRequest,
    path: web::Path<String>,
    state: web::Data<MockClerkState>,
) -> HttpResponse {
    if !authorized(&req) {
        return unauthorized();
    }
    let user_id = path.into_inner();
    match state.users.lock().unwrap().get(&user_id) {
        Some(metadata) => HttpResponse::Ok().json(user_json(&user_id, metadata)),
        None => clerk_error(
            StatusCode::NOT_FOUND,
            "resource_not_found",
            "User not found",
        ),
    }
}

async fn update_metadata(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<Value>,
    state: web::Data<MockClerkState>,
) -> HttpResponse {
    if !authorized(&req) {
        return unauthorized();
    }
    let user_id = path.into_inner();
    let body = body.into_inner();
    state
        .metadata_patches
        .lock()
        .unwrap()
        .push((user_id.clone(), body.clone()));

    if state.fail_updates.load(Ordering::SeqCst) {
        return clerk_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_clerk_error",
            "Metadata update failed",
        );
    }

    let mut users = state.users.lock().unwrap();
    let Some(metadata) = users.get_mut(&user_id) else {
        return clerk_error(
            StatusCode::NOT_FOUND,
            "resource_not_found",
            "User not found",
        );
    };
    if let Some(Value::Object(patch)) = body.get("public_metadata") {
        metadata.extend(patch.clone());
    }
    HttpResponse::Ok().json(user_json(&user_id, metadata))
}

use std::sync::Arc;
use std::time::Duration;

use actix_web::{
    App, Error, HttpRequest, HttpResponse, HttpServer, get, middleware::Logger, post, web,
};
use anyhow::Context;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde_json::json;
use tracing::{Level, debug, error, info, warn};

use crate::completion::OpenAIClient;
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::identity::{ClerkIdentityProvider, SessionCredentials};
use crate::logging::{self, LoggingConfig};
use crate::middleware::{RequestIdMiddleware, get_request_id};
use crate::relay::ChatRelay;

const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const IDENTITY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct AppState {
    relay: ChatRelay,
}

impl AppState {
    pub fn new(relay: ChatRelay) -> Self {
        Self { relay }
    }

    /// Wire the OpenAI and Clerk adapters from configuration.
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let completion =
            OpenAIClient::new(&config.openai).context("Failed to create OpenAI client")?;

        let identity_client = Client::builder()
            .pool_idle_timeout(Some(Duration::from_secs(50)))
            .timeout(IDENTITY_REQUEST_TIMEOUT)
            .build()
            .context("Failed to create identity client")?;
        let identity = ClerkIdentityProvider::new(identity_client, &config.clerk);

        Ok(Self::new(ChatRelay::new(
            Arc::new(identity),
            Arc::new(completion),
            config.openai.model.clone(),
        )))
    }
}

async fn sink_handler(_req: HttpRequest, mut payload: web::Payload) -> Result<HttpResponse, Error> {
    // Drain the payload
    while let Some(chunk) = payload.next().await {
        if let Err(err) = chunk {
            debug!("Error while draining payload: {:?}", err);
            break;
        }
    }
    Ok(HttpResponse::NotFound().finish())
}

#[get("/health")]
async fn health(_req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

#[post("/api/chat")]
async fn chat(
    req: HttpRequest,
    body: web::Bytes,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RelayError> {
    let request_id = get_request_id(&req);
    let session = SessionCredentials::from_request(&req);

    let stream = match data.relay.relay(&session, &body).await {
        Ok(stream) => stream,
        Err(e) => {
            log_failure(&request_id, "/api/chat", &e);
            return Err(e);
        }
    };

    info!(request_id = %request_id, "Streaming chat completion");
    let stream = stream.inspect_err(move |e| {
        warn!(request_id = %request_id, "Completion stream aborted: {}", e);
    });

    Ok(HttpResponse::Ok()
        .content_type(TEXT_PLAIN_UTF8)
        .streaming(stream))
}

#[get("/api/credits")]
async fn credits(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> Result<HttpResponse, RelayError> {
    let session = SessionCredentials::from_request(&req);
    let credits = data.relay.credits(&session).await.inspect_err(|e| {
        log_failure(&get_request_id(&req), "/api/credits", e);
    })?;
    Ok(HttpResponse::Ok().json(json!({ "credits": credits.to_json() })))
}

fn log_failure(request_id: &str, route: &str, err: &RelayError) {
    match err {
        RelayError::Failed(_) => {
            error!(request_id = %request_id, route, "Request failed: {}", err)
        }
        _ => info!(request_id = %request_id, route, "Request refused: {}", err),
    }
}

/// Routes served by the relay, including the 404 sink for everything else.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(chat)
        .service(credits)
        .service(health)
        .default_service(web::route().to(sink_handler));
}

pub async fn startup(config: RelayConfig) -> anyhow::Result<()> {
    let level = config
        .log_level
        .as_deref()
        .and_then(logging::parse_level)
        .unwrap_or(Level::INFO);
    let _log_guard = logging::init_logging(LoggingConfig {
        level,
        json_format: config.json_logs,
        log_dir: config.log_dir.clone(),
        colorize: !config.json_logs,
        log_file_name: "chat-relay".to_string(),
        log_targets: None,
    });

    info!("Initializing chat relay on {}:{}", config.host, config.port);
    info!("OpenAI config: {:?}", config.openai);
    info!("Clerk config: {:?}", config.clerk);
    info!(
        "Max payload size: {} MB",
        config.max_payload_size / (1024 * 1024)
    );

    let app_state = web::Data::new(AppState::from_config(&config)?);

    let request_id_headers = config.request_id_headers();
    let max_payload_size = config.max_payload_size;

    info!("Serving chat relay on {}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .wrap(RequestIdMiddleware::new(request_id_headers.clone()))
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .configure(configure)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("Failed to bind {}:{}", config.host, config.port))?
    .run()
    .await?;

    Ok(())
}

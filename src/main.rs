use chat_relay::config::{
    ClerkConfig, ConfigResult, DEFAULT_CLERK_API_URL, DEFAULT_MODEL, DEFAULT_OPENAI_BASE_URL,
    OpenAIConfig, RelayConfig,
};
use chat_relay::server;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "chat-relay")]
#[command(about = "Chat relay - credit-metered streaming proxy to OpenAI chat completions")]
#[command(long_about = r#"
Chat relay - credit-metered streaming proxy to OpenAI chat completions

Signed-in callers POST a conversation to /api/chat and receive the assistant's
reply as a plain-text stream. Every accepted conversation costs one credit,
read from and written back to the caller's Clerk public metadata.

Examples:
  # Keys from the environment
  OPENAI_API_KEY=sk-... CLERK_SECRET_KEY=sk_live_... chat-relay --port 3000

  # Restrict accepted session tokens to one frontend origin
  chat-relay --authorized-parties https://chat.example.com
"#)]
struct CliArgs {
    /// Host address to bind the relay server
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port number to bind the relay server
    #[arg(long, default_value_t = 3000)]
    port: u16,

    /// Maximum request body size in bytes
    #[arg(long, default_value_t = 4 * 1024 * 1024)]
    max_payload_size: usize,

    /// OpenAI API key; requests are refused with 400 when unset
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI organization sent with every completion request
    #[arg(long, env = "OPENAI_ORG_ID")]
    openai_organization: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_OPENAI_BASE_URL)]
    openai_base_url: String,

    /// Chat model used for every conversation
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Connect timeout for completion requests in seconds
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Clerk secret key
    #[arg(long, env = "CLERK_SECRET_KEY", hide_env_values = true)]
    clerk_secret_key: Option<String>,

    /// Clerk Backend API URL
    #[arg(long, env = "CLERK_API_URL", default_value = DEFAULT_CLERK_API_URL)]
    clerk_api_url: String,

    /// Accepted `azp` values of session tokens (empty accepts any)
    #[arg(long, num_args = 0..)]
    authorized_parties: Vec<String>,

    /// How long fetched signing keys are reused, in seconds
    #[arg(long, default_value_t = 3600)]
    jwks_cache_ttl_secs: u64,

    /// Directory to store log files
    #[arg(long)]
    log_dir: Option<String>,

    /// Set the logging level
    #[arg(long, default_value = "info", value_parser = ["debug", "info", "warn", "error"])]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// Headers checked, in order, for a caller-supplied request id
    #[arg(long, num_args = 0..)]
    request_id_headers: Vec<String>,
}

impl CliArgs {
    fn to_relay_config(&self) -> ConfigResult<RelayConfig> {
        let config = RelayConfig {
            host: self.host.clone(),
            port: self.port,
            max_payload_size: self.max_payload_size,
            openai: OpenAIConfig {
                api_key: self.openai_api_key.clone(),
                organization: self.openai_organization.clone(),
                base_url: self.openai_base_url.clone(),
                model: self.model.clone(),
                connect_timeout_secs: self.connect_timeout_secs,
            },
            clerk: ClerkConfig {
                secret_key: self.clerk_secret_key.clone().unwrap_or_default(),
                api_url: self.clerk_api_url.clone(),
                authorized_parties: self.authorized_parties.clone(),
                jwks_cache_ttl_secs: self.jwks_cache_ttl_secs,
            },
            log_dir: self.log_dir.clone(),
            log_level: Some(self.log_level.clone()),
            json_logs: self.json_logs,
            request_id_headers: if self.request_id_headers.is_empty() {
                None
            } else {
                Some(self.request_id_headers.clone())
            },
        };
        config.validate()?;
        Ok(config)
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    println!("Chat relay starting...");
    println!("Host: {}:{}", cli_args.host, cli_args.port);
    println!("Model: {}", cli_args.model);

    let config = cli_args.to_relay_config()?;
    server::startup(config).await
}

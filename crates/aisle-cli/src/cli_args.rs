use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "aisle",
    about = "Streaming shopping assistant: chat gateway over OpenAI with visitor and product tools",
    version
)]
/// Public struct `Cli` with every setting read from flags or the environment.
pub struct Cli {
    #[arg(long = "openai-api-key", env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(
        long = "openai-api-base",
        env = "AISLE_OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_api_base: String,

    #[arg(long = "model", env = "AISLE_MODEL", default_value = "gpt-4o-mini")]
    pub model: String,

    #[arg(long = "temperature", env = "AISLE_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    #[arg(long = "max-tokens", env = "AISLE_MAX_TOKENS", default_value_t = 1000)]
    pub max_tokens: u32,

    #[arg(
        long = "max-turns",
        env = "AISLE_MAX_TURNS",
        default_value_t = 5,
        help = "Upper bound on model requests per chat turn"
    )]
    pub max_turns: usize,

    #[arg(long = "moments-api-endpoint", env = "MOMENTS_API_ENDPOINT")]
    pub moments_api_endpoint: Option<String>,

    #[arg(long = "moments-engine-id", env = "MOMENTS_ENGINE_ID")]
    pub moments_engine_id: Option<String>,

    #[arg(
        long = "products-path",
        env = "AISLE_PRODUCTS_PATH",
        default_value = "data/products.json"
    )]
    pub products_path: PathBuf,

    #[arg(long = "port", env = "PORT", default_value_t = 3001)]
    pub port: u16,

    #[arg(long = "bind-host", env = "AISLE_BIND_HOST", default_value = "0.0.0.0")]
    pub bind_host: String,

    #[arg(
        long = "cors-origins",
        env = "AISLE_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3002,http://127.0.0.1:3002"
    )]
    pub cors_origins: Vec<String>,

    #[arg(
        long = "turn-timeout-ms",
        env = "AISLE_TURN_TIMEOUT_MS",
        help = "Deadline for one whole chat turn; unset leaves turns unbounded"
    )]
    pub turn_timeout_ms: Option<u64>,

    #[arg(
        long = "request-timeout-ms",
        env = "AISLE_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000
    )]
    pub request_timeout_ms: u64,

    #[arg(long = "max-retries", env = "AISLE_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: usize,
}

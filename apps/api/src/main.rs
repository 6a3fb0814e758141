mod analysis;
mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod routes;
mod sessions;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::analysis::throttle::build_rate_limiter;
use crate::analysis::AnalysisPipeline;
use crate::config::{Config, LlmProvider};
use crate::db::create_pool;
use crate::llm_client::{
    AnthropicTransport, CompletionTransport, GeminiTransport, LlmClient, RetryPolicy,
};
use crate::routes::build_router;
use crate::sessions::archive::S3Archive;
use crate::sessions::store::PgAnalysisStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LessonLens API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let transport: Arc<dyn CompletionTransport> = match config.llm_provider {
        LlmProvider::Anthropic => Arc::new(AnthropicTransport::new(config.llm_api_key.clone())?),
        LlmProvider::Gemini => Arc::new(GeminiTransport::new(config.llm_api_key.clone())?),
    };
    let llm = LlmClient::new(transport)
        .with_retry(RetryPolicy {
            max_attempts: config.llm_max_attempts,
            base_delay: config.llm_backoff_base,
        })
        .with_generation(config.llm_temperature, config.llm_max_output_tokens);
    info!(
        "LLM client initialized (model: {}, max attempts: {})",
        llm.model(),
        config.llm_max_attempts
    );

    // Rate limiter in front of every model call
    let limiter = build_rate_limiter(&config)?;

    let pipeline = AnalysisPipeline::new(llm, limiter, config.normalizer, config.max_concurrency);
    info!(
        "Analysis pipeline ready (max concurrency: {})",
        pipeline.max_concurrency()
    );

    // Build app state
    let state = AppState {
        store: Arc::new(PgAnalysisStore::new(db)),
        archive: Arc::new(S3Archive::new(s3, config.s3_bucket.clone())),
        pipeline: Arc::new(pipeline),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "lessonlens-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}

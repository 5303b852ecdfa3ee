use cms_gate::{
    AppState, HttpUpstream, UpstreamState,
    config::{AppConfig, Env, TokenVerification},
    create_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, builds the route table and
/// serves the gate. Any startup error aborts with a non-zero exit code.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load()?;

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cms_gate=debug,tower_http=info,axum=trace".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Gate starting in {:?} mode", config.env);
    if config.token_verification == TokenVerification::Unverified {
        if config.env == Env::Production {
            tracing::warn!(
                "TOKEN_VERIFICATION=unverified in production: token roles are trusted without a signature check"
            );
        } else {
            tracing::info!("access tokens are decoded without signature verification");
        }
    }

    // 4. Route Table (validated before any request is served)
    let routes = config.route_table()?;
    match &config.route_table_path {
        Some(path) => tracing::info!(%path, "route table loaded from file"),
        None => tracing::info!("using built-in dashboard route table"),
    }

    // 5. Upstream Front-End
    let upstream = Arc::new(HttpUpstream::new(&config.upstream_url)?) as UpstreamState;
    tracing::info!(upstream = %config.upstream_url, "forwarding allowed pages");

    // 6. Router and Server Startup
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(config, routes, upstream));

    let listener = TcpListener::bind(bind_addr.as_str()).await?;
    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app).await?;
    Ok(())
}

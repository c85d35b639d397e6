use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use teller::config::Config;
use teller::{db, mail, routes, scheduler, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("teller=debug".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(&config.database_url).await?;

    tracing::info!("Running migrations...");
    db::run_migrations(&pool).await?;

    scheduler::spawn_reconciliation_task(pool.clone());

    let mail = mail::create_mail_service(&config.mail)?;

    if config.is_development() {
        tracing::warn!("Development mode: /auth/dev-login is enabled");
    }

    let state = AppState::new(pool, &config, mail);

    let app = routes::router(state)
        .layer(cors_layer(config.cors_allowed_origins.as_deref()))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Teller service listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Credentials mode requires explicit origins, methods and headers
fn cors_layer(origins: Option<&[String]>) -> CorsLayer {
    let allowed_headers = [AUTHORIZATION, CONTENT_TYPE, ACCEPT];
    let allowed_methods = [Method::GET, Method::POST, Method::OPTIONS];

    let allowed: Vec<HeaderValue> = match origins {
        Some(origins) => origins.iter().filter_map(|o| o.parse().ok()).collect(),
        // Development: the dashboard's local dev servers
        None => ["http://localhost:3000", "http://127.0.0.1:3000", "http://localhost:5173"]
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect(),
    };

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(allowed_methods)
        .allow_headers(allowed_headers)
        .allow_credentials(true)
}

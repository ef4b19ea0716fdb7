use course_portal::{
    AppState, BillingState, HttpBillingClient, PostgresRepository, RepositoryState,
    config::{AppConfig, Env},
    create_router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// The asynchronous entry point, responsible for initializing configuration,
/// logging, the database pool, the billing gateway client, and the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging filter setup. RUST_LOG takes priority over the local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "course_portal=debug,tower_http=info,axum=trace".into());

    // 3. Initialize logging based on environment: pretty locally, JSON in production
    // for centralized log aggregation.
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

    tracing::info!(env = ?config.env, "starting course portal");

    // 4. Database initialization (Postgres).
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: could not connect to Postgres, check DATABASE_URL");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: database migration failed");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Billing gateway initialization. The bounded request timeout comes from the
    // configuration; every page request blocks on these calls synchronously.
    let billing = Arc::new(HttpBillingClient::new(&config)) as BillingState;

    // 6. Unified state assembly.
    let app_state = AppState {
        repo,
        billing,
        config,
    };

    // 7. Router and server startup.
    let app = create_router(app_state);

    let listener = TcpListener::bind("0.0.0.0:3000").await.unwrap();

    tracing::info!("listening on 0.0.0.0:3000");
    tracing::info!("Swagger UI at http://localhost:3000/swagger-ui");

    axum::serve(listener, app).await.unwrap();
}

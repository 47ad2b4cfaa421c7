use std::net::TcpListener;
use std::sync::Arc;

use session_rotor::auth::AuthService;
use session_rotor::configuration::{get_configuration, Settings, StoreBackend};
use session_rotor::startup::run;
use session_rotor::store::{
    run_migrations, InMemorySessionStore, InMemoryUserStore, PgSessionStore, PgUserStore,
    SessionStore, UserStore,
};
use session_rotor::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = get_configuration()
        .and_then(|config| config.validate().map(|_| config))
        .map_err(|e| {
            tracing::error!("Failed to read configuration: {}", e);
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "Configuration error")
        })?;
    tracing::info!("Configuration loaded successfully");

    let (users, sessions) = build_stores(&configuration).await?;

    let service = AuthService::from_settings(
        users,
        sessions,
        &configuration.auth,
        configuration.database.query_timeout(),
    );

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    run(listener, service)?.await
}

async fn build_stores(
    configuration: &Settings,
) -> std::io::Result<(Arc<dyn UserStore>, Arc<dyn SessionStore>)> {
    match configuration.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory stores, data is lost on restart");
            Ok((
                Arc::new(InMemoryUserStore::new()),
                Arc::new(InMemorySessionStore::new()),
            ))
        }
        StoreBackend::Postgres => {
            tracing::info!("Attempting to connect to database");
            let pool = PgPoolOptions::new()
                .max_connections(configuration.database.max_connections)
                .acquire_timeout(configuration.database.query_timeout())
                .connect(&configuration.database.connection_string())
                .await
                .map_err(|e| {
                    tracing::error!("Failed to create connection pool: {}", e);
                    std::io::Error::new(
                        std::io::ErrorKind::ConnectionRefused,
                        "Database connection error",
                    )
                })?;

            run_migrations(&pool).await.map_err(|e| {
                tracing::error!("Failed to migrate database: {}", e);
                std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
            })?;
            tracing::info!("Database connection pool created successfully");

            Ok((
                Arc::new(PgUserStore::new(pool.clone())),
                Arc::new(PgSessionStore::new(pool)),
            ))
        }
    }
}

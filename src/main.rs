use payment_ledger::api::{self, AppState};
use payment_ledger::config::{self, Config};
use payment_ledger::database::{init_pool, PgLedgerStore, PoolConfig};
use payment_ledger::payments::providers::{StripeConfig, StripeProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &config::ServerConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.pretty().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.server);

    tracing::info!("Starting payment ledger");
    tracing::info!("Environment: {}", config.server.environment);

    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        statement_timeout: config.webhook.ledger_timeout(),
        ..PoolConfig::default()
    };
    let pool = init_pool(&config.database.url, Some(pool_config)).await?;

    let store = PgLedgerStore::new(pool);
    store.ensure_schema().await?;
    tracing::info!("Ledger schema ready");

    let provider = StripeProvider::new(StripeConfig {
        secret_key: config.stripe.secret_key.clone(),
        base_url: config.stripe.api_base.clone(),
        timeout_secs: config.stripe.timeout_secs,
    })?;

    let state = AppState::new(&config, Arc::new(store), Arc::new(provider));
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

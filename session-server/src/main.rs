use anyhow::Context;
use bridge_desktop::ReqwestHttpClient;
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::logging::{init_logging, LoggingConfig};
use session_server::db::{create_pool, DatabaseConfig};
use session_server::repository::SqliteUserRepository;
use session_server::verifier::GoogleTokenVerifier;
use session_server::{app, AppState, ServerConfig, SessionIssuer, TokenSigner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TOKENINFO_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid server configuration")?;

    let mut logging = LoggingConfig::default().with_format(config.log_format);
    if let Some(filter) = &config.log_filter {
        logging = logging.with_filter(filter.clone());
    }
    init_logging(logging)?;

    if config.ephemeral_secret {
        warn!("SESSION_JWT_SECRET is not set; using a random secret, issued tokens will not survive a restart");
    }
    if config.google_client_ids.is_empty() {
        warn!("GOOGLE_CLIENT_IDS is not set; identity tokens for any audience are accepted");
    }

    let pool = create_pool(DatabaseConfig::new(&config.database_url)).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let http_client = Arc::new(ReqwestHttpClient::with_timeout(TOKENINFO_TIMEOUT)?);

    let issuer = SessionIssuer::new(
        Arc::new(GoogleTokenVerifier::new(
            http_client,
            config.tokeninfo_url.clone(),
            config.google_client_ids.clone(),
            Arc::clone(&clock),
        )),
        Arc::new(SqliteUserRepository::new(pool)),
        TokenSigner::new(
            config.jwt_secret.as_bytes(),
            config.token_ttl,
            config.refresh_ttl,
        ),
        clock,
    );

    let router = app(AppState {
        issuer: Arc::new(issuer),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Session server listening");
    axum::serve(listener, router).await?;

    Ok(())
}

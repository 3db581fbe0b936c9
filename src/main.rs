use castor::accounts::{self, AccountManagerArgs, RotationStrategy};
use castor::config::Config;
use castor::server::router::{CastorState, castor_router};
use castor::store::TokenStore;
use castor_sigcache::SignatureCache;
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // The server binary requires a config with a non-empty basic.api_key.
    let cfg = Config::from_toml();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    let antigravity_cfg = Arc::new(cfg.antigravity());
    let geminicli_cfg = Arc::new(cfg.geminicli());
    let strategy =
        RotationStrategy::from_config(cfg.rotation.strategy, cfg.rotation.request_count);
    info!(
        strategy = ?strategy,
        antigravity_models = ?antigravity_cfg.model_list,
        geminicli_models = ?geminicli_cfg.model_list,
        "Castor starting"
    );

    let password = cfg.basic.store_password.as_deref();
    let antigravity_store = TokenStore::open(
        &cfg.basic.data_dir,
        accounts::ANTIGRAVITY.store_file,
        password,
    )
    .await?;
    let geminicli_store = TokenStore::open(
        &cfg.basic.data_dir,
        accounts::GEMINICLI.store_file,
        password,
    )
    .await?;

    let antigravity_manager = accounts::spawn(AccountManagerArgs {
        variant: accounts::ANTIGRAVITY,
        cfg: antigravity_cfg.clone(),
        store: antigravity_store,
        strategy,
    })
    .await;
    let geminicli_manager = accounts::spawn(AccountManagerArgs {
        variant: accounts::GEMINICLI,
        cfg: geminicli_cfg.clone(),
        store: geminicli_store,
        strategy,
    })
    .await;

    let sigcache = Arc::new(SignatureCache::new(cfg.sigcache.gating_policy()));

    let state = CastorState::new(
        &cfg,
        antigravity_cfg,
        geminicli_cfg,
        antigravity_manager,
        geminicli_manager,
        sigcache,
    );
    let app = castor_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::net::TcpListener;
use tokio::signal;

use soundrelay::board::{Board, Target};
use soundrelay::config::Config;
use soundrelay::gateway::{GatewayHandle, Supervisor};
use soundrelay::rest::{DiscordRestClient, SoundboardApi};
use soundrelay::state::AppState;
use soundrelay::storage::{SoundStore, StoredSoundIndex};
use soundrelay::viewers::ViewerRegistry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "soundrelay=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let api: Arc<dyn SoundboardApi> = Arc::new(DiscordRestClient::new(
        &config.api_url,
        &config.cdn_url,
        &config.auth_token,
    ));
    let operator = match api.current_user().await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!("failed to look up the operator account: {e}");
            std::process::exit(1);
        }
    };
    eprintln!("  \x1b[2moperator\x1b[0m     {} ({})", operator.username, operator.id);

    let store = SoundStore::new(config.sounds_dir.clone());
    if let Err(e) = tokio::fs::create_dir_all(store.dir()).await {
        tracing::error!("failed to create sounds directory {:?}: {:?}", store.dir(), e);
    }
    let index = match store.load_index().await {
        Ok(index) => index,
        Err(e) => {
            tracing::warn!("failed to load stored sounds: {e:?}");
            StoredSoundIndex::default()
        }
    };
    tracing::info!("loaded {} stored sound(s)", index.len());
    let stored = Arc::new(ArcSwap::from_pointee(index));

    let target = Target {
        guild_id: config.guild_id.clone(),
        channel_id: config.channel_id.clone(),
        operator_id: operator.id,
    };
    let viewers = Arc::new(ViewerRegistry::new());
    let (gateway, outbound) = GatewayHandle::channel(&config.guild_id);

    let mut board = Board::new(target.clone(), viewers.clone(), gateway.clone(), stored.clone());
    if config.auto_save {
        board = board.with_auto_save(api.clone(), store.clone());
    }
    let board = board.spawn();

    let supervisor = Supervisor::new(config.gateway(), board.clone(), outbound);

    let state = AppState {
        board,
        viewers,
        gateway,
        api,
        store,
        stored,
        session: supervisor.state(),
        target: Arc::new(target),
        static_dir: config.static_dir.clone(),
    };
    let app = soundrelay::routes::router(state);

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("failed to get local address");
    eprintln!("  \x1b[32m→ listening on {addr}\x1b[0m");
    eprintln!();

    tokio::select! {
        err = supervisor.run() => {
            tracing::error!("gateway connection lost for good: {err}");
            std::process::exit(1);
        }
        result = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = result {
                tracing::error!("server error: {e}");
                std::process::exit(1);
            }
            tracing::info!("shutting down");
        }
    }
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");

    eprintln!();
    eprintln!("  \x1b[1;36msoundrelay\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mguild\x1b[0m        {}", config.guild_id);
    eprintln!("  \x1b[2mchannel\x1b[0m      {}", config.channel_id);
    eprintln!("  \x1b[2msounds\x1b[0m       {}", config.sounds_dir.display());
    eprintln!("  \x1b[2mgateway\x1b[0m      {}", config.gateway_url);
    if !config.auto_save {
        eprintln!();
        eprintln!("  \x1b[33m! auto-save disabled\x1b[0m");
    }
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
            .expect("failed to install SIGTERM handler")
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

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use danmu_api::{create_router, AppState};
use danmu_core::{logging, Catalog, ConfigRegistry, Orchestrator, Settings, StorageService};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration: environment + optional YAML file. The persisted
    // overlay is applied later, when the storage tier is first probed.
    let settings = Settings::load(&HashMap::new());
    let config = Arc::new(ConfigRegistry::new(settings, HashMap::new()));

    // 2. Logging
    {
        let settings = config.settings();
        logging::init_logging(&settings.log_level, &settings.log_format)?;
        info!(
            host = %settings.host,
            port = settings.port,
            sources = ?settings.source_order,
            "danmu proxy starting"
        );
    }

    // 3. Catalog + persistence (probed lazily on the first real request)
    let catalog = Arc::new(Catalog::new());
    let storage = Arc::new(StorageService::new(catalog.clone(), config.clone()));

    // 4. Source adapters and the orchestrator
    let (registry, translator) = danmu_sources::build_registry(&config);
    let orchestrator = Arc::new(
        Orchestrator::new(Arc::new(registry), catalog, config.clone(), storage.clone())
            .with_translator(translator),
    );

    // 5. HTTP server
    let state = AppState::new(orchestrator);
    let app = create_router(state);

    let addr: SocketAddr = {
        let settings = config.settings();
        format!("{}:{}", settings.host, settings.port).parse()?
    };
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 6. Final flush so a clean shutdown loses nothing.
    info!("Shutting down, flushing catalog");
    storage.persist_now().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}

use propledger::ingest::{GapReconciler, LiveSubscriber, Pipeline};
use propledger::{
    api, config::Config, db::init_db, Catalog, ChainClient, Decoder, LogFeed, Repository,
    RpcChainClient, WsLogFeed,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match &config.catalog_path {
        Some(path) => match Catalog::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load catalog from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => Catalog::builtin(),
    };

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(config.rpc_url.clone()));
    let feed: Arc<dyn LogFeed> = Arc::new(WsLogFeed::new(config.ws_url.clone()));

    if let Err(e) = chain.health().await {
        tracing::warn!(error = %e, "RPC node reports unhealthy, continuing");
    }

    let pipeline = Arc::new(Pipeline::new(
        repo,
        Arc::new(catalog),
        Decoder::program_data(),
        config.score_policy.clone(),
    ));
    let live_chain: Arc<dyn ChainClient> = Arc::new(
        RpcChainClient::new(config.rpc_url.clone())
            .with_max_elapsed(config.subscriber.fetch_max_elapsed),
    );
    let subscriber = Arc::new(LiveSubscriber::new(
        feed,
        live_chain,
        pipeline.clone(),
        config.program_id.clone(),
        config.subscriber.clone(),
    ));
    let reconciler = Arc::new(GapReconciler::new(
        chain,
        pipeline.clone(),
        config.program_id.clone(),
        config.gap.clone(),
    ));

    subscriber.start().await;
    reconciler.start().await;

    // Create router
    let app = api::create_router(api::AppState::new(
        pipeline,
        subscriber.clone(),
        reconciler.clone(),
    ));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    let (fatal_tx, fatal_rx) = oneshot::channel();
    let watcher = subscriber.clone();
    tokio::spawn(async move {
        let _ = fatal_tx.send(watcher.fatal_error().await);
    });

    let (stop_server, server_stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = server_stopped.await;
            })
            .await
    });

    let mut exit_code = 0;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutting down");
        }
        Ok(err) = fatal_rx => {
            tracing::error!(error = %err, "Live subscriber gave up");
            exit_code = 1;
        }
    }

    let _ = stop_server.send(());
    reconciler.stop().await;
    subscriber.stop().await;

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            eprintln!("Server error: {}", e);
            exit_code = 1;
        }
        Err(e) => {
            eprintln!("Server task failed: {}", e);
            exit_code = 1;
        }
    }

    std::process::exit(exit_code);
}

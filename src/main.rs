use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use phishscan_engine::{
    artifact,
    config::Config,
    dns::HickoryDnsLookup,
    features::FeatureExtractor,
    model::Classifier,
    routes::{self, AppState},
    telemetry,
    whois::{self, WhoisLookup},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "phishscan_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!("Loaded configuration: {:?}", config);

    let metrics = telemetry::install_recorder();

    // The service stays up without a model; /check_url reports 500 until restart.
    let classifier: Option<Arc<dyn Classifier>> = match artifact::fetch_and_load(&config.model).await {
        Ok(model) => {
            info!(
                "Model ready: version {:?}, {} trees",
                model.version(),
                model.tree_count()
            );
            Some(Arc::new(model))
        }
        Err(e) => {
            error!("Failed to load model from {}: {}", config.model.path, e);
            None
        }
    };

    let timeout = config.lookup_timeout();
    let suffixes = Arc::new(whois::load_suffix_list(&config.whois).await?);
    let extractor = FeatureExtractor::new(
        Arc::new(WhoisLookup::new(suffixes, &config.whois, timeout).await?),
        Arc::new(HickoryDnsLookup::from_system_conf(timeout)),
    );

    let app = routes::router(AppState {
        extractor: Arc::new(extractor),
        classifier,
        metrics,
    });

    let addr: SocketAddr = config.bind_addr.parse()?;
    info!("Starting phishing URL check service on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    warn!("Shutdown signal received, starting graceful shutdown");
}

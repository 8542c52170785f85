mod api;
mod middleware;
mod pipeline;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use peoplecount_detector::{YoloConfig, YoloDetector};
use tracing_subscriber::EnvFilter;

use crate::api::{build_app, AppState};
use crate::pipeline::MediaConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = peoplecount_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(env = %config.env, bind_addr = %config.bind_addr, "starting server");

    let pool_config = peoplecount_db::PoolConfig::from_app_config(&config);
    let pool = peoplecount_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = peoplecount_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");

    let media = MediaConfig::from_app_config(&config);
    tokio::fs::create_dir_all(&media.static_dir).await?;
    tokio::fs::create_dir_all(&media.upload_dir).await?;

    let detector = load_detector(&config).await?;

    let app = build_app(
        AppState {
            pool,
            detector,
            media: Arc::new(media),
        },
        config.max_upload_bytes,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Loads the model once and optionally runs a warm-up inference before the
/// server accepts traffic.
async fn load_detector(
    config: &peoplecount_core::AppConfig,
) -> anyhow::Result<Arc<YoloDetector>> {
    let yolo_config = YoloConfig::from_app_config(config);
    let warmup_image = config.warmup_image.clone();

    let detector = tokio::task::spawn_blocking(move || -> anyhow::Result<YoloDetector> {
        let detector = YoloDetector::load(yolo_config)?;
        if let Some(path) = warmup_image {
            match detector.warm_up(&path) {
                Ok(found) => tracing::info!(path = %path.display(), found, "model warmed up"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "warm-up failed"),
            }
        }
        Ok(detector)
    })
    .await??;

    Ok(Arc::new(detector))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}

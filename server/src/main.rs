use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod error;
mod handlers;
mod logic;
mod state;
mod storage;

use crate::handlers::app;
use crate::state::AppState;
use crate::storage::{FileStorage, S3Storage, S3StorageConfig, Storage};

const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageKind {
    File,
    S3,
}

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    public_dir: Option<PathBuf>,
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,
    #[arg(long, value_enum, default_value_t = StorageKind::File)]
    storage: StorageKind,
    #[arg(long, env = "PAGEMARK_S3_BUCKET")]
    s3_bucket: Option<String>,
    #[arg(long, env = "PAGEMARK_S3_PREFIX")]
    s3_prefix: Option<String>,
    #[arg(long, env = "AWS_REGION")]
    s3_region: Option<String>,
    #[arg(long, env = "PAGEMARK_S3_ENDPOINT")]
    s3_endpoint: Option<String>,
    #[arg(long)]
    s3_force_path_style: bool,
}

async fn build_storage(args: &Args) -> anyhow::Result<Arc<dyn Storage>> {
    match args.storage {
        StorageKind::File => {
            let data_dir = args
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data"));
            tokio::fs::create_dir_all(&data_dir)
                .await
                .with_context(|| format!("failed to create {}", data_dir.display()))?;
            tracing::info!("storing annotations in {}", data_dir.display());
            Ok(Arc::new(FileStorage::new(data_dir)))
        }
        StorageKind::S3 => {
            let bucket = args
                .s3_bucket
                .clone()
                .context("--s3-bucket is required with --storage s3")?;
            let mut config = S3StorageConfig::new(bucket);
            config.prefix = args.s3_prefix.clone();
            config.region = args.s3_region.clone();
            config.endpoint_url = args.s3_endpoint.clone();
            config.force_path_style = args.s3_force_path_style;
            config.access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok();
            config.secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
            tracing::info!("storing annotations in s3://{}", config.bucket);
            Ok(Arc::new(S3Storage::new(config).await))
        }
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown: {error}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagemark_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let state = AppState::new(build_storage(&args).await?);

    let public_dir = args
        .public_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../public"));
    let router = app(state.clone(), public_dir);

    let flush_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        loop {
            interval.tick().await;
            flush_state.flush().await;
        }
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("pagemark running at http://localhost:{}", args.port);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    let saved = state.flush().await;
    tracing::info!("shut down after saving {saved} document(s)");
    Ok(())
}

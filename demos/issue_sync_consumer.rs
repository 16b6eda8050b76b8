use clap::Parser;
use demos::cli::{sync_config, DatabaseArgs, QueueArgs};
use issue_sync::UpdateConsumer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "issue-sync", about = "Apply queued issue updates to mysql")]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,
    #[command(flatten)]
    queue: QueueArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = sync_config(cli.database, cli.queue);
    info!("Starting with {:?}", config);

    let consumer = UpdateConsumer::connect(config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Ctrl-C received, shutting down"),
                Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
            }
            shutdown.cancel();
        }
    });

    let result = consumer.start_until(shutdown).await;
    if let Err(e) = &result {
        error!("Consumer stopped: {}", e);
    }
    consumer.close().await?;
    Ok(result?)
}

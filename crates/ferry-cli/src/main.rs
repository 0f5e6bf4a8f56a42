//! ferry - outbox dispatcher の起動用バイナリ
//!
//! 環境変数:
//! - `FERRY_CONFIG`: DispatcherConfig の TOML ファイル（省略時はデフォルト値）
//! - `DATABASE_URL`: 設定されていれば PostgreSQL、なければ in-memory store
//! - `FERRY_MACHINE_ID`: ロック所有者 ID（省略時は自動生成）
//! - `FERRY_DEMO_MESSAGES`: 起動時に投入するデモ Message の件数（デフォルト 3）
//! - `RUST_LOG`: ログフィルタ（デフォルト `info`）

use std::sync::Arc;

use anyhow::Context;
use ferry_core::impls::{InMemoryStore, LogBroker, PgOutboxStore};
use ferry_core::ports::{MessageBroker, OutboxStore};
use ferry_core::{Dispatcher, DispatcherConfig, MachineId, Message, Publisher};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("FERRY_CONFIG") {
        Ok(path) => DispatcherConfig::load(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => DispatcherConfig::default(),
    };
    let machine_id = std::env::var("FERRY_MACHINE_ID")
        .map(MachineId::new)
        .unwrap_or_else(|_| MachineId::generate());
    let demo_messages: usize = match std::env::var("FERRY_DEMO_MESSAGES") {
        Ok(n) => n.parse().context("FERRY_DEMO_MESSAGES must be a number")?,
        Err(_) => 3,
    };
    let broker = Arc::new(LogBroker::new());

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .context("connecting to postgres")?;
            let store = Arc::new(PgOutboxStore::new(pool.clone()));
            store.migrate().await?;

            // 業務データと同じトランザクションで Message を書く
            let publisher = Publisher::new(Arc::clone(&store));
            let mut tx = pool.begin().await?;
            for message in demo(demo_messages)? {
                publisher.send(message, &mut *tx).await?;
            }
            tx.commit().await?;

            serve(config, store, broker, machine_id).await
        }
        Err(_) => {
            info!("DATABASE_URL not set, using in-memory store");
            let store = Arc::new(InMemoryStore::new());

            let publisher = Publisher::new(Arc::clone(&store));
            let mut tx = store.begin();
            for message in demo(demo_messages)? {
                publisher.send(message, &mut tx).await?;
            }
            store.commit(tx).await?;

            serve(config, store, broker, machine_id).await
        }
    }
}

fn demo(n: usize) -> anyhow::Result<Vec<Message>> {
    (1..=n)
        .map(|i| {
            let body = serde_json::to_vec(&serde_json::json!({
                "order_id": format!("order-{i}"),
                "total": i * 100,
            }))?;
            Ok(Message::new("orders", format!("order-{i}"), body)
                .with_header("content-type", "application/json"))
        })
        .collect()
}

async fn serve<S, B>(
    config: DispatcherConfig,
    store: Arc<S>,
    broker: Arc<B>,
    machine_id: MachineId,
) -> anyhow::Result<()>
where
    S: OutboxStore + 'static,
    B: MessageBroker + 'static,
{
    let dispatcher = Dispatcher::new(config, store, broker, machine_id)?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = stop_tx.send(true);
    });

    dispatcher.run(stop_rx).await;
    Ok(())
}

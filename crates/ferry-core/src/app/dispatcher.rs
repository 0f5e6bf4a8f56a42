//! Dispatcher - 3 つの周期タスクを束ねる
//!
//! - processor: `process_interval` ごとに配送
//! - unlocker: `lock_checker_interval` ごとに期限切れロックを回収
//! - cleaner: `cleanup_worker_interval` ごとに古い Record を削除
//!
//! 各タスクは独立した tokio task で動き、watch channel で停止を受け取る。
//! 1 回の実行で起きたエラーはログに出すだけでループは止めない。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::cleaner::RecordCleaner;
use super::config::{ConfigError, DispatcherConfig};
use super::processor::RecordProcessor;
use super::unlocker::RecordUnlocker;
use crate::domain::{MachineId, OutboxError};
use crate::ports::{Clock, MessageBroker, OutboxStore};

/// One unit of periodic work.
#[async_trait]
trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_once(&self) -> Result<(), OutboxError>;
}

#[async_trait]
impl<S, B> PeriodicTask for RecordProcessor<S, B>
where
    S: OutboxStore + 'static,
    B: MessageBroker + 'static,
{
    fn name(&self) -> &'static str {
        "processor"
    }

    async fn run_once(&self) -> Result<(), OutboxError> {
        let report = self.process_records().await?;
        if report.delivered > 0 {
            info!(
                machine_id = %self.machine_id(),
                claimed = report.claimed,
                delivered = report.delivered,
                "delivered records"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<S: OutboxStore + 'static> PeriodicTask for RecordUnlocker<S> {
    fn name(&self) -> &'static str {
        "unlocker"
    }

    async fn run_once(&self) -> Result<(), OutboxError> {
        self.unlock_expired_messages().await.map(drop)
    }
}

#[async_trait]
impl<S: OutboxStore + 'static> PeriodicTask for RecordCleaner<S> {
    fn name(&self) -> &'static str {
        "cleaner"
    }

    async fn run_once(&self) -> Result<(), OutboxError> {
        self.remove_expired_messages().await.map(drop)
    }
}

/// Background delivery engine for one machine.
///
/// # 使用例
/// ```ignore
/// let dispatcher = Dispatcher::new(config, store, broker, MachineId::generate())?;
/// let (stop_tx, stop_rx) = watch::channel(false);
/// tokio::spawn(async move {
///     tokio::signal::ctrl_c().await.ok();
///     let _ = stop_tx.send(true);
/// });
/// dispatcher.run(stop_rx).await;
/// ```
pub struct Dispatcher<S, B> {
    config: DispatcherConfig,
    machine_id: MachineId,
    processor: RecordProcessor<S, B>,
    unlocker: RecordUnlocker<S>,
    cleaner: RecordCleaner<S>,
}

impl<S, B> Dispatcher<S, B>
where
    S: OutboxStore + 'static,
    B: MessageBroker + 'static,
{
    /// Wire the three workers around `store` and `broker`.
    ///
    /// Rejects a config that fails [`DispatcherConfig::validate`].
    pub fn new(
        config: DispatcherConfig,
        store: Arc<S>,
        broker: Arc<B>,
        machine_id: MachineId,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let processor = RecordProcessor::new(
            config.retrial_policy,
            Arc::clone(&store),
            broker,
            machine_id.clone(),
        );
        let unlocker = RecordUnlocker::new(Arc::clone(&store), config.max_lock_time_duration());
        let cleaner = RecordCleaner::new(store, config.messages_retention_duration())
            .terminal_only(config.cleanup_terminal_only);

        Ok(Self {
            config,
            machine_id,
            processor,
            unlocker,
            cleaner,
        })
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        let Self {
            config,
            machine_id,
            processor,
            unlocker,
            cleaner,
        } = self;
        Self {
            config,
            machine_id,
            processor: processor.with_clock(Arc::clone(&clock)),
            unlocker: unlocker.with_clock(Arc::clone(&clock)),
            cleaner: cleaner.with_clock(clock),
        }
    }

    pub fn machine_id(&self) -> &MachineId {
        &self.machine_id
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run until `stop_signal` turns `true` (or its sender is dropped), then
    /// wait for every loop to finish its current iteration.
    pub async fn run(self, mut stop_signal: watch::Receiver<bool>) {
        let machine_id = self.machine_id.clone();
        let joins = self.start(&stop_signal);
        info!(%machine_id, "dispatcher started");

        loop {
            if *stop_signal.borrow_and_update() {
                break;
            }
            if stop_signal.changed().await.is_err() {
                break;
            }
        }

        for j in joins {
            let _ = j.await;
        }
        info!(%machine_id, "dispatcher stopped");
    }

    /// Start the loops in the background and hand back a handle to stop them.
    pub fn spawn(self) -> DispatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = self.start(&shutdown_rx);
        DispatcherHandle { shutdown_tx, joins }
    }

    fn start(self, stop: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let Self {
            config,
            processor,
            unlocker,
            cleaner,
            ..
        } = self;

        vec![
            tokio::spawn(run_periodic(
                Arc::new(processor),
                config.process_interval(),
                stop.clone(),
            )),
            tokio::spawn(run_periodic(
                Arc::new(unlocker),
                config.lock_checker_interval(),
                stop.clone(),
            )),
            tokio::spawn(run_periodic(
                Arc::new(cleaner),
                config.cleanup_worker_interval(),
                stop.clone(),
            )),
        ]
    }
}

/// Handle for a dispatcher started with [`Dispatcher::spawn`].
/// - `request_shutdown()` で停止を要求
/// - `shutdown_and_join()` で全ループの終了を待つ
/// - handle を drop しても停止する
pub struct DispatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl DispatcherHandle {
    /// In-flight iterations are not cancelled; loops stop before their next tick.
    pub fn request_shutdown(&self) {
        // ignore send error: loops may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn run_periodic<T: PeriodicTask>(
    task: Arc<T>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(task = task.name(), ?period, "periodic task started");

    loop {
        // shutdown が来ていたら抜ける
        if *stop.borrow_and_update() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                // sender が drop された場合も停止
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        match task.run_once().await {
            Ok(()) => {}
            // 配送失敗は Record に記録済み。次の tick で再試行される
            Err(e) if e.is_delivery() => warn!(task = task.name(), error = %e, "iteration failed"),
            Err(e) => error!(task = task.name(), error = %e, "iteration failed"),
        }
    }

    debug!(task = task.name(), "periodic task stopped");
}

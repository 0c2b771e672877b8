use perkbridge_core::{CommandDispatcher, ShopRegistry};
use perkbridge_host::{HostError, HostHandle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{CommandQueueConsumer, Config, PublishTrigger, SnapshotPublisher, StockScan};

/// Background tasks driving one bridge.
pub struct BridgeTasks<W> {
    pub trigger: PublishTrigger<W>,
    pub consumer: JoinHandle<()>,
    pub stock_timer: JoinHandle<()>,
    pub writer: JoinHandle<()>,
}

impl<W> BridgeTasks<W> {
    pub fn abort(&self) {
        self.consumer.abort();
        self.stock_timer.abort();
        self.writer.abort();
    }
}

/// Start the queue consumer, the stock timer and the snapshot writer for `cfg`.
///
/// Must be called inside a tokio runtime. World access goes through `host`.
pub fn spawn_bridge<W>(cfg: &Config, host: HostHandle<W>) -> BridgeTasks<W>
where
    W: CommandDispatcher + ShopRegistry + 'static,
{
    let (tx, writer) = spawn_snapshot_writer(SnapshotPublisher::from_config(cfg));
    let trigger = PublishTrigger::new(host.clone(), tx);
    let consumer = spawn_queue_consumer(CommandQueueConsumer::from_config(cfg), host, cfg);
    let stock_timer = spawn_stock_timer(trigger.clone(), cfg);
    info!(
        queue = %cfg.queue_path().display(),
        stock = %cfg.stock_path().display(),
        "bridge started"
    );
    BridgeTasks {
        trigger,
        consumer,
        stock_timer,
        writer,
    }
}

/// Periodically drain the queue file off the owner thread.
pub fn spawn_queue_consumer<W>(mut consumer: CommandQueueConsumer, host: HostHandle<W>, cfg: &Config) -> JoinHandle<()>
where
    W: CommandDispatcher + 'static,
{
    let start = Instant::now() + cfg.schedule.queue_initial_delay();
    let period = cfg.schedule.queue_interval();
    tokio::spawn(async move {
        let mut tick = interval_at(start, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            let queue = consumer.queue().clone();
            let drain = match tokio::task::spawn_blocking(move || queue.drain()).await {
                Ok(d) => d,
                Err(e) => {
                    warn!("queue drain worker failed: {e:?}");
                    continue;
                }
            };
            let report = consumer.execute_batch(drain, &host);
            if report.read > 0 {
                info!(
                    read = report.read,
                    submitted = report.submitted,
                    rejected = report.rejected,
                    skipped = report.skipped_seen,
                    "drained command queue"
                );
            }
            if report.host_closed {
                warn!("owner thread is gone; stopping queue consumer");
                break;
            }
        }
    })
}

/// Periodically ask the owner thread for a stock scan.
pub fn spawn_stock_timer<W>(trigger: PublishTrigger<W>, cfg: &Config) -> JoinHandle<()>
where
    W: ShopRegistry + 'static,
{
    let start = Instant::now() + cfg.schedule.stock_initial_delay();
    let period = cfg.schedule.stock_interval();
    tokio::spawn(async move {
        let mut tick = interval_at(start, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tick.tick().await;
            if let Err(HostError::Closed) = trigger.request_publish() {
                warn!("owner thread is gone; stopping stock timer");
                break;
            }
        }
    })
}

/// Single consumer of stock scans: writes them one at a time so two publishes
/// never share the temp file. Scans that queue up while a write is running are
/// collapsed to the newest one.
pub fn spawn_snapshot_writer(publisher: SnapshotPublisher) -> (mpsc::UnboundedSender<StockScan>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<StockScan>();
    let handle = tokio::spawn(async move {
        while let Some(mut scan) = rx.recv().await {
            while let Ok(newer) = rx.try_recv() {
                debug!("newer stock scan queued; skipping an older one");
                scan = newer;
            }
            let publisher = publisher.clone();
            match tokio::task::spawn_blocking(move || publisher.write_scan(&scan)).await {
                Ok(Ok(())) => {}
                // Already logged by write_scan; the previous snapshot stays authoritative.
                Ok(Err(_)) => {}
                Err(e) => error!("snapshot writer worker failed: {e:?}"),
            }
        }
        debug!("snapshot writer stopped");
    });
    (tx, handle)
}

//! # Concurrency Pool
//!
//! A fixed set of workers pulls targets from one shared queue; each worker
//! owns a target's full three-stage sequence before pulling the next, so the
//! pool size is the exact upper bound on concurrently active external-process
//! groups.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use redseam_common::config::Config;
use redseam_common::target::Target;

use crate::pipeline;
use crate::report::{Aggregator, TargetRecord};
use crate::stats::ScanStats;

/// Invoked by workers after every finished target, progress-bar style,
/// mirroring the record that was just folded in.
pub type ProgressFn = dyn Fn(&TargetRecord) + Send + Sync;

/// Processes every target and returns the records in input order.
///
/// Workers stop pulling new targets once `shutdown` flips; the in-flight
/// stage processes are killed by the runner. Records finished before the
/// interrupt are kept.
pub async fn run(
    targets: Vec<Target>,
    config: Arc<Config>,
    stats: Arc<ScanStats>,
    aggregator: Arc<Aggregator>,
    shutdown: watch::Receiver<bool>,
    on_target_done: Option<Box<ProgressFn>>,
) -> Vec<TargetRecord> {
    let total = targets.len();
    let worker_count = config.workers.clamp(1, total.max(1));

    let (tx, rx) = mpsc::channel::<(usize, Target)>(total.max(1));
    for item in targets.into_iter().enumerate() {
        // Channel capacity equals the queue length; this cannot block.
        let _ = tx.try_send(item);
    }
    drop(tx);

    let queue = Arc::new(Mutex::new(rx));
    let sink: Arc<Mutex<Vec<(usize, TargetRecord)>>> =
        Arc::new(Mutex::new(Vec::with_capacity(total)));
    let callback: Option<Arc<ProgressFn>> = on_target_done.map(Arc::from);

    let mut workers: JoinSet<()> = JoinSet::new();
    for worker_id in 0..worker_count {
        let queue = queue.clone();
        let sink = sink.clone();
        let config = config.clone();
        let stats = stats.clone();
        let aggregator = aggregator.clone();
        let shutdown = shutdown.clone();
        let callback = callback.clone();

        workers.spawn(async move {
            loop {
                if *shutdown.borrow() {
                    debug!(worker_id, "worker stopping, shutdown requested");
                    break;
                }
                let next = { queue.lock().await.recv().await };
                let Some((idx, target)) = next else {
                    break;
                };

                match pipeline::run_target(target, &config, shutdown.clone()).await {
                    Ok(record) => {
                        if let Err(e) = aggregator.write_record(&record) {
                            warn!("{e}");
                        }
                        stats.record(&record);
                        if let Some(cb) = &callback {
                            cb(&record);
                        }
                        sink.lock().await.push((idx, record));
                    }
                    Err(_) => {
                        // Only Interrupted reaches here; the target's child
                        // processes are already dead.
                        debug!(worker_id, "worker interrupted mid-target");
                        break;
                    }
                }
            }
        });
    }

    while workers.join_next().await.is_some() {}

    let mut indexed = {
        let mut guard = sink.lock().await;
        std::mem::take(&mut *guard)
    };
    indexed.sort_by_key(|(idx, _)| *idx);
    indexed.into_iter().map(|(_, record)| record).collect()
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

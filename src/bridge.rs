use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::debug;

use crate::error::{MmvError, MmvResult};
use crate::metric::MetricName;
use crate::value::MetricValue;
use crate::writer::MmvWriter;

/// One pending value-change notification.
#[derive(Debug)]
pub struct MetricUpdate {
    pub name: MetricName,
    pub value: MetricValue,
}

/// Buffers value-change notifications between producer threads and the slot
/// writes they turn into.
///
/// The queue is bounded and lossy: when it is full the newest update is
/// dropped, on the grounds that a later update for the same value supersedes
/// it. Failed updates are logged and swallowed so a producer thread never
/// sees an error from the export path. Dropping the bridge drains the queue
/// and joins the consumer.
pub struct UpdateBridge {
    sender: Option<Sender<MetricUpdate>>,
    worker: Option<JoinHandle<()>>,
    dropped: Arc<AtomicU64>,
}

impl UpdateBridge {
    pub fn new(writer: Arc<MmvWriter>) -> MmvResult<Self> {
        let depth = writer.config().update_queue_depth;
        let (sender, receiver) = bounded(depth);
        let worker = thread::Builder::new()
            .name("mmv-update-bridge".to_string())
            .spawn(move || run(writer, receiver))
            .map_err(|err| MmvError::startup(format!("spawn update bridge: {err}")))?;
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Enqueue one update. Never blocks; a full queue drops the update.
    pub fn publish(&self, name: MetricName, value: MetricValue) {
        let Some(sender) = self.sender.as_ref() else {
            return;
        };
        match sender.try_send(MetricUpdate { name, value }) {
            Ok(()) => {}
            Err(TrySendError::Full(update)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(metric = %update.name, "update queue full, dropping newest update");
            }
            Err(TrySendError::Disconnected(update)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(metric = %update.name, "update bridge stopped, dropping update");
            }
        }
    }

    /// Number of updates dropped because the queue was full or stopped.
    pub fn dropped_updates(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for UpdateBridge {
    fn drop(&mut self) {
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run(writer: Arc<MmvWriter>, receiver: Receiver<MetricUpdate>) {
    for update in receiver {
        if let Err(err) = writer.update_metric(&update.name, update.value) {
            debug!(metric = %update.name, error = %err, "dropping failed metric update");
        }
    }
}

//! Count- and time-bounded batching with background delivery
//!
//! [`Batcher::add`] appends to the shared queue. The queue is flushed when it
//! reaches the configured count or when the timer armed by the first item of a
//! cycle fires, whichever comes first. Flushed batches go over a channel to a
//! single delivery worker, which hands each batch to the [`BatchHandler`] on
//! its own task, with a bounded number in flight. Each task first waits until
//! the delivery delay has passed since its own flush.

use crate::config::Options;
use crate::error::{CaptureError, Result};
use crate::log_messages::{delivery as messages, lifecycle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Receives flushed batches. Errors are logged by the worker and dropped.
#[async_trait]
pub trait BatchHandler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle_batch(&self, batch: Vec<T>) -> Result<()>;
}

#[derive(Clone, Copy, Debug)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    pub max_send_interval: Duration,
    pub delivery_delay: Duration,
    pub max_concurrent_deliveries: usize,
    pub debug: bool,
}

impl BatcherConfig {
    pub fn from_options(options: &Options) -> Self {
        Self {
            max_batch_size: options.max_batch_size.into_inner(),
            max_send_interval: options.max_send_interval.as_duration(),
            delivery_delay: options.delivery_delay,
            max_concurrent_deliveries: options.max_concurrent_deliveries,
            debug: options.debug,
        }
    }
}

struct Queue<T> {
    items: Vec<T>,
    /// Incremented on every flush; a timer only flushes the cycle it was armed for
    cycle: u64,
    timer: Option<JoinHandle<()>>,
}

/// A flushed batch and the moment it left the queue
struct Flushed<T> {
    at: Instant,
    items: Vec<T>,
}

struct Shared<T> {
    queue: Mutex<Queue<T>>,
    config: BatcherConfig,
    outbox: mpsc::UnboundedSender<Flushed<T>>,
    runtime: Handle,
}

/// Shared batch queue. Clones refer to the same queue.
pub struct Batcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Batcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> std::fmt::Debug for Batcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batcher")
            .field("config", &self.shared.config)
            .field("pending", &self.shared.queue.lock().items.len())
            .finish()
    }
}

impl<T: Send + 'static> Batcher<T> {
    /// Create the batcher and spawn its delivery worker on the current runtime.
    ///
    /// The worker stops once every clone of the batcher is dropped.
    pub fn new<H>(config: BatcherConfig, handler: H) -> Result<Self>
    where
        H: BatchHandler<T>,
    {
        let runtime = Handle::try_current().map_err(|_| CaptureError::NoRuntime)?;
        let (outbox, batches) = mpsc::unbounded_channel();
        runtime.spawn(run_delivery_worker(batches, Arc::new(handler), config));

        Ok(Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue {
                    items: Vec::new(),
                    cycle: 0,
                    timer: None,
                }),
                config,
                outbox,
                runtime,
            }),
        })
    }

    /// Append an item, flushing when the queue reaches the configured size
    pub fn add(&self, item: T) {
        let mut queue = self.shared.queue.lock();
        queue.items.push(item);

        if queue.items.len() >= self.shared.config.max_batch_size {
            let batch = take_batch(&mut queue, true);
            drop(queue);
            dispatch(&self.shared, batch);
        } else if queue.timer.is_none() {
            let cycle = queue.cycle;
            queue.timer = Some(self.arm_timer(cycle));
        }
    }

    /// Cancel the pending timer and send whatever is queued
    pub fn flush(&self) {
        let batch = take_batch(&mut self.shared.queue.lock(), true);
        dispatch(&self.shared, batch);
    }

    /// Number of items waiting for the next flush
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    fn arm_timer(&self, cycle: u64) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let interval = self.shared.config.max_send_interval;
        self.shared.runtime.spawn(async move {
            tokio::time::sleep(interval).await;
            flush_from_timer(shared, cycle);
        })
    }
}

fn flush_from_timer<T: Send + 'static>(shared: Weak<Shared<T>>, cycle: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let batch = {
        let mut queue = shared.queue.lock();
        if queue.cycle != cycle {
            return;
        }
        take_batch(&mut queue, false)
    };
    dispatch(&shared, batch);
}

/// Swap the queue for an empty one and start a new cycle.
///
/// The cycle's own timer passes `abort_timer = false` so it is left to finish.
fn take_batch<T>(queue: &mut Queue<T>, abort_timer: bool) -> Vec<T> {
    match queue.timer.take() {
        Some(timer) if abort_timer => timer.abort(),
        _ => {}
    }
    queue.cycle += 1;
    std::mem::take(&mut queue.items)
}

fn dispatch<T>(shared: &Shared<T>, batch: Vec<T>) {
    if batch.is_empty() {
        debug!("{}", messages::EMPTY_FLUSH);
        return;
    }
    if shared.config.debug {
        debug!(batch_size = batch.len(), "{}", messages::FLUSHING);
    }
    let flushed = Flushed {
        at: Instant::now(),
        items: batch,
    };
    if shared.outbox.send(flushed).is_err() {
        warn!("{}", messages::WORKER_GONE);
    }
}

async fn run_delivery_worker<T, H>(
    mut batches: mpsc::UnboundedReceiver<Flushed<T>>,
    handler: Arc<H>,
    config: BatcherConfig,
) where
    T: Send + 'static,
    H: BatchHandler<T>,
{
    info!("{}", lifecycle::DELIVERY_WORKER_STARTED);
    let permits = Arc::new(Semaphore::new(config.max_concurrent_deliveries.max(1)));

    while let Some(Flushed { at, items: batch }) = batches.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let handler = Arc::clone(&handler);

        tokio::spawn(async move {
            let _permit = permit;
            tokio::time::sleep_until(at + config.delivery_delay).await;
            let batch_size = batch.len();
            if let Err(error) = handler.handle_batch(batch).await {
                if config.debug {
                    warn!(batch_size, %error, "{}", messages::SEND_FAILED);
                } else {
                    warn!(batch_size, "{}", messages::SEND_FAILED);
                }
            }
        });
    }

    info!("{}", lifecycle::DELIVERY_WORKER_STOPPED);
}

//! Lane Dispatcher (§4.5): keyed concurrency gate guaranteeing at-most-one
//! concurrent execution per session key, FIFO within a lane, and
//! starvation-free service across lanes bounded by a global parallelism
//! cap.
//!
//! Has no direct teacher counterpart — `TokioScheduler` spawns every due
//! job unconditionally with no per-key serialisation. Grounded on
//! `channels::manager::ChannelManager`'s keyed-registry-of-handles pattern
//! (`DashMap` plus per-entry async work), generalised into per-lane FIFO
//! queues gated by a `tokio::sync::Semaphore` for the global cap. Tokio's
//! semaphore serves waiters in arrival order, which is what makes
//! cross-lane starvation-freedom hold: a lane's queued item is always the
//! oldest outstanding request for a permit once it reaches the head of its
//! own queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

use crate::model::SessionKey;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("lane queue is full for `{0}`")]
    LaneQueueFull(String),
}

/// Cooperative cancellation flag threaded through to enqueued work. The
/// Executor checks this at its defined suspension points (§4.5).
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueuedWork {
    cancel: CancelToken,
    make_future: Box<dyn FnOnce(CancelToken) -> BoxFuture + Send>,
}

pub struct LaneDispatcher {
    lanes: DashMap<String, mpsc::Sender<QueuedWork>>,
    global: Arc<Semaphore>,
    queue_cap: usize,
}

impl LaneDispatcher {
    pub fn new(global_parallelism: usize, queue_cap: usize) -> Self {
        Self {
            lanes: DashMap::new(),
            global: Arc::new(Semaphore::new(global_parallelism.max(1))),
            queue_cap: queue_cap.max(1),
        }
    }

    /// Enqueue `work` onto `lane_key`'s FIFO queue, rejecting with
    /// `LaneQueueFull` rather than growing unbounded (§4.5 invariant 4).
    /// Returns a [`CancelToken`] the caller can use to request cooperative
    /// cancellation before `work` runs or at its own suspension points.
    pub fn enqueue<F, Fut>(&self, lane_key: &SessionKey, work: F) -> Result<CancelToken, DispatchError>
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancelToken::default();
        let item = QueuedWork {
            cancel: cancel.clone(),
            make_future: Box::new(move |tok| Box::pin(work(tok)) as BoxFuture),
        };

        let sender = self.lane_sender(lane_key);
        sender
            .try_send(item)
            .map_err(|_| DispatchError::LaneQueueFull(lane_key.as_str().to_string()))?;
        Ok(cancel)
    }

    fn lane_sender(&self, lane_key: &SessionKey) -> mpsc::Sender<QueuedWork> {
        self.lanes
            .entry(lane_key.as_str().to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.queue_cap);
                self.spawn_lane_worker(rx);
                tx
            })
            .clone()
    }

    fn spawn_lane_worker(&self, mut rx: mpsc::Receiver<QueuedWork>) {
        let global = self.global.clone();
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let Ok(permit) = global.clone().acquire_owned().await else {
                    break;
                };
                if !item.cancel.is_cancelled() {
                    (item.make_future)(item.cancel).await;
                }
                drop(permit);
            }
        });
    }
}

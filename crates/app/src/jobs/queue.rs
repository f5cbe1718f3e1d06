use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::warn;

use crate::jobs::shutdown::Shutdown;

/// Number of items waiting in a queue, readable from outside the pipeline.
#[derive(Debug, Clone)]
pub struct QueueGauge {
    name: &'static str,
    depth: Arc<AtomicUsize>,
}

impl QueueGauge {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            depth: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

/// FIFO queue with a single consumer loop.
pub fn work_queue<T>(gauge: QueueGauge) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        QueueSender {
            tx,
            gauge: gauge.clone(),
        },
        QueueReceiver { rx, gauge },
    )
}

pub struct QueueSender<T> {
    tx: mpsc::UnboundedSender<T>,
    gauge: QueueGauge,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            gauge: self.gauge.clone(),
        }
    }
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) -> bool {
        self.gauge.depth.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(item).is_err() {
            self.gauge.depth.fetch_sub(1, Ordering::Relaxed);
            warn!(queue = self.gauge.name, "queue consumer gone; item dropped");
            return false;
        }
        true
    }
}

pub struct QueueReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
    gauge: QueueGauge,
}

impl<T> QueueReceiver<T> {
    /// Next item, or `None` once shutdown is requested or every sender is gone.
    pub async fn recv(&mut self, shutdown: &mut Shutdown) -> Option<T> {
        if shutdown.is_set() {
            return None;
        }
        let item = tokio::select! {
            item = self.rx.recv() => item,
            _ = shutdown.wait() => None,
        };
        if item.is_some() {
            self.gauge.depth.fetch_sub(1, Ordering::Relaxed);
        }
        item
    }
}

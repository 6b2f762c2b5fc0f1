//! In-process publish/subscribe topics.
//!
//! Each topic is a tokio broadcast channel. Subscribers may attach a
//! predicate and an initial seed value; publishing never blocks and never
//! fails when nobody is listening.

use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::warn;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
pub struct EventBus<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, value: T) -> usize {
        self.tx.send(value).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribe_filtered(|_| true)
    }

    pub fn subscribe_filtered<F>(&self, predicate: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Subscription {
            rx: self.tx.subscribe(),
            predicate: Box::new(predicate),
            seed: None,
        }
    }

    /// Subscribe and receive `seed` first, ahead of anything published
    /// afterwards. The seed bypasses the predicate.
    pub fn subscribe_seeded<F>(&self, seed: T, predicate: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let mut sub = self.subscribe_filtered(predicate);
        sub.seed = Some(seed);
        sub
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription<T> {
    rx: broadcast::Receiver<T>,
    predicate: Predicate<T>,
    seed: Option<T>,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Next matching value. `None` once the bus has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(seed) = self.seed.take() {
            return Some(seed);
        }
        loop {
            match self.rx.recv().await {
                Ok(value) if (self.predicate)(&value) => return Some(value),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind the bus");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<T> {
        if let Some(seed) = self.seed.take() {
            return Some(seed);
        }
        loop {
            match self.rx.try_recv() {
                Ok(value) if (self.predicate)(&value) => return Some(value),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Subscriber lagged behind the bus");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Drain every value currently queued.
    pub fn drain(&mut self) -> Vec<T> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn into_stream(self) -> impl Stream<Item = T> {
        stream::unfold(self, |mut sub| async move {
            let next = sub.recv().await?;
            Some((next, sub))
        })
    }
}

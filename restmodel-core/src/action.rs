//! Per-instance action queue.
//!
//! Every record and collection owns an [`ActionQueue`]. Actions run strictly
//! in enqueue order: each one waits for the previous one to settle,
//! whatever the outcome. The queue's tail is a shared future, so any number
//! of callers can await "everything queued so far".
//!
//! Queued futures are spawned on the current tokio runtime. Without a
//! runtime nothing is spawned and the chain only progresses when awaited.

use crate::error::{RestError, RestResult};
use futures::FutureExt;
use futures::future::{self, BoxFuture, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Outcome of a settled action.
pub type Settled = RestResult<()>;

pub(crate) type Tail = Shared<BoxFuture<'static, Settled>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle given to a running action. It observes cancellation.
#[derive(Debug)]
pub struct ActionTicket {
    id: u64,
    canceled: AtomicBool,
}

impl ActionTicket {
    fn new(id: u64) -> Self {
        Self {
            id,
            canceled: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

/// FIFO chain of asynchronous actions.
#[derive(Default)]
pub struct ActionQueue {
    tail: Mutex<Option<Tail>>,
    pending: Arc<Mutex<Vec<Arc<ActionTicket>>>>,
    next_id: AtomicU64,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an asynchronous action.
    ///
    /// The body starts once every earlier action has settled. If the action
    /// was cancelled while waiting, the body never runs and the action
    /// settles with [`RestError::Canceled`].
    pub fn enqueue<F, Fut>(&self, body: F)
    where
        F: FnOnce(Arc<ActionTicket>) -> Fut + Send + 'static,
        Fut: Future<Output = Settled> + Send + 'static,
    {
        let ticket = Arc::new(ActionTicket::new(
            self.next_id.fetch_add(1, Ordering::Relaxed),
        ));
        lock(&self.pending).push(ticket.clone());
        let pending = self.pending.clone();

        let mut tail = lock(&self.tail);
        let previous = tail.take();
        let next = async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let result = if ticket.is_canceled() {
                debug!(action = ticket.id(), "skipping cancelled action");
                Err(RestError::Canceled)
            } else {
                body(ticket.clone()).await
            };
            lock(&pending).retain(|t| !Arc::ptr_eq(t, &ticket));
            result
        }
        .boxed()
        .shared();
        *tail = Some(next.clone());
        drop(tail);
        drive(next);
    }

    /// Runs a synchronous action now if the queue is idle, otherwise queues it.
    pub fn enqueue_sync<F>(&self, body: F)
    where
        F: FnOnce() -> Settled + Send + 'static,
    {
        if self.is_idle() {
            let out = body();
            self.settle(out);
        } else {
            self.enqueue(move |_| future::ready(body()));
        }
    }

    /// Appends a continuation receiving the outcome of everything before it.
    ///
    /// When nothing is in flight the continuation runs immediately.
    pub fn chain<F>(&self, f: F)
    where
        F: FnOnce(Settled) -> Settled + Send + 'static,
    {
        let mut tail = lock(&self.tail);
        match tail.take() {
            Some(current) if current.peek().is_none() => {
                let next = async move { f(current.await) }.boxed().shared();
                *tail = Some(next.clone());
                drop(tail);
                drive(next);
            }
            settled => {
                let previous = settled
                    .and_then(|t| t.peek().cloned())
                    .unwrap_or(Ok(()));
                drop(tail);
                let out = f(previous);
                self.settle(out);
            }
        }
    }

    /// Records the outcome of an action that ran synchronously.
    ///
    /// If the action queued more work while running, the outcome settles
    /// after that work.
    fn settle(&self, out: Settled) {
        let mut tail = lock(&self.tail);
        match tail.take() {
            Some(current) if current.peek().is_none() => {
                let next = async move { current.await.and(out) }.boxed().shared();
                *tail = Some(next.clone());
                drop(tail);
                drive(next);
            }
            _ => *tail = Some(future::ready(out).boxed().shared()),
        }
    }

    /// Future settling with the outcome of the last queued action.
    pub(crate) fn tail(&self) -> Option<Tail> {
        lock(&self.tail).clone()
    }

    /// Cancels every pending action. Returns how many were flagged.
    pub fn cancel(&self) -> usize {
        let pending = lock(&self.pending);
        for ticket in pending.iter() {
            ticket.cancel();
        }
        pending.len()
    }

    /// Returns true while any action is queued or running.
    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).is_empty()
    }

    fn is_idle(&self) -> bool {
        !self.has_pending() && lock(&self.tail).as_ref().is_none_or(|t| t.peek().is_some())
    }
}

fn drive(future: Tail) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => debug!("no tokio runtime; action runs when awaited"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn settle(queue: &ActionQueue) -> Settled {
        match queue.tail() {
            Some(tail) => tail.await,
            None => Ok(()),
        }
    }

    #[tokio::test]
    async fn actions_run_in_order() {
        let queue = ActionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (i, delay) in [(1, 30u64), (2, 0), (3, 10)] {
            let log = log.clone();
            queue.enqueue(move |_| async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(i);
                Ok(())
            });
        }
        settle(&queue).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
        assert!(!queue.has_pending());
    }

    #[tokio::test]
    async fn failure_does_not_block_later_actions() {
        let queue = ActionQueue::new();
        queue.enqueue(|_| async { Err(RestError::Network("down".into())) });
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue.enqueue(move |_| async move {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        settle(&queue).await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancel_skips_waiting_actions() {
        let queue = ActionQueue::new();
        queue.enqueue(|_| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(())
        });
        queue.enqueue(|_| async { Ok(()) });
        assert_eq!(queue.cancel(), 2);
        let err = settle(&queue).await.unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn chain_runs_immediately_when_idle() {
        let queue = ActionQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue.chain(move |prev| {
            flag.store(true, Ordering::SeqCst);
            prev
        });
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn sync_action_runs_without_runtime_when_idle() {
        let queue = ActionQueue::new();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        queue.enqueue_sync(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(ran.load(Ordering::SeqCst));
        assert!(!queue.has_pending());
    }
}

//! In-process fan-out for appended events. Not durable: subscribers that
//! need durability must persist state themselves (projections do this by
//! being rebuildable from the store).

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::warn;

use crate::domain::Event;
use crate::errors::RoadyError;

type Handler = Box<dyn Fn(&Event) -> Result<(), RoadyError> + Send + Sync>;

/// Bound on the dispatch channel feeding the background handler task. A
/// publisher that cannot keep up drops new dispatches rather than applying
/// backpressure to the appending `log` call.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
pub struct Publisher {
    subscribers: Arc<Mutex<Vec<Handler>>>,
    sender: Mutex<Option<mpsc::Sender<Event>>>,
}

impl Publisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Only events published after this call are
    /// delivered to it.
    pub fn subscribe(&mut self, handler: Handler) {
        self.subscribers.lock().unwrap().push(handler);
    }

    /// Dispatches `event` to every subscriber without blocking the caller.
    ///
    /// When a Tokio runtime is available, delivery runs on an independent
    /// background task fed through a bounded channel: the first publish
    /// lazily spawns the task, and every publish after that is a
    /// non-blocking `try_send`. A full channel means the background task
    /// is behind; the dispatch is dropped and logged rather than stalling
    /// the append path. Outside a runtime (plain synchronous callers,
    /// unit tests) handlers run inline so behavior stays deterministic.
    pub fn publish(&self, event: &Event) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            Self::run_inline(&self.subscribers, event);
            return;
        };

        let mut sender = self.sender.lock().unwrap();
        if sender.is_none() {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            handle.spawn(Self::dispatch_loop(self.subscribers.clone(), rx));
            *sender = Some(tx);
        }

        if let Err(err) = sender.as_ref().unwrap().try_send(event.clone()) {
            warn!(event_id = %event.id, error = %err, "event dispatch channel full, dropping dispatch");
        }
    }

    async fn dispatch_loop(subscribers: Arc<Mutex<Vec<Handler>>>, mut receiver: mpsc::Receiver<Event>) {
        while let Some(event) = receiver.recv().await {
            Self::run_inline(&subscribers, &event);
        }
    }

    /// Runs every handler in subscription order. A handler's error is
    /// logged but does not abort delivery to the remaining handlers.
    fn run_inline(subscribers: &Mutex<Vec<Handler>>, event: &Event) {
        for handler in subscribers.lock().unwrap().iter() {
            if let Err(err) = handler(event) {
                warn!(event_id = %event.id, error = %err, "event handler failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handler_error_does_not_stop_later_handlers() {
        let mut publisher = Publisher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        publisher.subscribe(Box::new(|_event| Err(RoadyError::Other("boom".into()))));
        let calls2 = calls.clone();
        publisher.subscribe(Box::new(move |_event| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let event = Event::next("plan.generate", "cli", Default::default(), "");
        publisher.publish(&event);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn late_subscriber_does_not_see_earlier_events() {
        let mut publisher = Publisher::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let event = Event::next("plan.generate", "cli", Default::default(), "");
        publisher.publish(&event);

        let seen2 = seen.clone();
        publisher.subscribe(Box::new(move |_event| {
            seen2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dispatch_runs_on_background_task_inside_a_runtime() {
        let mut publisher = Publisher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        publisher.subscribe(Box::new(move |_event| {
            calls2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let event = Event::next("plan.generate", "cli", Default::default(), "");
        publisher.publish(&event);

        // The handler runs on a spawned task; yield until it has a chance to run.
        for _ in 0..100 {
            if calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

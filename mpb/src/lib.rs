use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Multi-Producer Broadcast to do many to many (N*N) message passing.
///
/// Every message sent through any [`sender`](MPB::sender) is delivered to every
/// [`receiver`](MPB::receiver), in one global order decided by a single
/// dispatcher thread.
///
/// A bus built with [`MPB::replayable`] also keeps every message it has
/// dispatched. A receiver created on such a bus first gets the whole history, in
/// order, then the live messages, without gap or duplicate. This turns the bus
/// into an in-memory append-only log that any number of readers can replay.
pub struct MPB<X>
where
    X: Clone + Send + Sync + 'static,
{
    sender: Sender<X>,
    inner: Arc<Mutex<Inner<X>>>,
}

struct Inner<X> {
    senders: Vec<Sender<X>>,
    history: Option<Vec<X>>,
}

impl<X> MPB<X>
where
    X: Clone + Send + Sync + 'static,
{
    /// Live broadcast: receivers only get messages sent after they subscribed.
    pub fn new() -> Self {
        MPB::with_history(None)
    }

    /// Broadcast with replay: receivers get every message ever dispatched.
    pub fn replayable() -> Self {
        MPB::with_history(Some(vec![]))
    }

    fn with_history(history: Option<Vec<X>>) -> Self {
        let (sender, receiver) = unbounded::<X>();

        let mpb = MPB {
            sender,
            inner: Arc::new(Mutex::new(Inner {
                senders: vec![],
                history,
            })),
        };

        mpb._init(receiver);

        mpb
    }

    fn _init(&self, receiver: Receiver<X>) {
        let inner = self.inner.clone();

        let _ = thread::spawn(move || {
            for msg in receiver {
                let mut inner = lock(&inner);

                // drop receivers that went away
                inner
                    .senders
                    .retain(|sender| sender.send(msg.clone()).is_ok());

                if let Some(history) = inner.history.as_mut() {
                    history.push(msg);
                }
            }
        });
    }

    pub fn sender(&self) -> Sender<X> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<X> {
        let (sender, receiver) = unbounded();
        let mut inner = lock(&self.inner);

        if let Some(history) = inner.history.as_ref() {
            for msg in history.iter() {
                let _ = sender.send(msg.clone());
            }
        }

        inner.senders.push(sender);

        receiver
    }

    /// Number of messages dispatched so far, when the bus keeps a history.
    pub fn history_len(&self) -> Option<usize> {
        lock(&self.inner).history.as_ref().map(|history| history.len())
    }
}

impl<X> Default for MPB<X>
where
    X: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        MPB::new()
    }
}

fn lock<X>(inner: &Arc<Mutex<Inner<X>>>) -> MutexGuard<Inner<X>> {
    // a panicking receiver can not leave the sender list half written
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

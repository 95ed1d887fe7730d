use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use crate::record::{Record, Round};
use crate::transport::{LogProducer, TransportError};

/// Attempts of an append failing with transient errors before giving up.
pub const APPEND_ATTEMPTS: u32 = 100;
pub const APPEND_RETRY_BACKOFF: Duration = Duration::from_millis(50);

const WAITING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// How a heartbeat listener ended.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ListenerExit {
    /// The election timeout expired and the listener opened the next round.
    Fired,
    /// The owner cancelled the listener before it fired.
    Cancelled,
}

/// Follower side of a round: waits for the heartbeats of the leader and opens
/// the next round once they stop.
///
/// Every [`wake`](HeartbeatListener::wake) re-arms a full election timeout.
/// When the timeout expires the listener appends `next_vote`, unless it was
/// cancelled first. Firing and cancelling race on one atomic state, so exactly
/// one of them wins.
pub struct HeartbeatListener {
    state: Arc<AtomicU8>,
    wake: Sender<()>,
    join: Option<JoinHandle<ListenerExit>>,
}

impl HeartbeatListener {
    pub fn spawn<P: LogProducer>(
        node_id: String,
        round: Round,
        election_timeout: Duration,
        next_vote: Record,
        producer: P,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        let state = Arc::new(AtomicU8::new(WAITING));
        let (wake, heartbeats) = unbounded::<()>();

        let thread_state = state.clone();
        let join = thread::spawn(move || loop {
            match heartbeats.recv_timeout(election_timeout) {
                Ok(()) => {
                    if thread_state.load(Ordering::SeqCst) != WAITING {
                        return ListenerExit::Cancelled;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if thread_state
                        .compare_exchange(WAITING, FIRED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_err()
                    {
                        return ListenerExit::Cancelled;
                    }

                    info!(
                        "[{}] no heartbeat in round {} for {:?}, opening the next one with `{}`",
                        node_id, round, election_timeout, next_vote
                    );

                    if let Err(err) = append_retrying(&node_id, &producer, &next_vote, &terminate) {
                        error!("[{}] can not append `{}`: {}", node_id, next_vote, err);
                    }

                    return ListenerExit::Fired;
                }
                // the owner went away
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = thread_state.compare_exchange(
                        WAITING,
                        CANCELLED,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    return ListenerExit::Cancelled;
                }
            }
        });

        HeartbeatListener {
            state,
            wake,
            join: Some(join),
        }
    }

    /// Restarts the election timeout.
    pub fn wake(&self) {
        let _ = self.wake.send(());
    }

    /// Cancels the listener because another peer already opened the next round.
    /// Returns `false` if the listener fired first.
    pub fn set_late_to_timeout(&self) -> bool {
        let cancelled = self
            .state
            .compare_exchange(WAITING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        self.wake();
        cancelled
    }

    pub fn join(mut self) -> ListenerExit {
        match self.join.take().map(|join| join.join()) {
            Some(Ok(exit)) => exit,
            _ => ListenerExit::Cancelled,
        }
    }
}

impl Drop for HeartbeatListener {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.set_late_to_timeout();
        }
    }
}

/// Leader side of a round: appends `<round>,ALIVE,<node id>` at a fixed cadence.
pub struct HeartbeatSender {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl HeartbeatSender {
    pub fn spawn<P: LogProducer>(
        node_id: String,
        round: Round,
        interval: Duration,
        producer: P,
        terminate: Arc<AtomicBool>,
    ) -> Self {
        let (stop, stopped) = bounded::<()>(1);

        let join = thread::spawn(move || {
            let heartbeat = Record::alive(round, node_id.as_str());

            while !terminate.load(Ordering::SeqCst) {
                match producer.append(&heartbeat) {
                    Ok(()) => debug!("[{}] heartbeat for round {}", node_id, round),
                    Err(err) if err.is_transient() => {
                        debug!("[{}] heartbeat for round {} lost: {}", node_id, round, err)
                    }
                    Err(err) => {
                        warn!("[{}] heartbeat sender of round {} stops: {}", node_id, round, err);
                        break;
                    }
                }

                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            }
        });

        HeartbeatSender {
            stop,
            join: Some(join),
        }
    }

    /// Stops sending and waits for the last heartbeat to be appended.
    pub fn stop(mut self) {
        let _ = self.stop.try_send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Appends `record`, retrying transient failures every [`APPEND_RETRY_BACKOFF`]
/// until it succeeds, `terminate` is set or [`APPEND_ATTEMPTS`] are spent.
pub fn append_retrying<P: LogProducer>(
    node_id: &str,
    producer: &P,
    record: &Record,
    terminate: &AtomicBool,
) -> Result<(), TransportError> {
    let mut attempt = 1;

    loop {
        match producer.append(record) {
            Ok(()) => return Ok(()),
            Err(err)
                if err.is_transient()
                    && attempt < APPEND_ATTEMPTS
                    && !terminate.load(Ordering::SeqCst) =>
            {
                warn!(
                    "[{}] append of `{}` failed ({}), attempt {} of {}",
                    node_id, record, err, attempt, APPEND_ATTEMPTS
                );
                attempt += 1;
                thread::sleep(APPEND_RETRY_BACKOFF);
            }
            Err(err) => return Err(err),
        }
    }
}

//! Read-only follower of the log that reconstructs election outcomes.
//!
//! The observer tells the chaos driver which peer must not be killed: the first
//! voter of the latest round, from its vote until the close-poll marker. That
//! peer is the one closing the poll, and killing it before would leave the round
//! open forever.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use crate::record::{Body, Record, RecordError, Round};
use crate::transport::{LogConsumer, TransportError};
use crate::verdict::{Statement, Tally};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ObservedState {
    /// Latest round seen in the log.
    pub round: Option<Round>,
    /// Peer that must not be killed right now.
    pub immortal: Option<String>,
    /// Leader of every decided round.
    pub leaders: BTreeMap<Round, String>,
    /// Author and reception time of the latest heartbeat.
    pub last_heartbeat: Option<(String, DateTime<Utc>)>,
}

/// Shared view of an observer.
#[derive(Clone, Default)]
pub struct ObserverHandle {
    state: Arc<Mutex<ObservedState>>,
}

impl ObserverHandle {
    fn lock(&self) -> MutexGuard<ObservedState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn immortal_node(&self) -> Option<String> {
        self.lock().immortal.clone()
    }

    pub fn is_immortal(&self, node_id: &str) -> bool {
        self.lock().immortal.as_deref() == Some(node_id)
    }

    pub fn current_round(&self) -> Option<Round> {
        self.lock().round
    }

    pub fn leader_of(&self, round: Round) -> Option<String> {
        self.lock().leaders.get(&round).cloned()
    }

    pub fn snapshot(&self) -> ObservedState {
        self.lock().clone()
    }
}

pub struct Observer {
    tally: Tally,
    state: ObserverHandle,
}

impl Observer {
    pub fn new() -> Self {
        Observer {
            tally: Tally::new(),
            state: ObserverHandle::default(),
        }
    }

    pub fn handle(&self) -> ObserverHandle {
        self.state.clone()
    }

    pub fn observe(&mut self, raw: &str) -> Result<(), RecordError> {
        let record = Record::parse(raw)?;
        self.on_record(record);
        Ok(())
    }

    pub fn on_record(&mut self, record: Record) {
        let (round, body) = match record {
            Record::Check(_) => return,
            Record::Round { round, body } => (round, body),
        };

        let current = self.state.lock().round;
        match current {
            Some(current) if round < current => {
                warn!("ignoring record of superseded round {}: {}", round, body);
            }
            Some(current) if round == current => self.on_current_round(round, body),
            _ => self.on_new_round(round, body),
        }
    }

    fn on_new_round(&mut self, round: Round, body: Body) {
        let statement = match body {
            Body::Statement(statement) => statement,
            Body::Alive(leader) => {
                warn!("heartbeat of {} opens round {}, ignoring it", leader, round);
                return;
            }
        };

        self.tally = Tally::new();
        self.tally.apply(&statement);
        let verdict = self.tally.verdict();

        let mut state = self.state.lock();
        state.round = Some(round);
        state.immortal = verdict.first_candidate;
        match state.immortal.as_deref() {
            Some(immortal) => info!("cannot kill {} for a while", immortal),
            None => debug!("round {} opened without a vote", round),
        }
    }

    fn on_current_round(&mut self, round: Round, body: Body) {
        let statement = match body {
            Body::Statement(statement) => statement,
            Body::Alive(sender) => {
                let mut state = self.state.lock();
                if let Some(leader) = state.leaders.get(&round) {
                    if leader != &sender {
                        warn!(
                            "heartbeat of {} in round {} led by {}",
                            sender, round, leader
                        );
                    }
                }
                state.last_heartbeat = Some((sender, Utc::now()));
                return;
            }
        };

        let mut state = self.state.lock();

        if statement == Statement::ClosePoll {
            if let Some(immortal) = state.immortal.take() {
                info!("{} can be killed from now on", immortal);
            }
        }

        let decided = self.tally.verdict().consensus;
        self.tally.apply(&statement);
        let verdict = self.tally.verdict();

        if verdict.consensus && !decided {
            match verdict.value {
                Some(leader) => {
                    info!("leader for round {} is {}", round, leader);
                    state.leaders.insert(round, leader);
                }
                None => warn!("round {} closed without any vote", round),
            }
        }
    }

    /// Follows the log until `terminate` is set.
    pub fn run<C: LogConsumer>(
        mut self,
        mut consumer: C,
        poll_timeout: Duration,
        terminate: Arc<AtomicBool>,
    ) -> Result<(), TransportError> {
        while !terminate.load(Ordering::SeqCst) {
            let records = match consumer.poll(poll_timeout) {
                Ok(records) => records,
                Err(err) if err.is_transient() => continue,
                Err(err) => {
                    consumer.close();
                    return Err(err);
                }
            };

            for raw in records {
                if let Err(err) = self.observe(&raw) {
                    warn!("observer skips malformed record `{}`: {}", raw, err);
                }
            }
        }

        consumer.close();
        Ok(())
    }

    pub fn spawn<C: LogConsumer + 'static>(self, consumer: C, poll_timeout: Duration) -> ObserverThread {
        let handle = self.handle();
        let terminate = Arc::new(AtomicBool::new(false));
        let thread_terminate = terminate.clone();
        let join = thread::spawn(move || self.run(consumer, poll_timeout, thread_terminate));

        ObserverThread {
            handle,
            terminate,
            join: Some(join),
        }
    }
}

impl Default for Observer {
    fn default() -> Self {
        Observer::new()
    }
}

pub struct ObserverThread {
    handle: ObserverHandle,
    terminate: Arc<AtomicBool>,
    join: Option<JoinHandle<Result<(), TransportError>>>,
}

impl ObserverThread {
    pub fn handle(&self) -> ObserverHandle {
        self.handle.clone()
    }

    pub fn stop(mut self) -> Option<Result<(), TransportError>> {
        self.terminate.store(true, Ordering::SeqCst);
        self.join.take().and_then(|join| join.join().ok())
    }
}

impl Drop for ObserverThread {
    fn drop(&mut self) {
        self.terminate.store(true, Ordering::SeqCst);
    }
}

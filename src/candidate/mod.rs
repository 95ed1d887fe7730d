//! The candidate state machine of one peer.
//!
//! A candidate appends its check record, replays the log until the check record
//! comes back (round discovery), joins the current round and then folds every
//! record of that round:
//!
//! - the first voter of a round closes the poll after `poll_close_delay`;
//! - once the close-poll marker is read, the best ranked voter leads the round
//!   and sends heartbeats, every other peer listens to them;
//! - a listener that stops hearing the leader opens the next round with a vote,
//!   every other peer follows with its own vote when it reads that record.
//!
//! All the state of a candidate is owned by the thread consuming the log. The
//! heartbeat threads only append records.


pub mod heartbeat;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use uuid::Uuid;

use crate::config::Config;
use crate::discovery::RoundDiscovery;
use crate::error::ElectionError;
use crate::record::{Body, Record, Round};
use crate::transport::{LogConsumer, LogProducer};
use crate::verdict::{Rank, Statement, Tally, Verdict, RANK_MAX, RANK_MIN};

use heartbeat::{append_retrying, HeartbeatListener, HeartbeatSender, ListenerExit};

/// Where a candidate stood when it joined its current round.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum JoiningState {
    /// The log held no vote yet.
    New,
    /// The round was still open.
    Ongoing,
    /// The round already had a leader.
    Finished,
}

/// Source of the rank drawn for each vote.
pub trait RankSource: Send + 'static {
    fn next_rank(&mut self) -> Rank;
}

/// Uniform ranks in [`RANK_MIN`, `RANK_MAX`].
pub struct RandomRanks<R: RngCore>(R);

impl<R: RngCore> RandomRanks<R> {
    pub fn new(random: R) -> Self {
        RandomRanks(random)
    }
}

impl RandomRanks<StdRng> {
    pub fn from_entropy() -> Self {
        RandomRanks(StdRng::from_entropy())
    }
}

impl<R: RngCore + Send + 'static> RankSource for RandomRanks<R> {
    fn next_rank(&mut self) -> Rank {
        self.0.gen_range(RANK_MIN..=RANK_MAX)
    }
}

/// Ranks given in advance, then a fixed one.
pub struct ScriptedRanks {
    ranks: VecDeque<Rank>,
    then: Rank,
}

impl ScriptedRanks {
    pub fn new<I: IntoIterator<Item = Rank>>(ranks: I, then: Rank) -> Self {
        ScriptedRanks {
            ranks: ranks.into_iter().collect(),
            then,
        }
    }

    pub fn constant(rank: Rank) -> Self {
        ScriptedRanks::new(vec![], rank)
    }
}

impl RankSource for ScriptedRanks {
    fn next_rank(&mut self) -> Rank {
        self.ranks.pop_front().unwrap_or(self.then)
    }
}

pub struct Candidate<P: LogProducer, G: RankSource> {
    node_id: String,
    config: Config,
    producer: P,
    ranks: G,
    round: Round,
    joining_state: Option<JoiningState>,
    tally: Tally,
    timeout_counted: bool,
    elected_leader: Option<String>,
    listener: Option<HeartbeatListener>,
    sender: Option<HeartbeatSender>,
    terminate: Arc<AtomicBool>,
}

impl<P: LogProducer> Candidate<P, RandomRanks<StdRng>> {
    pub fn new(producer: P, config: Config) -> Self {
        Candidate::with_ranks(Uuid::new_v4().to_string(), producer, RandomRanks::from_entropy(), config)
    }
}

impl<P: LogProducer, G: RankSource> Candidate<P, G> {
    pub fn with_ranks<T: Into<String>>(node_id: T, producer: P, ranks: G, config: Config) -> Self {
        Candidate {
            node_id: node_id.into(),
            config,
            producer,
            ranks,
            round: 0,
            joining_state: None,
            tally: Tally::new(),
            timeout_counted: false,
            elected_leader: None,
            listener: None,
            sender: None,
            terminate: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id.as_str()
    }

    pub fn round(&self) -> Round {
        self.round
    }

    pub fn joining_state(&self) -> Option<JoiningState> {
        self.joining_state
    }

    pub fn elected_leader(&self) -> Option<&str> {
        self.elected_leader.as_deref()
    }

    pub fn is_leader(&self) -> bool {
        self.sender.is_some()
    }

    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    pub fn timeout_counted(&self) -> bool {
        self.timeout_counted
    }

    pub fn verdict(&self) -> Verdict {
        self.tally.verdict()
    }

    /// Flag that stops the candidate on its next loop turn.
    pub fn terminate_flag(&self) -> Arc<AtomicBool> {
        self.terminate.clone()
    }

    /// Runs the candidate on its own thread.
    pub fn spawn<C: LogConsumer + 'static>(self, consumer: C) -> CandidateHandle {
        let node_id = self.node_id.clone();
        let terminate = self.terminate.clone();
        let join = thread::spawn(move || self.run(consumer));

        CandidateHandle {
            node_id,
            terminate,
            join: Some(join),
        }
    }

    /// Appends the check record, discovers the current round, then follows the
    /// log until terminated. Returns early on a protocol violation.
    pub fn run<C: LogConsumer>(mut self, mut consumer: C) -> Result<(), ElectionError> {
        let mut discovery = RoundDiscovery::new();

        let check = discovery.check_record();
        let result = match append_retrying(&self.node_id, &self.producer, check, &self.terminate) {
            Ok(()) => self.consume(&mut consumer, &mut discovery),
            Err(err) => Err(err.into()),
        };

        if let Err(err) = &result {
            error!("[{}] stops: {}", self.node_id, err);
        }

        consumer.close();
        self.shutdown();
        result
    }

    fn consume<C: LogConsumer>(
        &mut self,
        consumer: &mut C,
        discovery: &mut RoundDiscovery,
    ) -> Result<(), ElectionError> {
        let mut joined = false;

        while !self.terminate.load(Ordering::SeqCst) {
            let records = match consumer.poll(self.config.poll_timeout) {
                Ok(records) => records,
                Err(err) if err.is_transient() => {
                    debug!("[{}] poll failed: {}", self.node_id, err);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            for raw in records {
                if self.terminate.load(Ordering::SeqCst) {
                    break;
                }

                if joined {
                    self.handle(&raw)?;
                    continue;
                }

                let record = parse(&raw)?;
                if let Some((round, prefix)) = discovery.observe(&record) {
                    self.participate(round, prefix)?;
                    joined = true;
                }
            }
        }

        Ok(())
    }

    /// Joins `round`, given the statements of that round appended before this
    /// candidate started.
    pub fn participate(&mut self, round: Round, prefix: Vec<Statement>) -> Result<(), ElectionError> {
        self.round = round;

        if prefix.is_empty() {
            self.joining_state = Some(JoiningState::New);
            info!("[{}] joins an empty log in round {}", self.node_id, round);
            return self.vote();
        }

        self.tally.extend(prefix.iter());
        let verdict = self.tally.verdict();

        if verdict.consensus {
            self.joining_state = Some(JoiningState::Finished);
            self.elected_leader = verdict.value;
            info!(
                "[{}] joins finished round {} led by {}",
                self.node_id,
                round,
                self.elected_leader.as_deref().unwrap_or("nobody")
            );
            self.start_listener()
        } else {
            self.joining_state = Some(JoiningState::Ongoing);
            info!("[{}] joins ongoing round {}", self.node_id, round);
            self.vote()
        }
    }

    /// Handles one record read after the candidate joined.
    pub fn handle(&mut self, raw: &str) -> Result<(), ElectionError> {
        let (round, body) = match parse(raw)? {
            Record::Check(_) => return Ok(()),
            Record::Round { round, body } => (round, body),
        };

        if Some(round) == self.round.checked_add(1) {
            self.advance_round(round)?;
        }

        match body {
            Body::Alive(leader) => {
                if round != self.round {
                    return Err(ElectionError::violation(
                        self.round,
                        raw,
                        "heartbeat outside of the current round",
                    ));
                }

                debug!("[{}] heartbeat of {} in round {}", self.node_id, leader, round);
                if let Some(listener) = self.listener.as_ref() {
                    listener.wake();
                }
                Ok(())
            }
            Body::Statement(statement) => {
                if round != self.round {
                    return Err(ElectionError::violation(
                        self.round,
                        raw,
                        "statement outside of the current and the next round",
                    ));
                }

                self.on_statement(raw, statement)
            }
        }
    }

    fn on_statement(&mut self, raw: &str, statement: Statement) -> Result<(), ElectionError> {
        if self.elected_leader.is_some() {
            warn!(
                "[{}] round {} is decided, dropping duplicate `{}`",
                self.node_id, self.round, raw
            );
            return Ok(());
        }

        self.tally.apply(&statement);
        let verdict = self.tally.verdict();

        if !verdict.consensus && verdict.is_first_candidate(&self.node_id) && !self.timeout_counted {
            self.timeout_counted = true;
            self.close_poll()
        } else if verdict.consensus {
            self.on_consensus(verdict)
        } else {
            Ok(())
        }
    }

    fn close_poll(&mut self) -> Result<(), ElectionError> {
        info!(
            "[{}] first candidate of round {}, closing the poll in {:?}",
            self.node_id, self.round, self.config.poll_close_delay
        );

        // late voters get this long to be counted
        thread::sleep(self.config.poll_close_delay);

        let close_poll = Record::close_poll(self.round);
        append_retrying(&self.node_id, &self.producer, &close_poll, &self.terminate)?;
        info!("[{}] closed the poll of round {}", self.node_id, self.round);
        Ok(())
    }

    fn on_consensus(&mut self, verdict: Verdict) -> Result<(), ElectionError> {
        if self.listener.is_some() || self.sender.is_some() {
            return Ok(());
        }

        match verdict.value {
            Some(leader) if leader == self.node_id => {
                info!("[{}] elected leader of round {}", self.node_id, self.round);
                self.elected_leader = Some(leader);
                self.sender = Some(HeartbeatSender::spawn(
                    self.node_id.clone(),
                    self.round,
                    self.config.heartbeat_interval,
                    self.producer.clone(),
                    self.terminate.clone(),
                ));
                Ok(())
            }
            Some(leader) => {
                info!("[{}] {} leads round {}", self.node_id, leader, self.round);
                self.elected_leader = Some(leader);
                self.start_listener()
            }
            None => {
                warn!("[{}] round {} closed without any vote", self.node_id, self.round);
                self.start_listener()
            }
        }
    }

    fn start_listener(&mut self) -> Result<(), ElectionError> {
        let next_round = self.round.checked_add(1).ok_or_else(|| {
            ElectionError::violation(self.round, self.round.to_string(), "no round after this one")
        })?;

        let next_vote = Record::vote(next_round, self.node_id.as_str(), self.ranks.next_rank());
        let election_timeout = self
            .config
            .random_election_timeout(&mut rand::thread_rng());

        self.listener = Some(HeartbeatListener::spawn(
            self.node_id.clone(),
            self.round,
            election_timeout,
            next_vote,
            self.producer.clone(),
            self.terminate.clone(),
        ));
        Ok(())
    }

    /// Moves to `round` once its first record is read.
    fn advance_round(&mut self, round: Round) -> Result<(), ElectionError> {
        let mut opened_by_self = false;

        if let Some(listener) = self.listener.take() {
            if listener.set_late_to_timeout() {
                info!(
                    "[{}] late to timeout, round {} was opened by another peer",
                    self.node_id, round
                );
            }
            opened_by_self = listener.join() == ListenerExit::Fired;
        }

        if let Some(sender) = self.sender.take() {
            warn!("[{}] deposed as leader of round {}", self.node_id, self.round);
            sender.stop();
        }

        self.clean_round(round);

        if opened_by_self {
            Ok(())
        } else {
            self.vote()
        }
    }

    fn clean_round(&mut self, round: Round) {
        self.round = round;
        self.tally = Tally::new();
        self.joining_state = None;
        self.timeout_counted = false;
        self.elected_leader = None;
        info!("[{}] cleaned round, now in round {}", self.node_id, round);
    }

    fn vote(&mut self) -> Result<(), ElectionError> {
        let rank = self.ranks.next_rank();
        let vote = Record::vote(self.round, self.node_id.as_str(), rank);
        append_retrying(&self.node_id, &self.producer, &vote, &self.terminate)?;
        info!("[{}] voted in round {} with rank {}", self.node_id, self.round, rank);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.set_late_to_timeout();
            listener.join();
        }

        if let Some(sender) = self.sender.take() {
            sender.stop();
        }

        info!("[{}] terminated in round {}", self.node_id, self.round);
    }
}

fn parse(raw: &str) -> Result<Record, ElectionError> {
    Record::parse(raw).map_err(|err| ElectionError::Record(raw.to_string(), err))
}

/// A candidate running on its own thread.
pub struct CandidateHandle {
    node_id: String,
    terminate: Arc<AtomicBool>,
    join: Option<JoinHandle<Result<(), ElectionError>>>,
}

impl CandidateHandle {
    pub fn node_id(&self) -> &str {
        self.node_id.as_str()
    }

    /// Asks the candidate to stop without waiting for it.
    pub fn terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
    }

    /// True once the candidate thread has returned, by itself or after
    /// [`terminate`](CandidateHandle::terminate).
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |join| join.is_finished())
    }

    /// Waits for the candidate. `None` if its thread panicked.
    pub fn join(mut self) -> Option<Result<(), ElectionError>> {
        self.join.take().and_then(|join| join.join().ok())
    }

    /// Terminates the candidate and waits for it.
    pub fn stop(self) -> Option<Result<(), ElectionError>> {
        self.terminate();
        self.join()
    }
}

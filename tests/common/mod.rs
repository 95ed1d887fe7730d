#![allow(dead_code)]

use std::collections::BTreeMap;
use std::thread::sleep;
use std::time::{Duration, Instant};

use logvote::candidate::ScriptedRanks;
use logvote::observer::ObserverThread;
use logvote::record::Body;
use logvote::transport::memory::MemoryProducer;
use logvote::verdict::{evaluate, Rank, Statement};
use logvote::{Candidate, CandidateHandle, Config, MemoryLog, Observer, ObserverHandle, Record, Round};

pub const DEADLINE: Duration = Duration::from_secs(10);

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Timings short enough for tests, with the same proportions as the defaults.
pub fn fast_config() -> Config {
    Config {
        poll_close_delay: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(20),
        election_timeout: Duration::from_millis(150),
        election_timeout_jitter: Duration::from_millis(60),
        poll_timeout: Duration::from_millis(5),
    }
}

pub fn wait_until<F: FnMut() -> bool>(what: &str, mut condition: F) {
    let deadline = Instant::now() + DEADLINE;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(5));
    }
}

/// Peers sharing one in-memory log, followed by an observer.
pub struct Cluster {
    pub log: MemoryLog,
    pub config: Config,
    observer: Option<ObserverThread>,
}

impl Cluster {
    pub fn new(config: Config) -> Self {
        init_logger();

        let log = MemoryLog::new();
        let observer = Observer::new().spawn(log.consumer(), config.poll_timeout);

        Cluster {
            log,
            config,
            observer: Some(observer),
        }
    }

    pub fn observer(&self) -> ObserverHandle {
        match self.observer.as_ref() {
            Some(observer) => observer.handle(),
            None => ObserverHandle::default(),
        }
    }

    pub fn candidate(&self, node_id: &str, rank: Rank) -> Candidate<MemoryProducer, ScriptedRanks> {
        Candidate::with_ranks(
            node_id,
            self.log.producer(),
            ScriptedRanks::constant(rank),
            self.config.clone(),
        )
    }

    pub fn start(&self, node_id: &str, rank: Rank) -> CandidateHandle {
        self.candidate(node_id, rank).spawn(self.log.consumer())
    }

    pub fn records(&self) -> Vec<Record> {
        self.log
            .snapshot()
            .iter()
            .map(|raw| Record::parse(raw).unwrap())
            .collect()
    }

    pub fn wait_for_record(&self, record: &Record) {
        let raw = record.to_string();
        wait_until(&raw, || self.log.snapshot().contains(&raw));
    }

    pub fn wait_for_leader(&self, round: Round) -> String {
        let observer = self.observer();
        wait_until(&format!("leader of round {}", round), || {
            observer.leader_of(round).is_some()
        });
        observer.leader_of(round).unwrap_or_default()
    }
}

impl Drop for Cluster {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.stop();
        }
    }
}

pub fn votes_of(records: &[Record], round: Round, node_id: &str) -> usize {
    records
        .iter()
        .filter(|record| match record {
            Record::Round {
                round: r,
                body: Body::Statement(Statement::Vote(ballot)),
            } => *r == round && ballot.client == node_id,
            _ => false,
        })
        .count()
}

/// Checks the safety properties of a whole log and returns the leader of every
/// decided round.
pub fn check_log(records: &[Record]) -> BTreeMap<Round, String> {
    let mut statements: BTreeMap<Round, Vec<Statement>> = BTreeMap::new();
    let mut leaders = BTreeMap::new();
    let mut voters: BTreeMap<(Round, String), usize> = BTreeMap::new();

    for record in records {
        let (round, body) = match record {
            Record::Check(_) => continue,
            Record::Round { round, body } => (*round, body),
        };

        let round_statements = statements.entry(round).or_default();
        let closed = round_statements.contains(&Statement::ClosePoll);

        match body {
            Body::Statement(statement) => {
                if statement == &Statement::ClosePoll {
                    assert!(!closed, "second close-poll marker in round {}", round);
                }
                if let Statement::Vote(ballot) = statement {
                    let votes = voters.entry((round, ballot.client.clone())).or_default();
                    *votes += 1;
                    assert_eq!(*votes, 1, "{} voted twice in round {}", ballot.client, round);
                }
                round_statements.push(statement.clone());
            }
            Body::Alive(sender) => {
                assert!(closed, "heartbeat of {} before the close of round {}", sender, round);

                let verdict = evaluate(round_statements.iter());
                assert_eq!(
                    verdict.value.as_deref(),
                    Some(sender.as_str()),
                    "heartbeat of a peer that did not win round {}",
                    round
                );
                leaders.insert(round, sender.clone());
            }
        }
    }

    leaders
}

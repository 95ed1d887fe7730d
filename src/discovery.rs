//! Round discovery of a starting peer.
//!
//! A peer appends a check record carrying a digest only it knows, then replays
//! the log from the start. Everything read before its own check record was
//! appended before the peer started: from that prefix it keeps the highest round
//! and the statements of that round.

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::record::{Body, Record, Round};
use crate::verdict::Statement;

pub const CHECK_KEY_LEN: usize = 16;

/// Random alphanumeric key of a check record.
pub fn check_key<R: Rng>(random: &mut R) -> String {
    random
        .sample_iter(&Alphanumeric)
        .take(CHECK_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Hex SHA-256 digest of a check key: 64 characters.
pub fn check_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[derive(Debug)]
pub struct RoundDiscovery {
    check: Record,
    round: Round,
    prefix: Vec<Statement>,
}

impl RoundDiscovery {
    pub fn new() -> Self {
        RoundDiscovery::with_key(&check_key(&mut rand::thread_rng()))
    }

    pub fn with_key(key: &str) -> Self {
        RoundDiscovery {
            check: Record::check(check_digest(key)),
            round: 0,
            prefix: vec![],
        }
    }

    /// Record to append before replaying the log.
    pub fn check_record(&self) -> &Record {
        &self.check
    }

    /// Feeds the next replayed record. Returns the round to join and its
    /// statements once the own check record comes back.
    pub fn observe(&mut self, record: &Record) -> Option<(Round, Vec<Statement>)> {
        match record {
            Record::Check(_) if record == &self.check => {
                Some((self.round, std::mem::take(&mut self.prefix)))
            }
            Record::Check(_) => None,
            Record::Round { body: Body::Alive(_), .. } => None,
            Record::Round {
                round,
                body: Body::Statement(statement),
            } => {
                if *round > self.round {
                    self.round = *round;
                    self.prefix.clear();
                }

                if *round == self.round {
                    self.prefix.push(statement.clone());
                }

                None
            }
        }
    }
}

impl Default for RoundDiscovery {
    fn default() -> Self {
        RoundDiscovery::new()
    }
}

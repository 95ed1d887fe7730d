//! Records of the shared log.
//!
//! ```text
//! record   := check | payload
//! check    := "CHECK," hex64
//! payload  := round "," body
//! body     := vote | closepoll | heartbeat
//! heartbeat:= "ALIVE," id
//! ```
//!
//! Records are split at their first comma only, the remainder being the body.


use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

use crate::verdict::{Rank, ScriptError, Statement};

pub type Round = u64;

pub const CHECK: &str = "CHECK";
pub const ALIVE: &str = "ALIVE";

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Record {
    /// Per-peer fence appended on startup.
    Check(String),
    Round { round: Round, body: Body },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Body {
    Statement(Statement),
    /// Heartbeat of the leader of the round.
    Alive(String),
}

#[derive(Debug, Eq, PartialEq)]
pub enum RecordError {
    // No comma between round and body
    MissingSeparator,
    // Round is not a non-negative integer
    BadRound(ParseIntError),
    // `ALIVE` without a node id
    BadHeartbeat,
    // Body is neither a vote nor a close-poll statement
    Script(ScriptError),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSeparator => write!(f, "record has no `,` separator"),
            Self::BadRound(err) => write!(f, "bad round number: {}", err),
            Self::BadHeartbeat => write!(f, "heartbeat without node id"),
            Self::Script(err) => write!(f, "bad record body: {}", err),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<ParseIntError> for RecordError {
    fn from(err: ParseIntError) -> Self {
        Self::BadRound(err)
    }
}

impl From<ScriptError> for RecordError {
    fn from(err: ScriptError) -> Self {
        Self::Script(err)
    }
}

impl Record {
    pub fn parse(raw: &str) -> Result<Record, RecordError> {
        let (head, body) = raw
            .split_once(',')
            .ok_or(RecordError::MissingSeparator)?;

        if head == CHECK {
            return Ok(Record::Check(body.to_string()));
        }

        let round = head.trim().parse::<Round>()?;

        let body = if body.starts_with(ALIVE) {
            match body.split_once(',') {
                Some((_, leader)) if !leader.is_empty() => Body::Alive(leader.to_string()),
                _ => return Err(RecordError::BadHeartbeat),
            }
        } else {
            Body::Statement(Statement::parse(body)?)
        };

        Ok(Record::Round { round, body })
    }

    pub fn check<T: Into<String>>(digest: T) -> Self {
        Record::Check(digest.into())
    }

    pub fn vote<T: Into<String>>(round: Round, client: T, rank: Rank) -> Self {
        Record::Round {
            round,
            body: Body::Statement(Statement::vote(client, rank)),
        }
    }

    pub fn close_poll(round: Round) -> Self {
        Record::Round {
            round,
            body: Body::Statement(Statement::ClosePoll),
        }
    }

    pub fn alive<T: Into<String>>(round: Round, leader: T) -> Self {
        Record::Round {
            round,
            body: Body::Alive(leader.into()),
        }
    }

    pub fn round(&self) -> Option<Round> {
        match self {
            Record::Check(_) => None,
            Record::Round { round, .. } => Some(*round),
        }
    }

    pub fn is_check(&self) -> bool {
        matches!(self, Record::Check(_))
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Statement(statement) => write!(f, "{}", statement),
            Body::Alive(leader) => write!(f, "{},{}", ALIVE, leader),
        }
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Check(digest) => write!(f, "{},{}", CHECK, digest),
            Record::Round { round, body } => write!(f, "{},{}", round, body),
        }
    }
}

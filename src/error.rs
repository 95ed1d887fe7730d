use std::fmt::{Display, Formatter};

use crate::record::{RecordError, Round};
use crate::transport::TransportError;

#[derive(Debug)]
pub enum ElectionError {
    // A record that no correct peer could have appended at this point of the log
    ProtocolViolation {
        round: Round,
        record: String,
        reason: String,
    },
    // A record that does not follow the wire grammar
    Record(String, RecordError),
    Transport(TransportError),
}

impl ElectionError {
    pub fn violation<R: Into<String>, S: Into<String>>(round: Round, record: R, reason: S) -> Self {
        ElectionError::ProtocolViolation {
            round,
            record: record.into(),
            reason: reason.into(),
        }
    }

    /// True for errors caused by the content of the log, as opposed to the log transport.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, ElectionError::Transport(_))
    }
}

impl Display for ElectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProtocolViolation {
                round,
                record,
                reason,
            } => write!(
                f,
                "protocol violation in round {} on record `{}`: {}",
                round, record, reason
            ),
            Self::Record(record, err) => write!(f, "malformed record `{}`: {}", record, err),
            Self::Transport(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ElectionError {}

impl From<TransportError> for ElectionError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

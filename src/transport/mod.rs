//! Boundary between the election core and the shared log.
//!
//! A log is one ordered topic of records. Producers append to it, consumers
//! read it from the beginning, in append order, without gap.

pub mod memory;
pub mod remote;

use std::fmt::{Display, Formatter};
use std::time::Duration;

use crate::protocol::ProtocolError;
use crate::record::Record;

pub use memory::MemoryLog;
pub use remote::RemoteLog;

pub trait LogProducer: Clone + Send + 'static {
    fn append_raw(&self, record: &str) -> Result<(), TransportError>;

    fn append(&self, record: &Record) -> Result<(), TransportError> {
        self.append_raw(&record.to_string())
    }
}

pub trait LogConsumer: Send {
    /// Waits at most `timeout` for new records and returns them in append order.
    /// An empty batch is not an error.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, TransportError>;

    fn close(&mut self) {}
}

/// Hands out producers and consumers of one topic.
pub trait LogTransport: Send + Sync {
    type Producer: LogProducer;
    type Consumer: LogConsumer + 'static;

    fn producer(&self) -> Result<Self::Producer, TransportError>;
    fn consumer(&self) -> Result<Self::Consumer, TransportError>;
}

#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    // the other end of the log went away
    Disconnected,
    // error reply of the log broker
    Broker(String),
    Protocol(ProtocolError),
    UnexpectedReply(String),
}

impl TransportError {
    /// Errors after which the handle can still be used.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            TransportError::Broker(_) => true,
            _ => false,
        }
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Io(err) => write!(f, "log i/o error: {}", err),
            TransportError::Disconnected => write!(f, "log disconnected"),
            TransportError::Broker(msg) => write!(f, "log broker replied: {}", msg),
            TransportError::Protocol(err) => write!(f, "log protocol error: {}", err),
            TransportError::UnexpectedReply(reply) => {
                write!(f, "unexpected log broker reply: {}", reply)
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

impl From<ProtocolError> for TransportError {
    fn from(err: ProtocolError) -> Self {
        TransportError::Protocol(err)
    }
}

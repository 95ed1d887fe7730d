//! Leader election for a small group of peers that coordinate only through one
//! shared, ordered, append-only log.
//!
//! Every action of a peer is a record of the log: its startup fence, its vote
//! in a round, the close of a poll, the heartbeats of the leader. Every peer
//! folds the same records in the same order and therefore agrees on the leader
//! of every round.

#[cfg(test)]
#[macro_use]
extern crate serial_test;

pub mod broker;
pub mod candidate;
pub mod chaos;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod observer;
pub mod protocol;
pub mod record;
pub mod transport;
pub mod verdict;

pub use broker::{Broker, BrokerOptions, BrokerState};
pub use candidate::{Candidate, CandidateHandle, JoiningState};
pub use config::{ChaosConfig, Config};
pub use error::ElectionError;
pub use observer::{Observer, ObserverHandle};
pub use record::{Record, Round};
pub use transport::{LogConsumer, LogProducer, LogTransport, MemoryLog, RemoteLog};
pub use verdict::{evaluate, Verdict};

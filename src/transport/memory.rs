use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mpb::MPB;

use super::{LogConsumer, LogProducer, LogTransport, TransportError};

/// In-process log: a replaying broadcast bus of records.
#[derive(Clone)]
pub struct MemoryLog {
    bus: Arc<MPB<String>>,
}

#[derive(Clone)]
pub struct MemoryProducer {
    sender: Sender<String>,
}

pub struct MemoryConsumer {
    receiver: Option<Receiver<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        MemoryLog {
            bus: Arc::new(MPB::replayable()),
        }
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            sender: self.bus.sender(),
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            receiver: Some(self.bus.receiver()),
        }
    }

    /// Every record dispatched so far.
    pub fn snapshot(&self) -> Vec<String> {
        self.bus.receiver().try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.bus.history_len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryLog {
    fn default() -> Self {
        MemoryLog::new()
    }
}

impl LogTransport for MemoryLog {
    type Producer = MemoryProducer;
    type Consumer = MemoryConsumer;

    fn producer(&self) -> Result<MemoryProducer, TransportError> {
        Ok(MemoryLog::producer(self))
    }

    fn consumer(&self) -> Result<MemoryConsumer, TransportError> {
        Ok(MemoryLog::consumer(self))
    }
}

impl LogProducer for MemoryProducer {
    fn append_raw(&self, record: &str) -> Result<(), TransportError> {
        self.sender
            .send(record.to_string())
            .map_err(|_| TransportError::Disconnected)
    }
}

impl LogConsumer for MemoryConsumer {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, TransportError> {
        let receiver = match self.receiver.as_ref() {
            Some(receiver) => receiver,
            None => return Err(TransportError::Disconnected),
        };

        match receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut records = vec![first];
                records.extend(receiver.try_iter());
                Ok(records)
            }
            Err(RecvTimeoutError::Timeout) => Ok(vec![]),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn close(&mut self) {
        // dropping the receiver unsubscribes it from the bus
        self.receiver = None;
    }
}

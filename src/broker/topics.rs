use std::collections::HashMap;

pub type Offset = u64;

/// Storage of the broker: named, append-only sequences of records.
pub trait TopicStorage {
    /// Appends `record` at the end of `topic`, creating it if needed, and returns its offset.
    fn append(&mut self, topic: &[u8], record: &[u8]) -> Offset;
    /// Returns at most `max` records of `topic` starting at `offset`.
    fn read(&self, topic: &[u8], offset: Offset, max: usize) -> Vec<&[u8]>;
    /// Returns the number of records of `topic`.
    fn len(&self, topic: &[u8]) -> u64;
    fn topics(&self) -> usize;
}

#[derive(Default)]
pub struct InMemoryTopics {
    topics: HashMap<Vec<u8>, Vec<Vec<u8>>>,
}

impl InMemoryTopics {
    pub fn new() -> Self {
        InMemoryTopics::default()
    }
}

impl TopicStorage for InMemoryTopics {
    fn append(&mut self, topic: &[u8], record: &[u8]) -> Offset {
        let records = self.topics.entry(topic.to_vec()).or_insert_with(Vec::new);
        records.push(record.to_vec());
        (records.len() - 1) as Offset
    }

    fn read(&self, topic: &[u8], offset: Offset, max: usize) -> Vec<&[u8]> {
        match self.topics.get(topic) {
            Some(records) => records
                .iter()
                .skip(offset as usize)
                .take(max)
                .map(|record| record.as_slice())
                .collect(),
            None => vec![],
        }
    }

    fn len(&self, topic: &[u8]) -> u64 {
        self.topics
            .get(topic)
            .map(|records| records.len() as u64)
            .unwrap_or(0)
    }

    fn topics(&self) -> usize {
        self.topics.len()
    }
}

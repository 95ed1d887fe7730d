//! Verdict evaluation: the deterministic fold every peer and the observer run over
//! the payloads of one round.
//!
//! The fold starts from an empty tally (`nodeRanks = []`, no timeout). A vote
//! statement appends its ballot unless the poll is already closed; a close-poll
//! statement closes it. Once closed, the round has reached consensus and the
//! leader is the ballot with the highest rank, the earliest one winning ties.

#[cfg(test)]
mod tests;

mod script;

pub use script::{ScriptError, ScriptErrorKind, Statement};

/// Rank drawn by a peer for one round, uniform in [`RANK_MIN`, `RANK_MAX`].
pub type Rank = u32;

pub const RANK_MIN: Rank = 1;
pub const RANK_MAX: Rank = 100;

/// A vote that made it into the tally.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Ballot {
    pub client: String,
    pub rank: Rank,
}

/// The outcome of folding a round prefix.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Verdict {
    /// True once the poll is closed.
    pub consensus: bool,
    /// Elected leader, if the poll is closed and at least one ballot counted.
    pub value: Option<String>,
    /// Author of the first counted ballot: the peer in charge of closing the poll.
    pub first_candidate: Option<String>,
    pub timeout: bool,
}

impl Verdict {
    pub fn is_first_candidate(&self, node_id: &str) -> bool {
        self.first_candidate.as_deref() == Some(node_id)
    }
}

/// Accumulator of one round.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Tally {
    node_ranks: Vec<Ballot>,
    timeout: bool,
}

impl Tally {
    pub fn new() -> Self {
        Tally::default()
    }

    pub fn apply(&mut self, statement: &Statement) {
        match statement {
            Statement::Vote(ballot) => {
                if !self.timeout {
                    self.node_ranks.push(ballot.clone());
                }
            }
            Statement::ClosePoll => self.timeout = true,
        }
    }

    pub fn extend<'a, I>(&mut self, statements: I)
    where
        I: IntoIterator<Item = &'a Statement>,
    {
        statements
            .into_iter()
            .for_each(|statement| self.apply(statement));
    }

    /// Folds concatenated legacy payloads, as found on the wire.
    pub fn extend_script(&mut self, script: &str) -> Result<(), ScriptError> {
        let statements = Statement::parse_script(script)?;
        self.extend(statements.iter());
        Ok(())
    }

    pub fn ballots(&self) -> &[Ballot] {
        self.node_ranks.as_slice()
    }

    pub fn is_closed(&self) -> bool {
        self.timeout
    }

    pub fn verdict(&self) -> Verdict {
        let mut verdict = Verdict {
            consensus: false,
            value: None,
            first_candidate: self.node_ranks.first().map(|b| b.client.clone()),
            timeout: self.timeout,
        };

        if self.timeout {
            verdict.consensus = true;

            // strict `>` keeps the earliest ballot among equal ranks
            let mut max_rank = 0;
            for ballot in self.node_ranks.iter() {
                if ballot.rank > max_rank {
                    verdict.value = Some(ballot.client.clone());
                    max_rank = ballot.rank;
                }
            }
        }

        verdict
    }
}

/// Evaluates a round prefix from scratch.
pub fn evaluate<'a, I>(prefix: I) -> Verdict
where
    I: IntoIterator<Item = &'a Statement>,
{
    let mut tally = Tally::new();
    tally.extend(prefix);
    tally.verdict()
}

/// Evaluates concatenated legacy payloads.
pub fn evaluate_script(script: &str) -> Result<Verdict, ScriptError> {
    let mut tally = Tally::new();
    tally.extend_script(script)?;
    Ok(tally.verdict())
}

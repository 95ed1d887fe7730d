use std::fmt::{Display, Formatter};
use std::num::ParseIntError;

use super::{Ballot, Rank};

/// One statement of a round payload.
///
/// The wire form is a snippet of script kept for compatibility with older
/// peers; it is parsed here and never executed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Statement {
    /// `if(!result.timeout){nodeRanks.push({client:"<id>",rank:<n>});}`
    Vote(Ballot),
    /// `result.timeout = true;`
    ClosePoll,
}

#[derive(Debug, Eq, PartialEq)]
pub enum ScriptErrorKind {
    // Script ended in the middle of a statement
    UnexpectedEnd,
    // Token that can not start or continue a statement
    UnexpectedToken(String),
    // Rank is not a non-negative integer
    BadRank(ParseIntError),
    // Exactly one statement was expected
    StatementCount(usize),
}

#[derive(Debug, Eq, PartialEq)]
pub struct ScriptError {
    pub kind: ScriptErrorKind,
    pub position: usize,
}

impl ScriptError {
    fn new(kind: ScriptErrorKind, position: usize) -> Self {
        ScriptError { kind, position }
    }
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ScriptErrorKind::UnexpectedEnd => {
                write!(f, "unexpected end of script at {}", self.position)
            }
            ScriptErrorKind::UnexpectedToken(found) => {
                write!(f, "unexpected `{}` at {}", found, self.position)
            }
            ScriptErrorKind::BadRank(err) => write!(f, "bad rank at {}: {}", self.position, err),
            ScriptErrorKind::StatementCount(count) => {
                write!(f, "expected exactly one statement, found {}", count)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

const VOTE_HEAD: &[&str] = &[
    "if", "(", "!", "result", ".", "timeout", ")", "{", "nodeRanks", ".", "push", "(", "{",
    "client", ":",
];
const CLOSE_POLL: &[&str] = &["result", ".", "timeout", "=", "true"];

impl Statement {
    /// Parses a whole script, i.e. any number of concatenated statements.
    pub fn parse_script(script: &str) -> Result<Vec<Statement>, ScriptError> {
        let mut cursor = Cursor::new(script);
        let mut statements = vec![];

        while !cursor.at_end() {
            statements.push(cursor.statement()?);
        }

        Ok(statements)
    }

    /// Parses a payload that must hold exactly one statement.
    pub fn parse(payload: &str) -> Result<Statement, ScriptError> {
        let mut statements = Statement::parse_script(payload)?;

        match statements.len() {
            1 => Ok(statements.remove(0)),
            count => Err(ScriptError::new(ScriptErrorKind::StatementCount(count), 0)),
        }
    }

    pub fn vote<T: Into<String>>(client: T, rank: Rank) -> Self {
        Statement::Vote(Ballot {
            client: client.into(),
            rank,
        })
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Vote(ballot) => write!(
                f,
                "if(!result.timeout){{nodeRanks.push({{client:\"{}\",rank:{}}});}}",
                ballot.client, ballot.rank
            ),
            Statement::ClosePoll => write!(f, "result.timeout = true;"),
        }
    }
}

struct Cursor<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Cursor { input, position: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.position..]
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.position += rest.len() - rest.trim_start().len();
    }

    fn at_end(&mut self) -> bool {
        self.skip_whitespace();
        self.rest().is_empty()
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_whitespace();
        if self.rest().starts_with(token) {
            self.position += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ScriptError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn expect_all(&mut self, tokens: &[&str]) -> Result<(), ScriptError> {
        tokens.iter().try_for_each(|token| self.expect(token))
    }

    fn unexpected(&self) -> ScriptError {
        match self.rest().chars().next() {
            Some(c) => ScriptError::new(
                ScriptErrorKind::UnexpectedToken(c.to_string()),
                self.position,
            ),
            None => ScriptError::new(ScriptErrorKind::UnexpectedEnd, self.position),
        }
    }

    fn quoted(&mut self) -> Result<&'a str, ScriptError> {
        self.expect("\"")?;
        let rest = self.rest();

        match rest.find('"') {
            Some(end) => {
                self.position += end + 1;
                Ok(&rest[..end])
            }
            None => Err(ScriptError::new(
                ScriptErrorKind::UnexpectedEnd,
                self.input.len(),
            )),
        }
    }

    fn integer(&mut self) -> Result<Rank, ScriptError> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or_else(|| rest.len());

        let rank = rest[..len]
            .parse::<Rank>()
            .map_err(|err| ScriptError::new(ScriptErrorKind::BadRank(err), self.position))?;
        self.position += len;

        Ok(rank)
    }

    fn statement(&mut self) -> Result<Statement, ScriptError> {
        self.skip_whitespace();

        if self.rest().starts_with("if") {
            self.vote()
        } else if self.rest().starts_with("result") {
            self.expect_all(CLOSE_POLL)?;
            self.eat(";");
            Ok(Statement::ClosePoll)
        } else {
            Err(self.unexpected())
        }
    }

    fn vote(&mut self) -> Result<Statement, ScriptError> {
        self.expect_all(VOTE_HEAD)?;
        let client = self.quoted()?;
        self.expect_all(&[",", "rank", ":"])?;
        let rank = self.integer()?;
        self.expect_all(&["}", ")"])?;
        // older peers wrote `})};` instead of `});}` when opening a round
        self.eat(";");
        self.expect("}")?;
        self.eat(";");

        Ok(Statement::vote(client, rank))
    }
}

use std::fmt::{Display, Formatter};
use std::num::ParseIntError;
use std::str::Utf8Error;

use crate::protocol::{ProtocolError, Resp};

use super::topics::Offset;

type Topic = Vec<u8>;
type Record = Vec<u8>;

/// Records returned by a `FETCH` without explicit maximum.
pub const DEFAULT_FETCH_MAX: usize = 512;

#[derive(Debug, PartialEq)]
pub enum Command {
    Append(Topic, Record),
    Fetch(Topic, Offset, usize),
    Len(Topic),
    Ping,
    Quit,
}

#[derive(Debug)]
pub enum CommandError {
    // Wrong number of arguments, holds command
    ArgNumber,
    // Could not convert bytes to UTF8
    BadString(Utf8Error),
    // Could not parse string for a u64
    IntParse(ParseIntError),
    // Command is not supported by the broker
    NotSupported(String),
    ProtocolParse(ProtocolError),
    InvalidCommand,
    CommandNotFound,
}

impl Display for CommandError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ArgNumber => {
                write!(f, "wrong number of arguments for command")
            }
            Self::BadString(e) => write!(f, "{}", e),
            Self::IntParse(e) => write!(f, "{}", e),
            Self::NotSupported(cmd) => {
                write!(f, "command {} not supported by logbroker", cmd)
            }
            Self::ProtocolParse(err) => write!(f, "{}", err),
            Self::InvalidCommand => write!(f, "invalid command"),
            Self::CommandNotFound => write!(f, "command not found"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<Utf8Error> for CommandError {
    fn from(err: Utf8Error) -> Self {
        Self::BadString(err)
    }
}

impl From<ParseIntError> for CommandError {
    fn from(err: ParseIntError) -> Self {
        Self::IntParse(err)
    }
}

impl From<ProtocolError> for CommandError {
    fn from(err: ProtocolError) -> Self {
        Self::ProtocolParse(err)
    }
}

fn get_bytes_vec(resp: Option<&Resp>) -> Result<Vec<u8>, CommandError> {
    match resp {
        Some(Resp::String(x)) | Some(Resp::BulkString(x)) => Ok(x.to_vec()),
        _ => Err(CommandError::ArgNumber),
    }
}

fn parse_u64(bytes: Vec<u8>) -> Result<u64, CommandError> {
    let number = std::str::from_utf8(&bytes[..])?;
    Ok(number.parse::<u64>()?)
}

impl Command {
    pub fn parse(v: Vec<Resp>) -> Result<Self, CommandError> {
        use Command::*;
        use CommandError::*;

        let name = match v.first() {
            Some(Resp::BulkString(command)) | Some(Resp::String(command)) => {
                command.to_ascii_uppercase()
            }
            _ => return Err(InvalidCommand),
        };

        let command = match name.as_slice() {
            b"APPEND" => {
                let topic = get_bytes_vec(v.get(1))?;
                let record = get_bytes_vec(v.get(2))?;

                Append(topic, record)
            }
            b"FETCH" => {
                let topic = get_bytes_vec(v.get(1))?;
                let offset = get_bytes_vec(v.get(2)).and_then(parse_u64)?;
                let max = match v.get(3) {
                    Some(_) => get_bytes_vec(v.get(3)).and_then(parse_u64)? as usize,
                    None => DEFAULT_FETCH_MAX,
                };

                Fetch(topic, offset, max)
            }
            b"LEN" => Len(get_bytes_vec(v.get(1))?),
            b"PING" => Ping,
            b"QUIT" => Quit,
            b"SET" | b"GET" | b"DEL" | b"INFO" => {
                return Err(NotSupported(String::from_utf8_lossy(&name).to_string()))
            }
            _ => return Err(CommandNotFound),
        };

        let arity = match command {
            Append(..) => 3,
            Fetch(..) => v.len().max(3).min(4),
            Len(_) => 2,
            Ping | Quit => 1,
        };

        if v.len() != arity {
            return Err(ArgNumber);
        }

        Ok(command)
    }
}

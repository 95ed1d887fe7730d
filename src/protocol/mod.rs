//! RESP, the serialization protocol spoken between log clients and the broker.


pub mod parser;
pub mod response;

pub type Result<'a> = std::result::Result<(Resp<'a>, &'a [u8]), ProtocolError>;

pub const OK: &[u8; 5] = b"+OK\r\n";
pub const PONG: &[u8; 7] = b"+PONG\r\n";
pub const NIL: &[u8; 5] = b"$-1\r\n";

#[derive(Debug, Eq, PartialEq)]
pub enum Resp<'a> {
    String(&'a [u8]),
    Error(&'a [u8]),
    Integer(&'a [u8]),
    BulkString(&'a [u8]),
    Array(Vec<Resp<'a>>),
    Nil,
}

impl<'a> Resp<'a> {
    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            Resp::String(x) | Resp::BulkString(x) | Resp::Error(x) | Resp::Integer(x) => {
                std::str::from_utf8(x).ok()
            }
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Resp::Integer(x) => std::str::from_utf8(x).ok()?.parse::<i64>().ok(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ProtocolErrorType {
    // Unknown symbol at index
    UnknownSymbol,
    // Attempting to parse an empty input
    EmptyInput,
    // Input ends before the frame does
    Incomplete,
    // Incorrect format detected
    IncorrectFormat,
    Other(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug)]
pub struct ProtocolError {
    err_type: ProtocolErrorType,
}

impl ProtocolError {
    fn unknown_symbol() -> Self {
        Self {
            err_type: ProtocolErrorType::UnknownSymbol,
        }
    }

    fn empty_input() -> Self {
        Self {
            err_type: ProtocolErrorType::EmptyInput,
        }
    }

    fn incomplete() -> Self {
        Self {
            err_type: ProtocolErrorType::Incomplete,
        }
    }

    fn incorrect_format() -> Self {
        Self {
            err_type: ProtocolErrorType::IncorrectFormat,
        }
    }

    pub fn err_type(&self) -> &ProtocolErrorType {
        &self.err_type
    }

    /// True when more bytes may turn the input into a valid frame.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self.err_type,
            ProtocolErrorType::EmptyInput | ProtocolErrorType::Incomplete
        )
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.err_type {
            ProtocolErrorType::UnknownSymbol => write!(f, "unknown symbol"),
            ProtocolErrorType::EmptyInput => write!(f, "empty input"),
            ProtocolErrorType::Incomplete => write!(f, "incomplete frame"),
            ProtocolErrorType::IncorrectFormat => write!(f, "incorrect format"),
            ProtocolErrorType::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<std::str::Utf8Error> for ProtocolError {
    fn from(from: std::str::Utf8Error) -> Self {
        Self {
            err_type: ProtocolErrorType::Other(Box::new(from)),
        }
    }
}

impl From<std::num::ParseIntError> for ProtocolError {
    fn from(from: std::num::ParseIntError) -> Self {
        Self {
            err_type: ProtocolErrorType::Other(Box::new(from)),
        }
    }
}

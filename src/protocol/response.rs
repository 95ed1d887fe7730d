use std::fmt::Display;

use super::{NIL, OK, PONG};

pub enum ResponseType {
    SimpleString(Vec<u8>),
    BulkString(Vec<u8>),
    Integer(i64),
    Nil,
}

pub struct Response {
    responses: ResponseInner,
}

enum ResponseInner {
    Single(ResponseType),
    Array(Vec<ResponseType>),
    Error(String),
    Okay,
    Pong,
    Quit,
}

impl ResponseType {
    // move out of the enum
    fn to_vec(&self) -> Vec<u8> {
        use ResponseType::*;
        match self {
            SimpleString(s) | BulkString(s) => s.clone(),
            Integer(num) => num.to_string().as_bytes().to_vec(),
            Nil => NIL.to_vec(),
        }
    }

    /// Move out of self and return bytes analogous to `format!("{}{}{}", symbol, data, CRLF)`
    pub fn get_formatted(self) -> Vec<u8> {
        use ResponseType::*;

        let symbol = match &self {
            SimpleString(_) => b'+',
            BulkString(_) => b'$',
            Integer(_) => b':',
            Nil => return self.to_vec(),
        };
        let mut bytes = self.to_vec();
        let mut reply =
            Vec::<u8>::with_capacity(bytes.len() + 3 /* 3 more bytes for symbol and /r/n */);
        reply.push(symbol);
        if symbol == b'$' {
            reply.extend_from_slice(bytes.len().to_string().as_bytes());
            reply.extend_from_slice(b"\r\n");
        }
        reply.append(&mut bytes);
        reply.extend_from_slice(b"\r\n");
        reply
    }
}

impl Response {
    pub fn okay() -> Self {
        Self {
            responses: ResponseInner::Okay,
        }
    }

    pub fn pong() -> Self {
        Self {
            responses: ResponseInner::Pong,
        }
    }

    pub fn quit() -> Self {
        Self {
            responses: ResponseInner::Quit,
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(self.responses, ResponseInner::Quit)
    }

    pub fn single(response: ResponseType) -> Self {
        Self {
            responses: ResponseInner::Single(response),
        }
    }

    pub fn array(responses: Vec<ResponseType>) -> Self {
        Self {
            responses: ResponseInner::Array(responses),
        }
    }

    pub fn error<E: Display>(error: E) -> Self {
        Self {
            responses: ResponseInner::Error(error.to_string()),
        }
    }

    pub fn reply(self) -> Vec<u8> {
        use ResponseInner::*;
        match self.responses {
            Okay | Quit => OK.to_vec(),
            Error(e) => format!("-ERR {}\r\n", e).into_bytes(),
            Pong => PONG.to_vec(),
            Single(single) => single.get_formatted(),
            Array(responses) => array_header(responses.len())
                .into_iter()
                .chain(responses.into_iter().flat_map(ResponseType::get_formatted))
                .collect(),
        }
    }
}

fn array_header(len: usize) -> Vec<u8> {
    format!("*{}\r\n", len).into_bytes()
}

/// Encodes a client request: an array of bulk strings.
pub fn request<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut request = array_header(args.len());
    for arg in args {
        request.append(&mut ResponseType::BulkString(arg.as_ref().to_vec()).get_formatted());
    }
    request
}

use super::{ProtocolError, Resp, Result};

const CRLF: &[u8; 2] = b"\r\n";

pub struct RespParser;

impl RespParser {
    /// Parses the frame at the start of `input` and returns it with the bytes
    /// that follow it.
    pub fn parse(input: &[u8]) -> Result {
        let (marker, rest) = input.split_first().ok_or_else(ProtocolError::empty_input)?;

        match *marker {
            b'+' => line(rest).map(|(text, rest)| (Resp::String(text), rest)),
            b'-' => line(rest).map(|(text, rest)| (Resp::Error(text), rest)),
            b':' => line(rest).map(|(digits, rest)| (Resp::Integer(digits), rest)),
            b'$' => bulk_string(rest),
            b'*' => array(rest),
            _ => Err(ProtocolError::unknown_symbol()),
        }
    }
}

fn line(input: &[u8]) -> std::result::Result<(&[u8], &[u8]), ProtocolError> {
    match input.windows(CRLF.len()).position(|window| window == CRLF) {
        Some(end) => Ok((&input[..end], &input[end + CRLF.len()..])),
        None => Err(ProtocolError::incomplete()),
    }
}

// `-1` is the nil length
fn length(input: &[u8]) -> std::result::Result<(Option<usize>, &[u8]), ProtocolError> {
    let (digits, rest) = line(input)?;

    match std::str::from_utf8(digits)?.parse::<i64>()? {
        -1 => Ok((None, rest)),
        len if len < 0 => Err(ProtocolError::incorrect_format()),
        len => Ok((Some(len as usize), rest)),
    }
}

fn bulk_string(input: &[u8]) -> Result {
    let (size, rest) = match length(input)? {
        (Some(size), rest) => (size, rest),
        (None, rest) => return Ok((Resp::Nil, rest)),
    };

    if rest.len() < size + CRLF.len() {
        return Err(ProtocolError::incomplete());
    }

    if &rest[size..size + CRLF.len()] != CRLF {
        return Err(ProtocolError::incorrect_format());
    }

    Ok((Resp::BulkString(&rest[..size]), &rest[size + CRLF.len()..]))
}

fn array(input: &[u8]) -> Result {
    let (count, mut rest) = match length(input)? {
        (Some(count), rest) => (count, rest),
        (None, rest) => return Ok((Resp::Nil, rest)),
    };

    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let (item, next) = RespParser::parse(rest)?;
        items.push(item);
        rest = next;
    }

    Ok((Resp::Array(items), rest))
}

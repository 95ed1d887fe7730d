use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::debug;

use crate::protocol::parser::RespParser;
use crate::protocol::response::request;
use crate::protocol::Resp;

use super::{LogConsumer, LogProducer, LogTransport, TransportError};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);
const FETCH_MAX: usize = 512;

/// Client of one topic of a log broker.
#[derive(Debug, Clone)]
pub struct RemoteLog {
    addr: String,
    topic: String,
    reply_timeout: Duration,
}

#[derive(Clone)]
pub struct RemoteProducer {
    connection: Arc<Mutex<Connection>>,
    topic: String,
}

pub struct RemoteConsumer {
    connection: Option<Connection>,
    topic: String,
    offset: u64,
}

enum Reply {
    Status(String),
    Integer(i64),
    Records(Vec<String>),
}

// A connection whose exchange failed midway is dropped and opened again on the
// next call, so a late reply is never read as the answer to a later request.
struct Connection {
    addr: String,
    reply_timeout: Duration,
    stream: Option<TcpStream>,
    buf: Vec<u8>,
}

impl RemoteLog {
    pub fn new<A: Into<String>, T: Into<String>>(addr: A, topic: T) -> Self {
        RemoteLog {
            addr: addr.into(),
            topic: topic.into(),
            reply_timeout: REPLY_TIMEOUT,
        }
    }

    /// How long a call waits for the reply of the broker.
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    fn connect(&self) -> Result<Connection, TransportError> {
        Connection::open(&self.addr, self.reply_timeout)
    }

    pub fn topic(&self) -> &str {
        self.topic.as_str()
    }

    /// Checks that the broker answers.
    pub fn ping(&self) -> Result<(), TransportError> {
        match self.connect()?.call(&["PING"])? {
            Reply::Status(status) if status == "PONG" => Ok(()),
            other => Err(other.unexpected()),
        }
    }

    /// Number of records of the topic.
    pub fn len(&self) -> Result<u64, TransportError> {
        match self.connect()?.call(&["LEN", self.topic.as_str()])? {
            Reply::Integer(len) if len >= 0 => Ok(len as u64),
            other => Err(other.unexpected()),
        }
    }
}

impl LogTransport for RemoteLog {
    type Producer = RemoteProducer;
    type Consumer = RemoteConsumer;

    fn producer(&self) -> Result<RemoteProducer, TransportError> {
        Ok(RemoteProducer {
            connection: Arc::new(Mutex::new(self.connect()?)),
            topic: self.topic.clone(),
        })
    }

    fn consumer(&self) -> Result<RemoteConsumer, TransportError> {
        Ok(RemoteConsumer {
            connection: Some(self.connect()?),
            topic: self.topic.clone(),
            offset: 0,
        })
    }
}

impl LogProducer for RemoteProducer {
    fn append_raw(&self, record: &str) -> Result<(), TransportError> {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match connection.call(&["APPEND", self.topic.as_str(), record])? {
            Reply::Integer(_) => Ok(()),
            other => Err(other.unexpected()),
        }
    }
}

impl LogConsumer for RemoteConsumer {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<String>, TransportError> {
        let connection = match self.connection.as_mut() {
            Some(connection) => connection,
            None => return Err(TransportError::Disconnected),
        };

        let offset = self.offset.to_string();
        let max = FETCH_MAX.to_string();
        let request = ["FETCH", self.topic.as_str(), offset.as_str(), max.as_str()];
        let records = match connection.call(&request)? {
            Reply::Records(records) => records,
            other => return Err(other.unexpected()),
        };

        if records.is_empty() {
            // nothing new, do not hammer the broker
            thread::sleep(timeout);
        }

        self.offset += records.len() as u64;
        Ok(records)
    }

    fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            let _ = connection.call(&["QUIT"]);
            debug!("consumer of topic {} closed at offset {}", self.topic, self.offset);
        }
    }
}

impl Drop for RemoteConsumer {
    fn drop(&mut self) {
        self.close();
    }
}

impl Reply {
    fn from_resp(resp: Resp) -> Result<Reply, TransportError> {
        match resp {
            Resp::String(status) => Ok(Reply::Status(String::from_utf8_lossy(status).to_string())),
            Resp::Error(msg) => Err(TransportError::Broker(
                String::from_utf8_lossy(msg).to_string(),
            )),
            Resp::Integer(digits) => std::str::from_utf8(digits)
                .ok()
                .and_then(|digits| digits.parse::<i64>().ok())
                .map(Reply::Integer)
                .ok_or_else(|| {
                    TransportError::UnexpectedReply(String::from_utf8_lossy(digits).to_string())
                }),
            Resp::Array(values) => values
                .iter()
                .map(|value| {
                    value
                        .as_str()
                        .map(|record| record.to_string())
                        .ok_or_else(|| TransportError::UnexpectedReply(format!("{:?}", value)))
                })
                .collect::<Result<Vec<String>, TransportError>>()
                .map(Reply::Records),
            other => Err(TransportError::UnexpectedReply(format!("{:?}", other))),
        }
    }

    fn unexpected(self) -> TransportError {
        let reply = match self {
            Reply::Status(status) => status,
            Reply::Integer(i) => i.to_string(),
            Reply::Records(records) => format!("{} records", records.len()),
        };

        TransportError::UnexpectedReply(reply)
    }
}

impl Connection {
    fn open(addr: &str, reply_timeout: Duration) -> Result<Connection, TransportError> {
        let mut connection = Connection {
            addr: addr.to_string(),
            reply_timeout,
            stream: None,
            buf: Vec::new(),
        };
        connection.stream()?;

        Ok(connection)
    }

    fn stream(&mut self) -> Result<&mut TcpStream, TransportError> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = TcpStream::connect(self.addr.as_str())?;
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(self.reply_timeout))?;
                debug!("connected to log broker {}", self.addr);
                stream
            }
        };

        Ok(self.stream.insert(stream))
    }

    fn call<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Reply, TransportError> {
        let reply = self.exchange(args);

        if let Err(err) = &reply {
            if matches!(
                err,
                TransportError::Io(_) | TransportError::Disconnected | TransportError::Protocol(_)
            ) {
                debug!("dropping connection to log broker {}: {}", self.addr, err);
                self.stream = None;
                self.buf.clear();
            }
        }

        reply
    }

    fn exchange<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<Reply, TransportError> {
        self.stream()?.write_all(&request(args))?;

        let mut chunk = [0; 4096];
        loop {
            match RespParser::parse(&self.buf[..]) {
                Ok((resp, left)) => {
                    let consumed = self.buf.len() - left.len();
                    let reply = Reply::from_resp(resp);
                    self.buf.drain(..consumed);
                    return reply;
                }
                Err(err) if err.is_incomplete() => {
                    let length = match self.stream.as_mut() {
                        Some(stream) => stream.read(&mut chunk)?,
                        None => return Err(TransportError::Disconnected),
                    };
                    if length == 0 {
                        return Err(TransportError::Disconnected);
                    }
                    self.buf.extend_from_slice(&chunk[..length]);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    use crate::protocol::parser::RespParser;
    use crate::transport::{LogConsumer, LogTransport, RemoteLog};

    const REPLY_TIMEOUT: Duration = Duration::from_millis(100);

    // arguments of the next request, `None` once the client hung up
    fn next_request(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Option<Vec<String>> {
        let mut chunk = [0; 512];
        loop {
            if let Ok((resp, left)) = RespParser::parse(&buf[..]) {
                let consumed = buf.len() - left.len();
                let args = match resp {
                    crate::protocol::Resp::Array(items) => items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_string))
                        .collect(),
                    _ => vec![],
                };
                buf.drain(..consumed);
                return Some(args);
            }

            match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return None,
                Ok(length) => buf.extend_from_slice(&chunk[..length]),
            }
        }
    }

    #[test]
    fn late_reply_is_not_taken_for_the_next_one() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let broker = thread::spawn(move || {
            // first connection: answers the first FETCH after the client gave up
            let (mut slow, _) = listener.accept().unwrap();
            let late = thread::spawn(move || {
                let mut buf = vec![];
                assert!(next_request(&mut slow, &mut buf).is_some());
                thread::sleep(REPLY_TIMEOUT * 3);
                let _ = slow.write_all(b"*1\r\n$1\r\nA\r\n");
            });

            // second connection: a topic holding the single record `A`
            let (mut fast, _) = listener.accept().unwrap();
            let mut buf = vec![];
            let mut fetches = vec![];
            while let Some(args) = next_request(&mut fast, &mut buf) {
                let reply: &[u8] = match args.get(2).map(String::as_str) {
                    Some("0") => b"*1\r\n$1\r\nA\r\n",
                    _ => b"*0\r\n",
                };
                fetches.push(args);
                if fast.write_all(reply).is_err() {
                    break;
                }
            }
            late.join().unwrap();
            fetches
        });

        let log = RemoteLog::new(addr.to_string(), "election").with_reply_timeout(REPLY_TIMEOUT);
        let mut consumer = log.consumer().unwrap();
        let wait = Duration::from_millis(1);

        let err = consumer.poll(wait).unwrap_err();
        assert!(err.is_transient());

        assert_eq!(consumer.poll(wait).unwrap(), vec!["A".to_string()]);
        assert!(consumer.poll(wait).unwrap().is_empty());
        assert!(consumer.poll(wait).unwrap().is_empty());

        consumer.close();
        let fetches = broker.join().unwrap();
        let offsets = fetches
            .iter()
            .filter(|args| args[0] == "FETCH")
            .map(|args| args[2].as_str())
            .collect::<Vec<_>>();
        assert_eq!(offsets, vec!["0", "1", "1"]);
    }
}

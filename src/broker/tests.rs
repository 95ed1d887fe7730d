use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use redis::{Connection, RedisResult};

use crate::broker::topics::InMemoryTopics;
use crate::broker::{Broker, BrokerState};

fn get_redis_client_connection(port: u16) -> (Broker, Connection) {
    let broker = Broker::new(InMemoryTopics::new(), port);
    assert_eq!(broker.start(), Some(BrokerState::Started));

    let redis_client = redis::Client::open(format!("redis://127.0.0.1:{}/", port)).unwrap();
    (broker, redis_client.get_connection().unwrap())
}

fn append(con: &mut Connection, topic: &str, record: &str) -> i64 {
    redis::cmd("APPEND")
        .arg(topic)
        .arg(record)
        .query(con)
        .unwrap()
}

#[test]
#[serial]
fn test_append_fetch_len() {
    let (broker, mut con) = get_redis_client_connection(3465);

    let pong: String = redis::cmd("PING").query(&mut con).unwrap();
    assert_eq!(pong, "PONG");

    assert_eq!(append(&mut con, "election", "CHECK,aa"), 0);
    assert_eq!(append(&mut con, "election", "0,result.timeout = true;"), 1);
    assert_eq!(append(&mut con, "election", "0,ALIVE,A"), 2);
    assert_eq!(append(&mut con, "other", "CHECK,bb"), 0);

    let len: i64 = redis::cmd("LEN").arg("election").query(&mut con).unwrap();
    assert_eq!(len, 3);

    let records: Vec<String> = redis::cmd("FETCH")
        .arg("election")
        .arg(0)
        .query(&mut con)
        .unwrap();
    assert_eq!(
        records,
        vec!["CHECK,aa", "0,result.timeout = true;", "0,ALIVE,A"]
    );

    let records: Vec<String> = redis::cmd("FETCH")
        .arg("election")
        .arg(1)
        .arg(1)
        .query(&mut con)
        .unwrap();
    assert_eq!(records, vec!["0,result.timeout = true;"]);

    let records: Vec<String> = redis::cmd("FETCH")
        .arg("election")
        .arg(3)
        .query(&mut con)
        .unwrap();
    assert!(records.is_empty());

    let records: Vec<String> = redis::cmd("FETCH")
        .arg("missing")
        .arg(0)
        .query(&mut con)
        .unwrap();
    assert!(records.is_empty());

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

#[test]
#[serial]
fn test_errors_keep_connection_usable() {
    let (broker, mut con) = get_redis_client_connection(3466);

    let x: RedisResult<String> = redis::cmd("NOPE").query(&mut con);
    assert!(x.is_err());

    let x: RedisResult<i64> = redis::cmd("APPEND").arg("election").query(&mut con);
    assert!(x.is_err());

    let x: RedisResult<Vec<String>> = redis::cmd("FETCH")
        .arg("election")
        .arg("first")
        .query(&mut con);
    assert!(x.is_err());

    let x: RedisResult<String> = redis::cmd("SET").arg("k").arg("v").query(&mut con);
    assert!(x.is_err());

    assert_eq!(append(&mut con, "election", "CHECK,aa"), 0);

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

#[test]
#[serial]
fn test_split_frames_and_pipelining() {
    let port = 3467;
    let broker = Broker::new(InMemoryTopics::new(), port);
    assert_eq!(broker.start(), Some(BrokerState::Started));

    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    // one request cut in the middle of a bulk string
    stream.write_all(b"*3\r\n$6\r\nAPPEND\r\n$1\r\nt\r\n$5\r\nCHE").unwrap();
    std::thread::sleep(Duration::from_millis(100));
    // the end of it, immediately followed by two more requests
    stream
        .write_all(b"CK\r\n*2\r\n$3\r\nLEN\r\n$1\r\nt\r\n*1\r\n$4\r\nQUIT\r\n")
        .unwrap();

    let expected = b":0\r\n:1\r\n+OK\r\n";
    let mut received = Vec::new();
    let mut buf = [0; 64];
    while received.len() < expected.len() {
        let n = stream.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, expected.to_vec());

    // QUIT closes the connection
    assert_eq!(stream.read(&mut buf).unwrap(), 0);

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

#[test]
#[serial]
fn test_restart_keeps_topics() {
    let (broker, mut con) = get_redis_client_connection(3468);
    assert_eq!(append(&mut con, "election", "CHECK,aa"), 0);
    assert_eq!(broker.stop(), Some(BrokerState::Stopped));

    assert_eq!(broker.start(), Some(BrokerState::Started));
    let redis_client = redis::Client::open("redis://127.0.0.1:3468/").unwrap();
    let mut con = redis_client.get_connection().unwrap();
    assert_eq!(append(&mut con, "election", "CHECK,bb"), 1);

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

#[test]
#[serial]
fn test_port_in_use() {
    let (broker, _con) = get_redis_client_connection(3469);

    let other = Broker::new(InMemoryTopics::new(), 3469);
    assert!(matches!(other.start(), Some(BrokerState::Error(_))));

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

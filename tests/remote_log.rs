mod common;

use std::time::Duration;

use serial_test::serial;

use logvote::broker::topics::InMemoryTopics;
use logvote::candidate::ScriptedRanks;
use logvote::{
    Broker, BrokerState, Candidate, LogConsumer, LogProducer, LogTransport, Observer, Record,
    RemoteLog,
};

use common::{check_log, fast_config, init_logger, wait_until};

fn start_broker(port: u16) -> Broker {
    init_logger();
    let broker = Broker::new(InMemoryTopics::new(), port);
    assert_eq!(broker.start(), Some(BrokerState::Started));
    broker
}

fn poll_all<C: LogConsumer>(consumer: &mut C, expected: usize) -> Vec<String> {
    let mut records = vec![];
    wait_until("records to reach the consumer", || {
        records.extend(consumer.poll(Duration::from_millis(10)).unwrap());
        records.len() >= expected
    });
    records
}

#[test]
#[serial]
fn append_and_poll_over_tcp() {
    let broker = start_broker(3480);
    let log = RemoteLog::new("127.0.0.1:3480", "election");
    log.ping().unwrap();
    assert_eq!(log.len().unwrap(), 0);

    let producer = log.producer().unwrap();
    let mut early = log.consumer().unwrap();

    producer.append(&Record::check("abc")).unwrap();
    producer.append(&Record::vote(0, "A", 42)).unwrap();
    producer.clone().append(&Record::close_poll(0)).unwrap();

    // a late consumer reads from the start of the topic as well
    let mut late = log.consumer().unwrap();

    let expected = vec![
        Record::check("abc").to_string(),
        Record::vote(0, "A", 42).to_string(),
        Record::close_poll(0).to_string(),
    ];
    assert_eq!(poll_all(&mut early, 3), expected);
    assert_eq!(poll_all(&mut late, 3), expected);
    assert_eq!(log.len().unwrap(), 3);

    // nothing new, nothing returned
    assert!(early.poll(Duration::from_millis(10)).unwrap().is_empty());

    early.close();
    assert!(early.poll(Duration::from_millis(10)).is_err());

    // topics are independent
    assert_eq!(RemoteLog::new("127.0.0.1:3480", "other").len().unwrap(), 0);

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

#[test]
#[serial]
fn unreachable_broker() {
    let log = RemoteLog::new("127.0.0.1:3481", "election");
    assert!(log.ping().is_err());
    assert!(log.producer().is_err());
}

#[test]
#[serial]
fn election_over_tcp() {
    let broker = start_broker(3482);
    let log = RemoteLog::new("127.0.0.1:3482", "election");
    let mut config = fast_config();
    config.poll_close_delay = Duration::from_millis(300);

    let observer = Observer::new().spawn(log.consumer().unwrap(), config.poll_timeout);
    let handle = observer.handle();

    let start = |node_id: &str, rank| {
        Candidate::with_ranks(
            node_id,
            log.producer().unwrap(),
            ScriptedRanks::constant(rank),
            config.clone(),
        )
        .spawn(log.consumer().unwrap())
    };

    let a = start("A", 30);
    wait_until("the vote of A", || handle.immortal_node().is_some());
    let b = start("B", 77);

    wait_until("a leader for round 0", || handle.leader_of(0).is_some());
    assert_eq!(handle.leader_of(0).as_deref(), Some("B"));

    assert!(matches!(b.stop(), Some(Ok(()))));
    wait_until("a leader for round 1", || handle.leader_of(1).is_some());
    assert_eq!(handle.leader_of(1).as_deref(), Some("A"));

    assert!(matches!(a.stop(), Some(Ok(()))));
    assert!(matches!(observer.stop(), Some(Ok(()))));

    let mut reader = log.consumer().unwrap();
    let total = log.len().unwrap() as usize;
    let records = poll_all(&mut reader, total)
        .iter()
        .map(|raw| Record::parse(raw).unwrap())
        .collect::<Vec<_>>();
    let leaders = check_log(&records);
    assert_eq!(leaders.get(&0).map(String::as_str), Some("B"));
    assert_eq!(leaders.get(&1).map(String::as_str), Some("A"));

    assert_eq!(broker.stop(), Some(BrokerState::Stopped));
}

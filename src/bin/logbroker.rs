//! logbroker serves named append-only topics over RESP. It is the shared log of
//! `peer` and `tester`.

use std::error::Error;
use std::thread;
use std::time::Duration;

use clap::Parser as _;
use log::error;

use logvote::broker::topics::InMemoryTopics;
use logvote::cli::init_logger;
use logvote::{Broker, BrokerOptions, BrokerState};

fn main() {
    init_logger();

    if let Err(error) = Command::parse().run() {
        error!("{}", error);
        std::process::exit(1);
    }
}

#[derive(clap::Parser)]
#[command(about = "Serves append-only topics to leader election peers.", version)]
struct Command {
    /// Port to listen on.
    #[arg(long, default_value_t = BrokerOptions::default().port)]
    port: u16,
    /// Maximum number of connections served at once.
    #[arg(long, default_value_t = BrokerOptions::default().threads)]
    threads: usize,
    /// Seconds of inactivity after which a connection is closed.
    #[arg(long, default_value_t = BrokerOptions::default().idle_timeout.as_secs())]
    idle_timeout_secs: u64,
}

impl Command {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let options = BrokerOptions {
            port: self.port,
            threads: self.threads,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        };

        let broker = Broker::new_with_options(InMemoryTopics::new(), options);
        match broker.start() {
            Some(BrokerState::Started) => {}
            other => return Err(format!("logbroker did not start: {:?}", other).into()),
        }

        loop {
            thread::park();
        }
    }
}

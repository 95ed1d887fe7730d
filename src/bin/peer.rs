//! peer runs one leader election candidate against a log broker topic, until
//! the candidate stops.

use std::error::Error;

use clap::Parser as _;
use log::{error, info};

use logvote::cli::{init_logger, TimingArgs};
use logvote::{Candidate, LogTransport, RemoteLog};

fn main() {
    init_logger();

    if let Err(error) = Command::parse().run() {
        error!("{}", error);
        std::process::exit(1);
    }
}

#[derive(clap::Parser)]
#[command(about = "Runs one leader election candidate.", version)]
struct Command {
    /// Address of the log broker, as host:port.
    log_server: String,
    /// Topic shared by the peers of the group.
    log_topic: String,
    #[command(flatten)]
    timing: TimingArgs,
}

impl Command {
    fn run(self) -> Result<(), Box<dyn Error>> {
        let config = self.timing.config()?;
        let log = RemoteLog::new(self.log_server.as_str(), self.log_topic.as_str());
        log.ping()?;

        let candidate = Candidate::new(log.producer()?, config);
        info!(
            "peer {} joins topic {} on {}",
            candidate.node_id(),
            self.log_topic,
            self.log_server
        );

        match candidate.spawn(log.consumer()?).join() {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) if err.is_protocol_violation() => {
                Err(format!("the log holds a record this peer can not follow: {}", err).into())
            }
            Some(Err(err)) => Err(format!("the log broker is unusable: {}", err).into()),
            None => Err("candidate thread panicked".into()),
        }
    }
}

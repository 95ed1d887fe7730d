//! tester follows a topic with an observer and starts and kills candidates at
//! random until none is left, reporting the leader of every round.

use std::error::Error;
use std::time::Duration;

use clap::Parser as _;
use log::{error, info};

use logvote::chaos::ChaosDriver;
use logvote::cli::{init_logger, TimingArgs};
use logvote::{ChaosConfig, LogTransport, Observer, RemoteLog};

fn main() {
    init_logger();

    if let Err(error) = Command::parse().run() {
        error!("{}", error);
        std::process::exit(1);
    }
}

#[derive(clap::Parser)]
#[command(about = "Starts and kills candidates while watching their elections.", version)]
struct Command {
    /// Address of the log broker, as host:port.
    log_server: String,
    /// Topic shared by the peers of the group.
    log_topic: String,
    /// Maximum number of candidates alive at once.
    max_peers: usize,
    /// Wait before another kill attempt when the chosen peer is protected.
    #[arg(long, default_value_t = 2000)]
    kill_retry_backoff_ms: u64,
    #[command(flatten)]
    timing: TimingArgs,
}

impl Command {
    fn run(self) -> Result<(), Box<dyn Error>> {
        if self.max_peers == 0 {
            return Err("max_peers must be at least 1".into());
        }

        let mut config = ChaosConfig::new(self.max_peers);
        config.kill_retry_backoff = Duration::from_millis(self.kill_retry_backoff_ms);
        config.candidate = self.timing.config()?;

        let log = RemoteLog::new(self.log_server.as_str(), self.log_topic.as_str());
        log.ping()?;

        let observer = Observer::new().spawn(log.consumer()?, config.candidate.poll_timeout);
        let driver = ChaosDriver::new(log, config, observer.handle());
        let report = driver.run()?;

        info!(
            "{} candidates started, {} killed, {} stopped by themselves",
            report.started, report.killed, report.failed
        );
        for (round, leader) in report.leaders.iter() {
            info!("round {} was led by {}", round, leader);
        }

        if let Some(Err(err)) = observer.stop() {
            return Err(err.into());
        }

        Ok(())
    }
}

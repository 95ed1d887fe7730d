//! Pieces shared by the binaries.

use std::time::Duration;

use crate::config::Config;

pub fn init_logger() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Election timings, in milliseconds.
#[derive(clap::Args, Debug, Clone)]
pub struct TimingArgs {
    /// Wait of the first voter of a round before it closes the poll.
    #[arg(long, default_value_t = Config::DEFAULT.poll_close_delay.as_millis() as u64)]
    pub poll_close_delay_ms: u64,
    /// Interval between two heartbeats of a leader.
    #[arg(long, default_value_t = Config::DEFAULT.heartbeat_interval.as_millis() as u64)]
    pub heartbeat_interval_ms: u64,
    /// Quiet time after which a follower deems its leader dead.
    #[arg(long, default_value_t = Config::DEFAULT.election_timeout.as_millis() as u64)]
    pub election_timeout_ms: u64,
    /// Upper bound of the random delay added to the election timeout.
    #[arg(long, default_value_t = Config::DEFAULT.election_timeout_jitter.as_millis() as u64)]
    pub election_timeout_jitter_ms: u64,
    /// Maximum wait of one poll of the log.
    #[arg(long, default_value_t = Config::DEFAULT.poll_timeout.as_millis() as u64)]
    pub poll_timeout_ms: u64,
}

impl TimingArgs {
    pub fn config(&self) -> Result<Config, String> {
        let config = Config {
            poll_close_delay: Duration::from_millis(self.poll_close_delay_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            election_timeout: Duration::from_millis(self.election_timeout_ms),
            election_timeout_jitter: Duration::from_millis(self.election_timeout_jitter_ms),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::TimingArgs;
    use crate::config::Config;

    #[derive(clap::Parser)]
    struct Command {
        #[command(flatten)]
        timing: TimingArgs,
    }

    #[test]
    fn defaults_match_config() {
        let command = Command::parse_from(["peer"]);
        assert_eq!(command.timing.config(), Ok(Config::DEFAULT));
    }

    #[test]
    fn flags_override_defaults() {
        let command = Command::parse_from(["peer", "--election-timeout-ms", "900"]);
        let config = command.timing.config().unwrap();
        assert_eq!(config.election_timeout.as_millis(), 900);
        assert_eq!(config.heartbeat_interval, Config::DEFAULT.heartbeat_interval);

        let command = Command::parse_from(["peer", "--election-timeout-ms", "50"]);
        assert!(command.timing.config().is_err());
    }
}

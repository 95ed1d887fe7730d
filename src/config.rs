use std::time::Duration;

use rand::RngCore;

/// Timing parameters of a candidate. Every peer of a group should run with the
/// same values.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Config {
    /// How long the first candidate of a round waits before closing the poll.
    /// Votes appended after the close-poll marker are not counted.
    pub poll_close_delay: Duration,

    /// Interval between two heartbeats of the leader.
    pub heartbeat_interval: Duration,

    /// Minimum quiet time after which a follower deems the leader dead.
    /// Must exceed `heartbeat_interval`.
    pub election_timeout: Duration,

    /// Upper bound (exclusive) of the random delay added to `election_timeout`.
    pub election_timeout_jitter: Duration,

    /// Maximum time a poll of the log consumer blocks.
    pub poll_timeout: Duration,
}

impl Config {
    pub const DEFAULT: Config = Config {
        poll_close_delay: Duration::from_millis(500),
        heartbeat_interval: Duration::from_millis(100),
        election_timeout: Duration::from_millis(300),
        election_timeout_jitter: Duration::from_millis(150),
        poll_timeout: Duration::from_millis(10),
    };

    /// Draws the quiet window of one heartbeat listener.
    pub fn random_election_timeout(&self, random: &mut impl RngCore) -> Duration {
        let jitter_ms = self.election_timeout_jitter.as_millis() as u64;
        let random = random.next_u64().checked_rem(jitter_ms).unwrap_or(0);
        self.election_timeout + Duration::from_millis(random)
    }

    /// Checks the timing constraints between the parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.election_timeout <= self.heartbeat_interval {
            return Err(format!(
                "election timeout ({:?}) must exceed the heartbeat interval ({:?})",
                self.election_timeout, self.heartbeat_interval
            ));
        }

        if self.heartbeat_interval == Duration::from_millis(0) {
            return Err("heartbeat interval must not be zero".to_string());
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::DEFAULT
    }
}

/// Parameters of the chaos driver.
#[derive(Debug, Clone)]
pub struct ChaosConfig {
    /// Maximum number of peers alive at once.
    pub max_peers: usize,

    /// Wait before picking another peer when the chosen one is immortal.
    pub kill_retry_backoff: Duration,

    /// Bounds of the wait between the first peer and the first step.
    pub warmup: (Duration, Duration),

    /// Bounds of the wait between two steps.
    pub step: (Duration, Duration),

    /// Probability to start a peer instead of killing one, until `max_peers` is reached.
    pub start_probability: f64,

    /// Timing parameters handed to every started peer.
    pub candidate: Config,
}

impl ChaosConfig {
    pub fn new(max_peers: usize) -> Self {
        ChaosConfig {
            max_peers,
            kill_retry_backoff: Duration::from_secs(2),
            warmup: (Duration::from_secs(1), Duration::from_secs(10)),
            step: (Duration::from_secs(1), Duration::from_secs(4)),
            start_probability: 0.75,
            candidate: Config::DEFAULT,
        }
    }
}

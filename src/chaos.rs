//! Chaos driver: starts and kills candidates at random while an observer
//! follows the log, never killing the peer the observer protects.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::candidate::{Candidate, CandidateHandle};
use crate::config::ChaosConfig;
use crate::observer::ObserverHandle;
use crate::record::Round;
use crate::transport::{LogTransport, TransportError};

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Step {
    Started(String),
    Killed(String),
    /// Nothing to kill, or the cap forbids another start.
    Idle,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ChaosReport {
    pub started: usize,
    pub killed: usize,
    /// Peers that stopped by themselves before being killed.
    pub failed: usize,
    pub leaders: BTreeMap<Round, String>,
}

pub struct ChaosDriver<T: LogTransport> {
    transport: T,
    config: ChaosConfig,
    observer: ObserverHandle,
    peers: BTreeMap<String, CandidateHandle>,
    cap_reached: bool,
    random: StdRng,
    stop: Arc<AtomicBool>,
    report: ChaosReport,
}

impl<T: LogTransport> ChaosDriver<T> {
    pub fn new(transport: T, config: ChaosConfig, observer: ObserverHandle) -> Self {
        ChaosDriver::with_random(transport, config, observer, StdRng::from_entropy())
    }

    pub fn with_random(
        transport: T,
        config: ChaosConfig,
        observer: ObserverHandle,
        random: StdRng,
    ) -> Self {
        ChaosDriver {
            transport,
            config,
            observer,
            peers: BTreeMap::new(),
            cap_reached: false,
            random,
            stop: Arc::new(AtomicBool::new(false)),
            report: ChaosReport::default(),
        }
    }

    /// Flag that ends the run on the next step.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn alive(&self) -> usize {
        self.peers.len()
    }

    pub fn peers(&self) -> Vec<String> {
        self.peers.keys().cloned().collect()
    }

    pub fn report(&self) -> &ChaosReport {
        &self.report
    }

    /// Forgets the peers whose candidate already stopped by itself and returns
    /// how many there were.
    pub fn reap(&mut self) -> usize {
        let finished = self
            .peers
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(node_id, _)| node_id.clone())
            .collect::<Vec<_>>();

        for node_id in finished.iter() {
            let handle = match self.peers.remove(node_id) {
                Some(handle) => handle,
                None => continue,
            };

            match handle.join() {
                Some(Ok(())) => info!("peer {} stopped by itself", node_id),
                Some(Err(err)) if err.is_protocol_violation() => {
                    warn!("peer {} stopped on a protocol violation: {}", node_id, err)
                }
                Some(Err(err)) => warn!("peer {} lost the log: {}", node_id, err),
                None => warn!("peer {} panicked", node_id),
            }
            self.report.failed += 1;
        }

        finished.len()
    }

    pub fn start_peer(&mut self) -> Result<String, TransportError> {
        let producer = self.transport.producer()?;
        let consumer = self.transport.consumer()?;

        let candidate = Candidate::new(producer, self.config.candidate.clone());
        let handle = candidate.spawn(consumer);
        let node_id = handle.node_id().to_string();

        info!("id of the new peer: {}", node_id);
        self.peers.insert(node_id.clone(), handle);
        self.report.started += 1;

        if self.peers.len() >= self.config.max_peers {
            self.cap_reached = true;
        }

        Ok(node_id)
    }

    /// Kills a random peer other than the immortal one.
    pub fn kill_peer(&mut self) -> Option<String> {
        loop {
            self.reap();
            if self.peers.is_empty() || self.stop.load(Ordering::SeqCst) {
                return None;
            }

            let index = self.random.gen_range(0..self.peers.len());
            let node_id = self.peers.keys().nth(index).cloned()?;

            if self.observer.is_immortal(&node_id) {
                info!("can not kill {} at this moment, trying again", node_id);
                thread::sleep(self.config.kill_retry_backoff);
                continue;
            }

            let handle = self.peers.remove(&node_id)?;
            match handle.stop() {
                Some(Ok(())) => {}
                Some(Err(err)) if err.is_protocol_violation() => {
                    warn!("peer {} had hit a protocol violation: {}", node_id, err)
                }
                Some(Err(err)) => warn!("peer {} had lost the log: {}", node_id, err),
                None => warn!("peer {} panicked", node_id),
            }

            info!("killed {}", node_id);
            self.report.killed += 1;
            return Some(node_id);
        }
    }

    /// Starts a peer with the configured probability until the cap is reached,
    /// kills one otherwise.
    pub fn step(&mut self) -> Result<Step, TransportError> {
        self.reap();
        let start = !self.cap_reached && self.random.gen_bool(self.config.start_probability);

        let step = if start {
            Step::Started(self.start_peer()?)
        } else {
            match self.kill_peer() {
                Some(node_id) => Step::Killed(node_id),
                None => Step::Idle,
            }
        };

        if self.cap_reached && matches!(step, Step::Started(_)) {
            info!(
                "maximum peer count {} reached, no more peers will start",
                self.config.max_peers
            );
        }

        Ok(step)
    }

    /// Runs until every peer is killed or gone, or the stop flag is set.
    pub fn run(mut self) -> Result<ChaosReport, TransportError> {
        self.start_peer()?;
        let warmup = random_between(&mut self.random, self.config.warmup);
        thread::sleep(warmup);

        while !self.peers.is_empty() && !self.stop.load(Ordering::SeqCst) {
            self.step()?;
            info!("number of candidates alive: {}", self.peers.len());

            let wait = random_between(&mut self.random, self.config.step);
            thread::sleep(wait);
        }

        for (node_id, handle) in std::mem::take(&mut self.peers) {
            handle.stop();
            info!("stopped {}", node_id);
        }

        self.report.leaders = self.observer.snapshot().leaders;
        Ok(self.report)
    }
}

fn random_between<R: Rng>(random: &mut R, (low, high): (Duration, Duration)) -> Duration {
    let low = low.as_millis() as u64;
    let high = high.as_millis() as u64;

    if high <= low {
        return Duration::from_millis(low);
    }

    Duration::from_millis(random.gen_range(low..=high))
}

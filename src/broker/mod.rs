//! TCP log broker: named append-only topics served over RESP.
//!
//! The broker backs the `<logServer>` argument of the `peer` and `tester`
//! binaries. Clients append records with `APPEND`, read them back from any
//! offset with `FETCH`, and every reader sees one topic in the same order.

#[cfg(test)]
mod tests;

pub mod command;
pub mod topics;
mod util;
use util::*;

use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{error, info};
use mpb::MPB;

use topics::TopicStorage;

pub struct Broker {
    state_bus: MPB<BrokerState>,
    options: BrokerOptions,
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum BrokerState {
    Start,
    Started,
    Stop,
    Stopped,
    Timeout,
    Error(String),
}

#[derive(Debug, Clone)]
pub struct BrokerOptions {
    pub port: u16,
    /// Size of the connection handler pool; every open connection holds one handler.
    pub threads: usize,
    pub idle_timeout: Duration,
}

impl BrokerOptions {
    pub fn new(port: u16) -> Self {
        BrokerOptions {
            port,
            ..BrokerOptions::default()
        }
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        BrokerOptions {
            port: 7878,
            threads: 64,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl Broker {
    pub fn new<T: TopicStorage + Send + 'static>(storage: T, port: u16) -> Self {
        Broker::new_with_options(storage, BrokerOptions::new(port))
    }

    pub fn new_with_options<T: TopicStorage + Send + 'static>(
        storage: T,
        options: BrokerOptions,
    ) -> Self {
        let b = Broker {
            state_bus: MPB::new(),
            options,
        };

        b._init_configuration(format!("0.0.0.0:{}", b.options.port), storage);
        b
    }

    fn _init_configuration<A: Into<String>, T: TopicStorage + Send + 'static>(
        &self,
        addr: A,
        storage: T,
    ) {
        let addr = addr.into();
        let options = self.options.clone();
        let state_send = self.state_bus.sender();
        let state_recv = self.state_bus.receiver();

        let _ = thread::spawn(move || {
            let storage = Arc::new(Mutex::new(storage));

            while let Ok(state) = state_recv.recv() {
                if state == BrokerState::Start {
                    start_broker(&addr, &options, &state_send, &state_recv, &storage);
                }
            }
        });
    }

    fn change_state(&self, change_to: BrokerState) -> Option<BrokerState> {
        let post_change_to_state = match change_to {
            BrokerState::Start => BrokerState::Started,
            BrokerState::Stop => BrokerState::Stopped,
            BrokerState::Started
            | BrokerState::Stopped
            | BrokerState::Timeout
            | BrokerState::Error(_) => return None,
        };

        // subscribe before asking so the answer can not be missed
        let receiver = self.state_bus.receiver();
        let _ = self.state_bus.sender().send(change_to);

        while let Ok(state) = receiver.recv_timeout(Duration::from_secs(5)) {
            if state == post_change_to_state {
                return Some(state);
            }

            if let BrokerState::Error(_) = state {
                return Some(state);
            }
        }

        Some(BrokerState::Timeout)
    }

    /// start broker
    pub fn start(&self) -> Option<BrokerState> {
        self.change_state(BrokerState::Start)
    }

    /// stop broker
    pub fn stop(&self) -> Option<BrokerState> {
        self.change_state(BrokerState::Stop)
    }

    pub fn port(&self) -> u16 {
        self.options.port
    }
}

fn start_broker<T: TopicStorage + Send + 'static>(
    addr: &str,
    options: &BrokerOptions,
    state_send: &Sender<BrokerState>,
    state_recv: &Receiver<BrokerState>,
    storage: &Arc<Mutex<T>>,
) {
    let thread_pool = match rayon::ThreadPoolBuilder::new()
        .thread_name(|i| format!("connection handler {}", i))
        .num_threads(options.threads)
        .build()
    {
        Ok(pool) => pool,
        Err(err) => {
            let _ = state_send.send(BrokerState::Error(err.to_string()));
            return;
        }
    };

    let listener = match TcpListener::bind(addr) {
        Ok(listener) => listener,
        Err(err) => {
            error!("logbroker can not listen on {}: {}", addr, err);
            let _ = state_send.send(BrokerState::Error(err.to_string()));
            return;
        }
    };

    if let Err(err) = listener.set_nonblocking(true) {
        let _ = state_send.send(BrokerState::Error(err.to_string()));
        return;
    }

    // notify that the broker has been started
    info!("logbroker listening on {}", addr);
    let _ = state_send.send(BrokerState::Started);

    let stopped = Arc::new(AtomicBool::new(false));

    // listen incoming connections
    for stream in listener.incoming() {
        match stream {
            Ok(tcp_stream) => {
                let storage = storage.clone();
                let stopped = stopped.clone();
                let idle_timeout = options.idle_timeout;

                thread_pool.spawn(move || {
                    handle_connection(&storage, tcp_stream, &stopped, idle_timeout);
                });
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => {
                error!("logbroker stops accepting connections: {}", err);
                break;
            }
        }

        if stop_sig_received(state_recv, state_send) {
            // let's gracefully shutdown the broker
            info!("logbroker on {} stopped", addr);
            break;
        }
    }

    stopped.store(true, Ordering::SeqCst);
}

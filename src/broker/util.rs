use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use log::debug;

use crate::protocol::parser::RespParser;
use crate::protocol::response::{Response, ResponseType};
use crate::protocol::Resp;

use super::command::{Command, CommandError};
use super::topics::TopicStorage;
use super::BrokerState;

const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub fn lock_then_release<T: TopicStorage>(storage: &Arc<Mutex<T>>) -> MutexGuard<T> {
    storage
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn stop_sig_received(recv: &Receiver<BrokerState>, sender: &Sender<BrokerState>) -> bool {
    if let Ok(recv_state) = recv.try_recv() {
        if recv_state == BrokerState::Stop {
            // notify that the broker has been stopped
            let _ = sender.send(BrokerState::Stopped);
            return true;
        }
    }

    false
}

pub fn get_command(resp: Resp) -> Result<Command, CommandError> {
    match resp {
        Resp::Array(v) => Command::parse(v),
        _ => Err(CommandError::InvalidCommand),
    }
}

pub fn run_command<T: TopicStorage>(storage: &Arc<Mutex<T>>, command: Command) -> Response {
    use ResponseType::*;

    match command {
        Command::Append(topic, record) => {
            let offset = lock_then_release(storage).append(&topic, &record);
            Response::single(Integer(offset as i64))
        }
        Command::Fetch(topic, offset, max) => {
            let storage = lock_then_release(storage);
            let records = storage
                .read(&topic, offset, max)
                .into_iter()
                .map(|record| BulkString(record.to_vec()))
                .collect();

            Response::array(records)
        }
        Command::Len(topic) => Response::single(Integer(lock_then_release(storage).len(&topic) as i64)),
        Command::Ping => Response::pong(),
        Command::Quit => Response::quit(),
    }
}

/// Answers every complete frame at the head of `pending` and drops it from the buffer.
/// Returns `true` once the client asked to quit.
pub fn handle_frames<T: TopicStorage>(
    storage: &Arc<Mutex<T>>,
    pending: &mut Vec<u8>,
    mut stream: &TcpStream,
) -> bool {
    while !pending.is_empty() {
        let (response, consumed) = match RespParser::parse(&pending[..]) {
            Ok((resp, left)) => {
                let consumed = pending.len() - left.len();
                let response = match get_command(resp) {
                    Ok(command) => run_command(storage, command),
                    Err(err) => Response::error(err),
                };
                (response, consumed)
            }
            Err(err) if err.is_incomplete() => return false,
            Err(err) => (Response::error(CommandError::from(err)), pending.len()),
        };

        pending.drain(..consumed);

        let quit = response.is_quit();
        if stream.write_all(&response.reply()).is_err() || quit {
            return true;
        }
    }

    false
}

pub fn handle_connection<T: TopicStorage>(
    storage: &Arc<Mutex<T>>,
    mut stream: TcpStream,
    stopped: &AtomicBool,
    idle_timeout: Duration,
) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_default();
    debug!("connection from {}", peer);

    let mut pending = Vec::<u8>::new();
    let mut buf = [0; 512];
    let mut last_update = Instant::now();

    loop {
        match stream.read(&mut buf) {
            // the client closed the connection
            Ok(0) => break,
            Ok(length) => {
                // reset the last time we received data
                last_update = Instant::now();
                pending.extend_from_slice(&buf[..length]);

                if handle_frames(storage, &mut pending, &stream) {
                    break;
                }
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }

        if stopped.load(Ordering::SeqCst) {
            break;
        }

        if last_update.elapsed() >= idle_timeout {
            debug!("closing idle connection from {}", peer);
            break;
        }
    }

    debug!("connection from {} closed", peer);
}

// src/net.rs
//
// Peer synchronization over a single TCP connection. Messages are
// newline-delimited JSON; one blocking reader thread per connection
// feeds decoded messages into an mpsc channel, so the game loop is the
// single consumer of everything the peer says.

use crate::board::Piece;
use crate::engine::GameState;
use crate::moves::Move;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;

// --- Wire format ---

/// Everything that crosses the wire. A `Move` replays one move on the
/// receiver, a `State` replaces the receiver's game wholesale, and a
/// `Piece` carries a promotion result to be placed at its recorded
/// coordinates.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    Move(Move),
    State(GameState),
    Piece(Piece),
}

// --- Errors ---

#[derive(Debug)]
pub enum NetError {
    Io(io::Error),
    Serialization(serde_json::Error),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Io(e) => write!(f, "network I/O error: {}", e),
            NetError::Serialization(e) => write!(f, "message encoding error: {}", e),
        }
    }
}

impl Error for NetError {}

impl From<io::Error> for NetError {
    fn from(e: io::Error) -> Self {
        NetError::Io(e)
    }
}

impl From<serde_json::Error> for NetError {
    fn from(e: serde_json::Error) -> Self {
        NetError::Serialization(e)
    }
}

// --- Session ---

/// One live connection to the peer. There is no reconnect; when either
/// end drops, the session is finished. The write half is shared behind
/// a mutex so that the forwarder thread and the owning thread never
/// interleave bytes within one message line.
pub struct Session {
    stream: TcpStream,
    writer: Arc<Mutex<TcpStream>>,
}

impl Session {
    /// Listens on the given port and blocks until a single peer
    /// connects.
    pub fn host(port: u16) -> Result<Session, NetError> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        log::info!("waiting for a peer on port {}", port);
        let (stream, peer) = listener.accept()?;
        log::info!("peer connected from {}", peer);
        Session::from_stream(stream)
    }

    /// Connects to a hosting peer at `host:port`.
    pub fn join(addr: &str) -> Result<Session, NetError> {
        let stream = TcpStream::connect(addr)?;
        log::info!("connected to {}", addr);
        Session::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Session, NetError> {
        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        Ok(Session { stream, writer })
    }

    /// Writes one message as a single JSON line.
    pub fn send(&mut self, message: &Message) -> Result<(), NetError> {
        write_message(&self.writer, message)
    }

    /// Starts the reader thread. It decodes lines from the peer until
    /// the connection closes, then hangs up the returned channel.
    pub fn spawn_receiver(&self) -> Result<Receiver<Message>, NetError> {
        let stream = self.stream.try_clone()?;
        let (tx, rx) = channel();
        thread::spawn(move || {
            let reader = BufReader::new(stream);
            for line in reader.lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        log::warn!("connection lost: {}", e);
                        return;
                    }
                };
                // A malformed line is dropped; the connection stays up.
                let message: Message = match serde_json::from_str(&line) {
                    Ok(m) => m,
                    Err(e) => {
                        log::error!("undecodable message from peer: {}", e);
                        continue;
                    }
                };
                if tx.send(message).is_err() {
                    return;
                }
            }
            log::info!("peer disconnected");
        });
        Ok(rx)
    }

    /// Starts the forwarder thread: every move record the engine emits
    /// is written to the peer as a move message. Replayed moves are
    /// echoed too; the peer's empty-source rejection terminates the
    /// loop.
    pub fn spawn_forwarder(&self, moves: Receiver<Move>) -> Result<(), NetError> {
        let writer = Arc::clone(&self.writer);
        thread::spawn(move || {
            for record in moves {
                if let Err(e) = write_message(&writer, &Message::Move(record)) {
                    log::warn!("stopped forwarding moves: {}", e);
                    return;
                }
            }
        });
        Ok(())
    }
}

/// Encodes a message and writes it under the lock, so each line reaches
/// the stream in one piece regardless of which thread produced it.
fn write_message(writer: &Mutex<TcpStream>, message: &Message) -> Result<(), NetError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    let mut stream = match writer.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    stream.write_all(line.as_bytes())?;
    Ok(())
}

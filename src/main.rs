// src/main.rs
//
// Terminal front end for a two-peer networked chess game. One thread
// reads stdin, reader threads watch the peer connection, and everything
// funnels into a single event queue consumed here, so the game state is
// only ever touched from this loop.

use lazy_static::lazy_static;
use netchess::board::Color;
use netchess::engine::{self, GameState, MoveOrigin};
use netchess::moves::{parse_square, square_name};
use netchess::net::{Message, Session};
use regex::Regex;
use std::io::{self, BufRead};
use std::sync::mpsc::{channel, Sender};
use std::thread;

lazy_static! {
    static ref MOVE_RE: Regex = Regex::new(r"^(?:move\s+)?([a-h][1-8])\s*([a-h][1-8])$").unwrap();
}

enum AppEvent {
    Input(String),
    Peer(Message),
}

struct App {
    state: GameState,
    session: Option<Session>,
    my_color: Option<Color>,
    /// Square of a pawn awaiting the local player's promotion choice.
    pending_promotion: Option<(i8, i8)>,
    events: Sender<AppEvent>,
}

impl App {
    fn new(events: Sender<AppEvent>) -> App {
        App {
            state: GameState::new(),
            session: None,
            my_color: None,
            pending_promotion: None,
            events,
        }
    }

    // --- Networking ---

    /// Wires a fresh connection into the event loop: engine emissions
    /// flow out as move messages, peer messages flow in as events.
    fn attach(&mut self, session: Session, color: Color) {
        match session.spawn_receiver() {
            Ok(incoming) => {
                let events = self.events.clone();
                thread::spawn(move || {
                    for message in incoming {
                        if events.send(AppEvent::Peer(message)).is_err() {
                            return;
                        }
                    }
                });
            }
            Err(e) => {
                println!("connection setup failed: {}", e);
                return;
            }
        }
        let emitted = self.state.subscribe();
        if let Err(e) = session.spawn_forwarder(emitted) {
            println!("connection setup failed: {}", e);
            return;
        }
        self.session = Some(session);
        self.my_color = Some(color);
        println!("you are playing {:?}", color);
    }

    fn cmd_host(&mut self, port_arg: Option<&str>) {
        let port: u16 = match port_arg.and_then(|p| p.parse().ok()) {
            Some(p) => p,
            None => {
                println!("usage: host <port>");
                return;
            }
        };
        match Session::host(port) {
            Ok(session) => {
                self.attach(session, Color::White);
                self.state.set_my_turn(true);
                // The joiner adopts the snapshot's turn flag verbatim,
                // so it is set for the receiving side before it ships.
                let mut snapshot = self.state.snapshot();
                snapshot.set_my_turn(false);
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.send(&Message::State(snapshot)) {
                        println!("failed to send initial state: {}", e);
                    }
                }
                println!("{}", self.state);
                println!("your move.");
            }
            Err(e) => println!("could not host on port {}: {}", port, e),
        }
    }

    fn cmd_join(&mut self, addr: Option<&str>) {
        let addr = match addr {
            Some(a) => a,
            None => {
                println!("usage: join <host:port>");
                return;
            }
        };
        match Session::join(addr) {
            Ok(session) => {
                self.attach(session, Color::Black);
                println!("waiting for the host's opening position...");
            }
            Err(e) => println!("could not join {}: {}", addr, e),
        }
    }

    // --- Moves ---

    fn try_move(&mut self, from: (i8, i8), to: (i8, i8)) {
        if self.state.is_game_over() {
            println!("the game is over.");
            return;
        }
        if self.session.is_some() && !self.state.is_my_turn() {
            println!("it is not your turn.");
            return;
        }
        if let Some(color) = self.my_color {
            match self.state.piece_at(from.0, from.1) {
                Some(piece) if piece.color == color => {}
                _ => {
                    println!("no {:?} piece on {}.", color, square_name(from.0, from.1));
                    return;
                }
            }
        }
        match self
            .state
            .apply_move(from.0, from.1, to.0, to.1, MoveOrigin::Local)
        {
            Some(record) => {
                self.state.set_my_turn(false);
                println!("{}", self.state);
                if record.is_promotion {
                    self.pending_promotion = Some((to.0, to.1));
                    println!(
                        "promote the pawn on {} to? (Queen/Rook/Bishop/Knight)",
                        square_name(to.0, to.1)
                    );
                } else {
                    self.report_status();
                }
            }
            None => println!("illegal move."),
        }
    }

    fn finish_promotion(&mut self, choice: &str) {
        let (row, col) = match self.pending_promotion {
            Some(square) => square,
            None => return,
        };
        let kind = match choice.to_ascii_lowercase().as_str() {
            "queen" | "q" => "Queen",
            "rook" | "r" => "Rook",
            "bishop" | "b" => "Bishop",
            "knight" | "n" => "Knight",
            other => {
                println!("'{}' is not a promotion piece.", other);
                return;
            }
        };
        match self.state.promote(row, col, kind) {
            Some(piece) => {
                self.pending_promotion = None;
                if let Some(session) = self.session.as_mut() {
                    if let Err(e) = session.send(&Message::Piece(piece)) {
                        println!("failed to send promotion to peer: {}", e);
                    }
                }
                println!("{}", self.state);
                self.report_status();
            }
            None => println!("pick one of Queen, Rook, Bishop or Knight."),
        }
    }

    fn cmd_auto(&mut self, color_arg: Option<&str>) {
        let color = match color_arg {
            Some("white") => Color::White,
            Some("black") => Color::Black,
            Some(other) => {
                println!("unknown color '{}'.", other);
                return;
            }
            None => self.my_color.unwrap_or(Color::White),
        };
        if self.state.is_game_over() {
            println!("the game is over.");
            return;
        }
        match self.state.random_move(color, &mut rand::rng()) {
            Some(m) => {
                println!("auto: {}", m);
                self.try_move((m.from_row, m.from_col), (m.to_row, m.to_col));
            }
            None => println!("no move available for {:?}.", color),
        }
    }

    // --- Peer messages ---

    fn handle_peer(&mut self, message: Message) {
        match message {
            Message::Move(m) => {
                let applied = self.state.apply_move(
                    m.from_row,
                    m.from_col,
                    m.to_row,
                    m.to_col,
                    MoveOrigin::Replay,
                );
                // An echo of our own forwarded move finds an empty
                // source square and dies here.
                if applied.is_some() {
                    self.state.set_my_turn(true);
                    println!("peer: {}", m);
                    println!("{}", self.state);
                    if m.is_promotion {
                        println!("waiting for the peer's promotion choice...");
                    } else {
                        self.report_status();
                        if !self.state.is_game_over() {
                            println!("your move.");
                        }
                    }
                }
            }
            Message::State(received) => {
                self.state.replace(received);
                println!("position received from the host.");
                println!("{}", self.state);
                if self.state.is_my_turn() {
                    println!("your move.");
                }
            }
            Message::Piece(piece) => {
                let square = square_name(piece.row, piece.col);
                println!("peer promoted to a {} on {}.", piece.kind.name(), square);
                self.state.add_piece(piece);
                println!("{}", self.state);
                self.report_status();
            }
        }
    }

    // --- Output ---

    fn report_status(&self) {
        if self.state.is_game_over() {
            for color in [Color::White, Color::Black] {
                if self.state.is_winner(color) {
                    println!("game over. {:?} wins!", color);
                }
            }
            return;
        }
        for color in [Color::White, Color::Black] {
            if self.state.is_checked(color) {
                println!("{:?} is in check.", color);
            }
        }
    }

    // --- Input dispatch ---

    /// Handles one line of input. Returns false to quit.
    fn handle_input(&mut self, line: &str) -> bool {
        if line.is_empty() {
            return true;
        }
        if self.pending_promotion.is_some() {
            self.finish_promotion(line);
            return true;
        }
        if let Some(caps) = MOVE_RE.captures(line) {
            let from = caps.get(1).and_then(|m| parse_square(m.as_str()));
            let to = caps.get(2).and_then(|m| parse_square(m.as_str()));
            if let (Some(from), Some(to)) = (from, to) {
                self.try_move(from, to);
            }
            return true;
        }
        let mut parts = line.split_whitespace();
        let command = parts.next().unwrap_or("");
        let arg = parts.next();
        match command {
            "host" => self.cmd_host(arg),
            "join" => self.cmd_join(arg),
            "auto" => self.cmd_auto(arg),
            "board" => println!("{}", self.state),
            "save" => match arg {
                Some(name) => match self.state.save(name) {
                    Ok(()) => println!("saved to {}{}.", name, engine::SAVE_SUFFIX),
                    Err(e) => println!("save failed: {}", e),
                },
                None => println!("usage: save <name>"),
            },
            "load" => match arg {
                Some(name) => match self.state.load(name) {
                    Ok(()) => {
                        println!("loaded {}{}.", name, engine::SAVE_SUFFIX);
                        println!("{}", self.state);
                        // The peer adopts the loaded position wholesale.
                        let snapshot = self.state.snapshot();
                        if let Some(session) = self.session.as_mut() {
                            if let Err(e) = session.send(&Message::State(snapshot)) {
                                println!("failed to send loaded state: {}", e);
                            }
                        }
                    }
                    Err(e) => println!("load failed: {}", e),
                },
                None => println!("usage: load <name>"),
            },
            "help" => print_help(),
            "quit" | "exit" => return false,
            other => println!("unknown command '{}'. type 'help'.", other),
        }
        true
    }
}

fn print_help() {
    println!("commands:");
    println!("  host <port>        wait for a peer and play White");
    println!("  join <host:port>   connect to a host and play Black");
    println!("  e2e4               move a piece (also: move e2 e4)");
    println!("  auto [white|black] play one random move");
    println!("  board              reprint the board");
    println!("  save <name>        write the game to <name>{}", engine::SAVE_SUFFIX);
    println!("  load <name>        restore the game from <name>{}", engine::SAVE_SUFFIX);
    println!("  quit               leave");
}

fn main() {
    env_logger::init();

    let (tx, rx) = channel();
    let input_tx = tx.clone();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => return,
            };
            if input_tx.send(AppEvent::Input(line)).is_err() {
                return;
            }
        }
    });

    let mut app = App::new(tx);
    println!("netchess. type 'help' for commands.");
    println!("{}", app.state);

    for event in rx {
        match event {
            AppEvent::Input(line) => {
                if !app.handle_input(line.trim()) {
                    break;
                }
            }
            AppEvent::Peer(message) => app.handle_peer(message),
        }
    }
}

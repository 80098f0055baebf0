//! In-process stand-ins for the music player and the panel board.
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use panel_proto::config::Config;
use panel_proto::stations::{Station, StationList};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::PanelResult;
use crate::mpd::MpdClient;
use crate::serial::{LinkPort, PortOpener, PortSettings, SerialLink};

// ── fake player ───────────────────────────────────────────────────────────────

pub(crate) struct FakeMpdOptions {
    pub greeting: String,
    pub password: Option<String>,
    pub volume: i64,
}

impl Default for FakeMpdOptions {
    fn default() -> Self {
        Self {
            greeting: "OK MPD 0.23.5".to_string(),
            password: None,
            volume: 100,
        }
    }
}

#[derive(Default)]
struct PlayerModel {
    volume: i64,
    playlist: Vec<String>,
    playing: Option<usize>,
    paused: bool,
}

struct Shared {
    options: FakeMpdOptions,
    model: Mutex<PlayerModel>,
    commands: Mutex<Vec<String>>,
    connections: AtomicUsize,
    drop_next: AtomicBool,
}

/// Minimal player speaking the text protocol on a loopback port.  Records
/// every line it receives.
pub(crate) struct FakeMpd {
    port: u16,
    shared: Arc<Shared>,
}

impl FakeMpd {
    pub async fn start() -> Self {
        Self::start_with(FakeMpdOptions::default()).await
    }

    pub async fn start_with(options: FakeMpdOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let shared = Arc::new(Shared {
            model: Mutex::new(PlayerModel {
                volume: options.volume,
                ..Default::default()
            }),
            options,
            commands: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            drop_next: AtomicBool::new(false),
        });

        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                accept_shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, accept_shared.clone()));
            }
        });

        Self { port, shared }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&self) -> MpdClient {
        MpdClient::new("127.0.0.1", self.port, None, Duration::from_secs(2))
    }

    pub fn commands(&self) -> Vec<String> {
        self.shared.commands.lock().unwrap().clone()
    }

    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Close the socket instead of answering the next command line.
    pub fn drop_connection_on_next_command(&self) {
        self.shared.drop_next.store(true, Ordering::SeqCst);
    }
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let (read_half, mut write_half) = stream.into_split();
    let greeting = format!("{}\n", shared.options.greeting);
    if write_half.write_all(greeting.as_bytes()).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(read_half).lines();
    let mut authed = shared.options.password.is_none();
    let mut batch: Option<Vec<String>> = None;

    while let Ok(Some(line)) = lines.next_line().await {
        if shared.drop_next.swap(false, Ordering::SeqCst) {
            return;
        }
        shared.commands.lock().unwrap().push(line.clone());

        let reply = if line == "command_list_begin" {
            batch = Some(Vec::new());
            continue;
        } else if line == "command_list_end" {
            let mut reply = ok("");
            for command in batch.take().unwrap_or_default() {
                let answer = shared.respond(&command, &mut authed);
                if answer.starts_with("ACK") {
                    reply = answer;
                    break;
                }
            }
            reply
        } else if let Some(pending) = batch.as_mut() {
            pending.push(line);
            continue;
        } else {
            shared.respond(&line, &mut authed)
        };

        if write_half.write_all(reply.as_bytes()).await.is_err() {
            return;
        }
    }
}

fn ok(body: &str) -> String {
    format!("{}OK\n", body)
}

fn ack(command: &str, message: &str) -> String {
    format!("ACK [5@0] {{{}}} {}\n", command, message)
}

/// Split a command line into words, honouring double quotes and backslash escapes.
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut arg = String::new();
        if first == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            arg.push(escaped);
                        }
                    }
                    '"' => break,
                    c => arg.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                arg.push(c);
                chars.next();
            }
        }
        args.push(arg);
    }
    args
}

impl Shared {
    fn respond(&self, line: &str, authed: &mut bool) -> String {
        let words = split_args(line);
        let Some((name, args)) = words.split_first() else {
            return ack("", "No command given");
        };
        let name = name.as_str();

        if name == "password" {
            return if self.options.password.as_deref() == args.first().map(String::as_str) {
                *authed = true;
                ok("")
            } else {
                ack(name, "incorrect password")
            };
        }
        if !*authed {
            return ack(name, &format!("you don't have permission for \"{}\"", name));
        }

        let number = |i: usize| args.get(i).and_then(|a| a.parse::<i64>().ok());
        let mut model = self.model.lock().unwrap();
        let len = model.playlist.len() as i64;

        match name {
            "status" => {
                let mut body = format!(
                    "volume: {}\nrepeat: 0\nrandom: 0\nplaylistlength: {}\n",
                    model.volume, len
                );
                match model.playing {
                    Some(i) => body.push_str(&format!(
                        "state: {}\nsong: {}\nsongid: {}\nelapsed: 3.500\n",
                        if model.paused { "pause" } else { "play" },
                        i,
                        i + 1
                    )),
                    None => body.push_str("state: stop\n"),
                }
                ok(&body)
            }
            "stats" => ok("uptime: 42\nplaytime: 7\n"),
            "currentsong" => match model.playing {
                Some(i) => ok(&format!(
                    "file: {}\nTitle: Fake Title\nName: Fake Station\n",
                    model.playlist[i]
                )),
                None => ok(""),
            },
            "setvol" => match number(0) {
                Some(v) => {
                    model.volume = v.clamp(0, 100);
                    ok("")
                }
                None => ack(name, "Integer expected"),
            },
            "volume" => match number(0) {
                Some(delta) => {
                    model.volume = (model.volume + delta).clamp(0, 100);
                    ok("")
                }
                None => ack(name, "Integer expected"),
            },
            "add" => match args.first() {
                Some(url) => {
                    model.playlist.push(url.clone());
                    ok("")
                }
                None => ack(name, "wrong number of arguments"),
            },
            "clear" => {
                model.playlist.clear();
                model.playing = None;
                ok("")
            }
            "delete" => match number(0).filter(|i| (0..len).contains(i)) {
                Some(i) => {
                    model.playlist.remove(i as usize);
                    model.playing = None;
                    ok("")
                }
                None => ack(name, "Bad song index"),
            },
            "move" => match (number(0), number(1)) {
                (Some(from), Some(to)) if (0..len).contains(&from) && (0..len).contains(&to) => {
                    let url = model.playlist.remove(from as usize);
                    model.playlist.insert(to as usize, url);
                    ok("")
                }
                _ => ack(name, "Bad song index"),
            },
            "play" => match number(0) {
                Some(i) if (0..len).contains(&i) => {
                    model.playing = Some(i as usize);
                    model.paused = false;
                    ok("")
                }
                _ => ack(name, "Bad song index"),
            },
            "stop" => {
                model.playing = None;
                ok("")
            }
            "pause" => {
                if model.playing.is_some() {
                    model.paused = !model.paused;
                }
                ok("")
            }
            "next" | "previous" | "repeat" | "random" | "seek" => ok(""),
            _ => ack(name, &format!("unknown command \"{}\"", name)),
        }
    }
}

// ── fake panel board ──────────────────────────────────────────────────────────

#[derive(Default)]
struct BoardState {
    ticks: i64,
    button: i64,
    display: Option<(usize, usize)>,
    silent: bool,
    garbled_button: bool,
    opens: usize,
    written: Vec<String>,
    partial: Vec<u8>,
    pending: VecDeque<u8>,
}

impl BoardState {
    fn handle_line(&mut self, line: String) {
        self.written.push(line.clone());
        if self.silent {
            return;
        }
        if line == "READ:" {
            let reply = if self.garbled_button {
                format!("VALUES:{}:#\r\n", self.ticks)
            } else {
                format!("VALUES:{}:{}\r\n", self.ticks, self.button)
            };
            self.pending.extend(reply.bytes());
        } else if line == "CFG:" {
            if let Some((cols, rows)) = self.display {
                let reply = format!("DISPLAY:{}:{}\r\n", cols, rows);
                self.pending.extend(reply.bytes());
            }
        } else if let Some(ticks) = line
            .strip_prefix("SET_ENC:")
            .and_then(|v| v.parse().ok())
        {
            self.ticks = ticks;
        }
    }
}

/// Panel microcontroller double: answers `READ:` and `CFG:` and tracks
/// `SET_ENC:` like the real encoder counter does.
#[derive(Clone, Default)]
pub(crate) struct FakeBoard(Arc<Mutex<BoardState>>);

impl FakeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(cols: usize, rows: usize) -> Self {
        let board = Self::default();
        board.0.lock().unwrap().display = Some((cols, rows));
        board
    }

    pub fn link(&self) -> SerialLink {
        SerialLink::new(Box::new(self.clone()))
    }

    pub fn set_values(&self, ticks: i64, button: i64) {
        let mut state = self.0.lock().unwrap();
        state.ticks = ticks;
        state.button = button;
    }

    pub fn set_garbled_button(&self, garbled: bool) {
        self.0.lock().unwrap().garbled_button = garbled;
    }

    pub fn set_silent(&self, silent: bool) {
        self.0.lock().unwrap().silent = silent;
    }

    pub fn opens(&self) -> usize {
        self.0.lock().unwrap().opens
    }

    pub fn written(&self) -> Vec<String> {
        self.0.lock().unwrap().written.clone()
    }

    pub fn take_written(&self) -> Vec<String> {
        std::mem::take(&mut self.0.lock().unwrap().written)
    }
}

impl PortOpener for FakeBoard {
    fn open(&self, _settings: &PortSettings) -> PanelResult<Box<dyn LinkPort>> {
        let mut state = self.0.lock().unwrap();
        state.opens += 1;
        state.pending.clear();
        state.partial.clear();
        Ok(Box::new(FakePort(self.0.clone())))
    }
}

struct FakePort(Arc<Mutex<BoardState>>);

impl Write for FakePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&state.partial).into_owned();
                state.partial.clear();
                state.handle_line(line);
            } else {
                state.partial.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Read for FakePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self.0.lock().unwrap();
        if state.pending.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "operation timed out",
            ));
        }
        let n = buf.len().min(state.pending.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.pending.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

// ── fixtures ──────────────────────────────────────────────────────────────────

pub(crate) fn stations(count: usize) -> StationList {
    StationList::new(
        (0..count)
            .map(|i| Station::new(format!("Station {}", i), format!("http://radio.test/{}", i)))
            .collect(),
    )
}

/// Config pointing at `server`, with every settle/backoff delay removed.
pub(crate) fn panel_config(server: &FakeMpd, state_file: &Path) -> Config {
    let mut config = Config::default();
    config.serial.boot_settle_ms = 0;
    config.serial.write_settle_ms = 0;
    config.player.host = "127.0.0.1".to_string();
    config.player.port = server.port();
    config.player.io_timeout_ms = 2000;
    config.daemon.state_file = state_file.to_path_buf();
    config.timing.poll_interval_ms = 0;
    config.timing.failure_backoff_ms = 0;
    config
}

/// Music Player Daemon text-protocol client.
///
/// One TCP session, strictly request → response:
///
/// ```text
///   connect()        ← "OK MPD 0.23.5"            (greeting carries the protocol version)
///   send_command()   → `setvol "40"`
///                    ← "key: value" lines … then "OK"
///                    ← or "ACK [50@0] {play} No such song"
///   flush_queue()    → command_list_begin / … / command_list_end   (one reply for the batch)
/// ```
///
/// Session lifecycle: Disconnected → Connected → Authenticated (optional) → Ready.
/// Any I/O failure drops back to Disconnected and the owner must `open()`
/// again.  The only implicit reconnect is the single retry inside a command
/// whose write failed.
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use panel_proto::state::clamp_volume;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{PanelError, PanelResult};

// ── protocol constants ────────────────────────────────────────────────────────

pub const RESPONSE_OK: &str = "OK";
pub const RESPONSE_ERR: &str = "ACK";

const CMD_STATUS: &str = "status";
const CMD_STATISTICS: &str = "stats";
const CMD_CURRENT_SONG: &str = "currentsong";
const CMD_VOLUME: &str = "volume";
const CMD_SETVOL: &str = "setvol";
const CMD_PLAY: &str = "play";
const CMD_STOP: &str = "stop";
const CMD_PAUSE: &str = "pause";
const CMD_NEXT: &str = "next";
const CMD_PREV: &str = "previous";
const CMD_PLADD: &str = "add";
const CMD_PLREMOVE: &str = "delete";
const CMD_PLCLEAR: &str = "clear";
const CMD_PLMOVETRACK: &str = "move";
const CMD_REPEAT: &str = "repeat";
const CMD_RANDOM: &str = "random";
const CMD_SEEK: &str = "seek";
const CMD_PASSWORD: &str = "password";
const CMD_START_BULK: &str = "command_list_begin";
const CMD_END_BULK: &str = "command_list_end";

// ── version gating ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `major[.minor[.patch]]`; missing parts are zero.
    pub fn parse(version: &str) -> Option<Self> {
        let mut parts = version.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        Some(Self::new(major, minor, patch))
    }

    /// Single number used for range checks: `100*major + 10*minor + patch`.
    pub fn value(&self) -> u32 {
        self.major
            .saturating_mul(100)
            .saturating_add(self.minor.saturating_mul(10))
            .saturating_add(self.patch)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

struct CommandRange {
    command: &'static str,
    min: Option<ProtocolVersion>,
    max: Option<ProtocolVersion>,
}

const V0_9_1: ProtocolVersion = ProtocolVersion::new(0, 9, 1);
const V0_10_0: ProtocolVersion = ProtocolVersion::new(0, 10, 0);

/// Commands not listed here are allowed on every version.
const COMPATIBILITY: &[CommandRange] = &[
    CommandRange {
        command: CMD_SEEK,
        min: Some(V0_9_1),
        max: None,
    },
    CommandRange {
        command: CMD_PLREMOVE,
        min: Some(V0_9_1),
        max: None,
    },
    CommandRange {
        command: CMD_RANDOM,
        min: Some(V0_9_1),
        max: None,
    },
    CommandRange {
        command: "swap",
        min: Some(V0_9_1),
        max: None,
    },
    CommandRange {
        command: CMD_PLMOVETRACK,
        min: Some(V0_9_1),
        max: None,
    },
    CommandRange {
        command: CMD_PASSWORD,
        min: Some(V0_10_0),
        max: None,
    },
    CommandRange {
        command: CMD_SETVOL,
        min: Some(V0_10_0),
        max: None,
    },
    CommandRange {
        command: CMD_VOLUME,
        min: None,
        max: Some(V0_10_0),
    },
];

pub fn check_compatibility(command: &str, version: ProtocolVersion) -> PanelResult<()> {
    let Some(range) = COMPATIBILITY.iter().find(|r| r.command == command) else {
        return Ok(());
    };
    let have = version.value();

    if let Some(min) = range.min {
        if have < min.value() {
            return Err(PanelError::Compatibility {
                command: command.to_string(),
                version: version.to_string(),
                reason: format!("version {} required", min),
            });
        }
    }

    if let Some(max) = range.max {
        if have > max.value() {
            return Err(PanelError::Compatibility {
                command: command.to_string(),
                version: version.to_string(),
                reason: format!("deprecated after {}", max),
            });
        }
    }

    Ok(())
}

// ── wire helpers ──────────────────────────────────────────────────────────────

fn quote_arg(arg: &str) -> String {
    format!("\"{}\"", arg.replace('\\', "\\\\").replace('"', "\\\""))
}

fn build_line(name: &str, args: &[&str]) -> String {
    let mut line = name.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(&quote_arg(arg));
    }
    line
}

/// `OK <product> <version>` → version.
fn parse_greeting(line: &str) -> Option<ProtocolVersion> {
    let rest = line.trim().strip_prefix(RESPONSE_OK)?.strip_prefix(' ')?;
    let mut parts = rest.split_whitespace();
    let _product = parts.next()?;
    ProtocolVersion::parse(parts.next()?)
}

/// `ACK [50@0] {play} No such song` → `No such song`.
fn parse_ack(line: &str) -> String {
    let rest = line
        .trim()
        .strip_prefix(RESPONSE_ERR)
        .unwrap_or(line)
        .trim_start();
    match rest.find("} ") {
        Some(idx) => rest[idx + 2..].to_string(),
        None => rest.to_string(),
    }
}

/// `key: value` body lines.  Lines without the separator are skipped.
pub fn parse_pairs(body: &str) -> impl Iterator<Item = (String, String)> + '_ {
    body.lines().filter_map(|line| {
        line.split_once(": ")
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    })
}

// ── status cache ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayState {
    Play,
    #[default]
    Stop,
    Pause,
}

/// Last known `stats` + `status` fields.
#[derive(Debug, Clone, Default)]
pub struct PlayerStatus {
    pub state: PlayState,
    /// Playlist position of the current song.  `None` when stopped.
    pub song: Option<u32>,
    pub song_id: Option<u32>,
    pub elapsed: Option<f64>,
    pub duration: Option<f64>,
    /// `None` when the player has no mixer (`volume: -1`).
    pub volume: Option<u8>,
    pub repeat: bool,
    pub random: bool,
    pub playlist_length: u32,
    pub uptime: Option<u64>,
    pub playtime: Option<u64>,
    fields: HashMap<String, String>,
}

impl PlayerStatus {
    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        let num = |key: &str| fields.get(key).and_then(|v| v.parse::<u64>().ok());
        let flag = |key: &str| fields.get(key).map(|v| v == "1").unwrap_or(false);

        let state = match fields.get("state").map(String::as_str) {
            Some("play") => PlayState::Play,
            Some("pause") => PlayState::Pause,
            _ => PlayState::Stop,
        };

        let (mut song, mut song_id, mut elapsed, mut duration) = (None, None, None, None);
        if state != PlayState::Stop {
            song = num("song").map(|v| v as u32);
            song_id = num("songid").map(|v| v as u32);
            // Old servers only send `time: <elapsed>:<total>`
            if let Some((pos, len)) = fields.get("time").and_then(|t| t.split_once(':')) {
                elapsed = pos.parse().ok();
                duration = len.parse().ok();
            }
            if let Some(v) = fields.get("elapsed").and_then(|v| v.parse().ok()) {
                elapsed = Some(v);
            }
            if let Some(v) = fields.get("duration").and_then(|v| v.parse().ok()) {
                duration = Some(v);
            }
        }

        let volume = fields
            .get("volume")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v >= 0)
            .map(clamp_volume);

        Self {
            state,
            song,
            song_id,
            elapsed,
            duration,
            volume,
            repeat: flag("repeat"),
            random: flag("random"),
            playlist_length: num("playlistlength").unwrap_or(0) as u32,
            uptime: num("uptime"),
            playtime: num("playtime"),
            fields,
        }
    }

    /// Raw field as reported by the server (e.g. `bitrate`, `db_update`).
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

// ── client ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    Ready,
}

struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    version: ProtocolVersion,
}

pub struct MpdClient {
    host: String,
    port: u16,
    password: Option<String>,
    io_timeout: Duration,
    session: Option<Session>,
    state: SessionState,
    queue: Vec<String>,
    status: PlayerStatus,
}

impl MpdClient {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        password: Option<String>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            password,
            io_timeout,
            session: None,
            state: SessionState::Disconnected,
            queue: Vec::new(),
            status: PlayerStatus::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn protocol_version(&self) -> Option<ProtocolVersion> {
        self.session.as_ref().map(|s| s.version)
    }

    /// Cached status from the last `refresh_status()`.
    pub fn status(&self) -> &PlayerStatus {
        &self.status
    }

    // ── session lifecycle ─────────────────────────────────────────────────────

    /// Open a socket and read the greeting.  Replaces any existing session.
    pub async fn connect(&mut self) -> PanelResult<ProtocolVersion> {
        self.disconnect();

        let addr = format!("{}:{}", self.host, self.port);
        debug!("mpd: connecting to {}", addr);
        let stream = match timeout(self.io_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(PanelError::Connection(format!(
                    "cannot connect to {}: {}",
                    addr, e
                )))
            }
            Err(_) => {
                return Err(PanelError::Connection(format!(
                    "timed out connecting to {}",
                    addr
                )))
            }
        };

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut greeting = String::new();
        match timeout(self.io_timeout, reader.read_line(&mut greeting)).await {
            Ok(Ok(0)) => {
                return Err(PanelError::Connection(
                    "connection closed before greeting".to_string(),
                ))
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(PanelError::Connection(format!("greeting: {}", e))),
            Err(_) => {
                return Err(PanelError::Connection(
                    "timed out waiting for greeting".to_string(),
                ))
            }
        }

        let version = parse_greeting(&greeting).ok_or_else(|| {
            PanelError::Connection(format!("unexpected greeting: {}", greeting.trim()))
        })?;

        self.session = Some(Session {
            reader,
            writer: write_half,
            version,
        });
        self.state = SessionState::Connected;
        info!("mpd: connected to {} (protocol {})", addr, version);
        Ok(version)
    }

    pub async fn authenticate(&mut self, password: &str) -> PanelResult<()> {
        let version = self.require_version()?;
        check_compatibility(CMD_PASSWORD, version)?;

        // Goes straight to the wire: a retry here would recurse into reconnect.
        let line = build_line(CMD_PASSWORD, &[password]);
        debug!("mpd: > {} \"***\"", CMD_PASSWORD);
        let result = match self.write_payload(&line).await {
            Ok(()) => self.read_response().await,
            Err(e) => {
                self.disconnect();
                Err(PanelError::Connection(format!("write failed: {}", e)))
            }
        };

        match result {
            Ok(_) => {
                self.state = SessionState::Authenticated;
                debug!("mpd: authenticated");
                Ok(())
            }
            Err(PanelError::Protocol { message }) => {
                self.disconnect();
                Err(PanelError::Auth(message))
            }
            Err(e) => Err(e),
        }
    }

    /// Connect, authenticate when a password is configured, and load the
    /// initial status.  A session that cannot read status is useless, so a
    /// refusal there is reported as an authentication problem.
    pub async fn open(&mut self) -> PanelResult<()> {
        self.connect().await?;
        if let Some(password) = self.password.clone() {
            self.authenticate(&password).await?;
        }
        match self.refresh_status().await {
            Ok(_) => {}
            Err(PanelError::Protocol { message }) => {
                self.disconnect();
                return Err(PanelError::Auth(format!("no read access: {}", message)));
            }
            Err(e) => return Err(e),
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            debug!("mpd: session closed");
        }
        self.state = SessionState::Disconnected;
    }

    async fn reconnect(&mut self) -> PanelResult<()> {
        self.connect().await?;
        if let Some(password) = self.password.clone() {
            self.authenticate(&password).await?;
        }
        Ok(())
    }

    fn require_version(&self) -> PanelResult<ProtocolVersion> {
        self.protocol_version()
            .ok_or_else(|| PanelError::Connection("not connected".to_string()))
    }

    // ── raw I/O ───────────────────────────────────────────────────────────────

    async fn write_payload(&mut self, payload: &str) -> std::io::Result<()> {
        let session = self.session.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected")
        })?;
        let mut data = payload.to_string();
        if !data.ends_with('\n') {
            data.push('\n');
        }
        match timeout(self.io_timeout, session.writer.write_all(data.as_bytes())).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "write timed out",
            )),
        }
    }

    /// Read until `OK` (returns the body) or `ACK` (returns the error).
    async fn read_response(&mut self) -> PanelResult<String> {
        let mut body = String::new();
        loop {
            let Some(session) = self.session.as_mut() else {
                return Err(PanelError::Connection("not connected".to_string()));
            };
            let mut line = String::new();
            match timeout(self.io_timeout, session.reader.read_line(&mut line)).await {
                Ok(Ok(0)) => {
                    self.disconnect();
                    return Err(PanelError::Connection(
                        "connection closed by player".to_string(),
                    ));
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    self.disconnect();
                    return Err(PanelError::Connection(format!("read error: {}", e)));
                }
                Err(_) => {
                    self.disconnect();
                    return Err(PanelError::Connection(
                        "timed out waiting for reply".to_string(),
                    ));
                }
            }

            if line.starts_with(RESPONSE_OK) {
                return Ok(body);
            }
            if line.starts_with(RESPONSE_ERR) {
                let message = parse_ack(&line);
                debug!("mpd: < ACK {}", message);
                return Err(PanelError::Protocol { message });
            }
            body.push_str(&line);
        }
    }

    /// Write with one reconnect-and-retry, then read the reply.
    async fn send_raw(&mut self, payload: &str) -> PanelResult<String> {
        if self.session.is_none() {
            return Err(PanelError::Connection("not connected".to_string()));
        }
        if let Err(e) = self.write_payload(payload).await {
            warn!("mpd: write failed ({}), reconnecting once", e);
            self.reconnect().await?;
            self.state = SessionState::Ready;
            if let Err(e) = self.write_payload(payload).await {
                self.disconnect();
                return Err(PanelError::Connection(format!(
                    "write failed after reconnect: {}",
                    e
                )));
            }
        }
        self.read_response().await
    }

    // ── commands ──────────────────────────────────────────────────────────────

    pub async fn send_command(&mut self, name: &str, args: &[&str]) -> PanelResult<String> {
        let version = self.require_version()?;
        check_compatibility(name, version)?;
        let line = build_line(name, args);
        debug!("mpd: > {}", line);
        self.send_raw(&line).await
    }

    /// Buffer a command for the next `flush_queue()`.  Gated immediately so a
    /// batch never contains a command the server would reject for its version.
    pub fn queue_command(&mut self, name: &str, args: &[&str]) -> PanelResult<()> {
        let version = self.require_version()?;
        check_compatibility(name, version)?;
        self.queue.push(build_line(name, args));
        Ok(())
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Send every queued command as one `command_list_begin … command_list_end`
    /// exchange.  The queue is emptied whether or not the batch succeeds.
    pub async fn flush_queue(&mut self) -> PanelResult<String> {
        if self.queue.is_empty() {
            return Ok(String::new());
        }
        let commands = std::mem::take(&mut self.queue);
        debug!("mpd: > bulk of {} commands", commands.len());
        let payload = format!(
            "{}\n{}\n{}",
            CMD_START_BULK,
            commands.join("\n"),
            CMD_END_BULK
        );
        self.send_raw(&payload).await
    }

    pub async fn refresh_status(&mut self) -> PanelResult<&PlayerStatus> {
        let stats = self.send_command(CMD_STATISTICS, &[]).await?;
        let status = self.send_command(CMD_STATUS, &[]).await?;
        let fields: HashMap<String, String> =
            parse_pairs(&stats).chain(parse_pairs(&status)).collect();
        self.status = PlayerStatus::from_fields(fields);
        Ok(&self.status)
    }

    async fn mutate(&mut self, name: &str, args: &[&str]) -> PanelResult<String> {
        let response = self.send_command(name, args).await?;
        self.refresh_status().await?;
        Ok(response)
    }

    /// Set the mixer volume, clamped to 0–100.  Servers too old for `setvol`
    /// get a relative `volume` adjustment instead.
    pub async fn set_volume(&mut self, volume: i64) -> PanelResult<u8> {
        let volume = clamp_volume(volume);
        let version = self.require_version()?;

        if check_compatibility(CMD_SETVOL, version).is_ok() {
            self.mutate(CMD_SETVOL, &[volume.to_string().as_str()])
                .await?;
        } else {
            let current = self.refresh_status().await?.volume.ok_or_else(|| {
                PanelError::Protocol {
                    message: "player reports no mixer volume".to_string(),
                }
            })?;
            let delta = volume as i64 - current as i64;
            self.mutate(CMD_VOLUME, &[delta.to_string().as_str()])
                .await?;
        }
        Ok(volume)
    }

    pub async fn playlist_add(&mut self, url: &str) -> PanelResult<()> {
        self.mutate(CMD_PLADD, &[url]).await.map(|_| ())
    }

    /// Append many entries with a single round trip.
    pub async fn playlist_add_bulk(&mut self, urls: &[&str]) -> PanelResult<()> {
        for url in urls {
            self.queue_command(CMD_PLADD, &[*url])?;
        }
        self.flush_queue().await?;
        self.refresh_status().await?;
        Ok(())
    }

    pub async fn playlist_clear(&mut self) -> PanelResult<()> {
        self.mutate(CMD_PLCLEAR, &[]).await.map(|_| ())
    }

    /// Move the entry at `from` to `to` (0-based).  `to` is clamped into the
    /// playlist; `from` must exist.
    pub async fn playlist_move_track(&mut self, from: u32, to: i64) -> PanelResult<()> {
        let len = self.status.playlist_length;
        if from >= len {
            return Err(PanelError::InvalidArgument(format!(
                "track {} out of range (playlist has {})",
                from, len
            )));
        }
        let to = to.clamp(0, len.saturating_sub(1) as i64);
        self.mutate(
            CMD_PLMOVETRACK,
            &[from.to_string().as_str(), to.to_string().as_str()],
        )
        .await
        .map(|_| ())
    }

    pub async fn playlist_remove_track(&mut self, position: u32) -> PanelResult<()> {
        self.mutate(CMD_PLREMOVE, &[position.to_string().as_str()])
            .await
            .map(|_| ())
    }

    /// Start playback at playlist position `index` (0-based).
    pub async fn play(&mut self, index: usize) -> PanelResult<()> {
        self.mutate(CMD_PLAY, &[index.to_string().as_str()])
            .await
            .map(|_| ())
    }

    pub async fn stop(&mut self) -> PanelResult<()> {
        self.mutate(CMD_STOP, &[]).await.map(|_| ())
    }

    /// Toggle pause.
    pub async fn pause(&mut self) -> PanelResult<()> {
        self.mutate(CMD_PAUSE, &[]).await.map(|_| ())
    }

    pub async fn next(&mut self) -> PanelResult<()> {
        self.mutate(CMD_NEXT, &[]).await.map(|_| ())
    }

    pub async fn previous(&mut self) -> PanelResult<()> {
        self.mutate(CMD_PREV, &[]).await.map(|_| ())
    }

    pub async fn set_repeat(&mut self, on: bool) -> PanelResult<()> {
        self.mutate(CMD_REPEAT, &[if on { "1" } else { "0" }])
            .await
            .map(|_| ())
    }

    pub async fn set_random(&mut self, on: bool) -> PanelResult<()> {
        self.mutate(CMD_RANDOM, &[if on { "1" } else { "0" }])
            .await
            .map(|_| ())
    }

    /// Seek to `seconds` within `track`, or within the current song.
    pub async fn seek_to(&mut self, seconds: u32, track: Option<u32>) -> PanelResult<()> {
        let track = track.or(self.status.song).ok_or_else(|| {
            PanelError::InvalidArgument("no track given and nothing is playing".to_string())
        })?;
        self.mutate(
            CMD_SEEK,
            &[track.to_string().as_str(), seconds.to_string().as_str()],
        )
        .await
        .map(|_| ())
    }

    /// Tags of the current song (`Title`, `Name`, `file`, …).  Empty when stopped.
    pub async fn current_song(&mut self) -> PanelResult<HashMap<String, String>> {
        let body = self.send_command(CMD_CURRENT_SONG, &[]).await?;
        Ok(parse_pairs(&body).collect())
    }
}

//! Player transport that shells out to `mpc` for every action instead of
//! holding a socket.  Slower, but works against players that only expose
//! the command-line helper.
use std::path::{Path, PathBuf};
use std::process::Stdio;

use panel_proto::state::clamp_volume;
use tracing::{debug, info};

use crate::error::{PanelError, PanelResult};

const NOW_PLAYING_FORMAT: &str = "%title% >>> %name%";
const NOW_PLAYING_SEPARATOR: &str = " >>> ";

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

/// Run `program` to completion and capture its output.
pub async fn run_process(program: &Path, args: &[String]) -> std::io::Result<ProcessOutput> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;
    Ok(ProcessOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

pub struct MpcClient {
    binary: PathBuf,
    host: String,
    port: u16,
    password: Option<String>,
    connected: bool,
}

impl MpcClient {
    pub fn new(
        binary: impl Into<PathBuf>,
        host: impl Into<String>,
        port: u16,
        password: Option<String>,
    ) -> Self {
        Self {
            binary: binary.into(),
            host: host.into(),
            port,
            password,
            connected: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// `mpc` takes the password as `password@host`.
    fn argv(&self, command: &str, args: &[String]) -> Vec<String> {
        let host = match &self.password {
            Some(password) => format!("{}@{}", password, self.host),
            None => self.host.clone(),
        };
        let mut argv = vec![
            "--host".to_string(),
            host,
            "--port".to_string(),
            self.port.to_string(),
            command.to_string(),
        ];
        argv.extend(args.iter().cloned());
        argv
    }

    pub async fn exec(&self, command: &str, args: &[String]) -> PanelResult<String> {
        debug!("mpc: {} {}", command, args.join(" "));
        let output = run_process(&self.binary, &self.argv(command, args))
            .await
            .map_err(|e| {
                PanelError::Connection(format!("cannot run {}: {}", self.binary.display(), e))
            })?;

        if output.success() {
            return Ok(output.stdout);
        }

        let message = match output.stderr.trim() {
            "" => format!("{} exited with status {:?}", self.binary.display(), output.status),
            text => text.to_string(),
        };
        let lowered = message.to_ascii_lowercase();
        if lowered.contains("password") || lowered.contains("permission") {
            Err(PanelError::Auth(message))
        } else if lowered.contains("connect") {
            Err(PanelError::Connection(message))
        } else {
            Err(PanelError::Protocol { message })
        }
    }

    /// Ask the player for its status once; there is no session to hold open.
    pub async fn connect(&mut self) -> PanelResult<()> {
        self.exec("status", &[]).await?;
        self.connected = true;
        info!("mpc: reached player at {}:{}", self.host, self.port);
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub async fn set_volume(&mut self, volume: i64) -> PanelResult<u8> {
        let volume = clamp_volume(volume);
        self.exec("volume", &[volume.to_string()]).await?;
        Ok(volume)
    }

    pub async fn playlist_add(&mut self, url: &str) -> PanelResult<()> {
        self.exec("add", &[url.to_string()]).await.map(|_| ())
    }

    pub async fn playlist_clear(&mut self) -> PanelResult<()> {
        self.exec("clear", &[]).await.map(|_| ())
    }

    // mpc counts playlist positions from 1.

    pub async fn playlist_move_track(&mut self, from: u32, to: u32) -> PanelResult<()> {
        self.exec("move", &[(from + 1).to_string(), (to + 1).to_string()])
            .await
            .map(|_| ())
    }

    pub async fn playlist_remove_track(&mut self, position: u32) -> PanelResult<()> {
        self.exec("del", &[(position + 1).to_string()])
            .await
            .map(|_| ())
    }

    pub async fn play(&mut self, index: usize) -> PanelResult<()> {
        self.exec("play", &[(index + 1).to_string()])
            .await
            .map(|_| ())
    }

    pub async fn stop(&mut self) -> PanelResult<()> {
        self.exec("stop", &[]).await.map(|_| ())
    }

    pub async fn pause(&mut self) -> PanelResult<()> {
        self.exec("toggle", &[]).await.map(|_| ())
    }

    /// `(title, stream name)` of the current song; both empty when stopped.
    pub async fn current(&mut self) -> PanelResult<(String, String)> {
        let out = self
            .exec(
                "current",
                &["--format".to_string(), NOW_PLAYING_FORMAT.to_string()],
            )
            .await?;
        Ok(parse_current(&out))
    }
}

fn parse_current(output: &str) -> (String, String) {
    let line = output.lines().next().unwrap_or("").trim();
    match line.split_once(NOW_PLAYING_SEPARATOR) {
        Some((title, name)) => (title.trim().to_string(), name.trim().to_string()),
        None => (line.to_string(), String::new()),
    }
}

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use flock_core::player::Avatar;
use flock_core::session::{SpawnConfig, is_restart_request, parse_listening};

use crate::config::SessionConfig;

#[derive(Debug)]
pub enum LaunchError {
    EmptyRoster,
    NoPortAvailable,
    Spawn(std::io::Error),
    /// The session process exited or misbehaved before acknowledging its port.
    Handshake(String),
}

impl std::fmt::Display for LaunchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyRoster => write!(f, "cannot launch a session with no participants"),
            Self::NoPortAvailable => write!(f, "no free port in the configured session range"),
            Self::Spawn(e) => write!(f, "failed to spawn session process: {e}"),
            Self::Handshake(m) => write!(f, "session handshake failed: {m}"),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Spawns one isolated game session process per launched room and tracks the
/// ports currently held by live sessions. Cheap to clone; clones share the
/// allocation set.
#[derive(Clone)]
pub struct SessionLauncher {
    config: Arc<SessionConfig>,
    allocated: Arc<Mutex<HashSet<u16>>>,
}

/// A running session process plus its status-line stream.
#[derive(Debug)]
pub struct LaunchedSession {
    pub port: u16,
    pub spawn: SpawnConfig,
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl SessionLauncher {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(config),
            allocated: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Reserve a port from the configured range that no live session holds.
    /// Random starting point, then a linear scan so exhaustion is detected
    /// deterministically.
    fn allocate_port(&self) -> Option<u16> {
        let (start, end) = (self.config.port_range_start, self.config.port_range_end);
        let span = u32::from(end - start) + 1;
        let offset = rand::rng().random_range(0..span);
        let mut allocated = self.allocated.lock().unwrap();
        for i in 0..span {
            let port = start + ((offset + i) % span) as u16;
            if allocated.insert(port) {
                return Some(port);
            }
        }
        None
    }

    /// Release a port once its session process has exited.
    pub fn release_port(&self, port: u16) {
        self.allocated.lock().unwrap().remove(&port);
    }

    /// Launch a session for the given join-ordered roster. Each failed attempt
    /// releases its port and retries with a fresh allocation, never the same
    /// endpoint, up to the configured bound.
    pub async fn launch(
        &self,
        participants: Vec<String>,
        avatars: Vec<Avatar>,
    ) -> Result<LaunchedSession, LaunchError> {
        let mut last_err = LaunchError::NoPortAvailable;
        for attempt in 1..=self.config.launch_retries {
            let Some(port) = self.allocate_port() else {
                return Err(LaunchError::NoPortAvailable);
            };
            let spawn =
                SpawnConfig::from_join_order(port, participants.clone(), avatars.clone())
                    .ok_or(LaunchError::EmptyRoster)?;
            match self.spawn_session(spawn).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::warn!(port, attempt, error = %e, "Session launch attempt failed");
                    self.release_port(port);
                    last_err = e;
                },
            }
        }
        Err(last_err)
    }

    /// Spawn the session binary, hand it the spawn config as one JSON line on
    /// stdin, and wait for its `listening` status line.
    async fn spawn_session(&self, spawn: SpawnConfig) -> Result<LaunchedSession, LaunchError> {
        let mut child = Command::new(&self.config.bin_path)
            .env("FLOCK_SCORES_PATH", &self.config.scores_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(LaunchError::Spawn)?;

        let handshake =
            serde_json::to_string(&spawn).map_err(|e| LaunchError::Handshake(e.to_string()))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| LaunchError::Handshake("session stdin unavailable".to_string()))?;
        stdin
            .write_all(format!("{handshake}\n").as_bytes())
            .await
            .map_err(|e| LaunchError::Handshake(e.to_string()))?;
        drop(stdin); // one-shot channel; the session reads a single line

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::Handshake("session stdout unavailable".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if parse_listening(&line).is_some() {
                        tracing::info!(port = spawn.port, "Session listening");
                        return Ok(LaunchedSession {
                            port: spawn.port,
                            spawn,
                            child,
                            lines,
                        });
                    }
                    tracing::debug!(port = spawn.port, line = %line, "Session status before listen");
                },
                Ok(None) => {
                    return Err(LaunchError::Handshake(
                        "session exited before listening".to_string(),
                    ));
                },
                Err(e) => return Err(LaunchError::Handshake(e.to_string())),
            }
        }
    }
}

impl LaunchedSession {
    /// Consume status lines until the session requests a restart (true) or
    /// its status stream closes (false). No timeout: a silent session simply
    /// never resolves, matching the relay's no-cancellation model.
    pub async fn wait_restart_or_exit(&mut self) -> bool {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    if is_restart_request(&line) {
                        tracing::info!(port = self.port, line = %line, "Session requested restart");
                        return true;
                    }
                    tracing::debug!(port = self.port, line = %line, "Session status");
                },
                Ok(None) => return false,
                Err(e) => {
                    tracing::debug!(port = self.port, error = %e, "Session status stream error");
                    return false;
                },
            }
        }
    }

    /// Wait for the process to exit and release its port. The old session is
    /// left to drain on its own after a restart; this is the tail of that.
    pub async fn drain(mut self, launcher: &SessionLauncher) {
        match self.child.wait().await {
            Ok(status) => {
                tracing::info!(port = self.port, %status, "Session exited");
            },
            Err(e) => {
                tracing::warn!(port = self.port, error = %e, "Failed to reap session");
            },
        }
        launcher.release_port(self.port);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher_with_range(start: u16, end: u16) -> SessionLauncher {
        SessionLauncher::new(SessionConfig {
            port_range_start: start,
            port_range_end: end,
            ..SessionConfig::default()
        })
    }

    #[test]
    fn allocation_exhausts_range_then_recovers() {
        let launcher = launcher_with_range(42000, 42002);
        let mut ports: Vec<u16> = (0..3)
            .map(|_| launcher.allocate_port().expect("port available"))
            .collect();
        ports.sort();
        assert_eq!(ports, vec![42000, 42001, 42002]);
        assert!(launcher.allocate_port().is_none());

        launcher.release_port(42001);
        assert_eq!(launcher.allocate_port(), Some(42001));
    }

    #[test]
    fn single_port_range_works() {
        let launcher = launcher_with_range(42500, 42500);
        assert_eq!(launcher.allocate_port(), Some(42500));
        assert!(launcher.allocate_port().is_none());
    }

    #[test]
    fn clones_share_the_allocation_set() {
        let launcher = launcher_with_range(42000, 42001);
        let clone = launcher.clone();
        let a = launcher.allocate_port().unwrap();
        let b = clone.allocate_port().unwrap();
        assert_ne!(a, b);
        assert!(launcher.allocate_port().is_none());
    }
}

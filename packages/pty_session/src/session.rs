use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::{Read, Write};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Configuration for spawning the session
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    pub env: Vec<(String, String)>,
    pub cols: u16,
    pub rows: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: "/bin/bash".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            cols: 80,
            rows: 24,
        }
    }
}

/// Snapshot of the session's current state
#[derive(Clone, Debug)]
pub struct SessionState {
    pub running: bool,
    pub pid: Option<u32>,
    pub command: String,
    pub cols: u16,
    pub rows: u16,
}

/// Messages that can be sent to the session actor
pub(crate) enum SessionMessage {
    Write {
        data: Vec<u8>,
        respond_to: oneshot::Sender<Result<usize, SessionError>>,
    },
    Resize {
        cols: u16,
        rows: u16,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Handle to communicate with the session actor
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    output_tx: broadcast::Sender<Vec<u8>>,
}

impl SessionHandle {
    /// Write client keystrokes into the child's input
    pub async fn write(&self, data: &[u8]) -> Result<usize, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Write {
                data: data.to_vec(),
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::Channel("failed to send write message".into()))?;
        rx.await
            .map_err(|_| SessionError::Channel("failed to receive write response".into()))?
    }

    /// Apply a new viewport size to the terminal device
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Resize {
                cols,
                rows,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::Channel("failed to send resize message".into()))?;
        rx.await
            .map_err(|_| SessionError::Channel("failed to receive resize response".into()))?
    }

    /// Get the current state of the session
    pub async fn state(&self) -> Result<SessionState, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|_| SessionError::Channel("failed to send state message".into()))?;
        rx.await
            .map_err(|_| SessionError::Channel("failed to receive state response".into()))
    }

    /// Subscribe to raw output from the session
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<u8>> {
        self.output_tx.subscribe()
    }

    /// Number of active output subscribers
    pub fn subscriber_count(&self) -> usize {
        self.output_tx.receiver_count()
    }
}

/// The actor that owns the PTY master and the child process.
///
/// All writes and resizes funnel through the actor's message channel, so the
/// underlying system calls are never issued concurrently. A dedicated blocking
/// thread is the only reader of the master handle.
pub struct SessionActor {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    state: SessionState,
    receiver: mpsc::Receiver<SessionMessage>,
}

impl SessionActor {
    /// Spawn the child inside a fresh PTY and return a handle to it.
    ///
    /// The child becomes the leader of a new terminal session with the slave
    /// device as its controlling terminal, which is what lets a multiplexer
    /// underneath keep the session alive across bridge restarts.
    pub fn spawn(config: SessionConfig) -> Result<SessionHandle, SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&config.command);
        for arg in &config.args {
            cmd.arg(arg);
        }

        if let Some(dir) = &config.working_dir {
            debug!("setting session working directory: {}", dir);
            cmd.cwd(dir);
        }

        // Terminal contract for the child: color-capable terminal type and a
        // UTF-8 locale, overridable by caller-supplied variables below.
        cmd.env("TERM", "xterm-256color");
        cmd.env("COLORTERM", "truecolor");
        cmd.env("LANG", "en_US.UTF-8");

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        info!(
            "spawning session command: {} with args: {:?}",
            config.command, config.args
        );

        let child = pair.slave.spawn_command(cmd).map_err(|e| {
            warn!("failed to spawn command '{}': {}", config.command, e);
            SessionError::SpawnFailed(e.to_string())
        })?;

        let pid = child.process_id();
        info!("session process started with PID: {:?}", pid);

        let writer = pair
            .master
            .take_writer()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::SpawnFailed(e.to_string()))?;

        let state = SessionState {
            running: true,
            pid,
            command: config.command.clone(),
            cols: config.cols,
            rows: config.rows,
        };

        let (output_tx, _) = broadcast::channel(1024);
        let (msg_tx, msg_rx) = mpsc::channel(32);

        let mut actor = Self {
            master: pair.master,
            writer,
            child,
            state,
            receiver: msg_rx,
        };

        // Dedicated blocking thread: the sole reader of the master handle.
        // Output is published even with zero subscribers so the child never
        // blocks on a full output buffer.
        let output_tx_reader = output_tx.clone();
        std::thread::spawn(move || {
            let mut buffer = vec![0u8; 4096];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => {
                        info!("session EOF, child process exited");
                        break;
                    }
                    Ok(n) => {
                        let _ = output_tx_reader.send(buffer[..n].to_vec());
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!("error reading session output: {}", e);
                        break;
                    }
                }
            }
            debug!("session reader thread exiting");
        });

        tokio::spawn(async move {
            actor.run().await;
        });

        Ok(SessionHandle {
            sender: msg_tx,
            output_tx,
        })
    }

    async fn run(&mut self) {
        debug!(
            "session actor started for command: {} with PID: {:?}",
            self.state.command, self.state.pid
        );

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                SessionMessage::Write { data, respond_to } => {
                    let result = self.handle_write(&data);
                    let _ = respond_to.send(result);
                }
                SessionMessage::Resize {
                    cols,
                    rows,
                    respond_to,
                } => {
                    let result = self.handle_resize(cols, rows);
                    let _ = respond_to.send(result);
                }
                SessionMessage::GetState { respond_to } => {
                    let _ = respond_to.send(self.state.clone());
                }
            }

            if let Ok(Some(status)) = self.child.try_wait() {
                info!("session process exited with status: {:?}", status);
                self.state.running = false;
                self.state.pid = None;
            }
        }

        debug!("session actor shutting down");
    }

    fn handle_write(&mut self, data: &[u8]) -> Result<usize, SessionError> {
        self.writer
            .write_all(data)
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;
        self.writer
            .flush()
            .map_err(|e| SessionError::WriteFailed(e.to_string()))?;

        Ok(data.len())
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) -> Result<(), SessionError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SessionError::ResizeFailed(e.to_string()))?;

        self.state.cols = cols;
        self.state.rows = rows;
        Ok(())
    }
}

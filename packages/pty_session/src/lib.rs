//! PTY session - single persistent pseudoterminal session library
//!
//! This crate owns one pseudoterminal pair and the child process attached to
//! its slave side. It has no HTTP dependencies and no knowledge of how its
//! output gets delivered; consumers subscribe to a broadcast channel and send
//! input/resize requests through an actor-style handle.
//!
//! # Example
//!
//! ```no_run
//! use pty_session::{SessionActor, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SessionConfig {
//!         command: "tmux".to_string(),
//!         args: vec!["new-session".into(), "-A".into(), "-s".into(), "main".into()],
//!         ..Default::default()
//!     };
//!
//!     let session = SessionActor::spawn(config).unwrap();
//!
//!     // Write to the terminal
//!     session.write(b"echo hello\n").await.unwrap();
//!
//!     // Subscribe to output
//!     let mut rx = session.subscribe();
//!     while let Ok(chunk) = rx.recv().await {
//!         print!("{}", String::from_utf8_lossy(&chunk));
//!     }
//! }
//! ```

mod error;
pub mod session;

pub use error::SessionError;
pub use session::{SessionActor, SessionConfig, SessionHandle, SessionState};

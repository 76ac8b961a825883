//! Seam between the session and whatever actually plays audio.
//!
//! A backend turns a stream URL into a handle; a handle is one live
//! connection to that stream and is owned by exactly one party until
//! `release` consumes it.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error("mpv binary not found")]
    BackendMissing,

    #[error("failed to start audio process: {0}")]
    Spawn(String),

    #[error("audio IPC error: {0}")]
    Ipc(String),

    #[error("no audio after {0:?}")]
    Timeout(Duration),

    #[error("stream ended: {0}")]
    StreamEnded(String),
}

/// What a handle last reported about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleStatus {
    pub loaded: bool,
    pub playing: bool,
}

impl HandleStatus {
    /// Loaded but not producing audio: paused, stalled or ended.
    pub fn is_halted(&self) -> bool {
        self.loaded && !self.playing
    }
}

#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Handle: AudioHandle;

    /// Connect to `url`.  Resolves once the stream is loaded, which for a
    /// network stream means the connection is up.
    async fn open(&self, url: &str, autoplay: bool) -> Result<Self::Handle, PlaybackError>;
}

#[async_trait]
pub trait AudioHandle: Send + 'static {
    async fn play(&mut self) -> Result<(), PlaybackError>;

    async fn pause(&mut self) -> Result<(), PlaybackError>;

    async fn stop(&mut self) -> Result<(), PlaybackError>;

    /// Free every resource behind the handle.
    async fn release(self) -> Result<(), PlaybackError>;

    fn status(&self) -> watch::Receiver<HandleStatus>;
}

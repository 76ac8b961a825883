//! SessionCore: single-owner event loop for the playback session.
//!
//! Owns the session state and the one live audio handle exclusively.
//! Clients (socket, HTTP) talk to it through a cloneable `SessionClient`;
//! acquisitions and handle status updates re-enter the loop as
//! `SessionEvent`s, so every state change happens on this one task in
//! arrival order.
//!
//! Each `play` and `stop` stamps a new generation.  An acquisition only
//! commits if its generation is still the latest when it lands; otherwise
//! its handle is released on the spot.  This makes overlapping `play`
//! requests resolve to the last one issued.
use std::sync::Arc;

use kaiga_proto::protocol::{ControlOutcome, PlayOutcome, SessionSnapshot};
use kaiga_proto::station::Station;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::backend::{AudioBackend, AudioHandle, HandleStatus, PlaybackError};

// ── commands ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SessionCommand {
    Play {
        station: Station,
        reply: oneshot::Sender<PlayOutcome>,
    },
    Stop {
        reply: oneshot::Sender<ControlOutcome>,
    },
    Toggle {
        reply: oneshot::Sender<ControlOutcome>,
    },
    Shutdown,
}

/// Inputs produced by the session's own tasks.
enum SessionEvent<H> {
    Acquired {
        generation: u64,
        station: Station,
        result: Result<H, PlaybackError>,
        reply: oneshot::Sender<PlayOutcome>,
    },
    HandleStatus {
        generation: u64,
        status: HandleStatus,
    },
}

// ── client ────────────────────────────────────────────────────────────────────

/// Cheaply cloneable access to the session for UI-facing tasks.
#[derive(Clone)]
pub struct SessionClient {
    cmd_tx: mpsc::Sender<SessionCommand>,
    state_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionClient {
    pub async fn play_station(&self, station: Station) -> PlayOutcome {
        let (reply, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(SessionCommand::Play { station, reply })
            .await
            .is_err()
        {
            return PlayOutcome::Failed {
                reason: "session closed".to_string(),
            };
        }
        rx.await.unwrap_or_else(|_| PlayOutcome::Failed {
            reason: "session closed".to_string(),
        })
    }

    pub async fn stop_playback(&self) -> ControlOutcome {
        let (reply, rx) = oneshot::channel();
        self.control(SessionCommand::Stop { reply }, rx).await
    }

    pub async fn toggle_playback(&self) -> ControlOutcome {
        let (reply, rx) = oneshot::channel();
        self.control(SessionCommand::Toggle { reply }, rx).await
    }

    async fn control(
        &self,
        cmd: SessionCommand,
        rx: oneshot::Receiver<ControlOutcome>,
    ) -> ControlOutcome {
        if self.cmd_tx.send(cmd).await.is_err() {
            return ControlOutcome::Failed {
                reason: "session closed".to_string(),
            };
        }
        rx.await.unwrap_or_else(|_| ControlOutcome::Failed {
            reason: "session closed".to_string(),
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Receiver that wakes on every published change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_rx.clone()
    }

    /// Ask the loop to tear down.  Returns once the request is queued.
    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Shutdown).await;
    }
}

// ── core ──────────────────────────────────────────────────────────────────────

struct LiveHandle<H> {
    generation: u64,
    handle: H,
    status_task: tokio::task::AbortHandle,
}

pub struct SessionCore<B: AudioBackend> {
    backend: Arc<B>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<SessionEvent<B::Handle>>,
    event_rx: mpsc::Receiver<SessionEvent<B::Handle>>,
    state_tx: watch::Sender<SessionSnapshot>,
    state: SessionSnapshot,
    /// The only handle the session considers live.
    live: Option<LiveHandle<B::Handle>>,
    /// Latest acquisition token handed out.
    generation: u64,
}

impl<B: AudioBackend> SessionCore<B> {
    pub fn new(backend: B) -> (Self, SessionClient) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::default());

        let core = Self {
            backend: Arc::new(backend),
            cmd_rx,
            event_tx,
            event_rx,
            state_tx,
            state: SessionSnapshot::default(),
            live: None,
            generation: 0,
        };
        (core, SessionClient { cmd_tx, state_rx })
    }

    /// Run until `Shutdown` arrives or every client is dropped, then release
    /// the live handle.
    pub async fn run(mut self) {
        info!("SessionCore: starting event loop");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => {
                        info!("SessionCore: all clients gone, shutting down");
                        break;
                    }
                    Some(SessionCommand::Shutdown) => {
                        info!("SessionCore: shutdown requested");
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                },
                Some(evt) = self.event_rx.recv() => self.handle_event(evt).await,
            }
        }

        self.teardown().await;
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Play { station, reply } => self.play_station(station, reply).await,
            SessionCommand::Stop { reply } => {
                let _ = reply.send(self.stop_playback().await);
            }
            SessionCommand::Toggle { reply } => {
                let _ = reply.send(self.toggle_playback().await);
            }
            SessionCommand::Shutdown => {}
        }
    }

    async fn handle_event(&mut self, evt: SessionEvent<B::Handle>) {
        match evt {
            SessionEvent::Acquired {
                generation,
                station,
                result,
                reply,
            } => self.on_acquired(generation, station, result, reply).await,
            SessionEvent::HandleStatus { generation, status } => {
                self.on_handle_status(generation, status)
            }
        }
    }

    // ── operations ────────────────────────────────────────────────────────────

    async fn play_station(&mut self, station: Station, reply: oneshot::Sender<PlayOutcome>) {
        self.generation += 1;
        let generation = self.generation;
        info!(
            "SessionCore: play '{}' (generation {})",
            station.name, generation
        );

        if let Some(live) = self.live.take() {
            release_live(live).await;
        }

        self.state.station = None;
        self.state.playing = false;
        self.state.loading = true;
        self.publish();

        let backend = Arc::clone(&self.backend);
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = backend.open(&station.stream_url, true).await;
            let evt = SessionEvent::Acquired {
                generation,
                station,
                result,
                reply,
            };
            if let Err(mpsc::error::SendError(evt)) = event_tx.send(evt).await {
                // Session already torn down: nobody else will free this handle.
                if let SessionEvent::Acquired {
                    result: Ok(handle), ..
                } = evt
                {
                    debug!("SessionCore: acquisition landed after teardown, releasing");
                    release_handle(handle).await;
                }
            }
        });
    }

    async fn on_acquired(
        &mut self,
        generation: u64,
        station: Station,
        result: Result<B::Handle, PlaybackError>,
        reply: oneshot::Sender<PlayOutcome>,
    ) {
        if generation != self.generation {
            debug!(
                "SessionCore: acquisition {} superseded by {}",
                generation, self.generation
            );
            if let Ok(handle) = result {
                release_handle(handle).await;
            }
            let _ = reply.send(PlayOutcome::Superseded);
            return;
        }

        self.state.loading = false;
        let outcome = match result {
            Ok(handle) => {
                info!("SessionCore: '{}' is live", station.name);
                let status_task = self.forward_status(generation, handle.status());
                self.live = Some(LiveHandle {
                    generation,
                    handle,
                    status_task,
                });
                let station_id = station.id;
                self.state.station = Some(station);
                self.state.playing = true;
                self.state.last_error = None;
                PlayOutcome::Started { station_id }
            }
            Err(e) => {
                warn!("SessionCore: failed to play '{}': {}", station.name, e);
                self.state.station = None;
                self.state.playing = false;
                self.state.last_error = Some(e.to_string());
                PlayOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        self.publish();
        let _ = reply.send(outcome);
    }

    async fn stop_playback(&mut self) -> ControlOutcome {
        let in_flight = self.state.loading;
        if self.live.is_none() && !in_flight {
            return ControlOutcome::NoOp;
        }

        // Invalidate any acquisition still on its way.
        self.generation += 1;
        info!("SessionCore: stop (generation {})", self.generation);

        if let Some(live) = self.live.take() {
            release_live(live).await;
        }
        self.state.station = None;
        self.state.playing = false;
        self.state.loading = false;
        self.state.last_error = None;
        self.publish();
        ControlOutcome::Done { playing: false }
    }

    async fn toggle_playback(&mut self) -> ControlOutcome {
        let Some(live) = self.live.as_mut() else {
            return ControlOutcome::NoOp;
        };

        let target = !self.state.playing;
        let result = if target {
            live.handle.play().await
        } else {
            live.handle.pause().await
        };

        match result {
            Ok(()) => {
                self.state.playing = target;
                self.publish();
                ControlOutcome::Done { playing: target }
            }
            Err(e) => {
                warn!("SessionCore: toggle failed: {}", e);
                ControlOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn on_handle_status(&mut self, generation: u64, status: HandleStatus) {
        let Some(live) = self.live.as_ref().filter(|l| l.generation == generation) else {
            return;
        };
        // A queued notification may predate a later toggle; trust the
        // handle's present status over the one carried by the event.
        let latest = *live.handle.status().borrow();
        if latest != status {
            debug!("SessionCore: dropping outdated handle status {:?}", status);
        }
        if latest.is_halted() && self.state.playing {
            info!("SessionCore: handle reported stopped");
            self.state.playing = false;
            self.publish();
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    /// Pipe a handle's status changes into the event loop, tagged with the
    /// generation that owns it.
    fn forward_status(
        &self,
        generation: u64,
        mut status_rx: watch::Receiver<HandleStatus>,
    ) -> tokio::task::AbortHandle {
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                if event_tx
                    .send(SessionEvent::HandleStatus { generation, status })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        })
        .abort_handle()
    }

    fn publish(&mut self) {
        self.state.rev += 1;
        self.state_tx.send_replace(self.state.clone());
    }

    async fn teardown(&mut self) {
        info!("SessionCore: teardown");
        // Late acquisitions see a stale generation or a closed channel.
        self.generation += 1;
        if let Some(live) = self.live.take() {
            release_live(live).await;
        }
        if self.state.station.is_some() || self.state.playing || self.state.loading {
            self.state.station = None;
            self.state.playing = false;
            self.state.loading = false;
            self.publish();
        }
        self.event_rx.close();
        // Drain anything that landed before the close.
        while let Ok(evt) = self.event_rx.try_recv() {
            if let SessionEvent::Acquired {
                result: Ok(handle),
                reply,
                ..
            } = evt
            {
                release_handle(handle).await;
                let _ = reply.send(PlayOutcome::Superseded);
            }
        }
    }
}

async fn release_live<H: AudioHandle>(live: LiveHandle<H>) {
    live.status_task.abort();
    release_handle(live.handle).await;
}

/// Stop, then free.  Failures are logged; the handle is gone either way.
async fn release_handle<H: AudioHandle>(mut handle: H) {
    if let Err(e) = handle.stop().await {
        debug!("SessionCore: stop before release failed: {}", e);
    }
    if let Err(e) = handle.release().await {
        warn!("SessionCore: release failed: {}", e);
    }
}

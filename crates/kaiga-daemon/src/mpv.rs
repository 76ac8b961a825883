//! mpv-backed audio handles.
//!
//! Every handle is its own mpv process with its own IPC socket, so
//! releasing a handle is just killing that process.
//!
//! ```text
//!   MpvBackend::open(url)
//!         │
//!         ├── spawn mpv --idle --input-ipc-server=<unique socket>
//!         ├── writer_task   ← receives PendingRequest via mpsc, serialises → socket
//!         ├── reader_task   ← reads JSON lines from socket
//!         │                      ├── response (has request_id) → matched oneshot::Sender
//!         │                      └── event / property-change   → event channel
//!         ├── loadfile url, wait for file-loaded | end-file | timeout
//!         └── status_task   ← folds pause / core-idle / end-file events into HandleStatus
//! ```
//!
//! Platform notes:
//! - Unix:   Unix domain sockets
//! - Windows: Named pipes  \\.\pipe\<name>
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, info, warn};

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::ClientOptions;

use crate::backend::{AudioBackend, AudioHandle, HandleStatus, PlaybackError};

// ── global request-id counter ─────────────────────────────────────────────────

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// observe_property id for `pause`.
pub const OBS_PAUSE: u64 = 1;
/// observe_property id for `core-idle`.
pub const OBS_CORE_IDLE: u64 = 2;

const IPC_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, PlaybackError>>>>>;

// ── internal channel types ────────────────────────────────────────────────────

struct PendingRequest {
    req_id: u64,
    payload: String, // serialised JSON line (already has '\n')
    reply: oneshot::Sender<Result<Value, PlaybackError>>,
}

/// An mpv event / property-change that arrived unsolicited (no request_id).
#[derive(Debug, Clone)]
pub struct MpvEvent {
    pub raw: Value,
}

impl MpvEvent {
    /// Returns `Some((obs_id, data))` if this is a property-change event.
    pub fn as_property_change(&self) -> Option<(u64, &Value)> {
        if self.raw.get("event")?.as_str()? == "property-change" {
            let id = self.raw.get("id")?.as_u64()?;
            let data = self.raw.get("data").unwrap_or(&Value::Null);
            Some((id, data))
        } else {
            None
        }
    }

    /// Returns the event name, e.g. "end-file", "start-file", "file-loaded".
    pub fn event_name(&self) -> Option<&str> {
        self.raw.get("event")?.as_str()
    }

    /// `reason` of an end-file event, with mpv's `file_error` appended when set.
    fn end_reason(&self) -> String {
        let reason = self
            .raw
            .get("reason")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        match self.raw.get("file_error").and_then(|v| v.as_str()) {
            Some(detail) => format!("{} ({})", reason, detail),
            None => reason.to_string(),
        }
    }
}

// ── IPC connection ────────────────────────────────────────────────────────────

/// Cloneable sender side of one mpv IPC connection.
#[derive(Clone)]
struct MpvIpc {
    tx: mpsc::Sender<PendingRequest>,
}

impl MpvIpc {
    async fn send(&self, command: Value) -> Result<Value, PlaybackError> {
        let req_id = NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed);
        let msg = json!({ "command": command, "request_id": req_id });
        let mut raw =
            serde_json::to_string(&msg).map_err(|e| PlaybackError::Ipc(e.to_string()))?;
        raw.push('\n');

        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(PendingRequest {
                req_id,
                payload: raw,
                reply: reply_tx,
            })
            .await
            .map_err(|_| PlaybackError::Ipc("mpv writer task gone".to_string()))?;

        tokio::time::timeout(IPC_TIMEOUT, reply_rx)
            .await
            .map_err(|_| PlaybackError::Ipc(format!("mpv IPC timeout for req={}", req_id)))?
            .map_err(|_| PlaybackError::Ipc(format!("mpv reply channel dropped req={}", req_id)))?
    }

    async fn set_pause(&self, paused: bool) -> Result<(), PlaybackError> {
        self.send(json!(["set_property", "pause", paused])).await?;
        Ok(())
    }
}

fn start_io_tasks<R, W>(read_half: R, write_half: W, event_tx: mpsc::Sender<MpvEvent>) -> MpvIpc
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
    W: tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    // req_id → reply channel.  Writer inserts, reader resolves.
    let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
    let (cmd_tx, cmd_rx) = mpsc::channel::<PendingRequest>(64);

    tokio::spawn(writer_task(write_half, cmd_rx, pending.clone()));
    tokio::spawn(reader_task(BufReader::new(read_half), pending, event_tx));

    MpvIpc { tx: cmd_tx }
}

#[cfg(unix)]
async fn connect_ipc(
    socket_name: &str,
    event_tx: mpsc::Sender<MpvEvent>,
) -> Result<MpvIpc, PlaybackError> {
    let socket_path = std::path::PathBuf::from(socket_name);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if socket_path.exists() {
            break;
        }
    }
    if !socket_path.exists() {
        return Err(PlaybackError::Ipc("mpv IPC socket did not appear".to_string()));
    }

    let stream = UnixStream::connect(&socket_path)
        .await
        .map_err(|e| PlaybackError::Ipc(e.to_string()))?;
    debug!("mpv: connected to {}", socket_name);
    let (read_half, write_half) = stream.into_split();
    Ok(start_io_tasks(read_half, write_half, event_tx))
}

#[cfg(windows)]
async fn connect_ipc(
    socket_name: &str,
    event_tx: mpsc::Sender<MpvEvent>,
) -> Result<MpvIpc, PlaybackError> {
    let pipe_path = format!(r"\\.\pipe\{}", socket_name);
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let Ok(client) = ClientOptions::new().open(&pipe_path) {
            debug!("mpv: connected to named pipe {}", pipe_path);
            let (read_half, write_half) = tokio::io::split(client);
            return Ok(start_io_tasks(read_half, write_half, event_tx));
        }
    }
    Err(PlaybackError::Ipc("mpv named pipe did not appear".to_string()))
}

// ── reader task ───────────────────────────────────────────────────────────────

async fn reader_task<R>(
    mut reader: BufReader<R>,
    pending: PendingMap,
    event_tx: mpsc::Sender<MpvEvent>,
) where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("mpv reader: connection closed");
                fail_pending(&pending, "mpv IPC connection closed").await;
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let val: Value = match serde_json::from_str(trimmed) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!("mpv reader: invalid json '{}': {}", trimmed, e);
                        continue;
                    }
                };

                if let Some(req_id) = val.get("request_id").and_then(|v| v.as_u64()) {
                    let mut map = pending.lock().await;
                    if let Some(tx) = map.remove(&req_id) {
                        let _ = tx.send(parse_response(val));
                    } else {
                        debug!("mpv reader: response for unknown req={}", req_id);
                    }
                } else {
                    debug!("mpv reader: event {}", trimmed);
                    let _ = event_tx.send(MpvEvent { raw: val }).await;
                }
            }
            Err(e) => {
                warn!("mpv reader: read error: {}", e);
                fail_pending(&pending, &format!("mpv IPC read error: {}", e)).await;
                break;
            }
        }
    }
}

fn parse_response(val: Value) -> Result<Value, PlaybackError> {
    if val["error"].as_str() == Some("success") {
        Ok(val)
    } else {
        let err = val["error"].as_str().unwrap_or("unknown error");
        Err(PlaybackError::Ipc(format!("mpv error: {}", err)))
    }
}

async fn fail_pending(pending: &PendingMap, reason: &str) {
    let mut map = pending.lock().await;
    for (_, tx) in map.drain() {
        let _ = tx.send(Err(PlaybackError::Ipc(reason.to_string())));
    }
}

// ── writer task ───────────────────────────────────────────────────────────────

async fn writer_task<W>(mut writer: W, mut rx: mpsc::Receiver<PendingRequest>, pending: PendingMap)
where
    W: tokio::io::AsyncWrite + Unpin,
{
    while let Some(req) = rx.recv().await {
        // Register reply channel before writing so reader can match it
        pending.lock().await.insert(req.req_id, req.reply);
        debug!("mpv writer: send req={} payload={}", req.req_id, req.payload.trim());
        if let Err(e) = writer.write_all(req.payload.as_bytes()).await {
            warn!("mpv writer: write error: {}", e);
            if let Some(tx) = pending.lock().await.remove(&req.req_id) {
                let _ = tx.send(Err(PlaybackError::Ipc(format!("mpv write error: {}", e))));
            }
            break;
        }
    }
    debug!("mpv writer: task exiting");
}

// ── status folding ────────────────────────────────────────────────────────────

/// What the stream has told us so far.
///
/// mpv reports `core-idle` while it waits for the first audio, so idleness
/// only counts as a stall once playback has actually started.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StreamState {
    paused: bool,
    idle: bool,
    started: bool,
    ended: bool,
}

impl StreamState {
    /// Apply one event.  Returns true when the state changed.
    fn apply(&mut self, evt: &MpvEvent) -> bool {
        let before = *self;
        match evt.as_property_change() {
            Some((OBS_PAUSE, data)) => self.paused = data.as_bool().unwrap_or(false),
            Some((OBS_CORE_IDLE, data)) => {
                self.idle = data.as_bool().unwrap_or(false);
                if !self.idle {
                    self.started = true;
                }
            }
            _ => {}
        }
        if evt.event_name() == Some("end-file") {
            self.ended = true;
        }
        *self != before
    }

    fn status(&self) -> HandleStatus {
        HandleStatus {
            loaded: true,
            playing: !self.paused && !self.ended && !(self.started && self.idle),
        }
    }
}

async fn status_task(
    mut events: mpsc::Receiver<MpvEvent>,
    mut state: StreamState,
    status_tx: watch::Sender<HandleStatus>,
) {
    while let Some(evt) = events.recv().await {
        if state.apply(&evt) {
            debug!("mpv: stream state {:?}", state);
            let status = state.status();
            status_tx.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
        }
    }
}

/// Drain events until the file is loaded or fails to load.
async fn wait_loaded(
    events: &mut mpsc::Receiver<MpvEvent>,
    state: &mut StreamState,
) -> Result<(), PlaybackError> {
    while let Some(evt) = events.recv().await {
        match evt.event_name() {
            Some("file-loaded") => return Ok(()),
            Some("end-file") => return Err(PlaybackError::StreamEnded(evt.end_reason())),
            _ => {
                state.apply(&evt);
            }
        }
    }
    Err(PlaybackError::Ipc("mpv IPC connection closed".to_string()))
}

// ── backend ───────────────────────────────────────────────────────────────────

pub struct MpvBackend {
    connect_timeout: Duration,
    volume: f32,
}

impl MpvBackend {
    pub fn new(connect_timeout: Duration, volume: f32) -> Self {
        Self {
            connect_timeout,
            volume,
        }
    }

    fn spawn_process(&self, socket_name: &str) -> Result<tokio::process::Child, PlaybackError> {
        let mpv_binary =
            kaiga_proto::platform::find_mpv_binary().ok_or(PlaybackError::BackendMissing)?;

        let vol_arg = format!(
            "--volume={}",
            (self.volume * 100.0).clamp(0.0, 100.0).round() as i64
        );

        tokio::process::Command::new(mpv_binary)
            .arg("--no-video")
            .arg("--idle=yes")
            .arg(kaiga_proto::platform::mpv_socket_arg(socket_name))
            .arg("--quiet")
            .arg(vol_arg)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PlaybackError::Spawn(e.to_string()))
    }
}

#[async_trait]
impl AudioBackend for MpvBackend {
    type Handle = MpvStream;

    async fn open(&self, url: &str, autoplay: bool) -> Result<MpvStream, PlaybackError> {
        let socket_name = kaiga_proto::platform::new_mpv_socket_name();
        info!("mpv: opening {} via {}", url, socket_name);
        let process = self.spawn_process(&socket_name)?;

        // From here on the stream owns the process; dropping it on an error
        // path kills mpv.
        let (event_tx, mut events) = mpsc::channel::<MpvEvent>(64);
        let ipc = match connect_ipc(&socket_name, event_tx).await {
            Ok(ipc) => ipc,
            Err(e) => {
                cleanup(process, &socket_name).await;
                return Err(e);
            }
        };

        let mut state = StreamState {
            paused: !autoplay,
            ..StreamState::default()
        };
        let load = async {
            ipc.send(json!(["observe_property", OBS_PAUSE, "pause"]))
                .await?;
            ipc.send(json!(["observe_property", OBS_CORE_IDLE, "core-idle"]))
                .await?;
            ipc.set_pause(!autoplay).await?;
            ipc.send(json!(["loadfile", url])).await?;
            wait_loaded(&mut events, &mut state).await
        };

        let loaded = match tokio::time::timeout(self.connect_timeout, load).await {
            Ok(result) => result,
            Err(_) => Err(PlaybackError::Timeout(self.connect_timeout)),
        };
        if let Err(e) = loaded {
            warn!("mpv: failed to open {}: {}", url, e);
            cleanup(process, &socket_name).await;
            return Err(e);
        }

        info!("mpv: {} loaded", url);
        let (status_tx, _) = watch::channel(state.status());
        let status = status_tx.subscribe();
        let status_handle = tokio::spawn(status_task(events, state, status_tx));

        Ok(MpvStream {
            ipc,
            process,
            socket_name,
            status,
            status_task: status_handle.abort_handle(),
        })
    }
}

async fn cleanup(mut process: tokio::process::Child, socket_name: &str) {
    let _ = process.kill().await;
    #[cfg(unix)]
    {
        let _ = tokio::fs::remove_file(socket_name).await;
    }
    #[cfg(windows)]
    {
        let _ = socket_name;
    }
}

// ── handle ────────────────────────────────────────────────────────────────────

pub struct MpvStream {
    ipc: MpvIpc,
    process: tokio::process::Child,
    socket_name: String,
    status: watch::Receiver<HandleStatus>,
    status_task: tokio::task::AbortHandle,
}

#[async_trait]
impl AudioHandle for MpvStream {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        self.ipc.set_pause(false).await
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        self.ipc.set_pause(true).await
    }

    async fn stop(&mut self) -> Result<(), PlaybackError> {
        self.ipc.send(json!(["stop"])).await?;
        Ok(())
    }

    async fn release(self) -> Result<(), PlaybackError> {
        debug!("mpv: releasing {}", self.socket_name);
        self.status_task.abort();
        let _ = self.ipc.send(json!(["quit"])).await;
        cleanup(self.process, &self.socket_name).await;
        Ok(())
    }

    fn status(&self) -> watch::Receiver<HandleStatus> {
        self.status.clone()
    }
}

//! In-memory audio backend for exercising the session without mpv.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};

use crate::backend::{AudioBackend, AudioHandle, HandleStatus, PlaybackError};

#[derive(Default)]
struct Ledger {
    next_id: u64,
    /// Handle id → stream url, for handles not yet released.
    live: HashMap<u64, String>,
    max_live: usize,
    releases: HashMap<u64, usize>,
    events: Vec<String>,
    gates: HashMap<String, oneshot::Receiver<()>>,
    failing: HashSet<String>,
    status: HashMap<u64, Arc<watch::Sender<HandleStatus>>>,
}

/// Records every call.  Handles are numbered from 1 in `open` order.
#[derive(Clone, Default)]
pub struct FakeBackend {
    ledger: Arc<Mutex<Ledger>>,
}

impl FakeBackend {
    fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        let mut ledger = self.ledger.lock().unwrap();
        f(&mut ledger)
    }

    /// Hold `open(url)` until the returned sender fires.
    pub fn gate_url(&self, url: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.with(|l| l.gates.insert(url.to_string(), rx));
        tx
    }

    pub fn fail_url(&self, url: &str) {
        self.with(|l| l.failing.insert(url.to_string()));
    }

    pub fn report_status(&self, id: u64, status: HandleStatus) {
        let sender = self.with(|l| l.status.get(&id).cloned());
        if let Some(sender) = sender {
            sender.send_replace(status);
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.with(|l| l.events.clone())
    }

    pub fn live_count(&self) -> usize {
        self.with(|l| l.live.len())
    }

    pub fn max_live(&self) -> usize {
        self.with(|l| l.max_live)
    }

    pub fn live_urls(&self) -> Vec<String> {
        self.with(|l| l.live.values().cloned().collect())
    }

    pub fn release_count(&self, id: u64) -> usize {
        self.with(|l| l.releases.get(&id).copied().unwrap_or(0))
    }

    pub async fn wait_opened(&self, n: u64) {
        self.wait_until(|l| l.next_id >= n).await
    }

    pub async fn wait_released(&self, id: u64) {
        self.wait_until(|l| l.releases.contains_key(&id)).await
    }

    async fn wait_until(&self, cond: impl Fn(&Ledger) -> bool) {
        for _ in 0..200 {
            if self.with(|l| cond(l)) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }
}

pub struct FakeHandle {
    id: u64,
    ledger: Arc<Mutex<Ledger>>,
    status: Arc<watch::Sender<HandleStatus>>,
}

impl FakeHandle {
    fn record(&self, what: &str) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.events.push(format!("{} {}", what, self.id));
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    type Handle = FakeHandle;

    async fn open(&self, url: &str, autoplay: bool) -> Result<FakeHandle, PlaybackError> {
        let (id, gate) = self.with(|l| {
            l.next_id += 1;
            l.events.push(format!("open {}", l.next_id));
            (l.next_id, l.gates.remove(url))
        });
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if self.with(|l| l.failing.contains(url)) {
            return Err(PlaybackError::StreamEnded(format!("{} refused", url)));
        }

        let (status_tx, _) = watch::channel(HandleStatus {
            loaded: true,
            playing: autoplay,
        });
        let status = Arc::new(status_tx);
        self.with(|l| {
            l.live.insert(id, url.to_string());
            l.max_live = l.max_live.max(l.live.len());
            l.status.insert(id, Arc::clone(&status));
        });
        Ok(FakeHandle {
            id,
            ledger: Arc::clone(&self.ledger),
            status,
        })
    }
}

#[async_trait]
impl AudioHandle for FakeHandle {
    async fn play(&mut self) -> Result<(), PlaybackError> {
        self.record("play");
        self.status.send_modify(|s| s.playing = true);
        Ok(())
    }

    async fn pause(&mut self) -> Result<(), PlaybackError> {
        self.record("pause");
        self.status.send_modify(|s| s.playing = false);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PlaybackError> {
        self.record("stop");
        Ok(())
    }

    async fn release(self) -> Result<(), PlaybackError> {
        self.record("release");
        let mut ledger = self.ledger.lock().unwrap();
        let count = ledger.releases.entry(self.id).or_insert(0);
        *count += 1;
        assert_eq!(*count, 1, "handle {} released twice", self.id);
        ledger.live.remove(&self.id);
        Ok(())
    }

    fn status(&self) -> watch::Receiver<HandleStatus> {
        self.status.subscribe()
    }
}

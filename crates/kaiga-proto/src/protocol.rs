use serde::{Deserialize, Serialize};

use crate::station::Station;

/// Current protocol version.  Bump this when the wire format changes in a
/// breaking way.  Clients check this on connect.
pub const PROTOCOL_VERSION: u32 = 1;

/// Messages sent from a client to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd")]
pub enum Command {
    Play { station_id: u32 },
    Stop,
    Toggle,
    GetState,
}

/// Messages sent from the daemon to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "broadcast")]
pub enum Broadcast {
    /// Sent immediately on connect: protocol version + full snapshot.
    Hello {
        protocol_version: u32,
        state: SessionSnapshot,
    },
    State {
        data: SessionSnapshot,
    },
    /// Reply to a single command from this client.
    Result {
        outcome: CommandOutcome,
    },
    Log {
        message: String,
    },
}

/// Observable state of the playback session.  `rev` increases on every
/// change so observers can skip duplicates.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub rev: u64,
    pub station: Option<Station>,
    pub playing: bool,
    pub loading: bool,
    /// Reason of the last failed play request, cleared on the next
    /// successful play or stop.
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    pub fn station_id(&self) -> Option<u32> {
        self.station.as_ref().map(|s| s.id)
    }

    /// Same session contents, ignoring `rev`.
    pub fn same_as(&self, other: &SessionSnapshot) -> bool {
        self.station == other.station
            && self.playing == other.playing
            && self.loading == other.loading
            && self.last_error == other.last_error
    }
}

/// Result of a play request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlayOutcome {
    /// The handle was acquired and is now the live one.
    Started { station_id: u32 },
    /// A later play or stop request overtook this one; its handle was released.
    Superseded,
    Failed { reason: String },
}

/// Result of a stop or toggle request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ControlOutcome {
    Done { playing: bool },
    /// Nothing to act on; state unchanged.
    NoOp,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    Play(PlayOutcome),
    Control(ControlOutcome),
    UnknownStation { station_id: u32 },
    State,
}

/// Wrapper for socket communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Command(Command),
    Broadcast(Broadcast),
}

impl Message {
    /// 4-byte big-endian length prefix followed by the JSON body.
    pub fn encode(&self) -> anyhow::Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut result = Vec::with_capacity(4 + json.len());
        result.extend_from_slice(&len.to_be_bytes());
        result.extend_from_slice(&json);
        Ok(result)
    }

    pub fn decode(data: &[u8]) -> anyhow::Result<(Self, usize)> {
        if data.len() < 4 {
            anyhow::bail!("Insufficient data for length header");
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.len() < 4 + len {
            anyhow::bail!("Insufficient data for message");
        }
        let msg: Self = serde_json::from_slice(&data[4..4 + len])?;
        Ok((msg, 4 + len))
    }
}

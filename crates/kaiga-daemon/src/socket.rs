use std::sync::Arc;

use kaiga_proto::protocol::{
    Broadcast, Command, CommandOutcome, Message, SessionSnapshot, PROTOCOL_VERSION,
};
use kaiga_proto::station::Catalog;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, info, warn};

use crate::session::SessionClient;

pub fn start_server(
    bind_address: String,
    port: u16,
    session: SessionClient,
    catalog: Arc<Catalog>,
    log_tx: broadcast::Sender<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, session, catalog, log_tx).await;
    })
}

async fn serve(
    listener: TcpListener,
    session: SessionClient,
    catalog: Arc<Catalog>,
    log_tx: broadcast::Sender<String>,
) {
    let mut client_id = 0usize;
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                info!("Client {} connected from {}", id, peer);

                let session = session.clone();
                let catalog = Arc::clone(&catalog);
                let log_rx = log_tx.subscribe();
                tokio::spawn(async move {
                    handle_client(stream, id, session, catalog, log_rx).await;
                    info!("Client {} disconnected", id);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    client_id: usize,
    session: SessionClient,
    catalog: Arc<Catalog>,
    log_rx: broadcast::Receiver<String>,
) {
    let (mut read_half, write_half) = stream.into_split();

    // Commands run one at a time in arrival order; the writer interleaves
    // their replies with state pushes and log lines.
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);
    let (reply_tx, reply_rx) = mpsc::channel::<Broadcast>(16);
    let writer = tokio::spawn(write_loop(
        write_half,
        client_id,
        session.subscribe(),
        reply_rx,
        log_rx,
    ));
    let executor = tokio::spawn(execute_loop(cmd_rx, reply_tx, session, catalog));

    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    loop {
        match read_half.read(&mut tmp).await {
            Ok(0) => {
                info!("Client {} closed connection", client_id);
                break;
            }
            Ok(n) => {
                read_buf.extend_from_slice(&tmp[..n]);
                loop {
                    if read_buf.len() < 4 {
                        break;
                    }
                    match Message::decode(&read_buf) {
                        Ok((Message::Command(cmd), consumed)) => {
                            read_buf.drain(..consumed);
                            info!("Client {} sent command: {:?}", client_id, cmd);
                            if cmd_tx.send(cmd).await.is_err() {
                                break;
                            }
                        }
                        Ok((_, consumed)) => {
                            read_buf.drain(..consumed);
                        }
                        Err(_) => break,
                    }
                }
            }
            Err(e) => {
                error!("Read error from client {}: {}", client_id, e);
                break;
            }
        }
    }

    executor.abort();
    writer.abort();
}

async fn execute_loop(
    mut cmd_rx: mpsc::Receiver<Command>,
    reply_tx: mpsc::Sender<Broadcast>,
    session: SessionClient,
    catalog: Arc<Catalog>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let outcome = execute(cmd, &session, &catalog).await;
        if reply_tx.send(Broadcast::Result { outcome }).await.is_err() {
            break;
        }
    }
}

/// Run one client command against the session.
pub async fn execute(cmd: Command, session: &SessionClient, catalog: &Catalog) -> CommandOutcome {
    match cmd {
        Command::Play { station_id } => match catalog.get(station_id) {
            Some(station) => CommandOutcome::Play(session.play_station(station.clone()).await),
            None => CommandOutcome::UnknownStation { station_id },
        },
        Command::Stop => CommandOutcome::Control(session.stop_playback().await),
        Command::Toggle => CommandOutcome::Control(session.toggle_playback().await),
        Command::GetState => CommandOutcome::State,
    }
}

async fn write_loop(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    client_id: usize,
    mut state_rx: watch::Receiver<SessionSnapshot>,
    mut reply_rx: mpsc::Receiver<Broadcast>,
    mut log_rx: broadcast::Receiver<String>,
) {
    let mut last_sent = state_rx.borrow_and_update().clone();
    let hello = Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        state: last_sent.clone(),
    };
    if send(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        let msg = tokio::select! {
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let data = state_rx.borrow_and_update().clone();
                if data.same_as(&last_sent) {
                    continue;
                }
                last_sent = data.clone();
                Broadcast::State { data }
            }
            reply = reply_rx.recv() => match reply {
                Some(reply) => {
                    // Follow each reply with the state it produced.
                    if send(&mut write_half, reply).await.is_err() {
                        break;
                    }
                    let data = state_rx.borrow_and_update().clone();
                    last_sent = data.clone();
                    Broadcast::State { data }
                }
                None => break,
            },
            log = log_rx.recv() => match log {
                Ok(message) => Broadcast::Log { message },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Client {} missed {} log lines", client_id, n);
                    continue;
                }
                Err(_) => continue,
            },
        };
        if send(&mut write_half, msg).await.is_err() {
            break;
        }
    }
}

async fn send(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    broadcast: Broadcast,
) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(broadcast).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}

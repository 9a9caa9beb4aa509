//! Relay server
//!
//! Accepts participant WebSocket connections and relays edits within block
//! rooms, questions to everyone else and answers back to their asker. Block
//! snapshots and saves are served from a [`BlockStore`].

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ServerMessage};
use crate::models::{Block, BlockId, Participant};
use crate::storage::{BlockStore, StorageError};

type ConnId = u64;

struct Connection {
    participant: Option<Participant>,
    tx: mpsc::UnboundedSender<ServerMessage>,
    rooms: HashSet<BlockId>,
}

#[derive(Default)]
struct RelayState {
    next_id: ConnId,
    connections: HashMap<ConnId, Connection>,
    rooms: HashMap<BlockId, HashSet<ConnId>>,
}

impl RelayState {
    fn send(&self, conn: ConnId, msg: ServerMessage) {
        if let Some(c) = self.connections.get(&conn) {
            let _ = c.tx.send(msg);
        }
    }

    fn leave(&mut self, conn: ConnId, block_id: &BlockId) {
        if let Some(members) = self.rooms.get_mut(block_id) {
            members.remove(&conn);
            if members.is_empty() {
                self.rooms.remove(block_id);
            }
        }
        if let Some(c) = self.connections.get_mut(&conn) {
            c.rooms.remove(block_id);
        }
    }
}

/// WebSocket relay for participants
#[derive(Clone)]
pub struct RelayServer {
    server_id: String,
    store: Arc<dyn BlockStore>,
    state: Arc<Mutex<RelayState>>,
}

impl RelayServer {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            server_id: format!("relay-{}", &uuid::Uuid::new_v4().to_string()[..8]),
            store,
            state: Arc::new(Mutex::new(RelayState::default())),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Bind `addr` and serve until the task is cancelled
    pub async fn run(self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind relay to {}", addr))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr().context("Listener has no address")?;
        info!("Relay {} listening on ws://{}", self.server_id, local);

        loop {
            let (stream, peer) = listener
                .accept()
                .await
                .context("Failed to accept connection")?;
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, peer).await {
                    warn!("Connection from {} ended with error: {:#}", peer, e);
                }
            });
        }
    }

    /// Number of connections currently joined to `block_id`
    pub async fn room_size(&self, block_id: &BlockId) -> usize {
        self.state
            .lock()
            .await
            .rooms
            .get(block_id)
            .map_or(0, HashSet::len)
    }

    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .context("WebSocket handshake failed")?;
        let (mut write, mut read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let conn = {
            let mut state = self.state.lock().await;
            state.next_id += 1;
            let id = state.next_id;
            state.connections.insert(
                id,
                Connection {
                    participant: None,
                    tx,
                    rooms: HashSet::new(),
                },
            );
            id
        };
        debug!("Connection {} from {}", conn, peer);

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let bytes = match msg.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Dropping unencodable message: {}", e);
                        continue;
                    }
                };
                if write.send(Message::Binary(bytes)).await.is_err() {
                    break;
                }
            }
            write.close().await.ok();
        });

        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Binary(data)) => match ClientMessage::decode(&data) {
                    Ok(msg) => self.handle_message(conn, msg).await,
                    Err(e) => warn!("Dropping malformed frame from {}: {}", peer, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Read error from {}: {}", peer, e);
                    break;
                }
            }
        }

        self.disconnect(conn).await;
        writer.await.ok();
        debug!("Connection {} closed", conn);
        Ok(())
    }

    async fn disconnect(&self, conn: ConnId) {
        let mut state = self.state.lock().await;
        let rooms: Vec<BlockId> = state
            .connections
            .get(&conn)
            .map(|c| c.rooms.iter().cloned().collect())
            .unwrap_or_default();
        for block_id in rooms {
            state.leave(conn, &block_id);
        }
        if let Some(c) = state.connections.remove(&conn) {
            if let Some(p) = c.participant {
                info!("{} ({}) disconnected", p.name, p.role);
            }
        }
    }

    async fn handle_message(&self, conn: ConnId, msg: ClientMessage) {
        let mut state = self.state.lock().await;

        let Some(greeted) = state.connections.get(&conn).map(|c| c.participant.clone()) else {
            return;
        };

        if let ClientMessage::Hello { participant } = &msg {
            if greeted.is_some() {
                state.send(
                    conn,
                    ServerMessage::Error {
                        message: "Already greeted".to_string(),
                    },
                );
                return;
            }
            info!("{} joined as {}", participant.name, participant.role);
            if let Some(c) = state.connections.get_mut(&conn) {
                c.participant = Some(participant.clone());
            }
            state.send(
                conn,
                ServerMessage::Welcome {
                    server_id: self.server_id.clone(),
                },
            );
            return;
        }

        let Some(participant) = greeted else {
            state.send(
                conn,
                ServerMessage::Error {
                    message: format!("Expected hello, got {}", msg.kind()),
                },
            );
            return;
        };

        match msg {
            ClientMessage::Hello { .. } => {}
            ClientMessage::Join { block_id } => {
                debug!("{} joined room '{}'", participant.id, block_id);
                state.rooms.entry(block_id.clone()).or_default().insert(conn);
                if let Some(c) = state.connections.get_mut(&conn) {
                    c.rooms.insert(block_id);
                }
            }
            ClientMessage::Leave { block_id } => {
                debug!("{} left room '{}'", participant.id, block_id);
                state.leave(conn, &block_id);
            }
            ClientMessage::Edit { block_id, content } => {
                let members = match state.rooms.get(&block_id) {
                    Some(members) if members.contains(&conn) => members.clone(),
                    _ => {
                        state.send(
                            conn,
                            ServerMessage::Error {
                                message: format!("Not joined to block '{}'", block_id),
                            },
                        );
                        return;
                    }
                };
                for member in members.into_iter().filter(|m| *m != conn) {
                    state.send(
                        member,
                        ServerMessage::Edited {
                            block_id: block_id.clone(),
                            sender_id: participant.id,
                            content: content.clone(),
                        },
                    );
                }
            }
            ClientMessage::Load { block_id } => {
                drop(state);
                let reply = match self.load(block_id.clone()).await {
                    Some(block) => ServerMessage::Snapshot { block },
                    None => ServerMessage::Unavailable { block_id },
                };
                self.state.lock().await.send(conn, reply);
            }
            ClientMessage::Save { block } => {
                drop(state);
                self.save(block).await;
            }
            ClientMessage::Ask { mut question } => {
                question.asker_id = participant.id;
                question.asker_name = participant.name.clone();
                for (id, c) in &state.connections {
                    if *id != conn && c.participant.is_some() {
                        let _ = c.tx.send(ServerMessage::Question {
                            question: question.clone(),
                        });
                    }
                }
            }
            ClientMessage::Answer { answer } => {
                let mut delivered = false;
                for c in state.connections.values() {
                    if c.participant.as_ref().map(|p| p.id) == Some(answer.asker_id) {
                        let _ = c.tx.send(ServerMessage::Answered {
                            answer: answer.clone(),
                        });
                        delivered = true;
                    }
                }
                if !delivered {
                    debug!("Asker {} is gone; answer dropped", answer.asker_id);
                }
            }
        }
    }

    async fn load(&self, block_id: BlockId) -> Option<Block> {
        let store = self.store.clone();
        let id = block_id.clone();
        match tokio::task::spawn_blocking(move || store.load_block(&id)).await {
            Ok(Ok(block)) => Some(block),
            Ok(Err(StorageError::BlockNotFound(_))) => None,
            Ok(Err(e)) => {
                warn!("Failed to load block '{}': {}", block_id, e);
                None
            }
            Err(e) => {
                warn!("Load of block '{}' panicked: {}", block_id, e);
                None
            }
        }
    }

    async fn save(&self, block: Block) {
        let store = self.store.clone();
        let id = block.id.clone();
        match tokio::task::spawn_blocking(move || store.save_block(&block)).await {
            Ok(Ok(())) => debug!("Saved block '{}'", id),
            Ok(Err(e)) => warn!("Failed to save block '{}': {}", id, e),
            Err(e) => warn!("Save of block '{}' panicked: {}", id, e),
        }
    }
}

//! Relay client implementation
//!
//! WebSocket-based [`SyncChannel`] and [`QaChannel`] talking to a
//! [`RelayServer`](super::RelayServer). Outbound messages are queued to a
//! writer task; a reader task routes inbound messages to per-room streams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use super::channel::{
    AnswerStream, ChannelError, EditStream, QaChannel, QuestionStream, RemoteEdit, SyncChannel,
};
use super::message::{ClientMessage, ServerMessage};
use crate::models::{Answer, AnswerId, Block, BlockId, Participant, Question, QuestionId};
use crate::storage::{BlockStore, StorageError, StorageResult};

/// How long to wait for the handshake and for block snapshots
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Handshake in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection closed or failed
    Disconnected,
}

/// Inbound routing table shared with the reader task
struct Routes {
    rooms: HashMap<BlockId, mpsc::UnboundedSender<RemoteEdit>>,
    pending_loads: HashMap<BlockId, Vec<oneshot::Sender<Option<Block>>>>,
    snapshots: HashMap<BlockId, Block>,
    questions: mpsc::UnboundedSender<Question>,
    answers: mpsc::UnboundedSender<Answer>,
}

type SharedRoutes = Arc<Mutex<Routes>>;

fn lock(routes: &SharedRoutes) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(|e| e.into_inner())
}

/// Participant connection to a relay server
pub struct RemoteChannel {
    url: String,
    participant: Participant,
    server_id: String,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    routes: SharedRoutes,
    status_rx: watch::Receiver<ConnectionStatus>,
    questions_rx: Mutex<Option<QuestionStream>>,
    answers_rx: Mutex<Option<AnswerStream>>,
    reader: JoinHandle<()>,
}

impl RemoteChannel {
    /// Connect to `url` and complete the handshake as `participant`
    pub async fn connect(url: &str, participant: Participant) -> Result<Self, ChannelError> {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        info!("Connecting to relay at {}", url);

        let (ws_stream, _response) =
            connect_async(url)
                .await
                .map_err(|e| ChannelError::Connect {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;
        debug!("WebSocket open, sending hello");
        let (mut write, mut read) = ws_stream.split();

        let hello = ClientMessage::Hello {
            participant: participant.clone(),
        };
        let bytes = hello.encode().map_err(ChannelError::Encode)?;
        write
            .send(Message::Binary(bytes))
            .await
            .map_err(|e| ChannelError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let server_id = wait_for_welcome(&mut read, url).await?;
        let _ = status_tx.send(ConnectionStatus::Connected);
        info!("Connected to relay {} as {}", server_id, participant.id);

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let bytes = match msg.encode() {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!("Dropping unencodable {} message: {}", msg.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Binary(bytes)).await {
                    warn!("Relay write failed: {}", e);
                    break;
                }
            }
            write.close().await.ok();
        });

        let (questions_tx, questions_rx) = mpsc::unbounded_channel();
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();
        let routes = Arc::new(Mutex::new(Routes {
            rooms: HashMap::new(),
            pending_loads: HashMap::new(),
            snapshots: HashMap::new(),
            questions: questions_tx,
            answers: answers_tx,
        }));

        let reader = tokio::spawn(read_loop(read, routes.clone(), status_tx));

        Ok(Self {
            url: url.to_string(),
            participant,
            server_id,
            outbound,
            routes,
            status_rx,
            questions_rx: Mutex::new(Some(questions_rx)),
            answers_rx: Mutex::new(Some(answers_rx)),
            reader,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    /// Identifier announced by the relay during the handshake
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Get the current status
    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Fetch the stored state of a block from the relay
    pub async fn fetch_block(&self, block_id: &BlockId) -> Result<Block, ChannelError> {
        let (tx, rx) = oneshot::channel();
        lock(&self.routes)
            .pending_loads
            .entry(block_id.clone())
            .or_default()
            .push(tx);

        self.send(ClientMessage::Load {
            block_id: block_id.clone(),
        })?;

        match tokio::time::timeout(RESPONSE_TIMEOUT, rx).await {
            Ok(Ok(Some(block))) => Ok(block),
            Ok(Ok(None)) => Err(ChannelError::Unavailable(block_id.clone())),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Timeout(format!(
                "no snapshot of '{}' from {}",
                block_id, self.url
            ))),
        }
    }

    fn send(&self, msg: ClientMessage) -> Result<(), ChannelError> {
        if self.status() == ConnectionStatus::Disconnected {
            return Err(ChannelError::Closed);
        }
        self.outbound.send(msg).map_err(|_| ChannelError::Closed)
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Wait for the relay's welcome message
async fn wait_for_welcome<S>(read: &mut S, url: &str) -> Result<String, ChannelError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(ChannelError::Timeout(format!(
                "no welcome from relay ({}). Check that the server is running.",
                url
            )));
        }

        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data) {
                        Ok(ServerMessage::Welcome { server_id }) => return Ok(server_id),
                        Ok(ServerMessage::Error { message }) => {
                            return Err(ChannelError::Connect {
                                url: url.to_string(),
                                reason: message,
                            });
                        }
                        Ok(_) => {}
                        Err(e) => debug!("Ignoring frame during handshake: {}", e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(ChannelError::Connect {
                            url: url.to_string(),
                            reason: "closed during handshake".to_string(),
                        });
                    }
                    Some(Err(e)) => {
                        return Err(ChannelError::Connect {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    _ => {}
                }
            }
            _ = tokio::time::sleep(remaining) => {}
        }
    }
}

async fn read_loop<S>(
    mut read: S,
    routes: SharedRoutes,
    status_tx: watch::Sender<ConnectionStatus>,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Binary(data)) => match ServerMessage::decode(&data) {
                Ok(msg) => dispatch(&routes, msg),
                Err(e) => warn!("Dropping malformed frame from relay: {}", e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Relay connection error: {}", e);
                break;
            }
        }
    }

    warn!("Disconnected from relay");
    let _ = status_tx.send(ConnectionStatus::Disconnected);

    // Close every inbound stream and fail pending loads
    let mut routes = lock(&routes);
    routes.rooms.clear();
    routes.pending_loads.clear();
}

fn dispatch(routes: &SharedRoutes, msg: ServerMessage) {
    let mut routes = lock(routes);
    match msg {
        ServerMessage::Edited {
            block_id,
            sender_id,
            content,
        } => match routes.rooms.get(&block_id) {
            Some(tx) => {
                let edit = RemoteEdit {
                    block_id,
                    sender: sender_id,
                    content,
                };
                let _ = tx.send(edit);
            }
            None => debug!("Edit for unjoined block '{}' dropped", block_id),
        },
        ServerMessage::Snapshot { block } => {
            if let Some(waiters) = routes.pending_loads.remove(&block.id) {
                for waiter in waiters {
                    let _ = waiter.send(Some(block.clone()));
                }
            }
            routes.snapshots.insert(block.id.clone(), block);
        }
        ServerMessage::Unavailable { block_id } => {
            if let Some(waiters) = routes.pending_loads.remove(&block_id) {
                for waiter in waiters {
                    let _ = waiter.send(None);
                }
            }
        }
        ServerMessage::Question { question } => {
            let _ = routes.questions.send(question);
        }
        ServerMessage::Answered { answer } => {
            let _ = routes.answers.send(answer);
        }
        ServerMessage::Error { message } => warn!("Relay error: {}", message),
        ServerMessage::Welcome { .. } => debug!("Unexpected welcome after handshake"),
    }
}

fn take_once<T>(slot: &Mutex<Option<T>>, name: &'static str) -> Result<T, ChannelError> {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or(ChannelError::AlreadyTaken(name))
}

impl SyncChannel for RemoteChannel {
    fn join(&self, block_id: &BlockId) -> Result<EditStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        // Route before the relay can answer the join
        lock(&self.routes).rooms.insert(block_id.clone(), tx);
        if let Err(e) = self.send(ClientMessage::Join {
            block_id: block_id.clone(),
        }) {
            lock(&self.routes).rooms.remove(block_id);
            return Err(e);
        }
        Ok(rx)
    }

    fn leave(&self, block_id: &BlockId) {
        lock(&self.routes).rooms.remove(block_id);
        if let Err(e) = self.send(ClientMessage::Leave {
            block_id: block_id.clone(),
        }) {
            debug!("Leave for '{}' not sent: {}", block_id, e);
        }
    }

    fn broadcast(&self, block_id: &BlockId, content: &str) -> Result<(), ChannelError> {
        if !lock(&self.routes).rooms.contains_key(block_id) {
            return Err(ChannelError::NotJoined(block_id.clone()));
        }
        self.send(ClientMessage::Edit {
            block_id: block_id.clone(),
            content: content.to_string(),
        })
    }
}

impl QaChannel for RemoteChannel {
    fn ask_question(&self, content: &str) -> Result<QuestionId, ChannelError> {
        let question = Question::new(&self.participant, content);
        let id = question.id;
        self.send(ClientMessage::Ask { question })?;
        Ok(id)
    }

    fn take_questions(&self) -> Result<QuestionStream, ChannelError> {
        take_once(&self.questions_rx, "question")
    }

    fn answer(&self, question: &Question, content: &str) -> Result<AnswerId, ChannelError> {
        let answer = Answer::to(question, content);
        let id = answer.id;
        self.send(ClientMessage::Answer { answer })?;
        Ok(id)
    }

    fn take_answers(&self) -> Result<AnswerStream, ChannelError> {
        take_once(&self.answers_rx, "answer")
    }
}

/// The relay acts as the store for remote sessions
///
/// Loads are served from snapshots already fetched with
/// [`RemoteChannel::fetch_block`]; saves are forwarded without waiting.
impl BlockStore for RemoteChannel {
    fn load_block(&self, id: &BlockId) -> StorageResult<Block> {
        lock(&self.routes)
            .snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::BlockNotFound(id.clone()))
    }

    fn save_block(&self, block: &Block) -> StorageResult<()> {
        self.send(ClientMessage::Save {
            block: block.clone(),
        })
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        lock(&self.routes)
            .snapshots
            .insert(block.id.clone(), block.clone());
        Ok(())
    }

    fn list_blocks(&self) -> StorageResult<Vec<Block>> {
        let mut blocks: Vec<Block> = lock(&self.routes).snapshots.values().cloned().collect();
        blocks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(blocks)
    }
}

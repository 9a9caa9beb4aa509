//! In-process channel hub
//!
//! Routes edits and Q&A between participants living in the same process.
//! Each participant gets a [`HubConnection`] implementing both channel
//! traits; dropping the connection removes it from every room.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::debug;

use super::channel::{
    AnswerStream, ChannelError, EditStream, QaChannel, QuestionStream, RemoteEdit, SyncChannel,
};
use crate::models::{Answer, AnswerId, BlockId, Participant, ParticipantId, Question, QuestionId};

struct PeerRoutes {
    questions: mpsc::UnboundedSender<Question>,
    answers: mpsc::UnboundedSender<Answer>,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<BlockId, HashMap<ParticipantId, mpsc::UnboundedSender<RemoteEdit>>>,
    peers: HashMap<ParticipantId, PeerRoutes>,
}

/// Shared router for in-process participants
#[derive(Clone, Default)]
pub struct LocalHub {
    state: Arc<Mutex<HubState>>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant and return its connection
    pub fn connect(&self, participant: Participant) -> HubConnection {
        let (questions_tx, questions_rx) = mpsc::unbounded_channel();
        let (answers_tx, answers_rx) = mpsc::unbounded_channel();

        self.lock().peers.insert(
            participant.id,
            PeerRoutes {
                questions: questions_tx,
                answers: answers_tx,
            },
        );
        debug!("{} ({}) connected to hub", participant.name, participant.id);

        HubConnection {
            participant,
            hub: self.clone(),
            questions_rx: Mutex::new(Some(questions_rx)),
            answers_rx: Mutex::new(Some(answers_rx)),
        }
    }

    /// Number of participants joined to `block_id`
    pub fn room_size(&self, block_id: &BlockId) -> usize {
        self.lock().rooms.get(block_id).map_or(0, HashMap::len)
    }

    /// Number of connected participants
    pub fn peer_count(&self) -> usize {
        self.lock().peers.len()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // State stays consistent even if a holder panicked
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One participant's view of a [`LocalHub`]
pub struct HubConnection {
    participant: Participant,
    hub: LocalHub,
    questions_rx: Mutex<Option<QuestionStream>>,
    answers_rx: Mutex<Option<AnswerStream>>,
}

impl HubConnection {
    pub fn participant(&self) -> &Participant {
        &self.participant
    }
}

fn take_once<T>(slot: &Mutex<Option<T>>, name: &'static str) -> Result<T, ChannelError> {
    slot.lock()
        .unwrap_or_else(|e| e.into_inner())
        .take()
        .ok_or(ChannelError::AlreadyTaken(name))
}

impl SyncChannel for HubConnection {
    fn join(&self, block_id: &BlockId) -> Result<EditStream, ChannelError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.hub
            .lock()
            .rooms
            .entry(block_id.clone())
            .or_default()
            .insert(self.participant.id, tx);
        debug!("{} joined '{}'", self.participant.id, block_id);
        Ok(rx)
    }

    fn leave(&self, block_id: &BlockId) {
        let mut state = self.hub.lock();
        if let Some(room) = state.rooms.get_mut(block_id) {
            room.remove(&self.participant.id);
            if room.is_empty() {
                state.rooms.remove(block_id);
            }
        }
        debug!("{} left '{}'", self.participant.id, block_id);
    }

    fn broadcast(&self, block_id: &BlockId, content: &str) -> Result<(), ChannelError> {
        let mut state = self.hub.lock();
        let room = state
            .rooms
            .get_mut(block_id)
            .filter(|room| room.contains_key(&self.participant.id))
            .ok_or_else(|| ChannelError::NotJoined(block_id.clone()))?;

        let edit = RemoteEdit {
            block_id: block_id.clone(),
            sender: self.participant.id,
            content: content.to_string(),
        };
        // Receivers whose stream was dropped are pruned
        room.retain(|id, tx| *id == edit.sender || tx.send(edit.clone()).is_ok());
        Ok(())
    }
}

impl QaChannel for HubConnection {
    fn ask_question(&self, content: &str) -> Result<QuestionId, ChannelError> {
        let question = Question::new(&self.participant, content);
        let state = self.hub.lock();
        for (id, peer) in &state.peers {
            if *id != self.participant.id {
                let _ = peer.questions.send(question.clone());
            }
        }
        Ok(question.id)
    }

    fn take_questions(&self) -> Result<QuestionStream, ChannelError> {
        take_once(&self.questions_rx, "question")
    }

    fn answer(&self, question: &Question, content: &str) -> Result<AnswerId, ChannelError> {
        let answer = Answer::to(question, content);
        let id = answer.id;
        match self.hub.lock().peers.get(&question.asker_id) {
            Some(peer) => {
                let _ = peer.answers.send(answer);
            }
            None => debug!("Asker {} is gone; answer dropped", question.asker_id),
        }
        Ok(id)
    }

    fn take_answers(&self) -> Result<AnswerStream, ChannelError> {
        take_once(&self.answers_rx, "answer")
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        let mut state = self.hub.lock();
        state.peers.remove(&self.participant.id);
        for room in state.rooms.values_mut() {
            room.remove(&self.participant.id);
        }
        state.rooms.retain(|_, room| !room.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> BlockId {
        BlockId::new("array")
    }

    #[test]
    fn test_broadcast_reaches_others_but_not_sender() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        let b = hub.connect(Participant::mentor("B"));

        let mut a_rx = a.join(&block()).unwrap();
        let mut b_rx = b.join(&block()).unwrap();

        a.broadcast(&block(), "one").unwrap();
        a.broadcast(&block(), "two").unwrap();

        assert_eq!(b_rx.try_recv().unwrap().content, "one");
        let second = b_rx.try_recv().unwrap();
        assert_eq!(second.content, "two");
        assert_eq!(second.sender, a.participant().id);
        assert!(a_rx.try_recv().is_err());
    }

    #[test]
    fn test_rooms_are_isolated() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        let b = hub.connect(Participant::student("B"));

        let _a_rx = a.join(&block()).unwrap();
        let mut b_rx = b.join(&BlockId::new("dom")).unwrap();

        a.broadcast(&block(), "x").unwrap();
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_requires_join() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        let err = a.broadcast(&block(), "x").unwrap_err();
        assert!(matches!(err, ChannelError::NotJoined(_)));
    }

    #[test]
    fn test_leave_stops_delivery() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        let b = hub.connect(Participant::mentor("B"));
        let _a_rx = a.join(&block()).unwrap();
        let mut b_rx = b.join(&block()).unwrap();

        b.leave(&block());
        a.broadcast(&block(), "after").unwrap();
        assert!(b_rx.try_recv().is_err());
        assert_eq!(hub.room_size(&block()), 1);
    }

    #[test]
    fn test_drop_cleans_up() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        let _rx = a.join(&block()).unwrap();
        assert_eq!(hub.peer_count(), 1);

        drop(a);
        assert_eq!(hub.peer_count(), 0);
        assert_eq!(hub.room_size(&block()), 0);
    }

    #[test]
    fn test_question_and_targeted_answer() {
        let hub = LocalHub::new();
        let student = hub.connect(Participant::student("Ada"));
        let mentor = hub.connect(Participant::mentor("Grace"));
        let other = hub.connect(Participant::student("Linus"));

        let mut mentor_questions = mentor.take_questions().unwrap();
        let mut other_questions = other.take_questions().unwrap();
        let mut student_questions = student.take_questions().unwrap();
        let mut student_answers = student.take_answers().unwrap();
        let mut other_answers = other.take_answers().unwrap();

        let qid = student.ask_question("Is map lazy?").unwrap();

        let question = mentor_questions.try_recv().unwrap();
        assert_eq!(question.id, qid);
        assert_eq!(question.asker_name, "Ada");
        assert!(other_questions.try_recv().is_ok());
        assert!(student_questions.try_recv().is_err());

        let aid = mentor.answer(&question, "No.").unwrap();
        let answer = student_answers.try_recv().unwrap();
        assert_eq!(answer.id, aid);
        assert_eq!(answer.question, "Is map lazy?");
        assert_eq!(answer.content, "No.");
        assert!(other_answers.try_recv().is_err());
    }

    #[test]
    fn test_streams_taken_once() {
        let hub = LocalHub::new();
        let a = hub.connect(Participant::student("A"));
        assert!(a.take_questions().is_ok());
        assert!(matches!(
            a.take_questions(),
            Err(ChannelError::AlreadyTaken("question"))
        ));
        assert!(a.take_answers().is_ok());
        assert!(a.take_answers().is_err());
    }
}

//! Session controller
//!
//! The single place where the write policy is enforced: a mentor may never
//! edit, and only a mentor may reset, and only while the block is solved.
//! Local mutations are applied to the [`BlockSession`] and then broadcast on
//! the injected [`SyncChannel`]; inbound edits are applied without
//! re-broadcasting.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::models::{Block, BlockId, Participant, ParticipantId};
use crate::session::{BlockSession, SolvedTransition};
use crate::storage::Persister;
use crate::sync::{ChannelError, EditStream, RemoteEdit, SyncChannel};

/// An inbound edit that has been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteUpdate {
    pub sender: ParticipantId,
    pub transition: SolvedTransition,
}

/// One participant attached to one block
pub struct SessionController {
    participant: Participant,
    session: BlockSession,
    channel: Arc<dyn SyncChannel>,
    inbound: Option<EditStream>,
}

impl SessionController {
    /// Join the room for `block` and start a session on it
    pub fn open(
        participant: Participant,
        block: Block,
        channel: Arc<dyn SyncChannel>,
    ) -> Result<Self, ChannelError> {
        let inbound = channel.join(&block.id)?;
        info!(
            "{} opened '{}' as {}",
            participant.name, block.id, participant.role
        );

        Ok(Self {
            participant,
            session: BlockSession::initialize(block),
            channel,
            inbound: Some(inbound),
        })
    }

    /// Persist local mutations through `persister`
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.session = self.session.with_persister(persister);
        self
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn session(&self) -> &BlockSession {
        &self.session
    }

    pub fn block_id(&self) -> &BlockId {
        self.session.id()
    }

    pub fn content(&self) -> &str {
        self.session.content()
    }

    pub fn is_solved(&self) -> bool {
        self.session.is_solved()
    }

    /// Whether the room is still joined
    pub fn is_joined(&self) -> bool {
        self.inbound.is_some()
    }

    /// Apply a local edit and broadcast it
    ///
    /// A failed broadcast is logged; the local edit still stands.
    pub fn edit(&mut self, content: &str) -> Result<SolvedTransition, SessionError> {
        if !self.participant.role.can_edit() {
            return Err(SessionError::InvalidRole {
                role: self.participant.role,
                action: "edit",
            });
        }

        let mutation = self.session.apply_local_edit(content);
        self.propagate(&mutation.content);
        Ok(mutation.transition)
    }

    /// Restore the starter text if the block is solved
    ///
    /// Returns false, without broadcasting, when the block is not solved.
    pub fn reset(&mut self) -> Result<bool, SessionError> {
        if !self.participant.role.can_reset() {
            return Err(SessionError::InvalidRole {
                role: self.participant.role,
                action: "reset",
            });
        }

        match self.session.reset() {
            Some(mutation) => {
                info!("{} reset '{}'", self.participant.name, self.block_id());
                self.propagate(&mutation.content);
                Ok(true)
            }
            None => {
                debug!("Reset of unsolved '{}' ignored", self.block_id());
                Ok(false)
            }
        }
    }

    /// Apply an edit received from a peer
    pub fn handle_remote(&mut self, edit: RemoteEdit) -> Result<SolvedTransition, SessionError> {
        if edit.block_id != *self.session.id() {
            return Err(SessionError::MalformedPayload(format!(
                "edit for block '{}' delivered to '{}'",
                edit.block_id,
                self.session.id()
            )));
        }
        if !self.is_joined() {
            debug!("Edit from {} after leave dropped", edit.sender);
            return Ok(SolvedTransition::Unchanged);
        }
        Ok(self.session.apply_remote_edit(edit.content))
    }

    /// Apply every inbound edit that is already queued
    pub fn pump(&mut self) -> Vec<RemoteUpdate> {
        let mut updates = Vec::new();
        while let Some(edit) = self.inbound.as_mut().and_then(|rx| rx.try_recv().ok()) {
            if let Some(update) = self.apply_inbound(edit) {
                updates.push(update);
            }
        }
        updates
    }

    /// Wait for the next inbound edit and apply it
    ///
    /// Returns `None` once the room has been left or the channel closed.
    pub async fn next_remote(&mut self) -> Option<RemoteUpdate> {
        loop {
            let edit = self.inbound.as_mut()?.recv().await?;
            if let Some(update) = self.apply_inbound(edit) {
                return Some(update);
            }
        }
    }

    /// Leave the room; later edits are no longer applied
    pub fn leave(&mut self) {
        if self.inbound.take().is_some() {
            self.channel.leave(self.session.id());
            info!("{} left '{}'", self.participant.name, self.block_id());
        }
    }

    fn apply_inbound(&mut self, edit: RemoteEdit) -> Option<RemoteUpdate> {
        let sender = edit.sender;
        match self.handle_remote(edit) {
            Ok(transition) => Some(RemoteUpdate { sender, transition }),
            Err(e) => {
                warn!("Dropping inbound edit from {}: {}", sender, e);
                None
            }
        }
    }

    fn propagate(&self, content: &str) {
        if let Err(e) = self.channel.broadcast(self.session.id(), content) {
            warn!("Failed to broadcast '{}': {}", self.block_id(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlockStore, MemoryBlockStore};
    use crate::sync::LocalHub;

    const STARTER: &str = "function f(a){}";
    const SOLUTION: &str = "function f(a, b) {}";

    fn block() -> Block {
        Block::new("async", "Async case", STARTER, Some(SOLUTION.to_string()))
    }

    fn open(hub: &LocalHub, participant: Participant) -> SessionController {
        let channel = Arc::new(hub.connect(participant.clone()));
        SessionController::open(participant, block(), channel).unwrap()
    }

    #[test]
    fn test_mentor_edit_rejected() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        let err = mentor.edit("anything").unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidRole { action: "edit", .. }
        ));
        assert_eq!(mentor.content(), STARTER);
        assert!(student.pump().is_empty());
    }

    #[test]
    fn test_student_cannot_reset() {
        let hub = LocalHub::new();
        let mut student = open(&hub, Participant::student("Ada"));
        assert!(matches!(
            student.reset(),
            Err(SessionError::InvalidRole {
                action: "reset",
                ..
            })
        ));
    }

    #[test]
    fn test_solve_flips_at_writer_and_peer() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        assert!(!student.is_solved());
        let transition = student.edit("function f(a,b){}").unwrap();
        assert_eq!(transition, SolvedTransition::Solved);
        assert!(student.is_solved());

        let updates = mentor.pump();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].sender, student.participant().id);
        assert_eq!(updates[0].transition, SolvedTransition::Solved);
        assert_eq!(mentor.content(), "function f(a,b){}");
        assert!(mentor.is_solved());
    }

    #[test]
    fn test_reflowed_sum_solves_for_student_and_mentor() {
        let sum = Block::new(
            "array",
            "Array method",
            "function f(a,b){}",
            Some("function f(a,b){return a+b}".to_string()),
        );
        let hub = LocalHub::new();
        let join = |participant: Participant| {
            let channel = Arc::new(hub.connect(participant.clone()));
            SessionController::open(participant, sum.clone(), channel).unwrap()
        };
        let mut student = join(Participant::student("Ada"));
        let mut mentor = join(Participant::mentor("Grace"));
        assert!(!student.is_solved());
        assert!(!mentor.is_solved());

        let transition = student.edit("function f(a, b) { return a + b; }").unwrap();
        assert_eq!(transition, SolvedTransition::Solved);
        assert!(student.is_solved());

        let updates = mentor.pump();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].transition, SolvedTransition::Solved);
        assert_eq!(mentor.content(), "function f(a, b) { return a + b; }");
        assert!(mentor.is_solved());
    }

    #[test]
    fn test_edit_is_not_echoed_to_sender() {
        let hub = LocalHub::new();
        let mut student = open(&hub, Participant::student("Ada"));
        let _mentor = open(&hub, Participant::mentor("Grace"));

        student.edit("let x").unwrap();
        assert!(student.pump().is_empty());
    }

    #[test]
    fn test_echoed_edit_is_idempotent() {
        let hub = LocalHub::new();
        let mut student = open(&hub, Participant::student("Ada"));
        student.edit(SOLUTION).unwrap();

        let transition = student
            .handle_remote(RemoteEdit {
                block_id: BlockId::new("async"),
                sender: student.participant().id,
                content: SOLUTION.to_string(),
            })
            .unwrap();
        assert_eq!(transition, SolvedTransition::Unchanged);
        assert_eq!(student.content(), SOLUTION);
        assert!(student.is_solved());
    }

    #[test]
    fn test_last_writer_wins() {
        let hub = LocalHub::new();
        let mut first = open(&hub, Participant::student("Ada"));
        let mut second = open(&hub, Participant::student("Linus"));
        let mut observer = open(&hub, Participant::mentor("Grace"));

        first.edit("let a = 1").unwrap();
        second.edit("let a = 2").unwrap();

        observer.pump();
        first.pump();
        second.pump();

        assert_eq!(observer.content(), "let a = 2");
        assert_eq!(first.content(), "let a = 2");
        // The second writer never receives its own edit back
        assert_eq!(second.content(), "let a = 2");
    }

    #[test]
    fn test_mentor_reset_when_solved() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        student.edit(SOLUTION).unwrap();
        mentor.pump();
        assert!(mentor.is_solved());

        assert!(mentor.reset().unwrap());
        assert_eq!(mentor.content(), STARTER);
        assert!(!mentor.is_solved());

        let updates = student.pump();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].transition, SolvedTransition::Unsolved);
        assert_eq!(student.content(), STARTER);
    }

    #[test]
    fn test_mentor_reset_when_unsolved_sends_nothing() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        student.edit("function f(a, c) {}").unwrap();
        mentor.pump();

        assert!(!mentor.reset().unwrap());
        assert_eq!(mentor.content(), "function f(a, c) {}");
        assert!(student.pump().is_empty());
    }

    #[test]
    fn test_foreign_block_edit_is_malformed() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let err = mentor
            .handle_remote(RemoteEdit {
                block_id: BlockId::new("dom"),
                sender: ParticipantId::new(),
                content: "x".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::MalformedPayload(_)));
        assert_eq!(mentor.content(), STARTER);
    }

    #[test]
    fn test_leave_stops_applying_edits() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        mentor.leave();
        assert!(!mentor.is_joined());
        student.edit("changed").unwrap();

        assert!(mentor.pump().is_empty());
        assert_eq!(mentor.content(), STARTER);
        assert_eq!(hub.room_size(&BlockId::new("async")), 1);
    }

    #[tokio::test]
    async fn test_next_remote_waits_for_edit() {
        let hub = LocalHub::new();
        let mut mentor = open(&hub, Participant::mentor("Grace"));
        let mut student = open(&hub, Participant::student("Ada"));

        student.edit(SOLUTION).unwrap();
        let update = mentor.next_remote().await.unwrap();
        assert_eq!(update.transition, SolvedTransition::Solved);

        mentor.leave();
        assert!(mentor.next_remote().await.is_none());
    }

    #[tokio::test]
    async fn test_local_edits_are_persisted() {
        let store = Arc::new(MemoryBlockStore::with_blocks(vec![block()]));
        let (persister, handle) = Persister::spawn(store.clone());

        let hub = LocalHub::new();
        let participant = Participant::student("Ada");
        let channel = Arc::new(hub.connect(participant.clone()));
        let mut student = SessionController::open(participant, block(), channel)
            .unwrap()
            .with_persister(persister);

        student.edit(SOLUTION).unwrap();
        drop(student);
        handle.await.unwrap();

        let saved = store.load_block(&BlockId::new("async")).unwrap();
        assert_eq!(saved.current_content(), SOLUTION);
    }

    #[test]
    fn test_broadcast_failure_keeps_local_edit() {
        struct Broken;
        impl SyncChannel for Broken {
            fn join(&self, _: &BlockId) -> Result<EditStream, ChannelError> {
                let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
                Ok(rx)
            }
            fn leave(&self, _: &BlockId) {}
            fn broadcast(&self, _: &BlockId, _: &str) -> Result<(), ChannelError> {
                Err(ChannelError::Closed)
            }
        }

        let mut student =
            SessionController::open(Participant::student("Ada"), block(), Arc::new(Broken))
                .unwrap();
        assert_eq!(student.edit(SOLUTION).unwrap(), SolvedTransition::Solved);
        assert_eq!(student.content(), SOLUTION);
    }
}

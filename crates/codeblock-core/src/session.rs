//! Block session state
//!
//! Holds the live content of one block for one participant and recomputes the
//! solved flag after every mutation. Write policy is not enforced here; see
//! [`SessionController`](crate::controller::SessionController).

use tracing::debug;

use crate::equivalence;
use crate::error::SessionError;
use crate::models::{Block, BlockId};
use crate::storage::Persister;

/// How the solved flag moved as a result of a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolvedTransition {
    /// The block just became solved
    Solved,
    /// The block was solved and no longer is
    Unsolved,
    /// No change
    Unchanged,
}

impl SolvedTransition {
    fn between(before: bool, after: bool) -> Self {
        match (before, after) {
            (false, true) => SolvedTransition::Solved,
            (true, false) => SolvedTransition::Unsolved,
            _ => SolvedTransition::Unchanged,
        }
    }
}

/// Result of a local mutation: the content to propagate and the solved flip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub content: String,
    pub transition: SolvedTransition,
}

/// Live state of a single block
pub struct BlockSession {
    block: Block,
    solved: bool,
    /// Whether the solution exists and can be tokenized
    checkable: bool,
    persister: Option<Persister>,
}

impl BlockSession {
    /// Start a session from a loaded block
    pub fn initialize(block: Block) -> Self {
        let checkable = match block.solution.as_deref() {
            Some(solution) => match equivalence::normalize(solution) {
                Ok(_) => true,
                Err(e) => {
                    debug!("Solution for '{}' is not checkable: {}", block.id, e);
                    false
                }
            },
            None => false,
        };

        let mut session = Self {
            block,
            solved: false,
            checkable,
            persister: None,
        };
        session.solved = session.evaluate();
        session
    }

    /// Route persistence requests for local mutations through `persister`
    pub fn with_persister(mut self, persister: Persister) -> Self {
        self.persister = Some(persister);
        self
    }

    pub fn id(&self) -> &BlockId {
        &self.block.id
    }

    pub fn content(&self) -> &str {
        self.block.current_content()
    }

    pub fn starter(&self) -> &str {
        &self.block.starter
    }

    pub fn solution(&self) -> Option<&str> {
        self.block.solution.as_deref()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Replace the content with a local edit and request persistence
    pub fn apply_local_edit(&mut self, content: impl Into<String>) -> Mutation {
        let content = content.into();
        let transition = self.set_content(content.clone());
        self.persist();
        Mutation {
            content,
            transition,
        }
    }

    /// Replace the content with an edit received from a peer
    ///
    /// Never persists; the writer already did.
    pub fn apply_remote_edit(&mut self, content: impl Into<String>) -> SolvedTransition {
        self.set_content(content.into())
    }

    /// Restore the starter text; only effective while solved
    pub fn reset(&mut self) -> Option<Mutation> {
        if !self.solved {
            return None;
        }
        let starter = self.block.starter.clone();
        Some(self.apply_local_edit(starter))
    }

    /// Compare the current content against the solution
    pub fn check(&self) -> Result<bool, SessionError> {
        match self.block.solution.as_deref() {
            Some(solution) if self.checkable => {
                Ok(equivalence::try_equivalent(self.content(), solution)?)
            }
            _ => Ok(false),
        }
    }

    fn set_content(&mut self, content: String) -> SolvedTransition {
        let before = self.solved;
        self.block.set_content(content);
        self.solved = self.evaluate();
        SolvedTransition::between(before, self.solved)
    }

    fn evaluate(&self) -> bool {
        match self.check() {
            Ok(solved) => solved,
            Err(e) => {
                debug!("Content of '{}' not comparable: {}", self.block.id, e);
                false
            }
        }
    }

    fn persist(&self) {
        if let Some(persister) = &self.persister {
            persister.request(self.block.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlockStore, MemoryBlockStore};
    use std::sync::Arc;

    fn block(starter: &str, solution: Option<&str>) -> Block {
        Block::new("async", "Async case", starter, solution.map(String::from))
    }

    #[test]
    fn test_initialize_uses_starter() {
        let session = BlockSession::initialize(block("let a = 1", Some("let a = 2")));
        assert_eq!(session.content(), "let a = 1");
        assert!(!session.is_solved());
    }

    #[test]
    fn test_initialize_uses_recorded_content() {
        let mut b = block("let a = 1", Some("let a = 2"));
        b.set_content("let a = 2;");
        let session = BlockSession::initialize(b);
        assert_eq!(session.content(), "let a = 2;");
        assert!(session.is_solved());
    }

    #[test]
    fn test_local_edit_flips_solved() {
        let mut session =
            BlockSession::initialize(block("function f(a,b){}", Some("function f(a, b) {}")));

        // Formatting-only difference from the solution
        assert!(session.is_solved());

        let mutation = session.apply_local_edit("function f(a){}");
        assert_eq!(mutation.content, "function f(a){}");
        assert_eq!(mutation.transition, SolvedTransition::Unsolved);

        let mutation = session.apply_local_edit("function f(a,b){}");
        assert_eq!(mutation.transition, SolvedTransition::Solved);
        assert!(session.is_solved());
    }

    #[test]
    fn test_remote_edit_is_idempotent() {
        let mut session = BlockSession::initialize(block("x", Some("y")));
        session.apply_local_edit("y");
        assert_eq!(session.apply_remote_edit("y"), SolvedTransition::Unchanged);
        assert_eq!(session.content(), "y");
        assert!(session.is_solved());
    }

    #[test]
    fn test_reset_only_when_solved() {
        let mut session = BlockSession::initialize(block("let x", Some("let x = 1")));
        assert!(session.reset().is_none());

        session.apply_local_edit("let x = 1");
        let mutation = session.reset().unwrap();
        assert_eq!(mutation.content, "let x");
        assert_eq!(mutation.transition, SolvedTransition::Unsolved);
        assert_eq!(session.content(), session.starter());
        assert!(!session.is_solved());
    }

    #[test]
    fn test_reset_keeps_solved_when_starter_matches() {
        let mut session = BlockSession::initialize(block("let x = 1", Some("let x = 1;")));
        assert!(session.is_solved());
        let mutation = session.reset().unwrap();
        assert_eq!(mutation.transition, SolvedTransition::Unchanged);
        assert!(session.is_solved());
    }

    #[test]
    fn test_absent_solution_never_solved() {
        let mut session = BlockSession::initialize(block("", None));
        session.apply_local_edit("");
        assert!(!session.is_solved());
        assert!(!session.check().unwrap());
    }

    #[test]
    fn test_malformed_solution_never_solved() {
        let mut session = BlockSession::initialize(block("x", Some("let s = 'oops")));
        let mutation = session.apply_local_edit("let s = 'oops");
        assert_eq!(mutation.transition, SolvedTransition::Unchanged);
        assert!(!session.is_solved());
    }

    #[test]
    fn test_malformed_candidate_reports_failure() {
        let mut session = BlockSession::initialize(block("x", Some("f(1)")));
        session.apply_remote_edit("f(1");
        assert!(!session.is_solved());
        assert!(matches!(
            session.check(),
            Err(SessionError::EquivalenceCheckFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_local_edit_requests_persistence() {
        let store = Arc::new(MemoryBlockStore::new());
        let b = block("x", Some("y"));
        store.save_block(&b).unwrap();

        let (persister, handle) = Persister::spawn(store.clone());
        let mut session = BlockSession::initialize(b).with_persister(persister);
        session.apply_local_edit("y");
        session.apply_remote_edit("z");

        drop(session);
        handle.await.unwrap();

        let saved = store.load_block(&BlockId::new("async")).unwrap();
        assert_eq!(saved.current_content(), "y");
    }
}

//! Join command handler
//!
//! Line-oriented participant: reads commands from stdin while printing
//! remote edits, solved transitions, questions and answers as they arrive.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use codeblock_core::models::Question;
use codeblock_core::sync::ConnectionStatus;
use codeblock_core::{
    BlockId, Participant, Persister, QaChannel, RemoteChannel, Role, SessionController,
    SolvedTransition,
};

use crate::output::Output;

const HELP: &str = "\
Commands:
  :edit            replace the content (end input with a line holding only '.')
  :reset           restore the starter text (mentor, solved blocks only)
  :ask TEXT        ask everyone a question
  :answer N TEXT   answer question number N
  :show            print the current content
  :help            show this help
  :quit            leave the block";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Edit,
    Reset,
    Ask(&'a str),
    Answer(usize, &'a str),
    Show,
    Help,
    Quit,
    Unknown(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    match head {
        ":edit" => Command::Edit,
        ":reset" => Command::Reset,
        ":ask" if !rest.is_empty() => Command::Ask(rest),
        ":answer" => {
            let parsed = rest.split_once(char::is_whitespace).and_then(|(n, text)| {
                let n = n.parse::<usize>().ok().filter(|n| *n > 0)?;
                let text = text.trim();
                (!text.is_empty()).then_some((n, text))
            });
            match parsed {
                Some((n, text)) => Command::Answer(n, text),
                None => Command::Unknown(line),
            }
        }
        ":show" => Command::Show,
        ":help" | ":h" | "?" => Command::Help,
        ":quit" | ":q" => Command::Quit,
        _ => Command::Unknown(line),
    }
}

enum Flow {
    Continue,
    Quit,
}

/// Interactive state for one joined block
struct Participation<'a> {
    controller: SessionController,
    channel: Arc<RemoteChannel>,
    output: &'a Output,
    draft: Option<Vec<String>>,
    inbox: Vec<Question>,
}

impl Participation<'_> {
    fn role(&self) -> Role {
        self.controller.participant().role
    }

    fn announce(&self, transition: SolvedTransition) {
        let text = match (transition, self.role()) {
            (SolvedTransition::Solved, Role::Mentor) => "Challenge solved!",
            (SolvedTransition::Solved, Role::Student) => "Congratulations! You solved the challenge",
            (SolvedTransition::Unsolved, _) => "The block is no longer solved",
            (SolvedTransition::Unchanged, _) => return,
        };
        self.output.event(
            "solved",
            text,
            serde_json::json!({ "solved": transition == SolvedTransition::Solved }),
        );
    }

    fn show(&self) {
        let status = if self.controller.is_solved() {
            "solved"
        } else {
            "not solved"
        };
        self.output.event(
            "content",
            &format!(
                "── {} ({}) ──\n{}",
                self.controller.block_id(),
                status,
                self.controller.content().trim_end()
            ),
            serde_json::json!({
                "content": self.controller.content(),
                "solved": self.controller.is_solved(),
            }),
        );
    }

    fn handle_line(&mut self, line: String) -> Flow {
        if let Some(draft) = self.draft.as_mut() {
            if line.trim() == "." {
                let content = draft.join("\n");
                self.draft = None;
                self.submit(&content);
            } else {
                draft.push(line);
            }
            return Flow::Continue;
        }

        match parse_command(&line) {
            Command::Edit => {
                self.output
                    .message("Enter the new content; finish with a line holding only '.'");
                self.draft = Some(Vec::new());
            }
            Command::Reset => match self.controller.reset() {
                Ok(true) => {
                    self.output.success("Block reset to the starter");
                    self.show();
                }
                Ok(false) => self
                    .output
                    .message("Nothing to reset: the block is not solved"),
                Err(e) => self.output.warning(&e.to_string()),
            },
            Command::Ask(text) => match self.channel.ask_question(text) {
                Ok(_) => self.output.success("Question sent"),
                Err(e) => self.output.warning(&format!("Question not sent: {}", e)),
            },
            Command::Answer(n, text) => match self.inbox.get(n - 1) {
                Some(question) => match self.channel.answer(question, text) {
                    Ok(_) => self
                        .output
                        .success(&format!("Answer sent to {}", question.asker_name)),
                    Err(e) => self.output.warning(&format!("Answer not sent: {}", e)),
                },
                None => self
                    .output
                    .warning(&format!("No question number {}", n)),
            },
            Command::Show => self.show(),
            Command::Help => self.output.message(HELP),
            Command::Quit => return Flow::Quit,
            Command::Unknown(text) if text.is_empty() => {}
            Command::Unknown(text) => self
                .output
                .warning(&format!("Unknown command '{}'. Type :help for help.", text)),
        }
        Flow::Continue
    }

    fn submit(&mut self, content: &str) {
        match self.controller.edit(content) {
            Ok(transition) => {
                debug!("Local edit applied ({:?})", transition);
                self.announce(transition);
            }
            Err(e) => self.output.warning(&e.to_string()),
        }
    }

    fn receive_question(&mut self, question: Question) {
        self.inbox.push(question);
        let n = self.inbox.len();
        let question = &self.inbox[n - 1];
        self.output.event(
            "question",
            &format!(
                "[{}] {} asks: {}  (reply with :answer {} TEXT)",
                n, question.asker_name, question.content, n
            ),
            serde_json::json!({
                "number": n,
                "asker": question.asker_name,
                "content": question.content,
            }),
        );
    }
}

/// Join `id` on the relay at `url`
pub async fn run(
    url: &str,
    id: &str,
    role: Role,
    name: Option<String>,
    output: &Output,
) -> Result<()> {
    let participant = Participant::new(name.unwrap_or_else(|| role.to_string()), role);
    let channel = Arc::new(
        RemoteChannel::connect(url, participant.clone())
            .await
            .with_context(|| format!("Failed to connect to relay at {}", url))?,
    );

    let block_id = BlockId::new(id);
    let block = channel
        .fetch_block(&block_id)
        .await
        .with_context(|| format!("Failed to load block '{}'", block_id))?;
    let title = block.title.clone();

    let (persister, persist_task) = Persister::spawn(channel.clone());
    let controller = SessionController::open(participant, block, channel.clone())
        .context("Failed to join block")?
        .with_persister(persister);

    let mut questions = channel.take_questions()?;
    let mut answers = channel.take_answers()?;
    let mut status = channel.subscribe_status();

    output.message(&format!("Joined '{}' ({}) as {}", title, block_id, role));
    output.message(HELP);

    let mut me = Participation {
        controller,
        channel: channel.clone(),
        output,
        draft: None,
        inbox: Vec::new(),
    };
    me.show();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read input")? {
                    Some(line) => {
                        if let Flow::Quit = me.handle_line(line) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            update = me.controller.next_remote() => {
                match update {
                    Some(update) => {
                        output.event(
                            "edit",
                            &format!("{} updated the block", update.sender),
                            serde_json::json!({ "sender": update.sender.as_uuid() }),
                        );
                        me.show();
                        me.announce(update.transition);
                    }
                    None => {
                        output.warning("Connection to the relay was lost");
                        break;
                    }
                }
            }
            Some(question) = questions.recv() => me.receive_question(question),
            Some(answer) = answers.recv() => {
                output.event(
                    "answer",
                    &format!("Answer to \"{}\": {}", answer.question, answer.content),
                    serde_json::json!({ "question": answer.question, "content": answer.content }),
                );
            }
            changed = status.changed() => {
                if changed.is_err() || *status.borrow() == ConnectionStatus::Disconnected {
                    output.warning("Disconnected from the relay");
                    break;
                }
            }
        }
    }

    me.controller.leave();
    drop(me);

    // Let queued saves reach the relay
    let _ = tokio::time::timeout(Duration::from_secs(2), persist_task).await;
    output.message(&format!("Left '{}'", block_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command(":edit"), Command::Edit);
        assert_eq!(parse_command("  :reset "), Command::Reset);
        assert_eq!(parse_command(":show"), Command::Show);
        assert_eq!(parse_command(":q"), Command::Quit);
        assert_eq!(parse_command(":help"), Command::Help);
    }

    #[test]
    fn test_parse_ask() {
        assert_eq!(
            parse_command(":ask why does map skip holes?"),
            Command::Ask("why does map skip holes?")
        );
        assert_eq!(parse_command(":ask"), Command::Unknown(":ask"));
    }

    #[test]
    fn test_parse_answer() {
        assert_eq!(
            parse_command(":answer 2 use await"),
            Command::Answer(2, "use await")
        );
        assert_eq!(parse_command(":answer 0 nope"), Command::Unknown(":answer 0 nope"));
        assert_eq!(parse_command(":answer two x"), Command::Unknown(":answer two x"));
        assert_eq!(parse_command(":answer 3"), Command::Unknown(":answer 3"));
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(parse_command("hello"), Command::Unknown("hello"));
        assert_eq!(parse_command(""), Command::Unknown(""));
    }
}

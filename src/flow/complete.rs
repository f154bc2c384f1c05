use serde_json::json;

use super::{stamp, Command, Timestamp, TransitionError};
use crate::participant::DbPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteEvent {
    EditFeedback(String),
    SubmitFeedback,
    /// `confirmed` is the participant's answer to the restart prompt.
    Restart { confirmed: bool },
}

#[derive(Debug, Clone)]
pub struct CompletionPage {
    paths: DbPaths,
    restart_url: String,
    feedback: String,
    submitted: bool,
}

impl CompletionPage {
    pub fn new(paths: DbPaths, restart_url: impl Into<String>) -> Self {
        Self {
            paths,
            restart_url: restart_url.into(),
            feedback: String::new(),
            submitted: false,
        }
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn submitted(&self) -> bool {
        self.submitted
    }

    pub fn submit_enabled(&self) -> bool {
        !self.submitted && !self.feedback.trim().is_empty()
    }

    pub fn apply(&mut self, event: CompleteEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        match event {
            CompleteEvent::EditFeedback(text) => {
                if self.submitted {
                    return Err(TransitionError::new("feedback already submitted"));
                }
                self.feedback = text;
                Ok(Vec::new())
            }
            CompleteEvent::SubmitFeedback => {
                if self.submitted {
                    return Err(TransitionError::new("feedback already submitted"));
                }
                if !self.submit_enabled() {
                    return Err(TransitionError::new("feedback is empty"));
                }
                self.submitted = true;
                Ok(vec![Command::write(
                    self.paths.feedback(),
                    json!({
                        "feedbackTime": stamp(at),
                        "feedbackText": self.feedback,
                    }),
                )])
            }
            CompleteEvent::Restart { confirmed: false } => Ok(Vec::new()),
            CompleteEvent::Restart { confirmed: true } => Ok(vec![Command::Redirect(self.restart_url.clone())]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::{t, writes};
    use crate::participant::ParticipantId;

    fn page() -> CompletionPage {
        CompletionPage::new(DbPaths::new("exp", &ParticipantId::new("u1")), "https://example.org/start")
    }

    #[test]
    fn blank_feedback_cannot_be_submitted() {
        let mut p = page();
        assert!(p.apply(CompleteEvent::SubmitFeedback, t(0)).is_err());
        p.apply(CompleteEvent::EditFeedback("   \n".into()), t(1)).unwrap();
        assert!(!p.submit_enabled());
        assert!(p.apply(CompleteEvent::SubmitFeedback, t(2)).is_err());
    }

    #[test]
    fn feedback_written_once() {
        let mut p = page();
        p.apply(CompleteEvent::EditFeedback("fun study".into()), t(1)).unwrap();
        let cmds = p.apply(CompleteEvent::SubmitFeedback, t(2)).unwrap();
        let w = writes(&cmds);
        assert_eq!(w[0].0, "exp/participantData/u1/userFeedback");
        assert_eq!(w[0].1["feedbackText"], "fun study");
        assert_eq!(w[0].1["feedbackTime"], stamp(t(2)));
        assert!(p.apply(CompleteEvent::SubmitFeedback, t(3)).is_err());
        assert!(p.apply(CompleteEvent::EditFeedback("more".into()), t(4)).is_err());
    }

    #[test]
    fn restart_needs_confirmation() {
        let mut p = page();
        assert!(p.apply(CompleteEvent::Restart { confirmed: false }, t(0)).unwrap().is_empty());
        let cmds = p.apply(CompleteEvent::Restart { confirmed: true }, t(1)).unwrap();
        assert_eq!(cmds, vec![Command::Redirect("https://example.org/start".into())]);
    }
}

//! Session state: one controller per section plus the section on screen.
//!
//! `Session::apply` routes an event to the visible section's controller
//! and follows any `Reveal` it emits, running the entry step of the newly
//! shown section. The task section is entered without trials; the runtime
//! samples an assignment and hands it over through
//! [`Session::install_assignment`] or parks the session with
//! [`Session::block`].

use crate::bank::QuestionBank;
use crate::config::StudyConfig;
use crate::flow::complete::{CompleteEvent, CompletionPage};
use crate::flow::consent::{ConsentEvent, ConsentForm};
use crate::flow::instructions::{Pager, PagerEvent};
use crate::flow::pledge::{PledgeEvent, PledgeForm};
use crate::flow::survey::{Survey, SurveyEvent};
use crate::flow::trial::{TrialEvent, TrialRun};
use crate::flow::{Command, Section, Timestamp, TransitionError};
use crate::logging::{log_reveal, Domain};
use crate::participant::{DbPaths, ParticipantId};
use crate::sampler::Assignment;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Consent(ConsentEvent),
    Instructions(PagerEvent),
    Pledge(PledgeEvent),
    Trial(TrialEvent),
    Survey(SurveyEvent),
    Complete(CompleteEvent),
}

impl SessionEvent {
    pub fn section(&self) -> Section {
        match self {
            SessionEvent::Consent(_) => Section::Consent,
            SessionEvent::Instructions(_) => Section::Instructions,
            SessionEvent::Pledge(_) => Section::Pledge,
            SessionEvent::Trial(_) => Section::Task,
            SessionEvent::Survey(_) => Section::Survey,
            SessionEvent::Complete(_) => Section::Complete,
        }
    }

    /// Log domain of the section the event belongs to.
    pub fn domain(&self) -> Domain {
        match self {
            SessionEvent::Consent(_) => Domain::Consent,
            SessionEvent::Instructions(_) => Domain::Instructions,
            SessionEvent::Pledge(_) => Domain::Pledge,
            SessionEvent::Trial(_) => Domain::Trial,
            SessionEvent::Survey(_) => Domain::Survey,
            SessionEvent::Complete(_) => Domain::Feedback,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    participant: ParticipantId,
    section: Section,
    consent: ConsentForm,
    pager: Pager,
    pledge: PledgeForm,
    trials: Option<TrialRun>,
    survey: Survey,
    complete: CompletionPage,
    blocked: Option<String>,
    paths: DbPaths,
}

impl Session {
    pub fn new(cfg: &StudyConfig, participant: ParticipantId) -> Self {
        let paths = DbPaths::new(&cfg.db_name, &participant);
        Self {
            section: Section::Consent,
            consent: ConsentForm::new(paths.clone()),
            pager: Pager::new(paths.clone(), cfg.debug),
            pledge: PledgeForm::new(paths.clone()),
            trials: None,
            survey: Survey::new(paths.clone()),
            complete: CompletionPage::new(paths.clone(), cfg.restart_url.clone()),
            blocked: None,
            participant,
            paths,
        }
    }

    /// Consent page load.
    pub fn open(&self, entry_url: Option<&str>) -> Vec<Command> {
        self.consent.on_load(entry_url)
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn paths(&self) -> &DbPaths {
        &self.paths
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn consent(&self) -> &ConsentForm {
        &self.consent
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub fn pledge(&self) -> &PledgeForm {
        &self.pledge
    }

    pub fn trials(&self) -> Option<&TrialRun> {
        self.trials.as_ref()
    }

    pub fn survey(&self) -> &Survey {
        &self.survey
    }

    pub fn completion(&self) -> &CompletionPage {
        &self.complete
    }

    pub fn blocked_reason(&self) -> Option<&str> {
        self.blocked.as_deref()
    }

    /// Task section is shown but its assignment has not arrived yet.
    pub fn awaiting_assignment(&self) -> bool {
        self.section == Section::Task && self.trials.is_none()
    }

    pub fn apply(&mut self, event: SessionEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        if self.section == Section::Blocked {
            return Err(TransitionError::new("session is blocked"));
        }
        if event.section() != self.section {
            return Err(TransitionError::new(format!(
                "{} is not open (showing {})",
                event.section().as_str(),
                self.section.as_str()
            )));
        }
        let cmds = match event {
            SessionEvent::Consent(e) => self.consent.apply(e, at)?,
            SessionEvent::Instructions(e) => self.pager.apply(e, at)?,
            SessionEvent::Pledge(e) => self.pledge.apply(e, at)?,
            SessionEvent::Trial(e) => match self.trials.as_mut() {
                Some(run) => run.apply(e, at)?,
                None => return Err(TransitionError::new("trials are still loading")),
            },
            SessionEvent::Survey(e) => self.survey.apply(e, at)?,
            SessionEvent::Complete(e) => self.complete.apply(e, at)?,
        };
        Ok(self.follow(cmds, at))
    }

    /// Present trial 1 of a freshly sampled assignment.
    pub fn install_assignment(
        &mut self,
        assignment: Assignment,
        bank: &QuestionBank,
        at: Timestamp,
    ) -> Result<Vec<Command>, TransitionError> {
        if !self.awaiting_assignment() {
            return Err(TransitionError::new("no assignment is pending"));
        }
        let mut run = TrialRun::new(self.paths.clone(), assignment, bank)?;
        let cmds = run.start(at);
        self.trials = Some(run);
        Ok(cmds)
    }

    /// Park the session on the blocking error view.
    pub fn block(&mut self, reason: impl Into<String>) {
        log_reveal(self.participant.as_str(), self.section.as_str(), Section::Blocked.as_str());
        self.section = Section::Blocked;
        self.blocked = Some(reason.into());
    }

    /// Apply every `Reveal` in `cmds`, splicing in the entry writes of the
    /// section it shows right after it.
    fn follow(&mut self, cmds: Vec<Command>, at: Timestamp) -> Vec<Command> {
        let mut out = Vec::with_capacity(cmds.len());
        for cmd in cmds {
            let reveal = match &cmd {
                Command::Reveal(next) => Some(*next),
                _ => None,
            };
            out.push(cmd);
            if let Some(next) = reveal {
                log_reveal(self.participant.as_str(), self.section.as_str(), next.as_str());
                self.section = next;
                match next {
                    Section::Instructions => out.extend(self.pager.start(at)),
                    Section::Survey => out.extend(self.survey.open(at)),
                    _ => {}
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::{reveals, t, writes};

    fn session() -> Session {
        let cfg = StudyConfig {
            debug: true,
            db_name: "exp".to_string(),
            ..StudyConfig::default()
        };
        Session::new(&cfg, ParticipantId::new("u1"))
    }

    #[test]
    fn events_for_hidden_sections_are_rejected() {
        let mut s = session();
        assert!(s.apply(SessionEvent::Pledge(PledgeEvent::Toggle(true)), t(0)).is_err());
        assert!(s.apply(SessionEvent::Trial(TrialEvent::Confirm), t(0)).is_err());
        assert_eq!(s.section(), Section::Consent);
    }

    #[test]
    fn consent_reveal_starts_instructions() {
        let mut s = session();
        s.apply(SessionEvent::Consent(ConsentEvent::Toggle(true)), t(1)).unwrap();
        let cmds = s.apply(SessionEvent::Consent(ConsentEvent::Submit), t(2)).unwrap();
        assert_eq!(reveals(&cmds), vec![Section::Instructions]);
        assert_eq!(s.section(), Section::Instructions);
        let w = writes(&cmds);
        assert_eq!(w.len(), 2);
        assert_eq!(w[1].0, "exp/participantData/u1/instructionData/metadata");
    }

    #[test]
    fn task_waits_for_assignment_then_blocks() {
        let mut s = session();
        s.apply(SessionEvent::Consent(ConsentEvent::Toggle(true)), t(1)).unwrap();
        s.apply(SessionEvent::Consent(ConsentEvent::Submit), t(2)).unwrap();
        s.apply(SessionEvent::Instructions(PagerEvent::Skip), t(3)).unwrap();
        s.apply(SessionEvent::Pledge(PledgeEvent::Toggle(true)), t(4)).unwrap();
        s.apply(SessionEvent::Pledge(PledgeEvent::Submit), t(5)).unwrap();
        assert!(s.awaiting_assignment());
        assert!(s.apply(SessionEvent::Trial(TrialEvent::RateConfidence(50)), t(6)).is_err());

        s.block("randomizer unreachable");
        assert_eq!(s.section(), Section::Blocked);
        assert_eq!(s.blocked_reason(), Some("randomizer unreachable"));
        assert!(s.apply(SessionEvent::Trial(TrialEvent::RateConfidence(50)), t(7)).is_err());
        assert!(s.install_assignment(Assignment::default(), &QuestionBank::new(vec![]), t(8)).is_err());
    }
}

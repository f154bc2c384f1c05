use serde_json::{json, Value};

use super::{stamp, Command, Section, Timestamp, TransitionError};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::participant::{url_parameters, DbPaths};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentEvent {
    /// Consent checkbox checked or unchecked.
    Toggle(bool),
    Submit,
}

#[derive(Debug, Clone)]
pub struct ConsentForm {
    paths: DbPaths,
    consented: Option<bool>,
    consent_time: Option<Timestamp>,
    submitted: bool,
}

impl ConsentForm {
    pub fn new(paths: DbPaths) -> Self {
        Self {
            paths,
            consented: None,
            consent_time: None,
            submitted: false,
        }
    }

    /// Page load: record the query parameters the participant arrived with.
    /// An unreadable URL is logged and skipped; consent still proceeds.
    pub fn on_load(&self, entry_url: Option<&str>) -> Vec<Command> {
        let Some(url) = entry_url else {
            return Vec::new();
        };
        match url_parameters(url) {
            Ok(params) => vec![Command::write(self.paths.participant_info(), Value::Object(params))],
            Err(err) => {
                log(
                    Level::Warn,
                    Domain::Consent,
                    "url.unreadable",
                    obj(&[("url", v_str(url)), ("msg", v_str(&format!("{:#}", err)))]),
                );
                Vec::new()
            }
        }
    }

    pub fn submit_enabled(&self) -> bool {
        self.consented == Some(true) && !self.submitted
    }

    pub fn consented(&self) -> Option<bool> {
        self.consented
    }

    pub fn apply(&mut self, event: ConsentEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        if self.submitted {
            return Err(TransitionError::new("consent already submitted"));
        }
        match event {
            ConsentEvent::Toggle(true) => {
                self.consented = Some(true);
                self.consent_time = Some(at);
                Ok(Vec::new())
            }
            ConsentEvent::Toggle(false) => {
                self.consented = Some(false);
                self.consent_time = None;
                Ok(Vec::new())
            }
            ConsentEvent::Submit => {
                if !self.submit_enabled() {
                    return Err(TransitionError::new("check the consent box before continuing"));
                }
                self.submitted = true;
                Ok(vec![
                    Command::write(
                        self.paths.consent(),
                        json!({
                            "consented": self.consented,
                            "consentTime": self.consent_time.map(stamp),
                        }),
                    ),
                    Command::Reveal(Section::Instructions),
                ])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::{reveals, t, writes};
    use crate::participant::ParticipantId;

    fn form() -> ConsentForm {
        ConsentForm::new(DbPaths::new("exp", &ParticipantId::new("u1")))
    }

    #[test]
    fn submit_requires_checked_box() {
        let mut f = form();
        assert!(f.apply(ConsentEvent::Submit, t(0)).is_err());
        f.apply(ConsentEvent::Toggle(true), t(1)).unwrap();
        f.apply(ConsentEvent::Toggle(false), t(2)).unwrap();
        assert!(!f.submit_enabled());
        assert!(f.apply(ConsentEvent::Submit, t(3)).is_err());
    }

    #[test]
    fn submit_writes_record_and_reveals_instructions() {
        let mut f = form();
        f.apply(ConsentEvent::Toggle(true), t(5)).unwrap();
        let cmds = f.apply(ConsentEvent::Submit, t(9)).unwrap();
        let w = writes(&cmds);
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].0, "exp/participantData/u1/consentData");
        assert_eq!(w[0].1["consented"], true);
        assert_eq!(w[0].1["consentTime"], stamp(t(5)));
        assert_eq!(reveals(&cmds), vec![Section::Instructions]);
    }

    #[test]
    fn record_is_immutable_after_submit() {
        let mut f = form();
        f.apply(ConsentEvent::Toggle(true), t(0)).unwrap();
        f.apply(ConsentEvent::Submit, t(1)).unwrap();
        assert!(f.apply(ConsentEvent::Toggle(false), t(2)).is_err());
        assert!(f.apply(ConsentEvent::Submit, t(3)).is_err());
    }

    #[test]
    fn load_captures_url_parameters() {
        let f = form();
        let cmds = f.on_load(Some("https://x.org/?PROLIFIC_PID=p9"));
        let w = writes(&cmds);
        assert_eq!(w[0].0, "exp/participantData/u1/participantInfo");
        assert_eq!(w[0].1["PROLIFIC_PID"], "p9");
        assert!(f.on_load(None).is_empty());
    }

    #[test]
    fn unreadable_entry_url_is_skipped_and_consent_still_works() {
        let mut f = form();
        assert!(f.on_load(Some("::")).is_empty());
        f.apply(ConsentEvent::Toggle(true), t(1)).unwrap();
        let cmds = f.apply(ConsentEvent::Submit, t(2)).unwrap();
        assert_eq!(reveals(&cmds), vec![Section::Instructions]);
    }
}

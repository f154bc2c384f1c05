use serde_json::json;

use super::{stamp, Command, Section, Timestamp, TransitionError};
use crate::participant::DbPaths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PledgeEvent {
    Toggle(bool),
    Submit,
}

#[derive(Debug, Clone)]
pub struct PledgeForm {
    paths: DbPaths,
    pledged: Option<bool>,
    pledge_time: Option<Timestamp>,
    submitted: bool,
}

impl PledgeForm {
    pub fn new(paths: DbPaths) -> Self {
        Self {
            paths,
            pledged: None,
            pledge_time: None,
            submitted: false,
        }
    }

    pub fn pledged(&self) -> Option<bool> {
        self.pledged
    }

    pub fn submit_enabled(&self) -> bool {
        self.pledged == Some(true) && !self.submitted
    }

    pub fn apply(&mut self, event: PledgeEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        if self.submitted {
            return Err(TransitionError::new("pledge already submitted"));
        }
        match event {
            PledgeEvent::Toggle(on) => {
                self.pledged = Some(on);
                self.pledge_time = on.then_some(at);
                Ok(Vec::new())
            }
            PledgeEvent::Submit => {
                if !self.submit_enabled() {
                    return Err(TransitionError::new("take the integrity pledge before continuing"));
                }
                self.submitted = true;
                Ok(vec![
                    Command::write(
                        self.paths.pledge(),
                        json!({
                            "pledged": self.pledged,
                            "pledgeTime": self.pledge_time.map(stamp),
                        }),
                    ),
                    Command::Reveal(Section::Task),
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

    #[test]
    fn pledge_then_submit() {
        let mut f = PledgeForm::new(DbPaths::new("exp", &ParticipantId::new("u1")));
        assert!(f.apply(PledgeEvent::Submit, t(0)).is_err());
        f.apply(PledgeEvent::Toggle(true), t(1)).unwrap();
        f.apply(PledgeEvent::Toggle(false), t(2)).unwrap();
        assert!(!f.submit_enabled());
        f.apply(PledgeEvent::Toggle(true), t(3)).unwrap();
        let cmds = f.apply(PledgeEvent::Submit, t(4)).unwrap();
        let w = writes(&cmds);
        assert_eq!(w[0].0, "exp/participantData/u1/integrityPledge");
        assert_eq!(w[0].1["pledgeTime"], stamp(t(3)));
        assert_eq!(reveals(&cmds), vec![Section::Task]);
        assert!(f.apply(PledgeEvent::Submit, t(5)).is_err());
    }
}

//! Two-phase trial loop.
//!
//! Each trial first asks how likely the assistant's answer is correct
//! (confidence rating), then for the participant's own answer. Confirming
//! the answer writes the trial record and moves on; after the last trial
//! every randomization table is finalized and the survey is revealed.

use serde_json::json;

use super::{ms_between, stamp, Command, Section, Timestamp, TransitionError};
use crate::bank::{AnswerOption, Question, QuestionBank};
use crate::participant::{two_digit, DbPaths};
use crate::sampler::Assignment;

/// Highest confidence value on the rating scale (percent).
pub const MAX_CONFIDENCE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingConfidenceRating,
    AwaitingOwnSelection,
    AllTrialsComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    RateConfidence(u8),
    SelectOption(AnswerOption),
    Confirm,
}

#[derive(Debug, Clone)]
pub struct TrialSlot {
    pub question_index: usize,
    /// Zero-based explanation style.
    pub explanation: usize,
    pub question: Question,
}

impl TrialSlot {
    pub fn explanation_text(&self) -> &str {
        self.question.explanation(self.explanation).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct TrialRun {
    paths: DbPaths,
    slots: Vec<TrialSlot>,
    tables: Vec<String>,
    current: usize,
    phase: Phase,
    experiment_started_at: Option<Timestamp>,
    trial_started_at: Option<Timestamp>,
    confidence: Option<u8>,
    confidence_at: Option<Timestamp>,
    selection_opened_at: Option<Timestamp>,
    selection: Option<AnswerOption>,
    selection_at: Option<Timestamp>,
}

impl TrialRun {
    /// Resolve every assigned index against the bank.
    pub fn new(paths: DbPaths, assignment: Assignment, bank: &QuestionBank) -> Result<Self, TransitionError> {
        let mut slots = Vec::with_capacity(assignment.len());
        for i in 0..assignment.len() {
            let (question_index, explanation) = assignment
                .slot(i)
                .ok_or_else(|| TransitionError::new("trial and explanation lists differ in length"))?;
            let question = bank
                .get(question_index)
                .ok_or_else(|| TransitionError::new(format!("question {} is not in the bank", question_index)))?;
            if question.explanation(explanation).is_none() {
                return Err(TransitionError::new(format!("explanation style {} does not exist", explanation + 1)));
            }
            slots.push(TrialSlot {
                question_index,
                explanation,
                question: question.clone(),
            });
        }
        if slots.is_empty() {
            return Err(TransitionError::new("assignment has no trials"));
        }
        Ok(Self {
            paths,
            slots,
            tables: assignment.tables,
            current: 0,
            phase: Phase::AwaitingConfidenceRating,
            experiment_started_at: None,
            trial_started_at: None,
            confidence: None,
            confidence_at: None,
            selection_opened_at: None,
            selection: None,
            selection_at: None,
        })
    }

    /// Present trial 1 and stamp the experiment start.
    pub fn start(&mut self, at: Timestamp) -> Vec<Command> {
        self.experiment_started_at = Some(at);
        self.trial_started_at = Some(at);
        vec![Command::write(
            format!("{}/metadata", self.paths.trials()),
            json!({
                "experimentStartTime": stamp(at),
                "experimentCompleted": false,
            }),
        )]
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// One-based number of the trial on screen.
    pub fn number(&self) -> usize {
        (self.current + 1).min(self.slots.len())
    }

    pub fn counter(&self) -> (String, String) {
        (two_digit(self.number()), two_digit(self.total()))
    }

    pub fn current(&self) -> Option<&TrialSlot> {
        match self.phase {
            Phase::AllTrialsComplete => None,
            _ => self.slots.get(self.current),
        }
    }

    pub fn confidence(&self) -> Option<u8> {
        self.confidence
    }

    pub fn selection(&self) -> Option<AnswerOption> {
        self.selection
    }

    pub fn options_enabled(&self) -> bool {
        self.phase == Phase::AwaitingOwnSelection
    }

    pub fn confirm_enabled(&self) -> bool {
        self.phase == Phase::AwaitingOwnSelection && self.selection.is_some()
    }

    pub fn apply(&mut self, event: TrialEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        match (self.phase, event) {
            (Phase::AllTrialsComplete, _) => Err(TransitionError::new("all trials are complete")),
            (_, TrialEvent::RateConfidence(value)) => {
                if value > MAX_CONFIDENCE {
                    return Err(TransitionError::new(format!("confidence must be 0-{}", MAX_CONFIDENCE)));
                }
                self.confidence = Some(value);
                self.confidence_at = Some(at);
                if self.phase == Phase::AwaitingConfidenceRating {
                    self.phase = Phase::AwaitingOwnSelection;
                    self.selection_opened_at = Some(at);
                }
                Ok(Vec::new())
            }
            (Phase::AwaitingConfidenceRating, _) => {
                Err(TransitionError::new("rate the assistant's answer first"))
            }
            (Phase::AwaitingOwnSelection, TrialEvent::SelectOption(option)) => {
                self.selection = Some(option);
                self.selection_at = Some(at);
                Ok(Vec::new())
            }
            (Phase::AwaitingOwnSelection, TrialEvent::Confirm) => {
                if self.selection.is_none() {
                    return Err(TransitionError::new("select an answer first"));
                }
                Ok(self.advance(at))
            }
        }
    }

    fn record(&self, at: Timestamp) -> serde_json::Value {
        let slot = &self.slots[self.current];
        let started = self.trial_started_at.unwrap_or(at);
        let selection_ms = match (self.selection_opened_at, self.selection_at) {
            (Some(opened), Some(picked)) => Some(ms_between(opened, picked)),
            _ => None,
        };
        json!({
            "trialStartTime": stamp(started),
            "trialEndTime": stamp(at),
            "questionID": slot.question.question_id,
            "questionIndex": slot.question_index,
            "explanationStyle": slot.explanation + 1,
            "probGPTCorrect": self.confidence,
            "probGPTCorrectTime": self.confidence_at.map(|c| ms_between(started, c)),
            "patOwnSelection": self.selection.map(|s| s.as_str()),
            "patOwnSelectionTime": selection_ms,
        })
    }

    fn advance(&mut self, at: Timestamp) -> Vec<Command> {
        let mut cmds = vec![Command::write(self.paths.trial(self.current + 1), self.record(at))];

        self.confidence = None;
        self.confidence_at = None;
        self.selection_opened_at = None;
        self.selection = None;
        self.selection_at = None;
        self.current += 1;

        if self.current < self.slots.len() {
            self.phase = Phase::AwaitingConfidenceRating;
            self.trial_started_at = Some(at);
            return cmds;
        }

        self.phase = Phase::AllTrialsComplete;
        self.trial_started_at = None;
        let mut finalized: Vec<&str> = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            if !finalized.contains(&table.as_str()) {
                finalized.push(table);
                cmds.push(Command::Finalize { table: table.clone() });
            }
        }
        let meta = format!("{}/metadata", self.paths.trials());
        let started = self.experiment_started_at.unwrap_or(at);
        cmds.push(Command::write(format!("{meta}/experimentEndTime"), stamp(at)));
        cmds.push(Command::write(format!("{meta}/experimentCompleted"), json!(true)));
        cmds.push(Command::write(
            format!("{meta}/experimentTotalTime"),
            json!(ms_between(started, at)),
        ));
        cmds.push(Command::Reveal(Section::Survey));
        cmds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::testing::{reveals, t, writes};
    use crate::participant::ParticipantId;
    use serde_json::Value;

    fn question(i: usize) -> Question {
        Question {
            question_id: json!(format!("q{i}")),
            topic: "Anatomy".to_string(),
            question: format!("Question {i}?"),
            a: "a".to_string(),
            b: "b".to_string(),
            c: "c".to_string(),
            d: "d".to_string(),
            explanationstyle1: format!("{i}-e1"),
            explanationstyle2: format!("{i}-e2"),
            explanationstyle3: format!("{i}-e3"),
            explanationstyle4: format!("{i}-e4"),
        }
    }

    fn run(n: usize) -> TrialRun {
        let bank = QuestionBank::new((0..20).map(question).collect());
        let assignment = Assignment {
            question_indices: (0..n).map(|i| i * 2).collect(),
            explanations: (0..n).map(|i| i % 4).collect(),
            tables: vec!["Table_0_0".to_string(), "Table_0_1".to_string(), "Table_0_0".to_string()],
        };
        let mut r = TrialRun::new(DbPaths::new("exp", &ParticipantId::new("u1")), assignment, &bank).unwrap();
        r.start(t(0));
        r
    }

    fn finalized(cmds: &[Command]) -> Vec<&str> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Finalize { table } => Some(table.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn option_locked_until_confidence_rated() {
        let mut r = run(2);
        assert!(!r.options_enabled());
        assert!(r.apply(TrialEvent::SelectOption(AnswerOption::A), t(1)).is_err());
        assert!(r.apply(TrialEvent::Confirm, t(1)).is_err());
        r.apply(TrialEvent::RateConfidence(60), t(2)).unwrap();
        assert_eq!(r.phase(), Phase::AwaitingOwnSelection);
        assert!(r.options_enabled());
        assert!(!r.confirm_enabled());
        assert!(r.apply(TrialEvent::Confirm, t(3)).is_err());
    }

    #[test]
    fn confirm_writes_one_record_with_timings() {
        let mut r = run(2);
        r.apply(TrialEvent::RateConfidence(80), t(3)).unwrap();
        r.apply(TrialEvent::SelectOption(AnswerOption::C), t(7)).unwrap();
        let cmds = r.apply(TrialEvent::Confirm, t(8)).unwrap();

        let w = writes(&cmds);
        assert_eq!(w.len(), 1);
        let (path, rec) = w[0];
        assert_eq!(path, "exp/participantData/u1/trialData/trial01");
        assert_eq!(rec["questionIndex"], 0);
        assert_eq!(rec["questionID"], "q0");
        assert_eq!(rec["explanationStyle"], 1);
        assert_eq!(rec["probGPTCorrect"], 80);
        assert_eq!(rec["probGPTCorrectTime"], 3000);
        assert_eq!(rec["patOwnSelection"], "C");
        assert_eq!(rec["patOwnSelectionTime"], 4000);
        assert_ne!(rec["patOwnSelectionTime"], Value::Null);

        assert_eq!(r.number(), 2);
        assert_eq!(r.phase(), Phase::AwaitingConfidenceRating);
        assert_eq!(r.confidence(), None);
        assert!(reveals(&cmds).is_empty());
    }

    #[test]
    fn rerating_keeps_selection_timer_from_phase_open() {
        let mut r = run(1);
        r.apply(TrialEvent::RateConfidence(20), t(1)).unwrap();
        r.apply(TrialEvent::RateConfidence(40), t(5)).unwrap();
        r.apply(TrialEvent::SelectOption(AnswerOption::B), t(6)).unwrap();
        r.apply(TrialEvent::SelectOption(AnswerOption::D), t(9)).unwrap();
        let cmds = r.apply(TrialEvent::Confirm, t(10)).unwrap();
        let rec = writes(&cmds)[0].1.clone();
        assert_eq!(rec["probGPTCorrect"], 40);
        assert_eq!(rec["probGPTCorrectTime"], 5000);
        assert_eq!(rec["patOwnSelection"], "D");
        assert_eq!(rec["patOwnSelectionTime"], 8000);
    }

    #[test]
    fn last_trial_finalizes_each_table_once_and_reveals_survey() {
        let mut r = run(2);
        for (i, opt) in [AnswerOption::A, AnswerOption::B].into_iter().enumerate() {
            let base = (i as i64) * 10;
            r.apply(TrialEvent::RateConfidence(50), t(base + 1)).unwrap();
            r.apply(TrialEvent::SelectOption(opt), t(base + 2)).unwrap();
            let cmds = r.apply(TrialEvent::Confirm, t(base + 3)).unwrap();
            if i == 0 {
                assert!(finalized(&cmds).is_empty());
            } else {
                assert_eq!(finalized(&cmds), vec!["Table_0_0", "Table_0_1"]);
                assert_eq!(reveals(&cmds), vec![Section::Survey]);
                let w = writes(&cmds);
                assert_eq!(w[0].0, "exp/participantData/u1/trialData/trial02");
                assert!(w.iter().any(|(p, v)| p.ends_with("experimentTotalTime") && **v == json!(13_000)));
            }
        }
        assert_eq!(r.phase(), Phase::AllTrialsComplete);
        assert!(r.current().is_none());
        assert!(r.apply(TrialEvent::RateConfidence(10), t(30)).is_err());
    }

    #[test]
    fn rejects_out_of_scale_confidence() {
        let mut r = run(1);
        assert!(r.apply(TrialEvent::RateConfidence(101), t(1)).is_err());
        assert_eq!(r.phase(), Phase::AwaitingConfidenceRating);
    }

    #[test]
    fn unknown_question_index_is_rejected() {
        let bank = QuestionBank::new((0..3).map(question).collect());
        let assignment = Assignment {
            question_indices: vec![5],
            explanations: vec![0],
            tables: vec![],
        };
        assert!(TrialRun::new(DbPaths::new("e", &ParticipantId::new("u")), assignment, &bank).is_err());
    }

    #[test]
    fn current_slot_shows_assigned_explanation() {
        let r = run(2);
        let slot = r.current().unwrap();
        assert_eq!(slot.explanation_text(), "0-e1");
        assert_eq!(r.counter(), ("01".to_string(), "02".to_string()));
    }
}

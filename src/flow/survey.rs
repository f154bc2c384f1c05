//! Post-task self-assessment: one Likert rating per topic.

use serde_json::{json, Map, Value};

use super::{ms_between, stamp, Command, Section, Timestamp, TransitionError};
use crate::participant::DbPaths;

pub const TOPICS: [&str; 10] = [
    "Anatomy",
    "Global Facts",
    "High School Chemistry",
    "High School Macroeconomics",
    "High School Physics",
    "High School World History",
    "Machine Learning",
    "Philosophy",
    "Professional Psychology",
    "Public Relations",
];

pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyEvent {
    /// Rate the topic at this index of [`TOPICS`].
    Rate { topic: usize, value: u8 },
    Submit,
}

#[derive(Debug, Clone)]
pub struct Survey {
    paths: DbPaths,
    ratings: [Option<u8>; TOPICS.len()],
    ranked: usize,
    opened_at: Option<Timestamp>,
    submitted: bool,
}

impl Survey {
    pub fn new(paths: DbPaths) -> Self {
        Self {
            paths,
            ratings: [None; TOPICS.len()],
            ranked: 0,
            opened_at: None,
            submitted: false,
        }
    }

    pub fn open(&mut self, at: Timestamp) -> Vec<Command> {
        self.opened_at = Some(at);
        vec![Command::write(
            format!("{}/metadata/surveyStartTime", self.paths.survey()),
            stamp(at),
        )]
    }

    /// Topics rated at least once.
    pub fn ranked(&self) -> usize {
        self.ranked
    }

    pub fn rating(&self, topic: usize) -> Option<u8> {
        self.ratings.get(topic).copied().flatten()
    }

    pub fn submit_enabled(&self) -> bool {
        self.ranked == TOPICS.len() && !self.submitted
    }

    pub fn apply(&mut self, event: SurveyEvent, at: Timestamp) -> Result<Vec<Command>, TransitionError> {
        if self.submitted {
            return Err(TransitionError::new("survey already submitted"));
        }
        match event {
            SurveyEvent::Rate { topic, value } => {
                if !(RATING_MIN..=RATING_MAX).contains(&value) {
                    return Err(TransitionError::new(format!(
                        "rating must be {}-{}",
                        RATING_MIN, RATING_MAX
                    )));
                }
                let slot = self
                    .ratings
                    .get_mut(topic)
                    .ok_or_else(|| TransitionError::new(format!("no topic {}", topic + 1)))?;
                if slot.is_none() {
                    self.ranked += 1;
                }
                *slot = Some(value);
                Ok(Vec::new())
            }
            SurveyEvent::Submit => {
                if !self.submit_enabled() {
                    return Err(TransitionError::new(format!(
                        "rate every topic first ({}/{} rated)",
                        self.ranked,
                        TOPICS.len()
                    )));
                }
                self.submitted = true;
                let mut ratings = Map::new();
                for (topic, value) in TOPICS.iter().zip(self.ratings.iter()) {
                    ratings.insert(topic.to_string(), json!(value));
                }
                let root = self.paths.survey();
                let started = self.opened_at.unwrap_or(at);
                Ok(vec![
                    Command::write(format!("{root}/selfAssessment"), Value::Object(ratings)),
                    Command::write(format!("{root}/metadata/surveyEndTime"), stamp(at)),
                    Command::write(
                        format!("{root}/metadata/surveyTotalTime"),
                        json!(ms_between(started, at)),
                    ),
                    Command::Reveal(Section::Complete),
                ])
            }
        }
    }
}

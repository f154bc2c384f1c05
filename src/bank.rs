use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

/// One multiple-choice item with its four explanation styles.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    /// Stable id from the source data set; numbers and strings both occur.
    pub question_id: Value,
    #[serde(rename = "Topic")]
    pub topic: String,
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "A")]
    pub a: String,
    #[serde(rename = "B")]
    pub b: String,
    #[serde(rename = "C")]
    pub c: String,
    #[serde(rename = "D")]
    pub d: String,
    pub explanationstyle1: String,
    pub explanationstyle2: String,
    pub explanationstyle3: String,
    pub explanationstyle4: String,
}

impl Question {
    /// Explanation for a zero-based variant index.
    pub fn explanation(&self, variant: usize) -> Option<&str> {
        match variant {
            0 => Some(&self.explanationstyle1),
            1 => Some(&self.explanationstyle2),
            2 => Some(&self.explanationstyle3),
            3 => Some(&self.explanationstyle4),
            _ => None,
        }
    }

    pub fn option_text(&self, option: AnswerOption) -> &str {
        match option {
            AnswerOption::A => &self.a,
            AnswerOption::B => &self.b,
            AnswerOption::C => &self.c,
            AnswerOption::D => &self.d,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub const ALL: [AnswerOption; 4] = [AnswerOption::A, AnswerOption::B, AnswerOption::C, AnswerOption::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerOption::A => "A",
            AnswerOption::B => "B",
            AnswerOption::C => "C",
            AnswerOption::D => "D",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(AnswerOption::A),
            "B" => Some(AnswerOption::B),
            "C" => Some(AnswerOption::C),
            "D" => Some(AnswerOption::D),
            _ => None,
        }
    }
}

/// Static question bank, ordered by category then confidence bin.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let questions: Vec<Question> = serde_json::from_str(raw).context("question bank is not a list of questions")?;
        Ok(Self { questions })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read question bank {}", path.display()))?;
        Self::from_json(&raw)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Fails unless every global index the sampler can produce is present.
    pub fn ensure_covers(&self, required: usize) -> Result<()> {
        if self.questions.len() < required {
            return Err(anyhow!(
                "question bank has {} questions, sampler needs {}",
                self.questions.len(),
                required
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"[{
        "question_id": 17,
        "Topic": "Anatomy",
        "Question": "Which bone?",
        "A": "Femur", "B": "Tibia", "C": "Ulna", "D": "Radius",
        "explanationstyle1": "e1", "explanationstyle2": "e2",
        "explanationstyle3": "e3", "explanationstyle4": "e4"
    }]"#;

    #[test]
    fn parses_source_field_names() {
        let bank = QuestionBank::from_json(ONE).unwrap();
        assert_eq!(bank.len(), 1);
        let q = bank.get(0).unwrap();
        assert_eq!(q.topic, "Anatomy");
        assert_eq!(q.option_text(AnswerOption::B), "Tibia");
        assert_eq!(q.explanation(3), Some("e4"));
        assert_eq!(q.explanation(4), None);
        assert_eq!(q.question_id, serde_json::json!(17));
    }

    #[test]
    fn coverage_check() {
        let bank = QuestionBank::from_json(ONE).unwrap();
        assert!(bank.ensure_covers(1).is_ok());
        assert!(bank.ensure_covers(350).is_err());
    }

    #[test]
    fn option_parse_is_case_insensitive() {
        assert_eq!(AnswerOption::parse(" b "), Some(AnswerOption::B));
        assert_eq!(AnswerOption::parse("e"), None);
    }
}

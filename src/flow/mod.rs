//! Section state machines: `(state, event) -> commands`.
//!
//! Nothing here touches the store, the randomizer or the terminal. Each
//! controller mutates its own state and returns the commands the runtime
//! executes; a rejected event leaves state untouched.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

pub mod complete;
pub mod consent;
pub mod instructions;
pub mod pledge;
pub mod survey;
pub mod trial;

pub type Timestamp = DateTime<Utc>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Consent,
    Instructions,
    Pledge,
    Task,
    Survey,
    Complete,
    /// Sampling failed; the session cannot continue.
    Blocked,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Consent => "consent",
            Section::Instructions => "instructions",
            Section::Pledge => "pledge",
            Section::Task => "task",
            Section::Survey => "survey",
            Section::Complete => "complete",
            Section::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Best-effort persistence at a participant-namespaced path.
    Write { path: String, value: Value },
    /// Hide the current section and show another.
    Reveal(Section),
    /// Commit this participant's allocation in a randomization table.
    Finalize { table: String },
    /// Leave the study for another URL.
    Redirect(String),
}

impl Command {
    pub fn write(path: impl Into<String>, value: Value) -> Self {
        Command::Write { path: path.into(), value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub msg: String,
}

impl TransitionError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for TransitionError {}

/// Timestamp as written to the store.
pub fn stamp(at: Timestamp) -> Value {
    Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

/// Milliseconds from `from` to `to`.
pub fn ms_between(from: Timestamp, to: Timestamp) -> i64 {
    (to - from).num_milliseconds()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use chrono::TimeZone;

    pub fn t(secs: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    pub fn writes(cmds: &[Command]) -> Vec<(&str, &Value)> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Write { path, value } => Some((path.as_str(), value)),
                _ => None,
            })
            .collect()
    }

    pub fn reveals(cmds: &[Command]) -> Vec<Section> {
        cmds.iter()
            .filter_map(|c| match c {
                Command::Reveal(s) => Some(*s),
                _ => None,
            })
            .collect()
    }
}

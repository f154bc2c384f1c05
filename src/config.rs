use serde_json::json;
use std::time::Duration;

use crate::logging::params_hash;

/// Number of trials a production session presents.
pub const TOTAL_TRIALS: usize = 40;
/// Number of trials a debug session presents.
pub const DEBUG_TRIALS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
    Http,
}

impl StoreKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "memory" => StoreKind::Memory,
            "http" => StoreKind::Http,
            _ => StoreKind::Sqlite,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RandomizerKind {
    Local,
    Http,
}

impl RandomizerKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "http" => RandomizerKind::Http,
            _ => RandomizerKind::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub struct StudyConfig {
    pub debug: bool,
    /// Database namespace; also the study id sent to the randomizer.
    pub db_name: String,
    pub question_bank: String,
    pub store: StoreKind,
    pub sqlite_path: String,
    pub store_base: String,
    pub store_auth: Option<String>,
    pub randomizer: RandomizerKind,
    pub randomizer_base: String,
    pub randomizer_seed: Option<u64>,
    /// Minutes before the randomizer reclaims an abandoned allocation.
    pub session_timeout_min: u32,
    /// Upper bound on any single randomizer or store request.
    pub request_timeout_ms: u64,
    pub participant_id: Option<String>,
    /// URL the participant arrived on; its query string is captured at consent.
    pub entry_url: Option<String>,
    pub restart_url: String,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            debug: false,
            db_name: "experiment-template".to_string(),
            question_bank: "data/example_file.json".to_string(),
            store: StoreKind::Sqlite,
            sqlite_path: "out/studyflow.sqlite".to_string(),
            store_base: "http://127.0.0.1:9000".to_string(),
            store_auth: None,
            randomizer: RandomizerKind::Local,
            randomizer_base: "http://127.0.0.1:9001".to_string(),
            randomizer_seed: None,
            session_timeout_min: 90,
            request_timeout_ms: 10_000,
            participant_id: None,
            entry_url: None,
            restart_url: "https://madlabatuci.github.io/experiment-template/".to_string(),
        }
    }
}

impl StudyConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            debug: std::env::var("STUDY_DEBUG").map(|v| v == "1" || v == "true").unwrap_or(d.debug),
            db_name: std::env::var("STUDY_DB_NAME").unwrap_or(d.db_name),
            question_bank: std::env::var("QUESTION_BANK").unwrap_or(d.question_bank),
            store: std::env::var("STORE").map(|v| StoreKind::parse(&v)).unwrap_or(d.store),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or(d.sqlite_path),
            store_base: std::env::var("STORE_BASE").unwrap_or(d.store_base),
            store_auth: std::env::var("STORE_AUTH").ok(),
            randomizer: std::env::var("RANDOMIZER").map(|v| RandomizerKind::parse(&v)).unwrap_or(d.randomizer),
            randomizer_base: std::env::var("RANDOMIZER_BASE").unwrap_or(d.randomizer_base),
            randomizer_seed: std::env::var("RANDOMIZER_SEED").ok().and_then(|v| v.parse().ok()),
            session_timeout_min: std::env::var("SESSION_TIMEOUT_MIN").ok().and_then(|v| v.parse().ok()).unwrap_or(d.session_timeout_min),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).filter(|ms| *ms > 0).unwrap_or(d.request_timeout_ms),
            participant_id: std::env::var("PARTICIPANT_ID").ok().filter(|v| !v.is_empty()),
            entry_url: std::env::var("ENTRY_URL").ok(),
            restart_url: std::env::var("RESTART_URL").unwrap_or(d.restart_url),
        }
    }

    /// Trials presented this session (the debug build runs a short session).
    pub fn trial_count(&self) -> usize {
        if self.debug {
            DEBUG_TRIALS
        } else {
            TOTAL_TRIALS
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Fingerprint of the settings that change what a participant sees.
    pub fn fingerprint(&self) -> String {
        let view = json!({
            "debug": self.debug,
            "db_name": self.db_name,
            "question_bank": self.question_bank,
            "session_timeout_min": self.session_timeout_min,
        });
        params_hash(&view.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_shrinks_trial_count() {
        let mut cfg = StudyConfig::default();
        assert_eq!(cfg.trial_count(), 40);
        cfg.debug = true;
        assert_eq!(cfg.trial_count(), 2);
    }

    #[test]
    fn request_timeout_defaults_to_ten_seconds() {
        let cfg = StudyConfig::default();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
        let short = StudyConfig { request_timeout_ms: 250, ..StudyConfig::default() };
        assert_eq!(short.request_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn kinds_fall_back_to_offline_backends() {
        assert_eq!(StoreKind::parse("http"), StoreKind::Http);
        assert_eq!(StoreKind::parse("memory"), StoreKind::Memory);
        assert_eq!(StoreKind::parse("anything"), StoreKind::Sqlite);
        assert_eq!(RandomizerKind::parse("http"), RandomizerKind::Http);
        assert_eq!(RandomizerKind::parse(""), RandomizerKind::Local);
    }

    #[test]
    fn fingerprint_tracks_debug_flag() {
        let a = StudyConfig::default();
        let b = StudyConfig { debug: true, ..StudyConfig::default() };
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint(), StudyConfig::default().fingerprint());
    }
}

use anyhow::{Context, Result};
use rand::Rng;
use serde_json::{Map, Value};
use url::Url;

/// Opaque participant identifier, stable for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self(format!("{:016x}{:012x}", rng.gen::<u64>(), rng.gen::<u64>() >> 16))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Two-digit, zero-padded counter used in page and trial keys.
pub fn two_digit(n: usize) -> String {
    format!("{:02}", n)
}

/// Paths under `<namespace>/participantData/<participant>`.
#[derive(Debug, Clone)]
pub struct DbPaths {
    root: String,
}

impl DbPaths {
    pub fn new(namespace: &str, participant: &ParticipantId) -> Self {
        Self {
            root: format!("{}/participantData/{}", namespace, participant.as_str()),
        }
    }

    pub fn participant_info(&self) -> String {
        format!("{}/participantInfo", self.root)
    }

    pub fn consent(&self) -> String {
        format!("{}/consentData", self.root)
    }

    pub fn instructions(&self) -> String {
        format!("{}/instructionData", self.root)
    }

    pub fn instruction_page(&self, page: usize) -> String {
        format!("{}/instructionPage{}", self.instructions(), two_digit(page))
    }

    pub fn pledge(&self) -> String {
        format!("{}/integrityPledge", self.root)
    }

    pub fn trials(&self) -> String {
        format!("{}/trialData", self.root)
    }

    pub fn trial(&self, number: usize) -> String {
        format!("{}/trial{}", self.trials(), two_digit(number))
    }

    pub fn survey(&self) -> String {
        format!("{}/surveyData", self.root)
    }

    pub fn feedback(&self) -> String {
        format!("{}/userFeedback", self.root)
    }
}

/// Query-string parameters of the URL the participant arrived on.
///
/// Repeated keys keep the last value, matching how recruitment platforms
/// append their ids.
pub fn url_parameters(entry_url: &str) -> Result<Map<String, Value>> {
    let url = Url::parse(entry_url).with_context(|| format!("invalid entry url {entry_url}"))?;
    let mut out = Map::new();
    for (k, v) in url.query_pairs() {
        out.insert(k.into_owned(), Value::String(v.into_owned()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_namespaced_by_participant() {
        let p = DbPaths::new("exp", &ParticipantId::new("u1"));
        assert_eq!(p.consent(), "exp/participantData/u1/consentData");
        assert_eq!(p.trial(3), "exp/participantData/u1/trialData/trial03");
        assert_eq!(
            p.instruction_page(10),
            "exp/participantData/u1/instructionData/instructionPage10"
        );
    }

    #[test]
    fn url_parameters_decode_query() {
        let params =
            url_parameters("https://example.org/study/?PROLIFIC_PID=abc&STUDY_ID=s%201").unwrap();
        assert_eq!(params.get("PROLIFIC_PID").unwrap(), "abc");
        assert_eq!(params.get("STUDY_ID").unwrap(), "s 1");
    }

    #[test]
    fn url_without_query_is_empty() {
        assert!(url_parameters("https://example.org/").unwrap().is_empty());
        assert!(url_parameters("not a url").is_err());
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(ParticipantId::generate(), ParticipantId::generate());
    }
}

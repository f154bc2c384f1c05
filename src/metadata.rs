//! Static study text injected into every section view.

#[derive(Clone, Debug)]
pub struct StudyMetadata {
    pub experiment_name: String,
    pub title_consent: String,
    pub title_instructions: String,
    pub title_pledge: String,
    pub title_completion: String,
    pub consent: ConsentText,
}

/// Text blocks shown on the consent page.
#[derive(Clone, Debug)]
pub struct ConsentText {
    pub summary: String,
    pub time_commitment: String,
    pub benefits_and_risks: String,
    pub eligibility: Vec<String>,
    pub compensation: String,
    pub recruitment_service: String,
    pub lead_researcher: String,
    pub lead_researcher_email: String,
}

impl ConsentText {
    pub fn contact_link(&self) -> String {
        format!("mailto:{}?Subject=Study%20Question", self.lead_researcher_email)
    }
}

impl Default for StudyMetadata {
    fn default() -> Self {
        Self {
            experiment_name: "Experiment Name Here".to_string(),
            title_consent: "Consent Page".to_string(),
            title_instructions: "Instructions".to_string(),
            title_pledge: "Integrity Pledge".to_string(),
            title_completion: "Task Completed".to_string(),
            consent: ConsentText {
                summary: "You will answer multiple-choice questions with the help of an AI \
                          assistant and rate how likely you think the assistant is correct."
                    .to_string(),
                time_commitment: "30 minutes".to_string(),
                benefits_and_risks: "There are no direct benefits from your participation in this study."
                    .to_string(),
                eligibility: vec![
                    "United States citizen/resident".to_string(),
                    "18 years or older".to_string(),
                    "English speaker".to_string(),
                    "HTML-5 compatible web browser (chrome, edge, safari, or firefox)".to_string(),
                ],
                compensation: "$5.00".to_string(),
                recruitment_service: "Prolific".to_string(),
                lead_researcher: "Your Name Here".to_string(),
                lead_researcher_email: "your_email@uci.edu".to_string(),
            },
        }
    }
}

impl StudyMetadata {
    pub fn from_env() -> Self {
        let mut meta = Self::default();
        if let Ok(name) = std::env::var("STUDY_NAME") {
            meta.experiment_name = name;
        }
        if let Ok(v) = std::env::var("STUDY_COMPENSATION") {
            meta.consent.compensation = v;
        }
        if let Ok(v) = std::env::var("STUDY_TIME_COMMITMENT") {
            meta.consent.time_commitment = v;
        }
        if let Ok(v) = std::env::var("STUDY_RESEARCHER") {
            meta.consent.lead_researcher = v;
        }
        if let Ok(v) = std::env::var("STUDY_RESEARCHER_EMAIL") {
            meta.consent.lead_researcher_email = v;
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_link_uses_email() {
        let meta = StudyMetadata::default();
        assert!(meta.consent.contact_link().starts_with("mailto:your_email@uci.edu?"));
        assert_eq!(meta.consent.eligibility.len(), 4);
    }
}

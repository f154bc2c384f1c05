use anyhow::{Context, Result};
use std::sync::Arc;

use studyflow::bank::QuestionBank;
use studyflow::config::StudyConfig;
use studyflow::logging::{log, log_session_summary, obj, v_str, Domain, Level};
use studyflow::metadata::StudyMetadata;
use studyflow::participant::ParticipantId;
use studyflow::runtime::Runtime;
use studyflow::sampler::bank_size;
use studyflow::session::Session;
use studyflow::store::Recorder;
use studyflow::term;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = StudyConfig::from_env();
    let meta = StudyMetadata::from_env();

    let bank = QuestionBank::load(&cfg.question_bank)?;
    bank.ensure_covers(bank_size())
        .with_context(|| format!("question bank {}", cfg.question_bank))?;

    let store = cfg.store.build(&cfg)?;
    let randomizer = cfg.randomizer.build(&cfg)?;
    let recorder = Recorder::spawn(store, cfg.request_timeout());

    let participant = cfg
        .participant_id
        .clone()
        .map(ParticipantId::new)
        .unwrap_or_else(ParticipantId::generate);
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("participant_id", v_str(participant.as_str())),
            ("study", v_str(&meta.experiment_name)),
            ("db_name", v_str(&cfg.db_name)),
            ("store", v_str(&format!("{:?}", cfg.store))),
            ("randomizer", v_str(&format!("{:?}", cfg.randomizer))),
        ]),
    );

    let session = Session::new(&cfg, participant);
    let mut rt = Runtime::new(cfg, session, recorder, randomizer, Arc::new(bank));
    let outcome = term::run(&mut rt, &meta).await;

    rt.recorder().flush().await;
    log_session_summary(rt.session().participant().as_str(), rt.session().section().as_str());
    outcome
}

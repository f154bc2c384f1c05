//! Sample one participant's assignment and print it as JSON.
//!
//! Usage: assign [--finalize]
//!
//! Draws against the configured randomizer (RANDOMIZER, RANDOMIZER_BASE,
//! RANDOMIZER_SEED). Without `--finalize` the allocations are left open and
//! the service reclaims them after SESSION_TIMEOUT_MIN. Every call is
//! bounded by REQUEST_TIMEOUT_MS.

use anyhow::{anyhow, Result};
use serde_json::json;
use std::env;
use tokio::time::timeout;

use studyflow::bank::QuestionBank;
use studyflow::config::StudyConfig;
use studyflow::sampler::{prepare_assignment, SamplingParams};

#[tokio::main]
async fn main() -> Result<()> {
    let finalize = env::args().skip(1).any(|a| a == "--finalize");
    let cfg = StudyConfig::from_env();
    let randomizer = cfg.randomizer.build(&cfg)?;
    let bank = QuestionBank::load(&cfg.question_bank).ok();

    let assignment = prepare_assignment(randomizer.clone(), SamplingParams::from_config(&cfg)).await?;

    let trials: Vec<_> = (0..assignment.len())
        .filter_map(|i| assignment.slot(i))
        .enumerate()
        .map(|(i, (question, explanation))| {
            let q = bank.as_ref().and_then(|b| b.get(question));
            json!({
                "trial": i + 1,
                "questionIndex": question,
                "explanationStyle": explanation + 1,
                "questionID": q.map(|q| q.question_id.clone()),
                "topic": q.map(|q| q.topic.clone()),
            })
        })
        .collect();

    if finalize {
        let limit = cfg.request_timeout();
        for table in &assignment.tables {
            timeout(limit, randomizer.finalize(&cfg.db_name, table))
                .await
                .map_err(|_| anyhow!("finalize {} gave no reply within {:?}", table, limit))??;
        }
    }

    let report = json!({
        "study": cfg.db_name,
        "debug": cfg.debug,
        "trials": trials,
        "tables": assignment.tables,
        "finalized": finalize,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

//! Counterbalanced trial sampling.
//!
//! Every (category, confidence bin) cell owns a randomization table whose
//! conditions enumerate `question × explanation`. One balanced draw per
//! cell picks both, so across the participant pool every question is seen
//! with every explanation style equally often.

use anyhow::{anyhow, Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::StudyConfig;
use crate::logging::{log, log_draw, obj, v_str, Domain, Level, ProfileScope};
use crate::randomize::{DrawRequest, Randomizer};

pub const CATEGORIES: usize = 10;
pub const BINS: usize = 4;
pub const EXPLANATION_OPTIONS: usize = 4;
pub const DRAWS_PER_TABLE: u32 = 1;

/// Questions available in a confidence bin of one category.
pub fn pool_size(bin: usize) -> usize {
    if bin == 0 {
        5
    } else {
        10
    }
}

pub fn table_name(category: usize, bin: usize) -> String {
    format!("Table_{}_{}", category, bin)
}

/// Split a drawn condition into `(question, explanation)`.
pub fn decompose(assigned: usize) -> (usize, usize) {
    let explanation = assigned % EXPLANATION_OPTIONS;
    let question = (assigned - explanation) / EXPLANATION_OPTIONS;
    (question, explanation)
}

/// Questions the bank must hold for every cell to resolve.
pub fn bank_size() -> usize {
    CATEGORIES * (0..BINS).map(pool_size).sum::<usize>()
}

/// One (category, bin) block of the question bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub category: usize,
    pub bin: usize,
    /// Global index of the cell's first question.
    pub offset: usize,
    pub pool_size: usize,
}

impl Cell {
    pub fn condition_count(&self) -> usize {
        self.pool_size * EXPLANATION_OPTIONS
    }

    pub fn table(&self) -> String {
        table_name(self.category, self.bin)
    }
}

/// Cells in bank order: category-major, bins ascending.
pub fn cells() -> Vec<Cell> {
    let mut out = Vec::with_capacity(CATEGORIES * BINS);
    let mut offset = 0;
    for category in 0..CATEGORIES {
        for bin in 0..BINS {
            let pool = pool_size(bin);
            out.push(Cell { category, bin, offset, pool_size: pool });
            offset += pool;
        }
    }
    out
}

/// Shuffle two equal-length lists with the same permutation.
pub fn co_shuffle<A, B, R: Rng + ?Sized>(first: &mut [A], second: &mut [B], rng: &mut R) {
    debug_assert_eq!(first.len(), second.len());
    let mut index = first.len().min(second.len());
    while index > 0 {
        let rnd = rng.gen_range(0..index);
        index -= 1;
        first.swap(index, rnd);
        second.swap(index, rnd);
    }
}

/// Parallel trial/explanation lists for one participant, plus every table
/// an allocation was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    pub question_indices: Vec<usize>,
    pub explanations: Vec<usize>,
    pub tables: Vec<String>,
}

impl Assignment {
    pub fn len(&self) -> usize {
        self.question_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.question_indices.is_empty()
    }

    pub fn slot(&self, i: usize) -> Option<(usize, usize)> {
        Some((*self.question_indices.get(i)?, *self.explanations.get(i)?))
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        co_shuffle(&mut self.question_indices, &mut self.explanations, rng);
    }

    /// Keep the first `total` trials. Tables are untouched: every one of
    /// them still holds an allocation that must be finalized.
    pub fn truncate(&mut self, total: usize) {
        self.question_indices.truncate(total);
        self.explanations.truncate(total);
    }
}

/// Everything one sampling run needs besides the randomizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingParams {
    pub study_id: String,
    /// Minutes before the service reclaims an unfinalized allocation.
    pub timeout_minutes: u32,
    pub trial_count: usize,
    pub seed: Option<u64>,
    /// Longest a single draw may take before sampling fails.
    pub draw_timeout: Duration,
}

impl SamplingParams {
    pub fn from_config(cfg: &StudyConfig) -> Self {
        Self {
            study_id: cfg.db_name.clone(),
            timeout_minutes: cfg.session_timeout_min,
            trial_count: cfg.trial_count(),
            seed: cfg.randomizer_seed,
            draw_timeout: cfg.request_timeout(),
        }
    }
}

/// Draw one condition per cell, in bank order. A failed, late or
/// out-of-range draw aborts sampling; nothing is retried.
pub async fn sample_assignment(randomizer: &dyn Randomizer, params: &SamplingParams) -> Result<Assignment> {
    let _scope = ProfileScope::with_context("sampler.assignment", &[("study_id", v_str(&params.study_id))]);
    let cells = cells();
    let mut out = Assignment::default();

    for cell in &cells {
        let table = cell.table();
        let condition_count = cell.condition_count();
        let req = DrawRequest {
            study_id: params.study_id.clone(),
            table: table.clone(),
            condition_count: condition_count as u32,
            timeout_minutes: params.timeout_minutes,
            draw_count: DRAWS_PER_TABLE,
        };
        let assigned = timeout(params.draw_timeout, randomizer.draw(&req))
            .await
            .map_err(|_| anyhow!("no draw for {} within {:?}", table, params.draw_timeout))?
            .with_context(|| format!("block randomization failed for {}", table))?;
        let assigned = assigned as usize;
        if assigned >= condition_count {
            return Err(anyhow!(
                "{} returned condition {} outside [0, {})",
                table,
                assigned,
                condition_count
            ));
        }

        let (question, explanation) = decompose(assigned);
        out.question_indices.push(cell.offset + question);
        out.explanations.push(explanation);
        out.tables.push(table.clone());
        log_draw(&table, assigned as u32, question, explanation, cells.len() - out.len());
    }

    Ok(out)
}

/// Sample, co-shuffle, then cut to the session's trial count.
pub async fn prepare_assignment(randomizer: Arc<dyn Randomizer>, params: SamplingParams) -> Result<Assignment> {
    let mut assignment = sample_assignment(randomizer.as_ref(), &params).await?;
    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    assignment.shuffle(&mut rng);
    assignment.truncate(params.trial_count);
    log(
        Level::Info,
        Domain::Sampler,
        "assignment.ready",
        obj(&[
            ("study_id", v_str(&params.study_id)),
            ("trials", json!(assignment.question_indices)),
            ("explanations", json!(assignment.explanations)),
            ("tables", json!(assignment.tables.len())),
        ]),
    );
    Ok(assignment)
}

/// Run [`prepare_assignment`] as its own task; the task section waits on
/// the handle.
pub fn spawn_sampling(randomizer: Arc<dyn Randomizer>, params: SamplingParams) -> JoinHandle<Result<Assignment>> {
    tokio::spawn(prepare_assignment(randomizer, params))
}

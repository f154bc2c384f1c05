//! Properties of full sampling runs against the local randomizer.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use studyflow::bank::QuestionBank;
use studyflow::config::{DEBUG_TRIALS, TOTAL_TRIALS};
use studyflow::randomize::{DrawRequest, LocalRandomizer, Randomizer};
use studyflow::sampler::{bank_size, cells, prepare_assignment, sample_assignment, SamplingParams, CATEGORIES};

fn params(trial_count: usize, seed: Option<u64>) -> SamplingParams {
    SamplingParams {
        study_id: "study".into(),
        timeout_minutes: 90,
        trial_count,
        seed,
        draw_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn one_question_per_cell_in_bank_order() {
    let r = LocalRandomizer::seeded(21);
    let asg = sample_assignment(&r, &params(TOTAL_TRIALS, None)).await.unwrap();
    assert_eq!(asg.len(), 40);

    for (cell, (&question, &explanation)) in cells()
        .iter()
        .zip(asg.question_indices.iter().zip(&asg.explanations))
    {
        assert!(question >= cell.offset && question < cell.offset + cell.pool_size);
        assert!(explanation < 4);
    }
    let tables: HashSet<_> = asg.tables.iter().collect();
    assert_eq!(tables.len(), 40);
}

#[tokio::test]
async fn every_category_is_covered_before_shuffle() {
    let r = LocalRandomizer::seeded(4);
    let asg = sample_assignment(&r, &params(TOTAL_TRIALS, None)).await.unwrap();
    let bank = QuestionBank::load("data/example_file.json").unwrap();
    assert_eq!(bank.len(), bank_size());

    let topics: HashSet<_> = asg
        .question_indices
        .iter()
        .map(|&i| bank.get(i).unwrap().topic.clone())
        .collect();
    assert_eq!(topics.len(), CATEGORIES);
}

#[tokio::test]
async fn prepared_assignment_keeps_pairs_and_all_tables() {
    let seed = Some(99);
    let raw = sample_assignment(&LocalRandomizer::seeded(3), &params(TOTAL_TRIALS, None)).await.unwrap();
    let pairs: HashSet<_> = (0..raw.len()).filter_map(|i| raw.slot(i)).collect();

    let randomizer: Arc<dyn Randomizer> = Arc::new(LocalRandomizer::seeded(3));
    let full = prepare_assignment(randomizer, params(TOTAL_TRIALS, seed)).await.unwrap();
    assert_eq!(full.len(), TOTAL_TRIALS);
    assert_ne!(full.question_indices, raw.question_indices);
    for i in 0..full.len() {
        assert!(pairs.contains(&full.slot(i).unwrap()));
    }

    let randomizer: Arc<dyn Randomizer> = Arc::new(LocalRandomizer::seeded(3));
    let short = prepare_assignment(randomizer, params(DEBUG_TRIALS, seed)).await.unwrap();
    assert_eq!(short.len(), DEBUG_TRIALS);
    assert_eq!(short.tables.len(), 40);
    assert_eq!(short.slot(0), full.slot(0));
}

/// Answers the first `answered` draws, then never replies.
struct Stalls {
    answered: usize,
    inner: LocalRandomizer,
    calls: AtomicUsize,
}

#[async_trait]
impl Randomizer for Stalls {
    async fn draw(&self, req: &DrawRequest) -> Result<u32> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n >= self.answered {
            std::future::pending::<()>().await;
        }
        self.inner.draw(req).await
    }

    async fn finalize(&self, study_id: &str, table: &str) -> Result<()> {
        self.inner.finalize(study_id, table).await
    }
}

#[tokio::test]
async fn silent_randomizer_fails_the_draw_after_the_timeout() {
    let r = Stalls {
        answered: 5,
        inner: LocalRandomizer::seeded(1),
        calls: Default::default(),
    };
    let mut p = params(TOTAL_TRIALS, None);
    p.draw_timeout = Duration::from_millis(30);
    let err = sample_assignment(&r, &p).await.unwrap_err();
    let table = cells()[5].table();
    assert!(format!("{:#}", err).contains(&table), "{:#}", err);
}

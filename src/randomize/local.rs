use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{DrawRequest, Randomizer};

/// In-process stand-in for the randomization service.
///
/// Draws are uniform, not balanced across participants; it only lets a
/// session run without the service.
pub struct LocalRandomizer {
    rng: Mutex<StdRng>,
    open: Mutex<BTreeMap<String, u32>>,
}

impl LocalRandomizer {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            open: Mutex::new(BTreeMap::new()),
        }
    }

    fn key(study_id: &str, table: &str) -> String {
        format!("{study_id}/{table}")
    }

    /// Tables drawn from but not yet finalized.
    pub fn open_tables(&self) -> Vec<String> {
        self.open
            .lock()
            .map(|open| open.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for LocalRandomizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Randomizer for LocalRandomizer {
    async fn draw(&self, req: &DrawRequest) -> Result<u32> {
        if req.condition_count == 0 {
            return Err(anyhow!("table {} has no conditions", req.table));
        }
        let assigned = {
            let mut rng = self.rng.lock().map_err(|_| anyhow!("randomizer lock poisoned"))?;
            rng.gen_range(0..req.condition_count)
        };
        if let Ok(mut open) = self.open.lock() {
            open.insert(Self::key(&req.study_id, &req.table), assigned);
        }
        Ok(assigned)
    }

    async fn finalize(&self, study_id: &str, table: &str) -> Result<()> {
        let mut open = self.open.lock().map_err(|_| anyhow!("randomizer lock poisoned"))?;
        open.remove(&Self::key(study_id, table))
            .map(|_| ())
            .ok_or_else(|| anyhow!("no open allocation in {}", table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(table: &str, n: u32) -> DrawRequest {
        DrawRequest {
            study_id: "study".to_string(),
            table: table.to_string(),
            condition_count: n,
            timeout_minutes: 90,
            draw_count: 1,
        }
    }

    #[tokio::test]
    async fn draws_stay_in_range() {
        let r = LocalRandomizer::seeded(7);
        for _ in 0..200 {
            let v = r.draw(&req("Table_0_0", 20)).await.unwrap();
            assert!(v < 20);
        }
    }

    #[tokio::test]
    async fn seeded_draws_repeat() {
        let a = LocalRandomizer::seeded(42);
        let b = LocalRandomizer::seeded(42);
        for _ in 0..10 {
            assert_eq!(
                a.draw(&req("t", 40)).await.unwrap(),
                b.draw(&req("t", 40)).await.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn finalize_closes_allocation_once() {
        let r = LocalRandomizer::seeded(1);
        r.draw(&req("Table_1_2", 40)).await.unwrap();
        assert_eq!(r.open_tables(), vec!["study/Table_1_2".to_string()]);
        assert!(r.finalize("study", "Table_1_2").await.is_ok());
        assert!(r.finalize("study", "Table_1_2").await.is_err());
        assert!(r.open_tables().is_empty());
    }

    #[tokio::test]
    async fn empty_table_is_an_error() {
        let r = LocalRandomizer::seeded(1);
        assert!(r.draw(&req("t", 0)).await.is_err());
    }
}

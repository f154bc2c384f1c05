use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{RandomizerKind, StudyConfig};

mod http;
mod local;

pub use http::HttpRandomizer;
pub use local::LocalRandomizer;

/// One balanced draw against a named allocation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRequest {
    pub study_id: String,
    pub table: String,
    pub condition_count: u32,
    /// Minutes before an unfinalized allocation is reclaimed.
    pub timeout_minutes: u32,
    pub draw_count: u32,
}

impl RandomizerKind {
    pub fn build(self, cfg: &StudyConfig) -> Result<Arc<dyn Randomizer>> {
        match self {
            RandomizerKind::Http => Ok(Arc::new(HttpRandomizer::new(
                cfg.randomizer_base.clone(),
                cfg.request_timeout(),
            )?)),
            RandomizerKind::Local => Ok(Arc::new(match cfg.randomizer_seed {
                Some(seed) => LocalRandomizer::seeded(seed),
                None => LocalRandomizer::new(),
            })),
        }
    }
}

/// Block randomization service: hands out balanced condition numbers in
/// `[0, condition_count)` across the participant pool.
#[async_trait]
pub trait Randomizer: Send + Sync {
    async fn draw(&self, req: &DrawRequest) -> Result<u32>;
    /// Commit this participant's allocation in `table`.
    async fn finalize(&self, study_id: &str, table: &str) -> Result<()>;
}

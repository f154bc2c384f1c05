use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DrawRequest, Randomizer};

pub struct HttpRandomizer {
    client: Client,
    base: String,
}

impl HttpRandomizer {
    /// `timeout` bounds each request, connect to last byte.
    pub fn new(base: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("cannot build randomizer http client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DrawBody<'a> {
    study_id: &'a str,
    table_name: &'a str,
    condition_count: u32,
    max_completion_time_minutes: u32,
    num_draws: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalizeBody<'a> {
    study_id: &'a str,
    table_name: &'a str,
}

/// The service has answered with a bare number, a numeric string, a list of
/// draws, or an object wrapping one of those.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum DrawResp {
    Number(u32),
    Text(String),
    List(Vec<u32>),
    Wrapped { assigned: Box<DrawResp> },
}

impl DrawResp {
    fn first(self) -> Result<u32> {
        match self {
            DrawResp::Number(n) => Ok(n),
            DrawResp::Text(s) => s.trim().parse().map_err(|_| anyhow!("non-numeric draw {:?}", s)),
            DrawResp::List(v) => v.first().copied().ok_or_else(|| anyhow!("empty draw list")),
            DrawResp::Wrapped { assigned } => assigned.first(),
        }
    }
}

#[async_trait]
impl Randomizer for HttpRandomizer {
    async fn draw(&self, req: &DrawRequest) -> Result<u32> {
        let url = format!("{}/draw", self.base);
        let resp = self
            .client
            .post(&url)
            .json(&DrawBody {
                study_id: &req.study_id,
                table_name: &req.table,
                condition_count: req.condition_count,
                max_completion_time_minutes: req.timeout_minutes,
                num_draws: req.draw_count,
            })
            .send()
            .await
            .with_context(|| format!("draw request for {} failed", req.table))?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(anyhow!("randomizer returned {} for {}: {}", status, req.table, body));
        }
        let parsed: DrawResp = serde_json::from_str(&body)
            .with_context(|| format!("unreadable draw for {}: {}", req.table, body))?;
        parsed.first()
    }

    async fn finalize(&self, study_id: &str, table: &str) -> Result<()> {
        let url = format!("{}/finalize", self.base);
        let resp = self
            .client
            .post(&url)
            .json(&FinalizeBody { study_id, table_name: table })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(anyhow!("finalize {} returned {}", table, resp.status()));
        }
        Ok(())
    }
}

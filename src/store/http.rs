use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::Store;

/// Realtime-database REST client: `PUT <base>/<path>.json`.
pub struct RealtimeDbStore {
    client: Client,
    base: String,
    auth: Option<String>,
}

impl RealtimeDbStore {
    pub fn new(base: String, auth: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("cannot build store http client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            auth,
        })
    }

    fn url_for(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        format!("{}/{}.json", self.base, path)
    }
}

#[async_trait]
impl Store for RealtimeDbStore {
    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        let mut req = self.client.put(self.url_for(path)).json(value);
        if let Some(token) = &self.auth {
            req = req.query(&[("auth", token)]);
        }
        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("write {} returned {}: {}", path, status, body));
        }
        Ok(())
    }
}

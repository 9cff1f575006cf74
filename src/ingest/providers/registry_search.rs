// src/ingest/providers/registry_search.rs
//! Open company registry search (JSON, no auth).
//!
//! The endpoint cannot filter on creation date, so a partition is paged with
//! a fixed page size until a short page or `max_pages`, and recency is
//! filtered downstream.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::HttpFetcher;
use crate::config::{LeadsConfig, RegistrySearchConfig};
use crate::error::LeadsError;
use crate::ingest::types::{Page, PageCursor, RawRecord, SourceAdapter, SourceKind};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct RegistrySearchAdapter {
    fetcher: HttpFetcher,
    cfg: RegistrySearchConfig,
}

impl RegistrySearchAdapter {
    pub fn new(cfg: &LeadsConfig) -> Result<Self, LeadsError> {
        Ok(Self {
            fetcher: HttpFetcher::from_config(cfg)?,
            cfg: cfg.registry.clone(),
        })
    }

    pub fn page_url(&self, partition: &str, cursor: PageCursor) -> Result<Url> {
        let mut url = Url::parse(&self.cfg.base_url)
            .with_context(|| format!("registry base url {}", self.cfg.base_url))?;
        url.query_pairs_mut()
            .append_pair("departement", partition)
            .append_pair("etat_administratif", &self.cfg.status_filter)
            .append_pair("page", &cursor.0.to_string())
            .append_pair("per_page", &self.cfg.page_size.to_string());
        Ok(url)
    }

    /// Parse one response body; non-object entries are skipped.
    pub fn parse_page(body: &str) -> Result<Vec<RawRecord>> {
        let resp: SearchResponse =
            serde_json::from_str(body).context("parsing registry search json")?;
        Ok(into_records(resp).0)
    }

    /// `returned` is the upstream entry count, before unusable entries are
    /// skipped.
    fn next_cursor(&self, returned: usize, cursor: PageCursor) -> Option<PageCursor> {
        let short_page = returned < self.cfg.page_size as usize;
        if short_page || cursor.0 >= self.cfg.max_pages {
            None
        } else {
            Some(cursor.next())
        }
    }
}

/// Records plus the number of entries upstream returned.
fn into_records(resp: SearchResponse) -> (Vec<RawRecord>, usize) {
    let returned = resp.results.len();
    let records = resp
        .results
        .into_iter()
        .filter_map(RawRecord::from_value)
        .collect();
    (records, returned)
}

#[async_trait]
impl SourceAdapter for RegistrySearchAdapter {
    async fn fetch_partition(&self, partition: &str, cursor: PageCursor) -> Result<Page> {
        let url = self.page_url(partition, cursor)?;
        let resp: SearchResponse = self
            .fetcher
            .get_json(url.as_str())
            .await
            .with_context(|| format!("registry search dept {partition} page {}", cursor.0))?;
        let (records, returned) = into_records(resp);
        let next = self.next_cursor(returned, cursor);

        tracing::debug!(
            target: "leads",
            partition,
            page = cursor.0,
            records = records.len(),
            last = next.is_none(),
            "registry page fetched"
        );
        Ok(Page { records, next })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::RegistrySearch
    }

    fn name(&self) -> &'static str {
        "registry-search"
    }
}

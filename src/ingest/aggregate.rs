// src/ingest/aggregate.rs
//! Run orchestration: partitions → adapter paging → normalize → probe →
//! score, then merge, deduplicate, filter by recency, sort and truncate.
//!
//! Partitions run one after another with a fixed pause in between. A
//! partition that fails upstream contributes nothing and the run goes on.
//! Cancellation stops at the next await point. Partitions that completed
//! before it are still ranked and returned. For the in-flight partition,
//! records whose liveness check already finished are kept; a partition still
//! paging upstream contributes nothing, since its pages are incomplete.

use std::collections::HashSet;
use std::time::Instant;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, gauge, histogram};
use tokio_util::sync::CancellationToken;

use super::ensure_metrics_described;
use super::normalize::Normalizer;
use super::types::{Company, PageCursor, PartitionResult, RawRecord, ScrapeOptions, SourceAdapter};
use crate::config::{LeadsConfig, RatePolicy};
use crate::error::LeadsError;
use crate::probe::LivenessProbe;
use crate::scoring::Scorer;

/// Hard stop for adapters that never report a last page.
const MAX_PAGES_PER_PARTITION: u32 = 1_000;

/// Outcome of one run. `companies` is the final ranked list.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub companies: Vec<Company>,
    pub partitions_ok: usize,
    pub partitions_failed: usize,
    pub raw_records: usize,
    /// Raw records the normalizer rejected.
    pub dropped: usize,
    pub cancelled: bool,
}

pub struct Aggregator {
    adapter: Box<dyn SourceAdapter>,
    normalizer: Normalizer,
    probe: LivenessProbe,
    scorer: Scorer,
    default_partitions: Vec<String>,
    rate: RatePolicy,
}

impl Aggregator {
    pub fn new(
        adapter: Box<dyn SourceAdapter>,
        normalizer: Normalizer,
        probe: LivenessProbe,
        scorer: Scorer,
        default_partitions: Vec<String>,
        rate: RatePolicy,
    ) -> Self {
        Self {
            adapter,
            normalizer,
            probe,
            scorer,
            default_partitions,
            rate,
        }
    }

    pub fn from_config(
        adapter: Box<dyn SourceAdapter>,
        cfg: &LeadsConfig,
    ) -> Result<Self, LeadsError> {
        let agent = cfg
            .user_agents
            .first()
            .map(String::as_str)
            .unwrap_or(concat!("opsidius-leads/", env!("CARGO_PKG_VERSION")));
        Ok(Self::new(
            adapter,
            Normalizer::from_config(cfg),
            LivenessProbe::new(cfg.probe, agent)?,
            Scorer::from_config(cfg),
            cfg.default_partitions.clone(),
            cfg.rate,
        ))
    }

    /// The requested partition, or the configured default list.
    pub fn partitions(&self, opts: &ScrapeOptions) -> Vec<String> {
        match &opts.partition {
            Some(p) => vec![p.clone()],
            None => self.default_partitions.clone(),
        }
    }

    pub async fn run(&self, opts: &ScrapeOptions, cancel: &CancellationToken) -> RunReport {
        self.run_at(opts, Utc::now(), cancel).await
    }

    /// Only the ranked list, for callers that do not care about the report.
    pub async fn ranked(&self, opts: &ScrapeOptions, cancel: &CancellationToken) -> Vec<Company> {
        self.run(opts, cancel).await.companies
    }

    /// Same as [`Aggregator::run`] with a fixed evaluation instant.
    pub async fn run_at(
        &self,
        opts: &ScrapeOptions,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> RunReport {
        ensure_metrics_described();

        let mut report = RunReport::default();
        let mut results: Vec<PartitionResult> = Vec::new();
        let partitions = self.partitions(opts);

        tracing::info!(
            target: "leads",
            source = self.adapter.name(),
            partitions = partitions.len(),
            days = opts.days,
            limit = opts.limit,
            "run started"
        );

        for (i, partition) in partitions.iter().enumerate() {
            if i > 0 {
                let paused = tokio::select! {
                    _ = cancel.cancelled() => false,
                    _ = tokio::time::sleep(self.rate.partition_delay()) => true,
                };
                if !paused {
                    report.cancelled = true;
                    break;
                }
            }
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let t0 = Instant::now();
            let fetched = tokio::select! {
                _ = cancel.cancelled() => None,
                r = self.collect_partition(partition) => Some(r),
            };
            histogram!("leads_partition_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

            let raw = match fetched {
                None => {
                    report.cancelled = true;
                    break;
                }
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    tracing::warn!(target: "leads", partition = %partition, error = ?e, "partition failed; contributing no records");
                    counter!("leads_partition_errors_total").increment(1);
                    report.partitions_failed += 1;
                    continue;
                }
            };
            report.raw_records += raw.len();
            counter!("leads_raw_records_total").increment(raw.len() as u64);

            let (companies, dropped, interrupted) = self.process_partition(&raw, now, cancel).await;
            report.dropped += dropped;
            counter!("leads_normalize_dropped_total").increment(dropped as u64);

            if interrupted {
                tracing::info!(target: "leads", partition = %partition, kept = companies.len(), "partition interrupted during liveness checks");
                report.cancelled = true;
                results.push(PartitionResult {
                    partition: partition.clone(),
                    companies,
                });
                break;
            }

            tracing::info!(
                target: "leads",
                partition = %partition,
                raw = raw.len(),
                kept = companies.len(),
                dropped,
                "partition done"
            );
            report.partitions_ok += 1;
            results.push(PartitionResult {
                partition: partition.clone(),
                companies,
            });
        }

        if report.cancelled {
            tracing::warn!(target: "leads", completed = results.len(), "run cancelled; returning partial results");
        }

        report.companies = rank(results, opts, now);
        gauge!("leads_pipeline_last_run_ts").set(now.timestamp().max(0) as f64);
        tracing::info!(
            target: "leads",
            ranked = report.companies.len(),
            failed = report.partitions_failed,
            "run finished"
        );
        report
    }

    /// Page through one partition until the adapter reports the last page.
    /// Any page error fails the whole partition.
    async fn collect_partition(&self, partition: &str) -> Result<Vec<RawRecord>> {
        let mut records = Vec::new();
        let mut cursor = Some(PageCursor::first());
        while let Some(c) = cursor {
            if c.0 > MAX_PAGES_PER_PARTITION {
                bail!("adapter {} exceeded {MAX_PAGES_PER_PARTITION} pages", self.adapter.name());
            }
            let page = self.adapter.fetch_partition(partition, c).await?;
            records.extend(page.records);
            cursor = page.next;
        }
        Ok(records)
    }

    /// Normalize → probe → score, preserving discovery order. On cancel the
    /// companies probed so far are returned and the flag is set.
    async fn process_partition(
        &self,
        raw: &[RawRecord],
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> (Vec<Company>, usize, bool) {
        let kind = self.adapter.kind();
        let today = now.date_naive();

        let normalized: Vec<Company> = raw
            .iter()
            .filter_map(|r| self.normalizer.normalize_at(r, kind, today))
            .collect();
        let dropped = raw.len() - normalized.len();

        let probe = &self.probe;
        let mut checks = std::pin::pin!(stream::iter(normalized)
            .map(|mut c| async move {
                if c.needs_probe() {
                    c.has_website = probe.probe(c.website_url.as_deref()).await;
                }
                c
            })
            .buffered(probe.policy().concurrency.max(1)));

        let mut probed = Vec::new();
        let mut interrupted = false;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    interrupted = true;
                    break;
                }
                next = checks.next() => match next {
                    Some(c) => probed.push(c),
                    None => break,
                },
            }
        }

        let scored = probed
            .into_iter()
            .map(|c| self.scorer.apply(c, now))
            .collect();
        (scored, dropped, interrupted)
    }
}

/// Merge partition results into the final ranked list.
///
/// First occurrence of a registry id wins (partition order, then discovery
/// order). Entries created before `now - days` or outside the city filter are
/// removed, the rest sorted by descending score with a stable sort, then
/// truncated to `limit`.
pub fn rank(partitions: Vec<PartitionResult>, opts: &ScrapeOptions, now: DateTime<Utc>) -> Vec<Company> {
    let cutoff = opts.created_since(now.date_naive());
    let city = opts.city.as_deref().map(str::to_lowercase);

    let mut seen: HashSet<String> = HashSet::new();
    let mut out: Vec<Company> = partitions
        .into_iter()
        .flat_map(|p| p.companies)
        .filter(|c| seen.insert(c.registry_id.clone()))
        .filter(|c| c.created_at >= cutoff)
        .filter(|c| match &city {
            Some(city) => c.city.to_lowercase().contains(city.as_str()),
            None => true,
        })
        .collect();

    out.sort_by(|a, b| b.score.cmp(&a.score));
    out.truncate(opts.limit);
    out
}

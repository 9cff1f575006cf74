// tests/metrics_ingest.rs
#![cfg(feature = "strict-metrics")]
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use opsidius_leads::config::RatePolicy;
use opsidius_leads::ingest::{Page, PageCursor, RawRecord, SourceAdapter, SourceKind};
use opsidius_leads::{Aggregator, LeadsConfig, LivenessProbe, Normalizer, ScrapeOptions, Scorer};

struct OneGoodOneBad;

#[async_trait]
impl SourceAdapter for OneGoodOneBad {
    async fn fetch_partition(&self, partition: &str, _cursor: PageCursor) -> Result<Page> {
        if partition == "53" {
            bail!("boom");
        }
        let ok = RawRecord::from_value(json!({
            "siren": "912345678",
            "denomination": "La Mie du Port",
            "siege": { "ville": "Nantes", "code_postal": "44000" },
            "date_creation": "2026-10-10",
            "site_web": "http://127.0.0.1:9/"
        }))
        .unwrap();
        let junk = RawRecord::from_value(json!({ "denomination": "no id" })).unwrap();
        Ok(Page {
            records: vec![ok, junk],
            next: None,
        })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::KeyedApi
    }

    fn name(&self) -> &'static str {
        "one-good-one-bad"
    }
}

#[tokio::test]
async fn metrics_exposed_after_run() {
    // Install a local recorder for the test
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let cfg = LeadsConfig::default_seed();
    let mut probe_policy = cfg.probe;
    probe_policy.timeout_ms = 500;
    probe_policy.insecure_fallback = false;
    let agg = Aggregator::new(
        Box::new(OneGoodOneBad),
        Normalizer::from_config(&cfg),
        LivenessProbe::new(probe_policy, "metrics-test").unwrap(),
        Scorer::from_config(&cfg),
        vec!["44".into(), "53".into()],
        RatePolicy {
            partition_delay_ms: 0,
        },
    );
    let now = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
    let report = agg
        .run_at(&ScrapeOptions::default(), now, &CancellationToken::new())
        .await;
    assert_eq!(report.companies.len(), 1);

    // Scrape metrics text and check series presence by substring
    let out = handle.render();
    assert!(out.contains("leads_raw_records_total"));
    assert!(out.contains("leads_normalize_dropped_total"));
    assert!(out.contains("leads_partition_errors_total"));
    assert!(out.contains("leads_probe_total"));
    assert!(out.contains("leads_partition_fetch_ms"));
    assert!(out.contains("leads_pipeline_last_run_ts"));
}

// src/ingest/mod.rs
pub mod aggregate;
pub mod normalize;
pub mod providers;
pub mod types;

pub use aggregate::{rank, Aggregator, RunReport};
pub use normalize::{parse_created_at, Normalizer, SectorTable};
pub use types::{
    Company, Page, PageCursor, PartitionResult, RawRecord, ScrapeOptions, SourceAdapter,
    SourceKind,
};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration so series show up once a recorder exists.
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "leads_raw_records_total",
            "Raw records returned by source adapters."
        );
        describe_counter!(
            "leads_normalize_dropped_total",
            "Raw records the normalizer found unusable."
        );
        describe_counter!(
            "leads_partition_errors_total",
            "Partitions that contributed nothing because of an upstream failure."
        );
        describe_counter!(
            "leads_detail_errors_total",
            "Detail-page enrichments that failed and degraded their record."
        );
        describe_counter!("leads_probe_total", "Website liveness checks issued.");
        describe_counter!(
            "leads_probe_alive_total",
            "Website liveness checks that found a reachable site."
        );
        describe_histogram!(
            "leads_partition_fetch_ms",
            "Time spent paging one partition, in milliseconds."
        );
        describe_gauge!(
            "leads_pipeline_last_run_ts",
            "Unix ts when the pipeline last completed."
        );
    });
}

/// Normalize scraped text: decode entities, strip tags, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Typographic quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace (NBSP included)
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 300 chars
    if out.chars().count() > 300 {
        out = out.chars().take(300).collect::<String>().trim_end().to_string();
    }

    out
}

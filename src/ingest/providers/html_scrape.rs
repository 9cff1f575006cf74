// src/ingest/providers/html_scrape.rs
//! Search-results page + per-company detail pages, extracted by pattern.
//!
//! Upstream markup carries no contract, so everything here is best effort:
//! a detail page that fails to load or lacks a field only degrades its own
//! record. Markup changes should only ever require edits in this file.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

use super::HttpFetcher;
use crate::config::{HtmlScrapeConfig, LeadsConfig};
use crate::error::LeadsError;
use crate::ingest::normalize_text;
use crate::ingest::types::{Page, PageCursor, RawRecord, SourceAdapter, SourceKind};

/// One company card on a search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub name: String,
    pub detail_url: String,
}

/// Fields pulled out of a detail page. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailFields {
    pub siren: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub created_at: Option<String>,
    pub naf_code: Option<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

pub struct HtmlScrapeAdapter {
    fetcher: HttpFetcher,
    cfg: HtmlScrapeConfig,
    base: Url,
}

impl HtmlScrapeAdapter {
    pub fn new(cfg: &LeadsConfig) -> Result<Self, LeadsError> {
        let base = Url::parse(&cfg.html.base_url)
            .with_context(|| format!("html base url {}", cfg.html.base_url))?;
        Ok(Self {
            fetcher: HttpFetcher::from_config(cfg)?,
            cfg: cfg.html.clone(),
            base,
        })
    }

    pub fn search_url(&self, partition: &str, cursor: PageCursor) -> Result<Url> {
        let mut url = self
            .base
            .join(&self.cfg.search_path)
            .context("joining search path")?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("q", "")
                .append_pair("sort", "date_creation")
                .append_pair("order", "desc")
                .append_pair("departement", partition);
            if cursor.0 > 1 {
                q.append_pair("page", &cursor.0.to_string());
            }
        }
        Ok(url)
    }

    /// Second fetch per company. Never fails: on error the record keeps what
    /// the search page gave (name, detail URL, id from the URL slug).
    async fn enrich(&self, hit: SearchHit) -> RawRecord {
        let mut rec = RawRecord::new();
        rec.insert("name", hit.name.clone());
        rec.insert("detail_url", hit.detail_url.clone());
        rec.insert_opt("siren", siren_from_url(&hit.detail_url));

        match self.fetcher.get_text(&hit.detail_url).await {
            Ok(html) => {
                let d = parse_detail(&html);
                if d.siren.is_some() {
                    rec.insert_opt("siren", d.siren);
                }
                rec.insert_opt("city", d.city);
                rec.insert_opt("postal_code", d.postal_code);
                rec.insert_opt("created_at", d.created_at);
                rec.insert_opt("naf_code", d.naf_code);
                rec.insert_opt("website", d.website);
                rec.insert_opt("email", d.email);
                rec.insert_opt("phone", d.phone);
            }
            Err(e) => {
                tracing::warn!(target: "leads", error = ?e, company = %hit.name, "detail page failed; record degraded");
                counter!("leads_detail_errors_total").increment(1);
            }
        }
        rec
    }
}

#[async_trait]
impl SourceAdapter for HtmlScrapeAdapter {
    async fn fetch_partition(&self, partition: &str, cursor: PageCursor) -> Result<Page> {
        let url = self.search_url(partition, cursor)?;
        let html = self
            .fetcher
            .get_text(url.as_str())
            .await
            .with_context(|| format!("html search dept {partition} page {}", cursor.0))?;
        let hits = parse_search_results(&html, &self.base);
        tracing::debug!(target: "leads", partition, hits = hits.len(), "search page parsed");

        let next = if hits.is_empty() || cursor.0 >= self.cfg.max_pages {
            None
        } else {
            Some(cursor.next())
        };

        // Order-preserving bounded pool; results land in one accumulator.
        let records: Vec<RawRecord> = stream::iter(hits)
            .map(|hit| self.enrich(hit))
            .buffered(self.cfg.detail_concurrency.max(1))
            .collect()
            .await;

        Ok(Page { records, next })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::HtmlScrape
    }

    fn name(&self) -> &'static str {
        "html-scrape"
    }
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

/// Extract `(name, detail URL)` pairs, deduplicated by URL, in page order.
pub fn parse_search_results(html: &str, base: &Url) -> Vec<SearchHit> {
    static RE_CARD: OnceCell<Regex> = OnceCell::new();
    let card = re(
        &RE_CARD,
        r#"href="(/entreprise/[^"]+)"[^>]*>\s*<[^>]*>\s*([^<]+)"#,
    );

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for cap in card.captures_iter(html) {
        let name = normalize_text(&cap[2]);
        if name.chars().count() <= 2 {
            continue;
        }
        let Ok(url) = base.join(&cap[1]) else {
            continue;
        };
        let detail_url = url.to_string();
        if seen.insert(detail_url.clone()) {
            out.push(SearchHit { name, detail_url });
        }
    }
    out
}

/// Pattern extraction over one company detail page.
pub fn parse_detail(html: &str) -> DetailFields {
    static RE_SIREN: OnceCell<Regex> = OnceCell::new();
    static RE_CITY_SPAN: OnceCell<Regex> = OnceCell::new();
    static RE_POSTAL_CITY: OnceCell<Regex> = OnceCell::new();
    static RE_POSTAL: OnceCell<Regex> = OnceCell::new();
    static RE_CREATED: OnceCell<Regex> = OnceCell::new();
    static RE_NAF: OnceCell<Regex> = OnceCell::new();
    static RE_SITE: OnceCell<Regex> = OnceCell::new();
    static RE_SITE_REV: OnceCell<Regex> = OnceCell::new();
    static RE_MAIL: OnceCell<Regex> = OnceCell::new();
    static RE_TEL: OnceCell<Regex> = OnceCell::new();

    let first = |r: &Regex| -> Option<String> {
        r.captures(html)
            .and_then(|c| c.get(1))
            .map(|m| normalize_text(m.as_str()))
            .filter(|s| !s.is_empty())
    };

    let siren = first(re(&RE_SIREN, r"SIREN[^\d]{0,40}(\d{3}\s?\d{3}\s?\d{3})"))
        .map(|s| s.replace(' ', ""));

    let postal_city = re(
        &RE_POSTAL_CITY,
        r"\b(\d{5})\s+([A-Za-zÀ-ÿ][^<\d]{0,60})",
    )
    .captures(html);

    let city = first(re(
        &RE_CITY_SPAN,
        r#"(?i)<span[^>]*class="[^"]*ville[^"]*"[^>]*>([^<]+)"#,
    ))
    .or_else(|| {
        postal_city
            .as_ref()
            .map(|c| normalize_text(&c[2]))
            .filter(|s| !s.is_empty())
    });

    let postal_code = postal_city
        .as_ref()
        .map(|c| c[1].to_string())
        .or_else(|| first(re(&RE_POSTAL, r"\b(\d{5})\b")));

    let website = first(re(
        &RE_SITE,
        r#"(?i)href="(https?://[^"]+)"[^>]*class="[^"]*site"#,
    ))
    .or_else(|| {
        first(re(
            &RE_SITE_REV,
            r#"(?i)class="[^"]*site[^"]*"[^>]*href="(https?://[^"]+)""#,
        ))
    });

    DetailFields {
        siren,
        city,
        postal_code,
        created_at: first(re(
            &RE_CREATED,
            r"(?i)Date de cr[ée]ation[^\d]{0,80}(\d{2}/\d{2}/\d{4})",
        )),
        naf_code: first(re(&RE_NAF, r"(?i)Code NAF[^\d]{0,40}(\d{2}\.\d{2}[A-Z])")),
        website,
        email: first(re(&RE_MAIL, r#"(?i)href="mailto:([^"?]+)"#)),
        phone: first(re(&RE_TEL, r"(?i)tel:(\+?[\d\s.]{6,20})"))
            .map(|p| p.replace([' ', '.'], "")),
    }
}

/// Detail URLs end in `-<9-digit id>` on the scraped site.
fn siren_from_url(url: &str) -> Option<String> {
    static RE_SLUG: OnceCell<Regex> = OnceCell::new();
    re(&RE_SLUG, r"-(\d{9})(?:[/?#]|$)")
        .captures(url)
        .map(|c| c[1].to_string())
}

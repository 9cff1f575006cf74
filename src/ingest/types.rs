// src/ingest/types.rs
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LeadsError;

/// Which upstream a raw record came from. Selects the adapter variant and the
/// field table the normalizer applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Paginated JSON search endpoint of the open company registry.
    RegistrySearch,
    /// Search-results page + per-company detail pages, pattern extracted.
    HtmlScrape,
    /// Token-authenticated company API with server-side date filtering.
    KeyedApi,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::RegistrySearch => "registry",
            SourceKind::HtmlScrape => "html",
            SourceKind::KeyedApi => "keyed",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = LeadsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "registry" | "registry_search" | "datagouv" => Ok(SourceKind::RegistrySearch),
            "html" | "html_scrape" | "scrape" => Ok(SourceKind::HtmlScrape),
            "keyed" | "keyed_api" | "api" => Ok(SourceKind::KeyedApi),
            other => Err(LeadsError::UnknownSource(other.to_string())),
        }
    }
}

/// Source-shaped record exactly as one upstream returned it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub Map<String, Value>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value; non-objects are not records.
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(m) => Some(Self(m)),
            _ => None,
        }
    }

    pub fn insert<S: Into<String>>(&mut self, key: &str, value: S) {
        self.0.insert(key.to_string(), Value::String(value.into()));
    }

    pub fn insert_opt(&mut self, key: &str, value: Option<String>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    /// Non-empty, trimmed string at `key`. Numbers are stringified.
    pub fn text(&self, key: &str) -> Option<String> {
        text_of(self.0.get(key)?)
    }

    /// Same as [`RawRecord::text`] one object level down (`siege.code_postal`).
    pub fn nested_text(&self, object: &str, key: &str) -> Option<String> {
        self.0
            .get(object)
            .and_then(Value::as_object)
            .and_then(|o| o.get(key))
            .and_then(text_of)
    }

    pub fn object(&self, key: &str) -> Option<RawRecord> {
        self.0
            .get(key)
            .and_then(Value::as_object)
            .map(|o| RawRecord(o.clone()))
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn text_of(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Canonical business record. Built by the normalizer, then touched only by
/// the liveness probe (`has_website`) and the scorer (`score`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub registry_id: String,
    pub name: String,
    pub city: String,
    pub postal_code: String,
    pub created_at: NaiveDate,
    pub sector_code: String,
    pub sector_label: String,
    pub website_url: Option<String>,
    pub has_website: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// 0..=100, set last.
    pub score: u8,
}

impl Company {
    /// Flat canonical raw shape (the one the HTML adapter emits). Normalizing
    /// it back yields the same company with a zero score.
    pub fn to_raw(&self) -> RawRecord {
        let mut r = RawRecord::new();
        r.insert("siren", self.registry_id.clone());
        r.insert("name", self.name.clone());
        r.insert("city", self.city.clone());
        r.insert("postal_code", self.postal_code.clone());
        r.insert("created_at", self.created_at.format("%Y-%m-%d").to_string());
        r.insert("naf_code", self.sector_code.clone());
        r.insert("naf_label", self.sector_label.clone());
        r.insert_opt("website", self.website_url.clone());
        r.0.insert("has_website".into(), Value::Bool(self.has_website));
        r.insert_opt("email", self.email.clone());
        r.insert_opt("phone", self.phone.clone());
        r
    }

    /// Candidates that still need a liveness check.
    pub fn needs_probe(&self) -> bool {
        !self.has_website
            && self
                .website_url
                .as_deref()
                .is_some_and(|u| !u.trim().is_empty())
    }
}

/// 1-based page number handed to adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor(pub u32);

impl PageCursor {
    pub fn first() -> Self {
        Self(1)
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// One fetched page: records plus where to continue, if anywhere.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    pub next: Option<PageCursor>,
}

/// Companies produced for one partition, in discovery order.
#[derive(Debug, Clone)]
pub struct PartitionResult {
    pub partition: String,
    pub companies: Vec<Company>,
}

/// Run configuration handed in by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeOptions {
    pub days: u32,
    pub limit: usize,
    pub partition: Option<String>,
    pub city: Option<String>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            days: 30,
            limit: 50,
            partition: None,
            city: None,
        }
    }
}

impl ScrapeOptions {
    pub fn new(days: u32, limit: usize) -> crate::error::Result<Self> {
        if days == 0 {
            return Err(LeadsError::InvalidOptions {
                reason: "days must be > 0".into(),
            });
        }
        if limit == 0 {
            return Err(LeadsError::InvalidOptions {
                reason: "limit must be > 0".into(),
            });
        }
        Ok(Self {
            days,
            limit,
            ..Self::default()
        })
    }

    /// Oldest creation date still inside the window. Saturates at the
    /// earliest representable date for very large `days`.
    pub fn created_since(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.days)))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn with_partition<S: Into<String>>(mut self, p: Option<S>) -> Self {
        self.partition = p.map(Into::into).filter(|s: &String| !s.trim().is_empty());
        self
    }

    pub fn with_city<S: Into<String>>(mut self, c: Option<S>) -> Self {
        self.city = c.map(Into::into).filter(|s: &String| !s.trim().is_empty());
        self
    }
}

/// One upstream source. Implementations page through a single partition;
/// the aggregator drives the cursor until `next` is `None`.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_partition(&self, partition: &str, cursor: PageCursor) -> Result<Page>;
    fn kind(&self) -> SourceKind;
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_kind_parses_aliases() {
        assert_eq!("Registry".parse::<SourceKind>().unwrap(), SourceKind::RegistrySearch);
        assert_eq!("html".parse::<SourceKind>().unwrap(), SourceKind::HtmlScrape);
        assert_eq!("keyed_api".parse::<SourceKind>().unwrap(), SourceKind::KeyedApi);
        assert!("ftp".parse::<SourceKind>().is_err());
    }

    #[test]
    fn raw_record_text_trims_and_stringifies() {
        let r = RawRecord::from_value(json!({
            "a": "  x ",
            "b": "   ",
            "n": 123456789,
            "siege": { "code_postal": "44000" }
        }))
        .unwrap();
        assert_eq!(r.text("a").as_deref(), Some("x"));
        assert_eq!(r.text("b"), None);
        assert_eq!(r.text("n").as_deref(), Some("123456789"));
        assert_eq!(r.nested_text("siege", "code_postal").as_deref(), Some("44000"));
        assert_eq!(r.text("missing"), None);
    }

    #[test]
    fn options_reject_zero_bounds() {
        assert!(ScrapeOptions::new(0, 10).is_err());
        assert!(ScrapeOptions::new(10, 0).is_err());
        let o = ScrapeOptions::new(7, 5)
            .unwrap()
            .with_partition(Some("44"))
            .with_city(Some("  "));
        assert_eq!(o.partition.as_deref(), Some("44"));
        assert_eq!(o.city, None);
    }

    #[test]
    fn created_since_saturates_instead_of_overflowing() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let o = ScrapeOptions::new(30, 5).unwrap();
        assert_eq!(o.created_since(today), NaiveDate::from_ymd_opt(2026, 9, 17).unwrap());
        let huge = ScrapeOptions::new(u32::MAX, 5).unwrap();
        assert_eq!(huge.created_since(today), NaiveDate::MIN);
    }
}

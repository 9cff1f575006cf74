// src/ingest/providers/keyed_api.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use url::Url;

use super::{redact_url, HttpFetcher};
use crate::config::{KeyedApiConfig, LeadsConfig};
use crate::error::LeadsError;
use crate::ingest::types::{
    Page, PageCursor, RawRecord, ScrapeOptions, SourceAdapter, SourceKind,
};

/// Token-authenticated company API. Unlike the open registry it filters on
/// creation date and city server-side, so far fewer pages are needed.
pub struct KeyedApiAdapter {
    fetcher: HttpFetcher,
    cfg: KeyedApiConfig,
    token: String,
    created_min: NaiveDate,
    created_max: NaiveDate,
    city: Option<String>,
}

impl KeyedApiAdapter {
    /// Fails with `MissingCredential` before anything touches the network.
    pub fn new(
        cfg: &LeadsConfig,
        opts: &ScrapeOptions,
        today: NaiveDate,
    ) -> Result<Self, LeadsError> {
        let token = cfg.keyed.resolve_token()?;
        Ok(Self {
            fetcher: HttpFetcher::from_config(cfg)?,
            cfg: cfg.keyed.clone(),
            token,
            created_min: opts.created_since(today),
            created_max: today,
            city: opts.city.clone(),
        })
    }

    pub fn page_url(&self, partition: &str, cursor: PageCursor) -> Result<Url> {
        let base = format!("{}/recherche", self.cfg.base_url.trim_end_matches('/'));
        let mut url = Url::parse(&base).with_context(|| format!("keyed api base url {base}"))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("api_token", &self.token)
                .append_pair("par_page", &self.cfg.page_size.to_string())
                .append_pair("page", &cursor.0.to_string())
                .append_pair("date_creation_min", &self.created_min.format("%Y-%m-%d").to_string())
                .append_pair("date_creation_max", &self.created_max.format("%Y-%m-%d").to_string())
                .append_pair("code_postal", &format!("{partition}*"));
            if let Some(city) = &self.city {
                q.append_pair("ville", city);
            }
        }
        Ok(url)
    }

    /// The API has answered under several top-level keys over time.
    pub fn extract_results(body: Value) -> Vec<RawRecord> {
        Self::split_results(body).0
    }

    /// Usable records plus the upstream entry count, which drives paging.
    fn split_results(body: Value) -> (Vec<RawRecord>, usize) {
        let Value::Object(mut root) = body else {
            return (Vec::new(), 0);
        };
        for key in ["entreprises", "resultats", "results"] {
            if let Some(Value::Array(items)) = root.remove(key) {
                let returned = items.len();
                let records = items.into_iter().filter_map(RawRecord::from_value).collect();
                return (records, returned);
            }
        }
        (Vec::new(), 0)
    }

    fn next_cursor(&self, returned: usize, cursor: PageCursor) -> Option<PageCursor> {
        let short_page = returned < self.cfg.page_size as usize;
        if short_page || cursor.0 >= self.cfg.max_pages {
            None
        } else {
            Some(cursor.next())
        }
    }
}

#[async_trait]
impl SourceAdapter for KeyedApiAdapter {
    async fn fetch_partition(&self, partition: &str, cursor: PageCursor) -> Result<Page> {
        let url = self.page_url(partition, cursor)?;
        let body: Value = self
            .fetcher
            .get_json(url.as_str())
            .await
            .with_context(|| format!("keyed api call {}", redact_url(url.as_str())))?;
        let (records, returned) = Self::split_results(body);
        let next = self.next_cursor(returned, cursor);
        tracing::debug!(target: "leads", partition, page = cursor.0, records = records.len(), "keyed api page fetched");
        Ok(Page { records, next })
    }

    fn kind(&self) -> SourceKind {
        SourceKind::KeyedApi
    }

    fn name(&self) -> &'static str {
        "keyed-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg_with_token() -> LeadsConfig {
        let mut cfg = LeadsConfig::default_seed();
        cfg.keyed.api_token = Some("t0ken".into());
        cfg
    }

    #[test]
    fn page_url_filters_dates_postal_prefix_and_city() {
        let opts = ScrapeOptions::new(30, 50)
            .unwrap()
            .with_city(Some("Nantes"));
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let a = KeyedApiAdapter::new(&cfg_with_token(), &opts, today).unwrap();
        let url = a.page_url("44", PageCursor(2)).unwrap();
        let q: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(q.contains(&("date_creation_min".into(), "2026-09-17".into())));
        assert!(q.contains(&("date_creation_max".into(), "2026-10-17".into())));
        assert!(q.contains(&("code_postal".into(), "44*".into())));
        assert!(q.contains(&("ville".into(), "Nantes".into())));
        assert!(q.contains(&("page".into(), "2".into())));
    }

    #[test]
    fn results_are_read_from_any_known_key() {
        let a = KeyedApiAdapter::extract_results(json!({"resultats": [{"siren": "1"}]}));
        assert_eq!(a.len(), 1);
        let b = KeyedApiAdapter::extract_results(json!({"entreprises": [{"siren": "1"}, {"siren": "2"}]}));
        assert_eq!(b.len(), 2);
        assert!(KeyedApiAdapter::extract_results(json!({"total": 0})).is_empty());
        assert!(KeyedApiAdapter::extract_results(json!([1, 2])).is_empty());
    }

    #[test]
    fn null_entries_still_count_toward_a_full_page() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let mut cfg = cfg_with_token();
        cfg.keyed.page_size = 3;
        cfg.keyed.max_pages = 10;
        let a = KeyedApiAdapter::new(&cfg, &ScrapeOptions::default(), today).unwrap();

        let (records, returned) =
            KeyedApiAdapter::split_results(json!({"resultats": [{"siren": "1"}, null, {"siren": "2"}]}));
        assert_eq!(records.len(), 2);
        assert_eq!(a.next_cursor(returned, PageCursor(1)), Some(PageCursor(2)));
        assert_eq!(a.next_cursor(2, PageCursor(1)), None);
    }

    #[test]
    fn huge_window_builds_without_overflow() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        let opts = ScrapeOptions::new(u32::MAX, 50).unwrap();
        let a = KeyedApiAdapter::new(&cfg_with_token(), &opts, today).unwrap();
        let url = a.page_url("44", PageCursor::first()).unwrap();
        assert!(url
            .query_pairs()
            .any(|(k, v)| k == "date_creation_max" && v == "2026-10-17"));
        assert!(url.query_pairs().any(|(k, _)| k == "date_creation_min"));
    }
}

// src/ingest/providers/mod.rs
pub mod html_scrape;
pub mod keyed_api;
pub mod registry_search;

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use crate::config::{HttpPolicy, LeadsConfig};
use crate::error::LeadsError;
use crate::ingest::types::{ScrapeOptions, SourceAdapter, SourceKind};

pub use html_scrape::HtmlScrapeAdapter;
pub use keyed_api::KeyedApiAdapter;
pub use registry_search::RegistrySearchAdapter;

const FALLBACK_AGENT: &str = concat!("opsidius-leads/", env!("CARGO_PKG_VERSION"));
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";

/// Build the adapter variant selected by configuration.
///
/// The keyed variant resolves its token here, so a missing credential fails
/// before any request is sent.
pub fn build_adapter(
    kind: SourceKind,
    cfg: &LeadsConfig,
    opts: &ScrapeOptions,
    today: NaiveDate,
) -> Result<Box<dyn SourceAdapter>, LeadsError> {
    Ok(match kind {
        SourceKind::RegistrySearch => Box::new(RegistrySearchAdapter::new(cfg)?),
        SourceKind::HtmlScrape => Box::new(HtmlScrapeAdapter::new(cfg)?),
        SourceKind::KeyedApi => Box::new(KeyedApiAdapter::new(cfg, opts, today)?),
    })
}

/// Round-robin pool of client-identifying strings.
#[derive(Debug)]
pub struct UserAgentPool {
    agents: Vec<String>,
    next: AtomicUsize,
}

impl UserAgentPool {
    pub fn new(agents: Vec<String>) -> Self {
        Self {
            agents,
            next: AtomicUsize::new(0),
        }
    }

    pub fn next_agent(&self) -> &str {
        if self.agents.is_empty() {
            return FALLBACK_AGENT;
        }
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.agents.len();
        &self.agents[i]
    }
}

/// GET with per-request agent rotation, explicit timeout and bounded retries.
/// Retries cover transport errors, 429 and 5xx; any other non-2xx fails fast.
#[derive(Debug)]
pub struct HttpFetcher {
    client: Client,
    agents: UserAgentPool,
    policy: HttpPolicy,
}

impl HttpFetcher {
    pub fn new(policy: HttpPolicy, agents: Vec<String>) -> Result<Self, LeadsError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("fr-FR,fr;q=0.9,en;q=0.8"),
        );
        let client = Client::builder()
            .connect_timeout(policy.connect_timeout())
            .timeout(policy.timeout())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            agents: UserAgentPool::new(agents),
            policy,
        })
    }

    pub fn from_config(cfg: &LeadsConfig) -> Result<Self, LeadsError> {
        Self::new(cfg.http, cfg.user_agents.clone())
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.get(url, ACCEPT_HTML).await?;
        resp.text()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("reading body of {}", redact_url(url)))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let resp = self.get(url, ACCEPT_JSON).await?;
        resp.json::<T>()
            .await
            .map_err(|e| e.without_url())
            .with_context(|| format!("decoding json from {}", redact_url(url)))
    }

    async fn get(&self, url: &str, accept: &'static str) -> Result<reqwest::Response> {
        let shown = redact_url(url);
        let max = self.policy.max_attempts.max(1);
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .get(url)
                .header(USER_AGENT, self.agents.next_agent())
                .header(ACCEPT, accept)
                .send()
                .await;

            let err = match res {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if !is_retryable(status) {
                        return Err(anyhow!("HTTP {status} for {shown}"));
                    }
                    anyhow!("HTTP {status} for {shown}")
                }
                Err(e) => anyhow::Error::new(e.without_url()).context(format!("GET {shown}")),
            };

            if attempt >= max {
                return Err(err);
            }
            tracing::debug!(target: "leads", url = %shown, attempt, error = %err, "retrying upstream fetch");
            tokio::time::sleep(self.policy.backoff(attempt)).await;
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Hide credential query parameters before a URL reaches a log line.
pub fn redact_url(raw: &str) -> String {
    let Ok(mut url) = url::Url::parse(raw) else {
        return raw.to_string();
    };
    if !url.query_pairs().any(|(k, _)| k == "api_token") {
        return raw.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "api_token" {
                "***".to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

// src/config/leads.rs
//! Run-independent configuration: lookup tables, endpoints and network
//! policies. Everything the pipeline components need is injected from a
//! `LeadsConfig` at construction time.
//!
//! Loading order (see [`LeadsConfig::load_default`]):
//! 1) `$LEADS_CONFIG_PATH` (must exist)
//! 2) `config/leads.toml`
//! 3) `config/leads.json`
//! 4) [`LeadsConfig::default_seed`]
//!
//! Files may be partial; missing keys keep their seed value.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::LeadsError;

pub const ENV_CONFIG_PATH: &str = "LEADS_CONFIG_PATH";
pub const ENV_API_TOKEN: &str = "PAPPERS_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LeadsConfig {
    /// Two-digit sector prefix → human-readable label.
    pub sector_labels: BTreeMap<String, String>,
    /// Sector prefixes counted as consumer-facing.
    pub b2c_sectors: Vec<String>,
    /// Postal-code prefixes of the target region.
    pub region_prefixes: Vec<String>,
    /// Short region tag used in export file names.
    pub region_name: String,
    /// Partitions scanned when the run does not name one.
    pub default_partitions: Vec<String>,
    /// Client-identifying strings rotated across requests.
    pub user_agents: Vec<String>,
    pub http: HttpPolicy,
    pub probe: ProbePolicy,
    pub rate: RatePolicy,
    pub registry: RegistrySearchConfig,
    pub html: HtmlScrapeConfig,
    pub keyed: KeyedApiConfig,
    pub output_dir: PathBuf,
}

/// Retry/timeout policy for upstream fetches (search + detail pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpPolicy {
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// Total attempts per request, including the first one.
    pub max_attempts: u8,
    /// Base backoff; doubled on every further attempt.
    pub backoff_ms: u64,
}

impl Default for HttpPolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 15_000,
            connect_timeout_ms: 5_000,
            max_attempts: 2,
            backoff_ms: 500,
        }
    }
}

impl HttpPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    /// Delay before attempt `attempt + 1` (attempt is 1-based).
    pub fn backoff(&self, attempt: u8) -> Duration {
        let shift = u32::from(attempt.saturating_sub(1)).min(10);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << shift))
    }
}

/// Website liveness check policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbePolicy {
    pub timeout_ms: u64,
    /// Retry a failed `https://` check once over `http://`.
    pub insecure_fallback: bool,
    pub max_redirects: usize,
    /// Concurrent probes per partition.
    pub concurrency: usize,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            timeout_ms: 8_000,
            insecure_fallback: true,
            max_redirects: 10,
            concurrency: 8,
        }
    }
}

impl ProbePolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatePolicy {
    /// Pause between two partitions.
    pub partition_delay_ms: u64,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            partition_delay_ms: 300,
        }
    }
}

impl RatePolicy {
    pub fn partition_delay(&self) -> Duration {
        Duration::from_millis(self.partition_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySearchConfig {
    pub base_url: String,
    pub page_size: u32,
    /// The endpoint cannot filter by creation date, so every partition is
    /// over-fetched up to this many pages and filtered downstream.
    pub max_pages: u32,
    /// `etat_administratif` filter; "A" = active.
    pub status_filter: String,
}

impl Default for RegistrySearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://recherche-entreprises.api.gouv.fr/search".into(),
            page_size: 25,
            max_pages: 20,
            status_filter: "A".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HtmlScrapeConfig {
    /// Site root; search and detail links are resolved against it.
    pub base_url: String,
    pub search_path: String,
    pub max_pages: u32,
    pub detail_concurrency: usize,
}

impl Default for HtmlScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.pappers.fr".into(),
            search_path: "/recherche".into(),
            max_pages: 1,
            detail_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyedApiConfig {
    pub base_url: String,
    pub page_size: u32,
    pub max_pages: u32,
    /// Literal token, or "ENV" / absent to read `$PAPPERS_API_KEY`.
    pub api_token: Option<String>,
}

impl Default for KeyedApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.pappers.fr/v2".into(),
            page_size: 100,
            max_pages: 5,
            api_token: None,
        }
    }
}

impl KeyedApiConfig {
    /// Resolve the token before any network call is made.
    pub fn resolve_token(&self) -> Result<String, LeadsError> {
        if let Some(t) = self.api_token.as_deref().map(str::trim) {
            if !t.is_empty() && !t.eq_ignore_ascii_case("env") {
                return Ok(t.to_string());
            }
        }
        std::env::var(ENV_API_TOKEN)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(LeadsError::MissingCredential { var: ENV_API_TOKEN })
    }
}

impl Default for LeadsConfig {
    fn default() -> Self {
        Self::default_seed()
    }
}

impl LeadsConfig {
    /// Built-in tables for the Pays de la Loire prospecting setup.
    pub fn default_seed() -> Self {
        let mut sector_labels = BTreeMap::new();
        for (k, v) in [
            ("01", "Agriculture"),
            ("10", "Food manufacturing"),
            ("14", "Clothing"),
            ("15", "Leather goods"),
            ("16", "Woodworking"),
            ("22", "Rubber and plastics"),
            ("25", "Metalworking"),
            ("28", "Machinery and equipment"),
            ("31", "Furniture"),
            ("32", "Other manufacturing"),
            ("33", "Repair and installation"),
            ("41", "Building construction"),
            ("43", "Specialised construction"),
            ("45", "Motor vehicle trade and repair"),
            ("46", "Wholesale trade"),
            ("47", "Retail trade"),
            ("49", "Land transport"),
            ("52", "Warehousing and logistics"),
            ("55", "Accommodation"),
            ("56", "Food service"),
            ("62", "IT services"),
            ("64", "Financial services"),
            ("68", "Real estate"),
            ("69", "Legal and accounting"),
            ("70", "Management consulting"),
            ("71", "Architecture and engineering"),
            ("73", "Advertising"),
            ("77", "Rental and leasing"),
            ("82", "Administrative support"),
            ("85", "Education"),
            ("86", "Human health"),
            ("88", "Social work"),
            ("90", "Arts and entertainment"),
            ("93", "Sports and recreation"),
            ("94", "Membership organisations"),
            ("95", "Repair of computers and personal goods"),
            ("96", "Personal services"),
        ] {
            sector_labels.insert(k.to_string(), v.to_string());
        }

        let b2c_sectors = [
            "47", "56", "96", "41", "43", "46", "10", "14", "15", "16", "31", "32", "33", "52",
            "55", "68", "77", "82", "90", "93", "95",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let region: Vec<String> = ["44", "49", "53", "72", "85"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        Self {
            sector_labels,
            b2c_sectors,
            region_prefixes: region.clone(),
            region_name: "pdl".into(),
            default_partitions: region,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into(),
            ],
            http: HttpPolicy::default(),
            probe: ProbePolicy::default(),
            rate: RatePolicy::default(),
            registry: RegistrySearchConfig::default(),
            html: HtmlScrapeConfig::default(),
            keyed: KeyedApiConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }

    /// Load from an explicit path. TOML or JSON, picked by extension first.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading leads config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing leads config {}", path.display()))?;
        Ok(cfg.sanitized())
    }

    /// Env var, then `config/leads.{toml,json}`, then the built-in seed.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        for candidate in ["config/leads.toml", "config/leads.json"] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default_seed())
    }

    /// Clamp values that would stall or disable the pipeline.
    fn sanitized(mut self) -> Self {
        self.http.max_attempts = self.http.max_attempts.max(1);
        self.probe.concurrency = self.probe.concurrency.max(1);
        self.html.detail_concurrency = self.html.detail_concurrency.max(1);
        self.registry.page_size = self.registry.page_size.max(1);
        self.registry.max_pages = self.registry.max_pages.max(1);
        self.keyed.page_size = self.keyed.page_size.max(1);
        self.keyed.max_pages = self.keyed.max_pages.max(1);
        self.html.max_pages = self.html.max_pages.max(1);
        self.b2c_sectors = clean_list(std::mem::take(&mut self.b2c_sectors));
        self.region_prefixes = clean_list(std::mem::take(&mut self.region_prefixes));
        self.default_partitions = clean_list(std::mem::take(&mut self.default_partitions));
        self.user_agents.retain(|u| !u.trim().is_empty());
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<LeadsConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        _ => serde_json::from_str(s)
            .map_err(anyhow::Error::from)
            .or_else(|_| toml::from_str(s).map_err(anyhow::Error::from))
            .map_err(|_| anyhow!("unsupported leads config format")),
    }
}

/// Trim, drop empties and duplicates, keep first-seen order.
fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for it in items {
        let t = it.trim();
        if !t.is_empty() && !out.iter().any(|o| o == t) {
            out.push(t.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn seed_has_region_and_b2c_tables() {
        let cfg = LeadsConfig::default_seed();
        assert_eq!(cfg.region_prefixes, vec!["44", "49", "53", "72", "85"]);
        assert_eq!(cfg.default_partitions, cfg.region_prefixes);
        assert_eq!(cfg.b2c_sectors.len(), 21);
        assert_eq!(cfg.probe.timeout_ms, 8_000);
        assert_eq!(cfg.rate.partition_delay_ms, 300);
        assert_eq!(cfg.registry.page_size, 25);
    }

    #[test]
    fn partial_toml_keeps_seed_values() {
        let s = r#"
region_prefixes = [" 75 ", "", "75", "92"]
[probe]
timeout_ms = 2000
"#;
        let cfg = parse_config(s, "toml").unwrap().sanitized();
        assert_eq!(cfg.region_prefixes, vec!["75", "92"]);
        assert_eq!(cfg.probe.timeout_ms, 2_000);
        assert!(cfg.probe.insecure_fallback);
        assert_eq!(cfg.registry.max_pages, 20);
    }

    #[test]
    fn backoff_doubles() {
        let p = HttpPolicy {
            backoff_ms: 100,
            ..HttpPolicy::default()
        };
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
    }

    #[serial_test::serial]
    #[test]
    fn token_prefers_config_then_env() {
        env::remove_var(ENV_API_TOKEN);
        let mut k = KeyedApiConfig::default();
        assert!(matches!(
            k.resolve_token(),
            Err(LeadsError::MissingCredential { .. })
        ));

        env::set_var(ENV_API_TOKEN, "from-env");
        k.api_token = Some("ENV".into());
        assert_eq!(k.resolve_token().unwrap(), "from-env");

        k.api_token = Some("literal".into());
        assert_eq!(k.resolve_token().unwrap(), "literal");
        env::remove_var(ENV_API_TOKEN);
    }
}

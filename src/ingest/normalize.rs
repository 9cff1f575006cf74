//! Raw upstream record → canonical [`Company`].
//!
//! Each source kind has its own field table with an explicit fallback order
//! per target field. A record without a registry identifier, or without any
//! location (city and postal code both empty), is unusable and yields `None`.
//!
//! Creation dates accept ISO `YYYY-MM-DD` (optionally followed by a time),
//! compact `YYYYMMDD` and French `DD/MM/YYYY`. An absent or unparsable date
//! falls back to the evaluation day, and a future date is clamped to it, so
//! recency filtering downstream works on an approximation for those records.

use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;

use super::normalize_text;
use super::types::{Company, RawRecord, SourceKind};
use crate::config::LeadsConfig;

pub const UNKNOWN_NAME: &str = "Unknown";
pub const OTHER_SECTOR_LABEL: &str = "Other";

/// Two-digit sector prefix → label.
#[derive(Debug, Clone, Default)]
pub struct SectorTable {
    labels: BTreeMap<String, String>,
}

impl SectorTable {
    pub fn new(labels: BTreeMap<String, String>) -> Self {
        Self { labels }
    }

    /// Empty code → empty label; unmapped prefix → "Other".
    pub fn label_for(&self, code: &str) -> String {
        let code = code.trim();
        if code.is_empty() {
            return String::new();
        }
        let prefix: String = code.chars().take(2).collect();
        self.labels
            .get(&prefix)
            .cloned()
            .unwrap_or_else(|| OTHER_SECTOR_LABEL.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    sectors: SectorTable,
}

impl Normalizer {
    pub fn new(sectors: SectorTable) -> Self {
        Self { sectors }
    }

    pub fn from_config(cfg: &LeadsConfig) -> Self {
        Self::new(SectorTable::new(cfg.sector_labels.clone()))
    }

    pub fn sectors(&self) -> &SectorTable {
        &self.sectors
    }

    /// Normalize against today's date.
    pub fn normalize(&self, raw: &RawRecord, kind: SourceKind) -> Option<Company> {
        self.normalize_at(raw, kind, Utc::now().date_naive())
    }

    /// Normalize with an explicit evaluation day (used for date fallback).
    pub fn normalize_at(
        &self,
        raw: &RawRecord,
        kind: SourceKind,
        today: NaiveDate,
    ) -> Option<Company> {
        let fields = match kind {
            SourceKind::RegistrySearch => registry_fields(raw),
            SourceKind::KeyedApi => keyed_fields(raw),
            SourceKind::HtmlScrape => flat_fields(raw),
        };
        self.finish(fields, today)
    }

    fn finish(&self, f: Fields, today: NaiveDate) -> Option<Company> {
        let registry_id = f.registry_id.map(|s| digits_only(&s)).unwrap_or_default();
        let city = f.city.map(|s| normalize_text(&s)).unwrap_or_default();
        let postal_code = f.postal_code.map(|s| normalize_text(&s)).unwrap_or_default();

        if registry_id.is_empty() || (city.is_empty() && postal_code.is_empty()) {
            return None;
        }

        let name = f
            .name
            .map(|s| normalize_text(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());

        let created_at = f
            .created_at
            .as_deref()
            .and_then(parse_created_at)
            .map(|d| d.min(today))
            .unwrap_or(today);

        let sector_code = f.sector_code.map(|s| normalize_text(&s)).unwrap_or_default();
        let sector_label = f
            .sector_label
            .map(|s| normalize_text(&s))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.sectors.label_for(&sector_code));

        let website_url = f.website.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let email = f
            .email
            .map(|s| s.trim().to_string())
            .filter(|s| s.contains('@'));
        let phone = f.phone.map(|s| clean_phone(&s)).filter(|s| !s.is_empty());

        Some(Company {
            registry_id,
            name,
            city,
            postal_code,
            created_at,
            sector_code,
            sector_label,
            has_website: f.has_website.unwrap_or(false) && website_url.is_some(),
            website_url,
            email,
            phone,
            score: 0,
        })
    }
}

/// Intermediate, source-independent view of one record.
#[derive(Debug, Default)]
struct Fields {
    registry_id: Option<String>,
    name: Option<String>,
    city: Option<String>,
    postal_code: Option<String>,
    created_at: Option<String>,
    sector_code: Option<String>,
    sector_label: Option<String>,
    website: Option<String>,
    has_website: Option<bool>,
    email: Option<String>,
    phone: Option<String>,
}

fn registry_fields(raw: &RawRecord) -> Fields {
    let legal = raw.object("unite_legale").unwrap_or_else(|| raw.clone());
    let siege = raw
        .object("siege")
        .or_else(|| legal.object("siege"))
        .unwrap_or_default();

    let person = legal.text("nom").map(|nom| match legal.text("prenom") {
        Some(prenom) => format!("{nom} {prenom}"),
        None => nom,
    });
    let name = legal
        .text("denomination")
        .or(person)
        .or_else(|| siege.text("enseigne_1"))
        .or_else(|| raw.text("nom_raison_sociale"))
        .or_else(|| raw.text("nom_complet"));

    Fields {
        registry_id: legal.text("siren").or_else(|| raw.text("siren")),
        name,
        city: siege.text("libelle_commune").or_else(|| siege.text("commune")),
        postal_code: siege.text("code_postal"),
        created_at: legal
            .text("date_creation")
            .or_else(|| legal.text("date_debut_activite")),
        sector_code: legal
            .text("activite_principale")
            .or_else(|| raw.text("activite_principale")),
        ..Fields::default()
    }
}

fn keyed_fields(raw: &RawRecord) -> Fields {
    let siege = raw
        .object("siege")
        .or_else(|| raw.object("etablissement"))
        .unwrap_or_default();

    Fields {
        registry_id: raw.text("siren"),
        name: raw
            .text("denomination")
            .or_else(|| raw.text("nom_entreprise"))
            .or_else(|| raw.text("name")),
        city: siege.text("ville").or_else(|| raw.text("ville")),
        postal_code: siege
            .text("code_postal")
            .or_else(|| raw.text("code_postal")),
        created_at: raw
            .text("date_creation")
            .or_else(|| raw.text("dateCreation")),
        sector_code: raw.text("code_naf").or_else(|| raw.text("codeNaf")),
        sector_label: raw.text("libelle_code_naf"),
        website: raw.text("site_web").or_else(|| raw.text("website")),
        has_website: None,
        email: raw.text("email"),
        phone: raw.text("telephone").or_else(|| raw.text("phone")),
    }
}

/// Canonical flat shape, shared by the HTML adapter and `Company::to_raw`.
fn flat_fields(raw: &RawRecord) -> Fields {
    Fields {
        registry_id: raw.text("siren"),
        name: raw.text("name"),
        city: raw.text("city"),
        postal_code: raw.text("postal_code"),
        created_at: raw.text("created_at"),
        sector_code: raw.text("naf_code"),
        sector_label: raw.text("naf_label"),
        website: raw.text("website"),
        has_website: raw.flag("has_website"),
        email: raw.text("email"),
        phone: raw.text("phone"),
    }
}

/// Parse the date encodings upstream sources use.
pub fn parse_created_at(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(head) = s.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(head, "%Y-%m-%d") {
            return Some(d);
        }
        if let Ok(d) = NaiveDate::parse_from_str(head, "%d/%m/%Y") {
            return Some(d);
        }
    }
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(s, "%Y%m%d").ok();
    }
    None
}

fn digits_only(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn clean_phone(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

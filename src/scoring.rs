//! Opportunity scoring.
//!
//! Score = capped sum of independent contributions:
//! - no confirmed website            +30
//! - created within the last 3 months +20
//! - consumer-facing sector prefix    +20
//! - postal code in the target region +10
//! - email known                      +10
//! - phone known                      +10
//!
//! Pure function of the company fields and the evaluation instant.

use chrono::{DateTime, Months, Utc};

use crate::config::LeadsConfig;
use crate::ingest::types::Company;

pub const W_NO_WEBSITE: u8 = 30;
pub const W_RECENT: u8 = 20;
pub const W_B2C_SECTOR: u8 = 20;
pub const W_TARGET_REGION: u8 = 10;
pub const W_EMAIL: u8 = 10;
pub const W_PHONE: u8 = 10;
pub const MAX_SCORE: u8 = 100;

/// Recency window for the creation bonus.
const RECENT_MONTHS: u32 = 3;

/// Which contributions applied; handy for explaining a rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub no_website: bool,
    pub recent: bool,
    pub b2c_sector: bool,
    pub target_region: bool,
    pub email: bool,
    pub phone: bool,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        let mut sum: u32 = 0;
        for (hit, w) in [
            (self.no_website, W_NO_WEBSITE),
            (self.recent, W_RECENT),
            (self.b2c_sector, W_B2C_SECTOR),
            (self.target_region, W_TARGET_REGION),
            (self.email, W_EMAIL),
            (self.phone, W_PHONE),
        ] {
            if hit {
                sum += u32::from(w);
            }
        }
        sum.min(u32::from(MAX_SCORE)) as u8
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scorer {
    b2c_sectors: Vec<String>,
    region_prefixes: Vec<String>,
}

impl Scorer {
    pub fn new(b2c_sectors: Vec<String>, region_prefixes: Vec<String>) -> Self {
        Self {
            b2c_sectors,
            region_prefixes,
        }
    }

    pub fn from_config(cfg: &LeadsConfig) -> Self {
        Self::new(cfg.b2c_sectors.clone(), cfg.region_prefixes.clone())
    }

    pub fn breakdown(&self, c: &Company, now: DateTime<Utc>) -> ScoreBreakdown {
        let today = now.date_naive();
        let recent_cutoff = today
            .checked_sub_months(Months::new(RECENT_MONTHS))
            .unwrap_or(today);

        ScoreBreakdown {
            no_website: !c.has_website,
            recent: c.created_at > recent_cutoff,
            b2c_sector: has_prefix(&c.sector_code, &self.b2c_sectors),
            target_region: has_prefix(&c.postal_code, &self.region_prefixes),
            email: c.email.as_deref().is_some_and(|e| !e.is_empty()),
            phone: c.phone.as_deref().is_some_and(|p| !p.is_empty()),
        }
    }

    pub fn score(&self, c: &Company, now: DateTime<Utc>) -> u8 {
        self.breakdown(c, now).total()
    }

    /// Set `score` in place and hand the company back.
    pub fn apply(&self, mut c: Company, now: DateTime<Utc>) -> Company {
        c.score = self.score(&c, now);
        c
    }
}

fn has_prefix(value: &str, prefixes: &[String]) -> bool {
    !value.is_empty() && prefixes.iter().any(|p| value.starts_with(p.as_str()))
}

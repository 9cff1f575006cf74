//! Delimited-text export of the ranked list.
//!
//! Column order is fixed. Free-text columns (name, city, sector label,
//! website, email) are always double-quoted with embedded quotes doubled;
//! codes, dates, numbers and the yes/no column are written bare, with commas,
//! quotes and line breaks removed so a stray character cannot shift columns.
//!
//! The `HasWebsite` column historically reads "Yes" for companies WITHOUT a
//! live website: it encodes the opportunity, not web presence. That stays the
//! default ([`WebsiteColumn::Opportunity`]); [`WebsiteColumn::Literal`] writes
//! the literal meaning instead.

use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LeadsError;
use crate::ingest::types::Company;

pub const HEADERS: [&str; 12] = [
    "Name",
    "City",
    "PostalCode",
    "CreatedAt",
    "HasWebsite",
    "WebsiteUrl",
    "SectorCode",
    "SectorLabel",
    "Email",
    "Phone",
    "Score",
    "RegistryId",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WebsiteColumn {
    /// "Yes" = no live website (a prospect).
    #[default]
    Opportunity,
    /// "Yes" = a live website was found.
    Literal,
}

impl WebsiteColumn {
    fn cell(self, has_website: bool) -> &'static str {
        let yes = match self {
            WebsiteColumn::Opportunity => !has_website,
            WebsiteColumn::Literal => has_website,
        };
        if yes {
            "Yes"
        } else {
            "No"
        }
    }
}

/// Header plus one row per company, joined by `\n`.
pub fn to_delimited_text(companies: &[Company]) -> String {
    to_delimited_text_with(companies, WebsiteColumn::default())
}

pub fn to_delimited_text_with(companies: &[Company], website: WebsiteColumn) -> String {
    let mut lines = Vec::with_capacity(companies.len() + 1);
    lines.push(HEADERS.join(","));
    for c in companies {
        let row = [
            quoted(&c.name),
            quoted(&c.city),
            bare(&c.postal_code),
            c.created_at.format("%Y-%m-%d").to_string(),
            website.cell(c.has_website).to_string(),
            quoted(c.website_url.as_deref().unwrap_or_default()),
            bare(&c.sector_code),
            quoted(&c.sector_label),
            quoted(c.email.as_deref().unwrap_or_default()),
            bare(c.phone.as_deref().unwrap_or_default()),
            c.score.to_string(),
            bare(&c.registry_id),
        ];
        lines.push(row.join(","));
    }
    lines.join("\n")
}

fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn bare(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ',' | '"' | '\r' | '\n'))
        .collect()
}

/// `leads-<partition or region>-YYYY-MM-DD.csv`
pub fn export_filename(date: NaiveDate, scope: &str) -> String {
    let scope: String = scope
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let scope = if scope.is_empty() { "all".to_string() } else { scope };
    format!("leads-{scope}-{}.csv", date.format("%Y-%m-%d"))
}

/// Write `content` to `dir/filename` (UTF-8). The directory is created if
/// needed; the file is written to a temporary sibling and renamed into place.
pub fn save_to_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf, LeadsError> {
    let path = dir.join(filename);
    let err = |source: std::io::Error| LeadsError::Export {
        path: path.clone(),
        source,
    };

    fs::create_dir_all(dir).map_err(err)?;
    let tmp = path.with_extension("csv.tmp");
    {
        let mut f = fs::File::create(&tmp).map_err(err)?;
        f.write_all(content.as_bytes()).map_err(err)?;
        f.sync_all().map_err(err)?;
    }
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(err(e));
    }
    tracing::info!(target: "leads", path = %path.display(), bytes = content.len(), "export written");
    Ok(path)
}

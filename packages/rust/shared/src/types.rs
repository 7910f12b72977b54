//! Core domain types for leadharvest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{LeadHarvestError, Result};

/// Company name stored when no heading on the profile page was usable.
pub const UNKNOWN_COMPANY: &str = "Unknown";

/// Literal written by older tooling for "no website"; treated as absent.
pub const NO_WEBSITE: &str = "None";

// ---------------------------------------------------------------------------
// OrganizationId
// ---------------------------------------------------------------------------

/// Canonical reference to one organization profile on the source platform.
///
/// Always an absolute http(s) URL with query, fragment and trailing slash
/// removed, so the same profile linked from different places collapses to one
/// value. Used as the natural key of a [`Lead`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(String);

impl OrganizationId {
    /// Parse and normalize a (possibly relative) profile link against `base`.
    pub fn parse(href: &str, base: &Url) -> Result<Self> {
        let mut url = base
            .join(href.trim())
            .map_err(|e| LeadHarvestError::parse(format!("invalid profile link '{href}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LeadHarvestError::parse(format!(
                "profile link '{href}' is not http(s)"
            )));
        }

        url.set_query(None);
        url.set_fragment(None);

        let mut s = url.to_string();
        while s.ends_with('/') && s.matches('/').count() > 3 {
            s.pop();
        }
        Ok(Self(s))
    }

    /// The normalized URL string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path component, e.g. `/company/acme`.
    pub fn path(&self) -> String {
        Url::parse(&self.0)
            .map(|u| u.path().to_string())
            .unwrap_or_default()
    }

    /// URL of the profile's sub-page (e.g. `about/`).
    pub fn subpage(&self, suffix: &str) -> Result<Url> {
        let base = format!("{}/", self.0);
        let base = Url::parse(&base)
            .map_err(|e| LeadHarvestError::parse(format!("invalid identifier {}: {e}", self.0)))?;
        base.join(suffix.trim_start_matches('/'))
            .map_err(|e| LeadHarvestError::parse(format!("invalid profile suffix '{suffix}': {e}")))
    }
}

impl std::fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Website reference
// ---------------------------------------------------------------------------

/// Normalize a stored or scraped website reference.
///
/// Empty strings and the legacy `"None"` literal become `None`.
pub fn normalize_website(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() || raw == NO_WEBSITE {
        None
    } else {
        Some(raw.to_string())
    }
}

// ---------------------------------------------------------------------------
// ContactEmail
// ---------------------------------------------------------------------------

/// The contact email of a lead: either a discovered address or a sentinel.
///
/// Sentinels are data, not errors. `Pending` means the crawl was never
/// attempted or could not complete and is the target of later enrichment
/// passes; the two `NotFound*` values mean a crawl succeeded and found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContactEmail {
    /// A real address found on the organization's site.
    Discovered(String),
    /// Not attempted, or the site could not be reached.
    Pending,
    /// Crawled during harvesting, no address present.
    NotFoundOnHarvest,
    /// Crawled during an enrichment pass, no address present.
    NotFoundOnEnrichment,
}

impl ContactEmail {
    pub const PENDING: &'static str = "discovery@pending.com";
    pub const NOT_FOUND_HARVEST: &'static str = "not_found@company.com";
    pub const NOT_FOUND_ENRICHMENT: &'static str = "not_found@website.com";

    /// Stored string form.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Discovered(email) => email,
            Self::Pending => Self::PENDING,
            Self::NotFoundOnHarvest => Self::NOT_FOUND_HARVEST,
            Self::NotFoundOnEnrichment => Self::NOT_FOUND_ENRICHMENT,
        }
    }

    /// Parse a stored value back into its variant.
    pub fn from_stored(value: &str) -> Self {
        match value.trim() {
            Self::PENDING => Self::Pending,
            Self::NOT_FOUND_HARVEST => Self::NotFoundOnHarvest,
            Self::NOT_FOUND_ENRICHMENT => Self::NotFoundOnEnrichment,
            "" => Self::Pending,
            other => Self::Discovered(other.to_string()),
        }
    }

    /// True for any of the reserved placeholder values.
    pub fn is_sentinel(&self) -> bool {
        !matches!(self, Self::Discovered(_))
    }

    /// True for either "crawled, nothing found" value.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFoundOnHarvest | Self::NotFoundOnEnrichment)
    }
}

impl std::fmt::Display for ContactEmail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A validated lead about to be persisted.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub company_name: String,
    pub description: String,
    pub source_url: String,
    pub website: Option<String>,
    pub contact_email: ContactEmail,
    pub embedding: Vec<f32>,
}

impl NewLead {
    /// Build a lead, applying the name fallback and rejecting unusable input.
    pub fn new(
        company_name: &str,
        description: &str,
        source_url: &str,
        website: Option<&str>,
        contact_email: ContactEmail,
        embedding: Vec<f32>,
    ) -> Result<Self> {
        if source_url.trim().is_empty() {
            return Err(LeadHarvestError::validation("lead source_url must not be empty"));
        }
        if embedding.is_empty() {
            return Err(LeadHarvestError::validation("lead embedding must not be empty"));
        }
        if let ContactEmail::Discovered(email) = &contact_email {
            if !email.contains('@') {
                return Err(LeadHarvestError::validation(format!(
                    "'{email}' is not an email address"
                )));
            }
        }

        let name = company_name.trim();
        Ok(Self {
            company_name: if name.is_empty() {
                UNKNOWN_COMPANY.to_string()
            } else {
                name.to_string()
            },
            description: description.trim().to_string(),
            source_url: source_url.trim().to_string(),
            website: normalize_website(website),
            contact_email,
            embedding,
        })
    }
}

/// A persisted lead.
#[derive(Debug, Clone)]
pub struct Lead {
    pub id: String,
    pub company_name: String,
    pub description: String,
    /// Natural key: the platform profile URL.
    pub source_url: String,
    pub website: Option<String>,
    pub contact_email: ContactEmail,
    pub embedding: Vec<f32>,
    /// Set by downstream outreach drafting.
    pub is_pitched: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Materialize a freshly inserted lead.
    pub fn from_new(new: NewLead) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7().to_string(),
            company_name: new.company_name,
            description: new.description,
            source_url: new.source_url,
            website: new.website,
            contact_email: new.contact_email,
            embedding: new.embedding,
            is_pitched: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lookup key for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LeadKey {
    /// The platform profile URL.
    Source(String),
    /// The organization's own website.
    Website(String),
}

impl LeadKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Source(s) | Self::Website(s) => s,
        }
    }
}

/// Aggregate counts over stored leads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeadStats {
    pub total: u64,
    pub with_email: u64,
    pub pending: u64,
    pub not_found: u64,
    pub pitched: u64,
}

impl LeadStats {
    pub fn missing_email(&self) -> u64 {
        self.total.saturating_sub(self.with_email)
    }

    /// Leads with an address that have not been drafted yet.
    pub fn remaining_to_draft(&self) -> u64 {
        self.with_email.saturating_sub(self.pitched)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One authentication cookie captured from a logged-in browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".into()
}

/// Authenticated browsing state, captured once by a manual login.
///
/// Read at the start of every run and never modified while a run is in
/// progress. Staleness is only observable through failed navigations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub cookies: Vec<SessionCookie>,
}

impl Session {
    /// Build a session from a `Cookie:` header value (`a=1; b=2`) for `domain`.
    pub fn from_cookie_header(header: &str, domain: &str) -> Result<Self> {
        let mut cookies = Vec::new();
        for pair in header.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| LeadHarvestError::parse(format!("malformed cookie '{pair}'")))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(LeadHarvestError::parse(format!("malformed cookie '{pair}'")));
            }
            cookies.push(SessionCookie {
                name: name.to_string(),
                value: value.trim().trim_matches('"').to_string(),
                domain: domain.to_string(),
                path: default_cookie_path(),
            });
        }

        if cookies.is_empty() {
            return Err(LeadHarvestError::parse("cookie header contains no cookies"));
        }

        Ok(Self {
            captured_at: Utc::now(),
            cookies,
        })
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A catalog entry whose description embedding is matched against leads later.
#[derive(Debug, Clone)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub description: String,
    pub embedding: Vec<f32>,
}

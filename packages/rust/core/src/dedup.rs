//! Deduplication against already-stored leads.
//!
//! The gate only reads. Between a passing check and the later insert another
//! worker may store the same organization; source-keyed inserts resolve that
//! at the database (`InsertOutcome::Duplicate`), website-keyed runs accept it.

use std::sync::Arc;

use tracing::debug;

use leadharvest_shared::{KeyMode, LeadKey, OrganizationId, Result, normalize_website};
use leadharvest_storage::LeadStore;

/// Decision for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not stored yet; spend work on it.
    Admit,
    /// A lead with this key exists.
    Known { lead_id: String },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admit)
    }
}

/// Checks candidate keys against the [`LeadStore`].
#[derive(Clone)]
pub struct DeduplicationGate {
    store: Arc<dyn LeadStore>,
    mode: KeyMode,
}

impl DeduplicationGate {
    pub fn new(store: Arc<dyn LeadStore>, mode: KeyMode) -> Self {
        Self { store, mode }
    }

    pub fn mode(&self) -> KeyMode {
        self.mode
    }

    /// Whether the gate can decide from the identifier alone, before any
    /// navigation.
    pub fn checks_before_extraction(&self) -> bool {
        self.mode == KeyMode::Source
    }

    /// Natural key for an organization under the active mode.
    ///
    /// Website mode falls back to the identifier when no website is known.
    pub fn key_for(&self, id: &OrganizationId, website: Option<&str>) -> LeadKey {
        match (self.mode, normalize_website(website)) {
            (KeyMode::Website, Some(site)) => LeadKey::Website(site),
            _ => LeadKey::Source(id.as_str().to_string()),
        }
    }

    /// Look `key` up in the store.
    pub async fn check(&self, key: &LeadKey) -> Result<Admission> {
        match self.store.find_by_key(key).await? {
            Some(lead) => {
                debug!(key = key.as_str(), lead_id = %lead.id, "already stored");
                Ok(Admission::Known { lead_id: lead.id })
            }
            None => Ok(Admission::Admit),
        }
    }
}

//! In-memory collaborators for pipeline tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use leadharvest_crawler::{Browser, Page};
use leadharvest_shared::{
    ContactEmail, Lead, LeadHarvestError, LeadKey, LeadStats, NewLead, Result, Service,
};
use leadharvest_storage::{InsertOutcome, LeadStore};

use crate::embedding::Embedder;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    leads: Mutex<Vec<Lead>>,
    services: Mutex<Vec<Service>>,
    reject_email_for: Mutex<Vec<String>>,
}

impl MemoryStore {
    /// Email writes for the lead stored under `source` fail.
    pub fn reject_email_for(&self, source: &str) {
        self.reject_email_for.lock().unwrap().push(source.to_string());
    }

    pub fn len(&self) -> usize {
        self.leads.lock().unwrap().len()
    }

    pub fn leads(&self) -> Vec<Lead> {
        self.leads.lock().unwrap().clone()
    }

    pub fn by_source(&self, source: &str) -> Option<Lead> {
        self.leads
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.source_url == source)
            .cloned()
    }

    pub fn services(&self) -> Vec<Service> {
        self.services.lock().unwrap().clone()
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn find_by_key(&self, key: &LeadKey) -> Result<Option<Lead>> {
        let leads = self.leads.lock().unwrap();
        Ok(leads
            .iter()
            .find(|l| match key {
                LeadKey::Source(s) => &l.source_url == s,
                LeadKey::Website(w) => l.website.as_deref() == Some(w.as_str()),
            })
            .cloned())
    }

    async fn insert(&self, lead: NewLead) -> Result<InsertOutcome> {
        let mut leads = self.leads.lock().unwrap();
        if leads.iter().any(|l| l.source_url == lead.source_url) {
            return Ok(InsertOutcome::Duplicate);
        }
        let lead = Lead::from_new(lead);
        leads.push(lead.clone());
        Ok(InsertOutcome::Inserted(lead))
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        let mut leads = self.leads.lock().unwrap();
        let slot = leads
            .iter_mut()
            .find(|l| l.id == lead.id)
            .ok_or_else(|| LeadHarvestError::Storage(format!("no lead {}", lead.id)))?;
        slot.contact_email = lead.contact_email.clone();
        slot.website = lead.website.clone();
        slot.is_pitched = lead.is_pitched;
        Ok(())
    }

    async fn set_email(&self, lead_id: &str, email: &ContactEmail) -> Result<()> {
        let rejected = self.reject_email_for.lock().unwrap().clone();
        let mut leads = self.leads.lock().unwrap();
        let slot = leads
            .iter_mut()
            .find(|l| l.id == lead_id)
            .ok_or_else(|| LeadHarvestError::Storage(format!("no lead {lead_id}")))?;
        if rejected.contains(&slot.source_url) {
            return Err(LeadHarvestError::Storage("database is locked".into()));
        }
        slot.contact_email = email.clone();
        Ok(())
    }

    async fn query_by_email(&self, emails: &[ContactEmail]) -> Result<Vec<Lead>> {
        let leads = self.leads.lock().unwrap();
        Ok(leads
            .iter()
            .filter(|l| emails.contains(&l.contact_email))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<LeadStats> {
        let leads = self.leads.lock().unwrap();
        let mut stats = LeadStats {
            total: leads.len() as u64,
            ..LeadStats::default()
        };
        for lead in leads.iter() {
            match &lead.contact_email {
                ContactEmail::Discovered(_) => stats.with_email += 1,
                ContactEmail::Pending => stats.pending += 1,
                _ => stats.not_found += 1,
            }
            if lead.is_pitched {
                stats.pitched += 1;
            }
        }
        Ok(stats)
    }

    async fn insert_service(
        &self,
        name: &str,
        description: &str,
        embedding: Vec<f32>,
    ) -> Result<Service> {
        let service = Service {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.into(),
            description: description.into(),
            embedding,
        };
        self.services.lock().unwrap().push(service.clone());
        Ok(service)
    }
}

// ---------------------------------------------------------------------------
// StubEmbedder
// ---------------------------------------------------------------------------

pub struct StubEmbedder {
    dims: usize,
    fail: bool,
    texts: Mutex<Vec<String>>,
}

impl StubEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            fail: false,
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            dims: 1,
            fail: true,
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.texts.lock().unwrap().push(text.to_string());
        if self.fail {
            return Err(LeadHarvestError::Embedding("stub failure".into()));
        }
        Ok(vec![text.len() as f32; self.dims])
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

// ---------------------------------------------------------------------------
// FakeBrowser
// ---------------------------------------------------------------------------

/// Serves canned pages by exact URL and records every navigation.
#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), Some(html.to_string()));
        self
    }

    /// Navigations to `url` fail.
    pub fn with_failure(mut self, url: &str) -> Self {
        self.pages.insert(url.to_string(), None);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_containing(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn open(&self, url: &Url, _timeout: Duration) -> Result<Page> {
        self.calls.lock().unwrap().push(url.to_string());
        match self.pages.get(url.as_str()) {
            Some(Some(html)) => Ok(Page {
                url: url.clone(),
                status: 200,
                html: html.clone(),
            }),
            Some(None) => Err(LeadHarvestError::Timeout {
                url: url.to_string(),
            }),
            None => Err(LeadHarvestError::navigation(url.as_str(), "HTTP 404")),
        }
    }
}

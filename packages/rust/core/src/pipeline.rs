//! Harvest pipeline: search → dedup → batched {extract → hunt → sink}.
//!
//! [`Pipeline`] is the composition root for one run. Every collaborator is
//! injected; nothing is global.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use leadharvest_crawler::{
    Browser, HuntPhase, RecordExtractor, SearchHarvester, WebsiteEmailHunter,
};
use leadharvest_shared::{
    AppConfig, ContactEmail, HarvestConfig, HunterConfig, OrganizationId, Result, ScheduleConfig,
};
use leadharvest_storage::LeadStore;

use crate::dedup::{Admission, DeduplicationGate};
use crate::embedding::Embedder;
use crate::export::ExportLog;
use crate::scheduler::{BatchScheduler, UnitReport};
use crate::sink::{RecordSink, SinkOutcome};

// ---------------------------------------------------------------------------
// Configuration and collaborators
// ---------------------------------------------------------------------------

/// Runtime configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub harvest: HarvestConfig,
    pub hunter: HunterConfig,
    pub schedule: ScheduleConfig,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            harvest: HarvestConfig::from(config),
            hunter: HunterConfig::from(config),
            schedule: ScheduleConfig::from(config),
        }
    }
}

/// Externally owned services the pipeline calls.
#[derive(Clone)]
pub struct Collaborators {
    pub browser: Arc<dyn Browser>,
    pub store: Arc<dyn LeadStore>,
    pub embedder: Arc<dyn Embedder>,
    /// Live CSV export; `None` disables it.
    pub export: Option<Arc<ExportLog>>,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when one unit of work settles.
    fn unit_settled(&self, label: &str, status: &str, current: usize, total: usize);
    /// Called when a harvest run completes.
    fn harvest_done(&self, report: &HarvestReport);
    /// Called when an enrichment run completes.
    fn enrichment_done(&self, report: &crate::enrichment::EnrichmentReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn unit_settled(&self, _label: &str, _status: &str, _current: usize, _total: usize) {}
    fn harvest_done(&self, _report: &HarvestReport) {}
    fn enrichment_done(&self, _report: &crate::enrichment::EnrichmentReport) {}
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one harvested organization.
#[derive(Debug, Clone)]
pub enum HarvestUnit {
    Stored { company: String, email: ContactEmail },
    /// Already stored under its website key (website mode only).
    Known,
    /// Lost the insert race to another unit.
    Duplicate,
}

/// Summary of a harvest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub query: String,
    /// Distinct identifiers returned by the search.
    pub found: usize,
    /// Identifiers skipped because a lead already exists.
    pub known: usize,
    pub stored: usize,
    pub with_email: usize,
    pub pending: usize,
    pub not_found: usize,
    pub duplicates: usize,
    pub failed: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

pub(crate) mod duration_secs {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// One configured run of the harvesting and enrichment pipeline.
pub struct Pipeline {
    pub(crate) harvester: SearchHarvester,
    pub(crate) extractor: Arc<RecordExtractor>,
    pub(crate) hunter: Arc<WebsiteEmailHunter>,
    pub(crate) gate: DeduplicationGate,
    pub(crate) scheduler: BatchScheduler,
    pub(crate) sink: RecordSink,
    pub(crate) store: Arc<dyn LeadStore>,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Result<Self> {
        let Collaborators {
            browser,
            store,
            embedder,
            export,
        } = collaborators;

        let scheduler = BatchScheduler::new(config.schedule)?;
        let hunter = WebsiteEmailHunter::new(browser.clone(), config.hunter)?;
        let gate = DeduplicationGate::new(store.clone(), config.harvest.key_mode);
        let sink = RecordSink::new(
            store.clone(),
            embedder,
            config.harvest.embed_template,
            export,
        );

        Ok(Self {
            harvester: SearchHarvester::new(browser.clone(), config.harvest.clone()),
            extractor: Arc::new(RecordExtractor::new(browser, config.harvest)),
            hunter: Arc::new(hunter),
            gate,
            scheduler,
            sink,
            store,
        })
    }

    pub fn sink(&self) -> &RecordSink {
        &self.sink
    }

    /// Harvest organizations for `query` and store every new one.
    ///
    /// Only a failed search is an error. Per-organization failures are
    /// counted in the report and never stop the run.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn run_harvest(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<HarvestReport> {
        let start = Instant::now();
        let mut report = HarvestReport {
            query: query.to_string(),
            ..HarvestReport::default()
        };

        progress.phase("Searching");
        let ids = self.harvester.harvest(query).await?;
        report.found = ids.len();
        info!(found = ids.len(), "identifiers harvested");

        let candidates = if self.gate.checks_before_extraction() {
            progress.phase("Checking for known leads");
            let mut admitted = Vec::with_capacity(ids.len());
            for id in ids {
                match self.gate.check(&self.gate.key_for(&id, None)).await {
                    Ok(Admission::Admit) => admitted.push(id),
                    Ok(Admission::Known { .. }) => report.known += 1,
                    Err(e) => {
                        warn!(id = %id, error = %e, "dedup check failed, skipping");
                        report.failed += 1;
                    }
                }
            }
            admitted
        } else {
            ids.into_iter().collect()
        };

        info!(
            new = candidates.len(),
            known = report.known,
            batches = self.scheduler.batch_count(candidates.len()),
            "processing new organizations"
        );
        progress.phase("Processing organizations");

        let total = candidates.len();
        let mut settled = 0usize;
        let reports = self
            .scheduler
            .run(
                candidates,
                |id| self.harvest_unit(id),
                |unit: &UnitReport<OrganizationId, HarvestUnit>| {
                    settled += 1;
                    progress.unit_settled(unit.item.as_str(), &unit_status(unit), settled, total);
                },
            )
            .await;

        for unit in reports {
            match unit.result {
                Ok(HarvestUnit::Stored { email, .. }) => {
                    report.stored += 1;
                    match email {
                        ContactEmail::Discovered(_) => report.with_email += 1,
                        ContactEmail::Pending => report.pending += 1,
                        _ => report.not_found += 1,
                    }
                }
                Ok(HarvestUnit::Known) => report.known += 1,
                Ok(HarvestUnit::Duplicate) => report.duplicates += 1,
                Err(e) => {
                    warn!(id = %unit.item, error = %e, "organization skipped");
                    report.failed += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            stored = report.stored,
            with_email = report.with_email,
            known = report.known,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "harvest run complete"
        );
        progress.harvest_done(&report);
        Ok(report)
    }

    /// Build the future for one organization. Owns clones of everything it
    /// touches so it can run on its own task.
    fn harvest_unit(
        &self,
        id: OrganizationId,
    ) -> impl std::future::Future<Output = Result<HarvestUnit>> + Send + use<> {
        let extractor = self.extractor.clone();
        let hunter = self.hunter.clone();
        let gate = self.gate.clone();
        let sink = self.sink.clone();

        async move {
            let profile = extractor.extract(&id).await?;

            if !gate.checks_before_extraction() {
                let key = gate.key_for(&id, profile.website.as_deref());
                if let Admission::Known { .. } = gate.check(&key).await? {
                    return Ok(HarvestUnit::Known);
                }
            }

            let outcome = hunter.hunt(profile.website.as_deref()).await;
            let email = outcome.to_contact_email(HuntPhase::Harvest);

            match sink.store(&id, &profile, email.clone()).await? {
                SinkOutcome::Stored(lead) => Ok(HarvestUnit::Stored {
                    company: lead.company_name,
                    email,
                }),
                SinkOutcome::Duplicate => Ok(HarvestUnit::Duplicate),
            }
        }
    }
}

fn unit_status(unit: &UnitReport<OrganizationId, HarvestUnit>) -> String {
    match &unit.result {
        Ok(HarvestUnit::Stored { company, email }) => format!("{company} <{email}>"),
        Ok(HarvestUnit::Known) => "already stored".into(),
        Ok(HarvestUnit::Duplicate) => "duplicate".into(),
        Err(e) => format!("failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadharvest_shared::{KeyMode, NewLead};

    use crate::testing::{FakeBrowser, MemoryStore, StubEmbedder};

    const SEARCH: &str = "https://www.linkedin.com/search/results/companies/?keywords=fintech";

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::from(&AppConfig::default());
        config.harvest.initial_wait = Duration::ZERO;
        config.harvest.scroll_pause = Duration::ZERO;
        config.harvest.profile_settle = Duration::ZERO;
        config.hunter.contact_settle = Duration::ZERO;
        config.schedule.min_delay = Duration::ZERO;
        config.schedule.max_delay = Duration::ZERO;
        config
    }

    fn about(bio: &str, website: Option<&str>) -> String {
        let dl = website
            .map(|w| format!(r#"<dl><dt>Website</dt><dd><a href="{w}">{w}</a></dd></dl>"#))
            .unwrap_or_default();
        format!(
            r#"<html><head><title>Profile | LinkedIn</title></head><body><main>
               <h1><span>Company</span></h1>
               <section class="artdeco-card"><p class="break-words">{bio}</p>{dl}</section>
               </main></body></html>"#
        )
    }

    fn search_page(slugs: &[&str]) -> String {
        slugs
            .iter()
            .map(|s| format!(r#"<a href="/company/{s}/?trk=srp">{s}</a>"#))
            .collect()
    }

    fn pipeline(browser: Arc<FakeBrowser>, store: Arc<MemoryStore>, config: PipelineConfig) -> Pipeline {
        Pipeline::new(
            Collaborators {
                browser,
                store,
                embedder: Arc::new(StubEmbedder::new(8)),
                export: None,
            },
            config,
        )
        .unwrap()
    }

    fn acme() -> &'static str {
        "https://www.linkedin.com/company/acme"
    }

    fn beta() -> &'static str {
        "https://www.linkedin.com/company/beta"
    }

    #[tokio::test]
    async fn fintech_scenario() {
        let browser = Arc::new(
            FakeBrowser::default()
                .with_page(SEARCH, &search_page(&["acme", "beta", "acme"]))
                .with_page(
                    "https://www.linkedin.com/company/acme/about/",
                    &about("We build payment APIs", None),
                )
                .with_page(
                    "https://www.linkedin.com/company/beta/about/",
                    &about("Payments for platforms", Some("https://beta.io")),
                )
                .with_page(
                    "https://beta.io/",
                    "<p>press@beta.io</p><img src='/static/icon@2x.png'>",
                ),
        );
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(browser.clone(), store.clone(), config());

        let report = pipeline.run_harvest("fintech", &SilentProgress).await.unwrap();
        assert_eq!(report.found, 2);
        assert_eq!(report.stored, 2);
        assert_eq!(report.with_email, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.failed, 0);

        let acme = store.by_source(acme()).expect("acme stored");
        assert_eq!(acme.description, "We build payment APIs");
        assert_eq!(acme.website, None);
        assert_eq!(acme.contact_email.as_str(), "discovery@pending.com");

        let beta = store.by_source(beta()).expect("beta stored");
        assert_eq!(beta.website.as_deref(), Some("https://beta.io"));
        assert_eq!(
            beta.contact_email,
            ContactEmail::Discovered("press@beta.io".into())
        );
        assert_eq!(beta.embedding.len(), 8);
    }

    #[tokio::test]
    async fn known_identifiers_cost_no_navigation() {
        let browser = Arc::new(
            FakeBrowser::default()
                .with_page(SEARCH, &search_page(&["acme", "beta"]))
                .with_page(
                    "https://www.linkedin.com/company/beta/about/",
                    &about("Beta", None),
                ),
        );
        let store = Arc::new(MemoryStore::default());
        store
            .insert(
                NewLead::new("Acme", "", acme(), Some("https://acme.io"), ContactEmail::Pending, vec![1.0])
                    .unwrap(),
            )
            .await
            .unwrap();

        let pipeline = pipeline(browser.clone(), store.clone(), config());
        let report = pipeline.run_harvest("fintech", &SilentProgress).await.unwrap();

        assert_eq!(report.known, 1);
        assert_eq!(report.stored, 1);
        assert_eq!(browser.calls_containing("/company/acme"), 0);
        assert_eq!(browser.calls_containing("acme.io"), 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn one_failing_unit_leaves_siblings_committed() {
        let browser = Arc::new(
            FakeBrowser::default()
                .with_page(SEARCH, &search_page(&["acme", "beta", "gamma"]))
                .with_page(
                    "https://www.linkedin.com/company/acme/about/",
                    &about("Acme", None),
                )
                .with_failure("https://www.linkedin.com/company/beta/about/")
                .with_page(
                    "https://www.linkedin.com/company/gamma/about/",
                    &about("Gamma", None),
                ),
        );
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(browser, store.clone(), config());

        let report = pipeline.run_harvest("fintech", &SilentProgress).await.unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(report.failed, 1);
        assert!(store.by_source(acme()).is_some());
        assert!(store.by_source(beta()).is_none());
        assert!(store.by_source("https://www.linkedin.com/company/gamma").is_some());
    }

    #[tokio::test]
    async fn website_mode_skips_known_websites_before_hunting() {
        let browser = Arc::new(
            FakeBrowser::default()
                .with_page(SEARCH, &search_page(&["beta-emea"]))
                .with_page(
                    "https://www.linkedin.com/company/beta-emea/about/",
                    &about("Beta EMEA", Some("https://beta.io")),
                ),
        );
        let store = Arc::new(MemoryStore::default());
        store
            .insert(
                NewLead::new("Beta", "", beta(), Some("https://beta.io"), ContactEmail::Pending, vec![1.0])
                    .unwrap(),
            )
            .await
            .unwrap();

        let mut config = config();
        config.harvest.key_mode = KeyMode::Website;
        let pipeline = pipeline(browser.clone(), store.clone(), config);

        let report = pipeline.run_harvest("fintech", &SilentProgress).await.unwrap();
        assert_eq!(report.known, 1);
        assert_eq!(report.stored, 0);
        assert_eq!(browser.calls_containing("beta.io"), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn failed_search_is_an_error() {
        let browser = Arc::new(FakeBrowser::default().with_failure(SEARCH));
        let pipeline = pipeline(browser, Arc::new(MemoryStore::default()), config());
        assert!(pipeline.run_harvest("fintech", &SilentProgress).await.is_err());
    }
}

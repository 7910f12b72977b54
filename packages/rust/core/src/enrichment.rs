//! Enrichment pass: revisit stored leads without an email.
//!
//! Targets are grouped by website so each site is crawled once per run, then
//! hunted through the same [`BatchScheduler`](crate::scheduler::BatchScheduler)
//! as harvesting. Unreachable or missing websites leave the lead untouched.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, instrument, warn};

use leadharvest_crawler::{HuntOutcome, HuntPhase};
use leadharvest_shared::{ContactEmail, Lead, LeadKey, Result, normalize_website};

use crate::pipeline::{Pipeline, ProgressReporter};
use crate::scheduler::UnitReport;

/// Which stored leads an enrichment run revisits.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnrichOptions {
    /// Also retry leads whose site was crawled without finding anything.
    pub retry_not_found: bool,
}

impl EnrichOptions {
    /// Email values selected for the run.
    pub fn targets(&self) -> Vec<ContactEmail> {
        let mut emails = vec![ContactEmail::Pending];
        if self.retry_not_found {
            emails.push(ContactEmail::NotFoundOnHarvest);
            emails.push(ContactEmail::NotFoundOnEnrichment);
        }
        emails
    }
}

/// Leads sharing one website.
#[derive(Debug, Clone)]
pub struct WebsiteGroup {
    pub key: LeadKey,
    pub website: Option<String>,
    pub leads: Vec<Lead>,
}

/// Group leads by normalized website, in order of first appearance.
///
/// Leads without a website key on their source URL and stay alone.
pub fn group_by_website(leads: Vec<Lead>) -> Vec<WebsiteGroup> {
    let mut groups: Vec<WebsiteGroup> = Vec::new();
    let mut index: HashMap<LeadKey, usize> = HashMap::new();

    for lead in leads {
        let website = normalize_website(lead.website.as_deref());
        let key = match &website {
            Some(site) => LeadKey::Website(site.trim_end_matches('/').to_ascii_lowercase()),
            None => LeadKey::Source(lead.source_url.clone()),
        };
        match index.get(&key) {
            Some(&i) => groups[i].leads.push(lead),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push(WebsiteGroup {
                    key,
                    website,
                    leads: vec![lead],
                });
            }
        }
    }
    groups
}

/// Result of hunting one website group.
#[derive(Debug, Clone, Default)]
pub struct GroupResult {
    pub discovered: usize,
    pub not_found: usize,
    /// Leads left as they were (no website, or the site was unreachable).
    pub unchanged: usize,
    /// Leads whose write failed; siblings in the group are still written.
    pub failed: usize,
}

/// Summary of an enrichment run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrichmentReport {
    /// Leads selected by the run's email filter.
    pub targeted: usize,
    /// Distinct websites (or lone leads) processed.
    pub websites: usize,
    pub discovered: usize,
    pub not_found: usize,
    pub unchanged: usize,
    /// Leads whose write failed, or whose whole unit aborted.
    pub failed: usize,
    #[serde(with = "crate::pipeline::duration_secs")]
    pub elapsed: Duration,
}

impl Pipeline {
    /// Hunt websites of stored leads still lacking an email.
    #[instrument(skip_all, fields(retry_not_found = options.retry_not_found))]
    pub async fn run_enrichment(
        &self,
        options: EnrichOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<EnrichmentReport> {
        let start = Instant::now();
        progress.phase("Selecting leads");

        let leads = self.store.query_by_email(&options.targets()).await?;
        let mut report = EnrichmentReport {
            targeted: leads.len(),
            ..EnrichmentReport::default()
        };

        let groups = group_by_website(leads);
        report.websites = groups.len();
        info!(
            leads = report.targeted,
            websites = report.websites,
            batches = self.scheduler.batch_count(groups.len()),
            "enrichment targets selected"
        );
        progress.phase("Hunting emails");

        let total = groups.len();
        let mut settled = 0usize;
        let reports = self
            .scheduler
            .run(
                groups,
                |group| self.enrich_unit(group),
                |unit: &UnitReport<WebsiteGroup, GroupResult>| {
                    settled += 1;
                    let label = unit.item.website.as_deref().unwrap_or(unit.item.key.as_str());
                    let status = match &unit.result {
                        Ok(r) if r.failed > 0 => format!("{} write(s) failed", r.failed),
                        Ok(r) if r.discovered > 0 => "email found".to_string(),
                        Ok(r) if r.not_found > 0 => "no email".to_string(),
                        Ok(_) => "unchanged".to_string(),
                        Err(e) => format!("failed: {e}"),
                    };
                    progress.unit_settled(label, &status, settled, total);
                },
            )
            .await;

        for unit in reports {
            match unit.result {
                Ok(result) => {
                    report.discovered += result.discovered;
                    report.not_found += result.not_found;
                    report.unchanged += result.unchanged;
                    report.failed += result.failed;
                }
                Err(e) => {
                    warn!(key = unit.item.key.as_str(), error = %e, "website group failed");
                    report.failed += unit.item.leads.len();
                }
            }
        }

        report.elapsed = start.elapsed();
        info!(
            discovered = report.discovered,
            not_found = report.not_found,
            unchanged = report.unchanged,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "enrichment run complete"
        );
        progress.enrichment_done(&report);
        Ok(report)
    }

    fn enrich_unit(
        &self,
        group: WebsiteGroup,
    ) -> impl std::future::Future<Output = Result<GroupResult>> + Send + use<> {
        let hunter = self.hunter.clone();
        let sink = self.sink.clone();

        async move {
            let outcome = hunter.hunt(group.website.as_deref()).await;
            let mut result = GroupResult::default();

            if matches!(outcome, HuntOutcome::Unreachable(_) | HuntOutcome::Skipped) {
                result.unchanged = group.leads.len();
                return Ok(result);
            }

            let email = outcome.to_contact_email(HuntPhase::Enrichment);
            for lead in &group.leads {
                if let Err(e) = sink.update_email(lead, email.clone()).await {
                    warn!(lead_id = %lead.id, error = %e, "lead update failed");
                    result.failed += 1;
                } else if let ContactEmail::Discovered(_) = &email {
                    result.discovered += 1;
                } else {
                    result.not_found += 1;
                }
            }
            Ok(result)
        }
    }
}

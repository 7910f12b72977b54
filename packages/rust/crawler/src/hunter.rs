//! Contact email discovery on an organization's own website.
//!
//! The hunter distinguishes "crawled, nothing there" from "could not crawl":
//! only the first becomes a not-found sentinel, the second stays pending so a
//! later enrichment pass picks it up again.

use std::sync::Arc;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use leadharvest_shared::{
    ContactEmail, HunterConfig, LeadHarvestError, Result, normalize_website,
};

use crate::browser::{Browser, is_platform_host};

/// Permissive `local@domain.tld` pattern.
const EMAIL_PATTERN: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";

/// Result of hunting one website.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HuntOutcome {
    /// An address survived filtering.
    Found(String),
    /// Every page loaded and none had a usable address.
    NotFound,
    /// A navigation failed or timed out.
    Unreachable(String),
    /// No website to visit (absent, legacy "None", or on the platform itself).
    Skipped,
}

/// Which pass is hunting; decides the not-found sentinel written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HuntPhase {
    Harvest,
    Enrichment,
}

impl HuntOutcome {
    /// Stored email for this outcome.
    pub fn to_contact_email(&self, phase: HuntPhase) -> ContactEmail {
        match (self, phase) {
            (Self::Found(email), _) => ContactEmail::Discovered(email.clone()),
            (Self::NotFound, HuntPhase::Harvest) => ContactEmail::NotFoundOnHarvest,
            (Self::NotFound, HuntPhase::Enrichment) => ContactEmail::NotFoundOnEnrichment,
            (Self::Unreachable(_) | Self::Skipped, _) => ContactEmail::Pending,
        }
    }
}

/// Crawls a website (and at most one contact page) for an email address.
pub struct WebsiteEmailHunter {
    browser: Arc<dyn Browser>,
    config: HunterConfig,
    email_re: Regex,
}

impl WebsiteEmailHunter {
    pub fn new(browser: Arc<dyn Browser>, config: HunterConfig) -> Result<Self> {
        let email_re = Regex::new(EMAIL_PATTERN)
            .map_err(|e| LeadHarvestError::config(format!("invalid email pattern: {e}")))?;
        Ok(Self {
            browser,
            config,
            email_re,
        })
    }

    /// Resolve a stored website reference to the URL to visit, or `None` when
    /// it must not be crawled.
    pub fn target_url(&self, website: Option<&str>) -> Option<Url> {
        let raw = normalize_website(website)?;
        let with_scheme = if raw.contains("://") {
            raw
        } else {
            format!("https://{raw}")
        };

        let url = Url::parse(&with_scheme).ok()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        let host = url.host_str()?;
        if is_platform_host(host, &self.config.platform_domain) {
            return None;
        }
        Some(url)
    }

    /// Hunt `website` for a contact address.
    #[instrument(skip_all, fields(website = website.unwrap_or("-")))]
    pub async fn hunt(&self, website: Option<&str>) -> HuntOutcome {
        let Some(url) = self.target_url(website) else {
            debug!("no crawlable website");
            return HuntOutcome::Skipped;
        };

        let page = match self.browser.open(&url, self.config.timeout).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "website unreachable");
                return HuntOutcome::Unreachable(e.to_string());
            }
        };

        let emails = extract_emails(&page.html, &self.email_re, &self.config.noise_tokens);
        if let Some(email) = emails.into_iter().next() {
            info!(email = %email, "email found");
            return HuntOutcome::Found(email);
        }

        let contact = find_contact_link(&page.html, &page.url, &self.config.contact_link_words);
        let Some(contact_url) = contact else {
            debug!("no email and no contact link");
            return HuntOutcome::NotFound;
        };

        debug!(contact = %contact_url, "trying contact page");
        let page = match self.browser.open(&contact_url, self.config.timeout).await {
            Ok(page) => page,
            Err(e) => {
                warn!(url = %contact_url, error = %e, "contact page unreachable");
                return HuntOutcome::Unreachable(e.to_string());
            }
        };
        tokio::time::sleep(self.config.contact_settle).await;

        let emails = extract_emails(&page.html, &self.email_re, &self.config.noise_tokens);
        match emails.into_iter().next() {
            Some(email) => {
                info!(email = %email, "email found on contact page");
                HuntOutcome::Found(email)
            }
            None => HuntOutcome::NotFound,
        }
    }
}

/// Every email-shaped substring of `text`, in order of first appearance,
/// case-insensitively deduplicated and with noisy candidates removed.
pub fn extract_emails(text: &str, email_re: &Regex, noise_tokens: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    email_re
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|candidate| !is_noise(candidate, noise_tokens))
        .filter(|candidate| seen.insert(candidate.to_ascii_lowercase()))
        .collect()
}

fn is_noise(candidate: &str, noise_tokens: &[String]) -> bool {
    let lower = candidate.to_ascii_lowercase();
    noise_tokens
        .iter()
        .any(|token| lower.contains(&token.to_ascii_lowercase()))
}

/// First anchor whose text mentions one of `words`, resolved against `page_url`.
pub fn find_contact_link(html: &str, page_url: &Url, words: &[String]) -> Option<Url> {
    let doc = Html::parse_document(html);
    let sel = Selector::parse("a[href]").ok()?;
    let words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

    doc.select(&sel).find_map(|a| {
        let text = a.text().collect::<String>().to_lowercase();
        if !words.iter().any(|w| text.contains(w.as_str())) {
            return None;
        }
        let href = a.value().attr("href")?.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
        {
            return None;
        }
        let url = page_url.join(href).ok()?;
        matches!(url.scheme(), "http" | "https").then_some(url)
    })
}

//! Profile page extraction.
//!
//! Every field has a fallback: a page with none of the expected elements
//! still yields a profile (`"Unknown"`, empty description, no website).

use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use leadharvest_shared::{HarvestConfig, OrganizationId, Result, UNKNOWN_COMPANY};

use crate::browser::{Browser, is_platform_host};

/// Heading candidates for the organization name, most specific first.
const NAME_SELECTORS: [&str; 3] = ["h1 span", "h1", "title"];

/// Description paragraph on the about page.
const BIO_SELECTOR: &str = "section.artdeco-card p.break-words";

/// How many anchors the website fallback scans before giving up.
const WEBSITE_SCAN_LIMIT: usize = 60;

/// Fields read from one organization profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationProfile {
    pub name: String,
    pub bio: String,
    pub website: Option<String>,
    pub industry: Option<String>,
}

/// Loads a profile's about page and reads its fields.
pub struct RecordExtractor {
    browser: Arc<dyn Browser>,
    config: HarvestConfig,
}

impl RecordExtractor {
    pub fn new(browser: Arc<dyn Browser>, config: HarvestConfig) -> Self {
        Self { browser, config }
    }

    /// Navigate to the about sub-page of `id` and extract its fields.
    ///
    /// Only navigation failures are errors; missing elements fall back.
    #[instrument(skip_all, fields(id = %id))]
    pub async fn extract(&self, id: &OrganizationId) -> Result<OrganizationProfile> {
        let url = id.subpage(&self.config.platform.profile_suffix)?;
        let page = self
            .browser
            .open(&url, self.config.navigation_timeout)
            .await?;
        tokio::time::sleep(self.config.profile_settle).await;

        let profile = parse_profile(&page.html, &page.url, &self.config.platform.domain);
        debug!(
            name = %profile.name,
            bio_len = profile.bio.len(),
            website = profile.website.as_deref().unwrap_or("-"),
            "profile extracted"
        );
        Ok(profile)
    }
}

/// Read name, description, website and industry from profile markup.
pub fn parse_profile(html: &str, page_url: &Url, platform_domain: &str) -> OrganizationProfile {
    let doc = Html::parse_document(html);
    let details = definition_pairs(&doc);

    let website = details
        .iter()
        .filter(|(term, _)| term.eq_ignore_ascii_case("website"))
        .find_map(|(_, dd)| first_external_link(anchors_within(*dd), page_url, platform_domain))
        .or_else(|| fallback_website(&doc, page_url, platform_domain));

    let industry = details
        .iter()
        .find(|(term, _)| term.eq_ignore_ascii_case("industry"))
        .map(|(_, dd)| collapse_whitespace(&dd.text().collect::<String>()))
        .filter(|s| !s.is_empty());

    OrganizationProfile {
        name: extract_name(&doc),
        bio: extract_bio(&doc),
        website,
        industry,
    }
}

fn extract_name(doc: &Html) -> String {
    for sel_str in NAME_SELECTORS {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        let Some(el) = doc.select(&sel).next() else {
            continue;
        };

        let mut text = collapse_whitespace(&el.text().collect::<String>());
        if sel_str == "title" {
            if let Some((head, _)) = text.split_once(" | ") {
                text = head.trim().to_string();
            }
        }
        if text.chars().count() > 2 {
            return text;
        }
    }
    UNKNOWN_COMPANY.to_string()
}

fn extract_bio(doc: &Html) -> String {
    let Ok(sel) = Selector::parse(BIO_SELECTOR) else {
        return String::new();
    };
    doc.select(&sel)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .unwrap_or_default()
}

/// `(dt text, dd element)` pairs from every definition list on the page.
fn definition_pairs(doc: &Html) -> Vec<(String, ElementRef<'_>)> {
    let Ok(dl_sel) = Selector::parse("dl") else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    for dl in doc.select(&dl_sel) {
        let mut term: Option<String> = None;
        for child in dl.children().filter_map(ElementRef::wrap) {
            match child.value().name() {
                "dt" => term = Some(collapse_whitespace(&child.text().collect::<String>())),
                "dd" => {
                    if let Some(t) = &term {
                        pairs.push((t.clone(), child));
                    }
                }
                _ => {}
            }
        }
    }
    pairs
}

fn anchors_within(el: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    match Selector::parse("a[href]") {
        Ok(sel) => el.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// First external http(s) link among the leading anchors of `main` (or `body`).
fn fallback_website(doc: &Html, page_url: &Url, platform_domain: &str) -> Option<String> {
    for scope in ["main", "body"] {
        let Ok(sel) = Selector::parse(scope) else {
            continue;
        };
        if let Some(root) = doc.select(&sel).next() {
            let anchors: Vec<_> = anchors_within(root)
                .into_iter()
                .take(WEBSITE_SCAN_LIMIT)
                .collect();
            return first_external_link(anchors, page_url, platform_domain);
        }
    }
    None
}

fn first_external_link(
    anchors: Vec<ElementRef<'_>>,
    page_url: &Url,
    platform_domain: &str,
) -> Option<String> {
    anchors.into_iter().find_map(|a| {
        let href = a.value().attr("href")?;
        resolve_external(href, page_url, platform_domain)
    })
}

/// Resolve `href` to an off-platform http(s) URL, unwrapping the platform's
/// outbound redirect wrapper.
pub fn resolve_external(href: &str, page_url: &Url, platform_domain: &str) -> Option<String> {
    let mut url = page_url.join(href.trim()).ok()?;

    let on_platform = url
        .host_str()
        .is_some_and(|h| is_platform_host(h, platform_domain));
    if on_platform && url.path().contains("/redir/redirect") {
        let target = url
            .query_pairs()
            .find(|(k, _)| k == "url")
            .map(|(_, v)| v.into_owned())?;
        url = Url::parse(&target).ok()?;
    }

    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    let host = url.host_str()?;
    if is_platform_host(host, platform_domain) {
        return None;
    }

    let s = url.to_string();
    // Bare origins serialize with a trailing slash the page never showed.
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        return Some(s.trim_end_matches('/').to_string());
    }
    Some(s)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Keyword search over the platform's organization directory.

use std::collections::BTreeSet;
use std::sync::Arc;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use leadharvest_shared::{HarvestConfig, LeadHarvestError, OrganizationId, Result};

use crate::browser::{Browser, is_platform_host};

/// Collects organization identifiers for a free-text query.
pub struct SearchHarvester {
    browser: Arc<dyn Browser>,
    config: HarvestConfig,
}

impl SearchHarvester {
    pub fn new(browser: Arc<dyn Browser>, config: HarvestConfig) -> Self {
        Self { browser, config }
    }

    /// Search URL for `query`; `page` selects a later result page.
    pub fn search_url(&self, query: &str, page: Option<u32>) -> Result<Url> {
        let platform = &self.config.platform;
        let base = Url::parse(&platform.base_url).map_err(|e| {
            LeadHarvestError::config(format!("invalid platform.base_url '{}': {e}", platform.base_url))
        })?;
        let mut url = base.join(&platform.search_path).map_err(|e| {
            LeadHarvestError::config(format!("invalid platform.search_path: {e}"))
        })?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair(&platform.query_param, query.trim());
            if let Some(page) = page {
                pairs.append_pair(&platform.page_param, &page.to_string());
            }
        }
        Ok(url)
    }

    /// Run the search and return the distinct profile identifiers found.
    ///
    /// The first results page must load; later load-more cycles that fail end
    /// the scroll early and keep what was already collected.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn harvest(&self, query: &str) -> Result<BTreeSet<OrganizationId>> {
        let timeout = self.config.navigation_timeout;
        let first = self.search_url(query, None)?;

        let page = self.browser.open(&first, timeout).await?;
        tokio::time::sleep(self.config.initial_wait).await;

        let mut found: BTreeSet<OrganizationId> = collect_profile_links(
            &page.html,
            &page.url,
            &self.config.platform.profile_pattern,
            &self.config.platform.domain,
        )
        .into_iter()
        .collect();
        debug!(count = found.len(), "first results page");

        for cycle in 1..=self.config.scroll_cycles {
            let url = self.search_url(query, Some(cycle + 1))?;
            let page = match self.browser.open(&url, timeout).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(cycle, error = %e, "load-more failed, stopping scroll");
                    break;
                }
            };

            let before = found.len();
            found.extend(collect_profile_links(
                &page.html,
                &page.url,
                &self.config.platform.profile_pattern,
                &self.config.platform.domain,
            ));
            tokio::time::sleep(self.config.scroll_pause).await;

            if found.len() == before {
                debug!(cycle, "no new results, end of listing");
                break;
            }
        }

        info!(count = found.len(), "harvest complete");
        Ok(found)
    }
}

/// Extract normalized profile identifiers from a results page.
///
/// Keeps links whose path contains `pattern` followed by a slug, drops search
/// and off-platform links, and trims each to `pattern + slug` so sub-pages of
/// the same profile collapse together.
pub fn collect_profile_links(
    html: &str,
    page_url: &Url,
    pattern: &str,
    platform_domain: &str,
) -> Vec<OrganizationId> {
    let doc = Html::parse_document(html);
    let Ok(link_sel) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut ids = Vec::new();
    for el in doc.select(&link_sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = page_url.join(href) else {
            continue;
        };
        if !resolved
            .host_str()
            .is_some_and(|h| is_platform_host(h, platform_domain))
        {
            continue;
        }

        let path = resolved.path();
        if path.split('/').any(|segment| segment == "search") {
            continue;
        }
        let Some(idx) = path.find(pattern) else {
            continue;
        };
        let rest = &path[idx + pattern.len()..];
        let slug = rest.split('/').next().unwrap_or("");
        if slug.is_empty() {
            continue;
        }

        let canonical = format!("{}{}", &path[..idx + pattern.len()], slug);
        if let Ok(id) = OrganizationId::parse(&canonical, &resolved) {
            ids.push(id);
        }
    }
    ids
}

//! Browsing collaborator: loads a page and hands back its markup.
//!
//! One [`Browser`] is shared read-only by every unit of work in a run; each
//! call to [`Browser::open`] is an independent navigation with its own
//! timeout, the same way each worker opens its own tab in a shared context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::Jar;
use tracing::{debug, instrument};
use url::Url;

use leadharvest_shared::{LeadHarvestError, PlatformConfig, Result, Session};

/// Desktop browser User-Agent sent with every navigation.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// A loaded page.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status of the final response.
    pub status: u16,
    /// Raw markup.
    pub html: String,
}

/// Loads pages on behalf of the harvester, extractor and hunter.
#[async_trait]
pub trait Browser: Send + Sync {
    /// Navigate to `url`, failing if the page is not available within `timeout`.
    async fn open(&self, url: &Url, timeout: Duration) -> Result<Page>;
}

/// True if `host` is `domain` or one of its subdomains.
pub fn is_platform_host(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{domain}")))
}

// ---------------------------------------------------------------------------
// HttpBrowser
// ---------------------------------------------------------------------------

/// [`Browser`] backed by `reqwest`, carrying the session cookies for the
/// platform and no cookies anywhere else.
pub struct HttpBrowser {
    client: Client,
    platform_domain: String,
    login_path: String,
}

impl HttpBrowser {
    /// Build a browser whose cookie jar is seeded from `session`.
    pub fn new(session: Option<&Session>, platform: &PlatformConfig) -> Result<Self> {
        let base = Url::parse(&platform.base_url).map_err(|e| {
            LeadHarvestError::config(format!("invalid platform.base_url '{}': {e}", platform.base_url))
        })?;

        let jar = Arc::new(Jar::default());
        if let Some(session) = session {
            for cookie in &session.cookies {
                let header = if cookie.domain.is_empty() {
                    format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path)
                } else {
                    format!(
                        "{}={}; Domain={}; Path={}",
                        cookie.name, cookie.value, cookie.domain, cookie.path
                    )
                };
                jar.add_cookie_str(&header, &base);
            }
            debug!(
                cookies = session.cookies.len(),
                captured_at = %session.captured_at,
                "session cookies loaded"
            );
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(jar)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| LeadHarvestError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            platform_domain: platform.domain.clone(),
            login_path: platform.login_path.clone(),
        })
    }

    fn on_platform(&self, url: &Url) -> bool {
        url.host_str()
            .is_some_and(|h| is_platform_host(h, &self.platform_domain))
    }

    fn map_send_error(url: &Url, e: reqwest::Error) -> LeadHarvestError {
        if e.is_timeout() {
            LeadHarvestError::Timeout {
                url: url.to_string(),
            }
        } else {
            LeadHarvestError::navigation(url.as_str(), e.to_string())
        }
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    #[instrument(skip_all, fields(url = %url))]
    async fn open(&self, url: &Url, timeout: Duration) -> Result<Page> {
        debug!("navigating");

        let response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        let final_url = response.url().clone();
        let status = response.status();

        if self.on_platform(&final_url) {
            let bounced_to_login = final_url.path().starts_with(&self.login_path)
                && !url.path().starts_with(&self.login_path);
            if bounced_to_login || status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(LeadHarvestError::SessionInvalid {
                    url: url.to_string(),
                });
            }
        }

        if !status.is_success() {
            return Err(LeadHarvestError::navigation(
                url.as_str(),
                format!("HTTP {status}"),
            ));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Self::map_send_error(url, e))?;

        Ok(Page {
            url: final_url,
            status: status.as_u16(),
            html,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadharvest_shared::SessionCookie;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn platform_for(server: &MockServer) -> PlatformConfig {
        PlatformConfig {
            base_url: server.uri(),
            domain: "127.0.0.1".into(),
            ..PlatformConfig::default()
        }
    }

    fn session() -> Session {
        Session {
            captured_at: chrono::Utc::now(),
            cookies: vec![SessionCookie {
                name: "li_at".into(),
                value: "secret".into(),
                domain: String::new(),
                path: "/".into(),
            }],
        }
    }

    #[test]
    fn platform_host_matching() {
        assert!(is_platform_host("www.linkedin.com", "linkedin.com"));
        assert!(is_platform_host("linkedin.com", "linkedin.com"));
        assert!(is_platform_host("LinkedIn.com", ".linkedin.com"));
        assert!(!is_platform_host("notlinkedin.com", "linkedin.com"));
        assert!(!is_platform_host("beta.io", "linkedin.com"));
        assert!(!is_platform_host("beta.io", ""));
    }

    #[tokio::test]
    async fn sends_session_cookie_to_platform() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/company/acme/about/"))
            .and(header("cookie", "li_at=secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Acme</h1>"))
            .mount(&server)
            .await;

        let browser = HttpBrowser::new(Some(&session()), &platform_for(&server)).unwrap();
        let url = Url::parse(&format!("{}/company/acme/about/", server.uri())).unwrap();
        let page = browser.open(&url, Duration::from_secs(5)).await.unwrap();

        assert_eq!(page.status, 200);
        assert!(page.html.contains("Acme"));
    }

    #[tokio::test]
    async fn http_error_is_navigation_error() {
        let server = MockServer::start().await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let browser = HttpBrowser::new(None, &platform_for(&server)).unwrap();
        let url = Url::parse(&format!("{}/missing", server.uri())).unwrap();
        let err = browser.open(&url, Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, LeadHarvestError::Navigation { .. }));
    }

    #[tokio::test]
    async fn login_redirect_is_session_invalid() {
        let server = MockServer::start().await;
        Mock::given(path("/company/acme/about/"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "/login?session_redirect=x"),
            )
            .mount(&server)
            .await;
        Mock::given(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<form>Sign in</form>"))
            .mount(&server)
            .await;

        let browser = HttpBrowser::new(Some(&session()), &platform_for(&server)).unwrap();
        let url = Url::parse(&format!("{}/company/acme/about/", server.uri())).unwrap();
        let err = browser.open(&url, Duration::from_secs(5)).await.unwrap_err();

        assert!(matches!(err, LeadHarvestError::SessionInvalid { .. }));
        assert!(err.is_navigation());
    }

    #[tokio::test]
    async fn slow_page_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let browser = HttpBrowser::new(None, &platform_for(&server)).unwrap();
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = browser
            .open(&url, Duration::from_millis(200))
            .await
            .unwrap_err();

        assert!(matches!(err, LeadHarvestError::Timeout { .. }));
    }
}

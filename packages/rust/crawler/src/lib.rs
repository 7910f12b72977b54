//! Browsing, search harvesting and page extraction for leadharvest.
//!
//! This crate provides:
//! - [`browser`] — the [`Browser`] collaborator and its `reqwest` implementation
//! - [`session`] — persisted authentication state
//! - [`harvester`] — keyword search yielding organization identifiers
//! - [`extractor`] — profile page fields with per-field fallbacks
//! - [`hunter`] — contact email discovery on an organization's website
//!
//! HTML is parsed only inside synchronous helpers so the async entry points
//! stay `Send` and can run on spawned tasks.

pub mod browser;
pub mod extractor;
pub mod harvester;
pub mod hunter;
pub mod session;

pub use browser::{Browser, HttpBrowser, Page, is_platform_host};
pub use extractor::{OrganizationProfile, RecordExtractor, parse_profile};
pub use harvester::{SearchHarvester, collect_profile_links};
pub use hunter::{HuntOutcome, HuntPhase, WebsiteEmailHunter};
pub use session::{SessionStore, parse_session_export};

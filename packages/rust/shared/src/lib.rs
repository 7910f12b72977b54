//! Shared types, error model, and configuration for leadharvest.
//!
//! This crate is the foundation depended on by all other leadharvest crates.
//! It provides:
//! - [`LeadHarvestError`] — the unified error type
//! - Domain types ([`OrganizationId`], [`Lead`], [`ContactEmail`], [`Session`])
//! - Configuration ([`AppConfig`], runtime configs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, EmbedTemplate, EmbeddingConfig, EmbeddingSection, HarvestConfig,
    HarvestSection, HunterConfig, HunterSection, KeyMode, PlatformConfig, ScheduleConfig,
    ScheduleSection, config_dir, config_file_path, embedding_api_key, expand_home, init_config,
    load_config, load_config_from,
};
pub use error::{LeadHarvestError, Result};
pub use types::{
    ContactEmail, Lead, LeadKey, LeadStats, NO_WEBSITE, NewLead, OrganizationId, Service,
    Session, SessionCookie, UNKNOWN_COMPANY, normalize_website,
};

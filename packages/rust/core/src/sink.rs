//! Embedding and persistence of finished records.

use std::sync::Arc;

use tracing::{debug, info, warn};

use leadharvest_crawler::OrganizationProfile;
use leadharvest_shared::{ContactEmail, EmbedTemplate, Lead, NewLead, OrganizationId, Result};
use leadharvest_storage::{InsertOutcome, LeadStore};

use crate::embedding::Embedder;
use crate::export::ExportLog;

/// Placeholder used by the industry template when the bio is empty.
const NO_DESCRIPTION: &str = "No description";

/// What happened to a record handed to the sink.
#[derive(Debug, Clone)]
pub enum SinkOutcome {
    Stored(Lead),
    /// Another unit stored the same organization first.
    Duplicate,
}

/// Text handed to the embedder for a profile.
///
/// The industry template falls back to the bio template when the profile has
/// no industry.
pub fn compose_embedding_text(template: EmbedTemplate, profile: &OrganizationProfile) -> String {
    match (template, profile.industry.as_deref()) {
        (EmbedTemplate::IndustryBio, Some(industry)) => {
            let bio = if profile.bio.is_empty() {
                NO_DESCRIPTION
            } else {
                profile.bio.as_str()
            };
            format!("{industry}: {bio}")
        }
        _ => format!("Bio: {}", profile.bio),
    }
}

/// Commits one record at a time: embed, then insert or update.
#[derive(Clone)]
pub struct RecordSink {
    store: Arc<dyn LeadStore>,
    embedder: Arc<dyn Embedder>,
    template: EmbedTemplate,
    export: Option<Arc<ExportLog>>,
}

impl RecordSink {
    pub fn new(
        store: Arc<dyn LeadStore>,
        embedder: Arc<dyn Embedder>,
        template: EmbedTemplate,
        export: Option<Arc<ExportLog>>,
    ) -> Self {
        Self {
            store,
            embedder,
            template,
            export,
        }
    }

    /// Embed and insert a newly harvested organization.
    pub async fn store(
        &self,
        id: &OrganizationId,
        profile: &OrganizationProfile,
        email: ContactEmail,
    ) -> Result<SinkOutcome> {
        let text = compose_embedding_text(self.template, profile);
        let embedding = self.embedder.embed(&text).await?;

        let lead = NewLead::new(
            &profile.name,
            &profile.bio,
            id.as_str(),
            profile.website.as_deref(),
            email,
            embedding,
        )?;

        match self.store.insert(lead).await? {
            InsertOutcome::Inserted(lead) => {
                info!(
                    company = %lead.company_name,
                    email = %lead.contact_email,
                    website = lead.website.as_deref().unwrap_or("-"),
                    "lead stored"
                );
                self.export_if_discovered(&lead).await;
                Ok(SinkOutcome::Stored(lead))
            }
            InsertOutcome::Duplicate => {
                debug!(id = %id, "lead already stored by another unit");
                Ok(SinkOutcome::Duplicate)
            }
        }
    }

    /// Write an enrichment result back onto an existing lead.
    ///
    /// Only the email column is written; fields that changed since `lead` was
    /// read (such as the drafted flag) are left as stored.
    pub async fn update_email(&self, lead: &Lead, email: ContactEmail) -> Result<Lead> {
        self.store.set_email(&lead.id, &email).await?;
        let mut updated = lead.clone();
        updated.contact_email = email;
        info!(
            company = %updated.company_name,
            email = %updated.contact_email,
            "lead updated"
        );
        self.export_if_discovered(&updated).await;
        Ok(updated)
    }

    /// Embed a catalog service description and store it.
    pub async fn store_service(
        &self,
        name: &str,
        description: &str,
    ) -> Result<leadharvest_shared::Service> {
        let embedding = self.embedder.embed(description).await?;
        let service = self
            .store
            .insert_service(name, description, embedding)
            .await?;
        info!(service = %service.name, id = %service.id, "service stored");
        Ok(service)
    }

    async fn export_if_discovered(&self, lead: &Lead) {
        let (Some(export), ContactEmail::Discovered(email)) = (&self.export, &lead.contact_email)
        else {
            return;
        };

        let export = export.clone();
        let path = export.path().display().to_string();
        let company = lead.company_name.clone();
        let email = email.clone();
        let website = lead.website.clone();
        let bio = lead.description.clone();
        let written = tokio::task::spawn_blocking(move || {
            export.append(&company, &email, website.as_deref(), &bio)
        })
        .await;

        // The lead is already committed; a failed export row only gets logged.
        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(path = %path, error = %e, "export append failed"),
            Err(e) => warn!(path = %path, error = %e, "export task aborted"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, StubEmbedder};
    use url::Url;

    fn profile(bio: &str, industry: Option<&str>) -> OrganizationProfile {
        OrganizationProfile {
            name: "Beta Payments".into(),
            bio: bio.into(),
            website: Some("https://beta.io".into()),
            industry: industry.map(String::from),
        }
    }

    fn beta() -> OrganizationId {
        let base = Url::parse("https://www.linkedin.com/").unwrap();
        OrganizationId::parse("/company/beta", &base).unwrap()
    }

    #[test]
    fn embedding_text_templates() {
        let p = profile("Payment APIs", Some("Financial Services"));
        assert_eq!(compose_embedding_text(EmbedTemplate::Bio, &p), "Bio: Payment APIs");
        assert_eq!(
            compose_embedding_text(EmbedTemplate::IndustryBio, &p),
            "Financial Services: Payment APIs"
        );
        assert_eq!(
            compose_embedding_text(EmbedTemplate::IndustryBio, &profile("", Some("Fintech"))),
            "Fintech: No description"
        );
        assert_eq!(
            compose_embedding_text(EmbedTemplate::IndustryBio, &profile("x", None)),
            "Bio: x"
        );
    }

    #[tokio::test]
    async fn stores_and_exports_discovered_email() {
        let store = Arc::new(MemoryStore::default());
        let embedder = Arc::new(StubEmbedder::new(4));
        let csv_path = std::env::temp_dir()
            .join(format!("lh-sink-{}", uuid::Uuid::now_v7()))
            .join("out.csv");
        let sink = RecordSink::new(
            store.clone(),
            embedder.clone(),
            EmbedTemplate::Bio,
            Some(Arc::new(ExportLog::new(&csv_path))),
        );

        let outcome = sink
            .store(
                &beta(),
                &profile("Payment APIs", None),
                ContactEmail::Discovered("press@beta.io".into()),
            )
            .await
            .unwrap();
        let SinkOutcome::Stored(lead) = outcome else {
            panic!("expected stored lead");
        };
        assert_eq!(lead.embedding.len(), 4);
        assert_eq!(embedder.texts(), vec!["Bio: Payment APIs".to_string()]);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.contains("Beta Payments,press@beta.io,https://beta.io,Payment APIs"));

        let again = sink
            .store(&beta(), &profile("Payment APIs", None), ContactEmail::Pending)
            .await
            .unwrap();
        assert!(matches!(again, SinkOutcome::Duplicate));
        assert_eq!(store.len(), 1);

        let _ = std::fs::remove_dir_all(csv_path.parent().unwrap());
    }

    #[tokio::test]
    async fn sentinel_email_is_not_exported() {
        let store = Arc::new(MemoryStore::default());
        let csv_path = std::env::temp_dir()
            .join(format!("lh-sink-{}", uuid::Uuid::now_v7()))
            .join("out.csv");
        let sink = RecordSink::new(
            store,
            Arc::new(StubEmbedder::new(2)),
            EmbedTemplate::Bio,
            Some(Arc::new(ExportLog::new(&csv_path))),
        );

        sink.store(&beta(), &profile("", None), ContactEmail::NotFoundOnHarvest)
            .await
            .unwrap();
        assert!(!csv_path.exists());
    }

    #[tokio::test]
    async fn update_email_exports_discovered_address() {
        let store = Arc::new(MemoryStore::default());
        let csv_path = std::env::temp_dir()
            .join(format!("lh-sink-{}", uuid::Uuid::now_v7()))
            .join("out.csv");
        let sink = RecordSink::new(
            store.clone(),
            Arc::new(StubEmbedder::new(2)),
            EmbedTemplate::Bio,
            Some(Arc::new(ExportLog::new(&csv_path))),
        );
        let SinkOutcome::Stored(lead) = sink
            .store(&beta(), &profile("Payment APIs", None), ContactEmail::Pending)
            .await
            .unwrap()
        else {
            panic!("expected stored lead");
        };
        assert!(!csv_path.exists());

        let updated = sink
            .update_email(&lead, ContactEmail::Discovered("press@beta.io".into()))
            .await
            .unwrap();
        assert_eq!(
            updated.contact_email,
            ContactEmail::Discovered("press@beta.io".into())
        );
        assert_eq!(store.leads()[0].contact_email, updated.contact_email);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        assert!(csv.contains("Beta Payments,press@beta.io,https://beta.io,Payment APIs"));

        let _ = std::fs::remove_dir_all(csv_path.parent().unwrap());
    }

    #[tokio::test]
    async fn service_description_is_embedded_and_stored() {
        let store = Arc::new(MemoryStore::default());
        let embedder = Arc::new(StubEmbedder::new(3));
        let sink = RecordSink::new(store.clone(), embedder.clone(), EmbedTemplate::Bio, None);

        let service = sink
            .store_service("AI Chatbots", "We build support chatbots")
            .await
            .unwrap();

        assert_eq!(embedder.texts(), vec!["We build support chatbots".to_string()]);
        let services = store.services();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].id, service.id);
        assert_eq!(services[0].name, "AI Chatbots");
        assert_eq!(services[0].embedding.len(), 3);
    }

    #[tokio::test]
    async fn embedding_failure_stores_nothing() {
        let store = Arc::new(MemoryStore::default());
        let sink = RecordSink::new(
            store.clone(),
            Arc::new(StubEmbedder::failing()),
            EmbedTemplate::Bio,
            None,
        );
        let result = sink
            .store(&beta(), &profile("x", None), ContactEmail::Pending)
            .await;
        assert!(result.is_err());
        assert_eq!(store.len(), 0);
    }
}

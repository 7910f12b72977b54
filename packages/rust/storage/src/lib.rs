//! libSQL storage layer for harvested leads.
//!
//! The [`Storage`] struct wraps a local libSQL database holding leads and the
//! service catalog. Every operation opens its own connection, commits, and
//! drops it, so concurrent units of work never share a handle.
//!
//! The pipeline only sees the [`LeadStore`] trait; tests substitute in-memory
//! fakes.

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use leadharvest_shared::{
    ContactEmail, Lead, LeadHarvestError, LeadKey, LeadStats, NewLead, Result, Service,
};
use libsql::{Connection, Database, params};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// LeadStore
// ---------------------------------------------------------------------------

/// Result of attempting to persist a new lead.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    /// The lead was written.
    Inserted(Lead),
    /// Another writer already stored a lead with the same source URL.
    Duplicate,
}

/// Record store collaborator used by the pipeline.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Look up a lead by natural key.
    async fn find_by_key(&self, key: &LeadKey) -> Result<Option<Lead>>;

    /// Persist a new lead. A lead with the same source URL is left untouched.
    async fn insert(&self, lead: NewLead) -> Result<InsertOutcome>;

    /// Write back the mutable fields (email, website, pitched flag) of `lead`.
    async fn update(&self, lead: &Lead) -> Result<()>;

    /// Replace only the contact email of the lead with id `lead_id`, leaving
    /// every other column as currently stored.
    async fn set_email(&self, lead_id: &str, email: &ContactEmail) -> Result<()>;

    /// Leads whose email is still the pending sentinel.
    async fn query_pending_email(&self) -> Result<Vec<Lead>> {
        self.query_by_email(&[ContactEmail::Pending]).await
    }

    /// Leads whose stored email equals any of `emails`.
    async fn query_by_email(&self, emails: &[ContactEmail]) -> Result<Vec<Lead>>;

    /// Aggregate counts for reporting.
    async fn stats(&self) -> Result<LeadStats>;

    /// Add a catalog service with its description embedding.
    async fn insert_service(
        &self,
        name: &str,
        description: &str,
        embedding: Vec<f32>,
    ) -> Result<Service>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// libSQL-backed [`LeadStore`].
pub struct Storage {
    db: Database,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LeadHarvestError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for reporting only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LeadHarvestError::Storage(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        Ok(Self { db, readonly: true })
    }

    /// Open a fresh connection for one unit of work.
    async fn connect(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;
        Ok(conn)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let conn = self.connect().await?;
        let current_version = get_schema_version(&conn).await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                conn.execute_batch(migration.sql).await.map_err(|e| {
                    LeadHarvestError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    pub async fn schema_version(&self) -> Result<u32> {
        let conn = self.connect().await?;
        Ok(get_schema_version(&conn).await)
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LeadHarvestError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }
}

async fn get_schema_version(conn: &Connection) -> u32 {
    let result = conn
        .query("SELECT MAX(version) FROM schema_migrations", params![])
        .await;

    match result {
        Ok(mut rows) => {
            if let Ok(Some(row)) = rows.next().await {
                row.get::<u32>(0).unwrap_or(0)
            } else {
                0
            }
        }
        Err(_) => 0, // Table doesn't exist yet
    }
}

const LEAD_COLUMNS: &str = "id, company_name, description, source_url, website, contact_email, \
     embedding, is_pitched, created_at, updated_at";

#[async_trait]
impl LeadStore for Storage {
    async fn find_by_key(&self, key: &LeadKey) -> Result<Option<Lead>> {
        let sql = match key {
            LeadKey::Source(_) => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE source_url = ?1 LIMIT 1")
            }
            LeadKey::Website(_) => {
                format!("SELECT {LEAD_COLUMNS} FROM leads WHERE website = ?1 LIMIT 1")
            }
        };

        let conn = self.connect().await?;
        let mut rows = conn
            .query(&sql, params![key.as_str()])
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_lead(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(LeadHarvestError::Storage(e.to_string())),
        }
    }

    async fn insert(&self, lead: NewLead) -> Result<InsertOutcome> {
        self.check_writable()?;
        let lead = Lead::from_new(lead);
        let embedding = serde_json::to_string(&lead.embedding)
            .map_err(|e| LeadHarvestError::Storage(format!("embedding encode failed: {e}")))?;

        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "INSERT INTO leads (id, company_name, description, source_url, website,
                                    contact_email, embedding, is_pitched, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(source_url) DO NOTHING",
                params![
                    lead.id.as_str(),
                    lead.company_name.as_str(),
                    lead.description.as_str(),
                    lead.source_url.as_str(),
                    lead.website.as_deref(),
                    lead.contact_email.as_str(),
                    embedding,
                    0i64,
                    lead.created_at.to_rfc3339(),
                    lead.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        if affected == 0 {
            tracing::debug!(source_url = %lead.source_url, "insert lost to an existing row");
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted(lead))
    }

    async fn update(&self, lead: &Lead) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE leads SET contact_email = ?1, website = ?2, is_pitched = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                lead.contact_email.as_str(),
                lead.website.as_deref(),
                i64::from(lead.is_pitched),
                now.as_str(),
                lead.id.as_str(),
            ],
        )
        .await
        .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn set_email(&self, lead_id: &str, email: &ContactEmail) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let conn = self.connect().await?;
        let affected = conn
            .execute(
                "UPDATE leads SET contact_email = ?1, updated_at = ?2 WHERE id = ?3",
                params![email.as_str(), now.as_str(), lead_id],
            )
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(LeadHarvestError::Storage(format!("no lead with id {lead_id}")));
        }
        Ok(())
    }

    async fn query_by_email(&self, emails: &[ContactEmail]) -> Result<Vec<Lead>> {
        let conn = self.connect().await?;
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE contact_email = ?1 ORDER BY created_at"
        );

        let mut results = Vec::new();
        for email in emails {
            let mut rows = conn
                .query(&sql, params![email.as_str()])
                .await
                .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;
            while let Ok(Some(row)) = rows.next().await {
                results.push(row_to_lead(&row)?);
            }
        }
        Ok(results)
    }

    async fn stats(&self) -> Result<LeadStats> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN contact_email NOT IN (?1, ?2, ?3) THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN contact_email = ?1 THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN contact_email IN (?2, ?3) THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(is_pitched), 0)
                 FROM leads",
                params![
                    ContactEmail::PENDING,
                    ContactEmail::NOT_FOUND_HARVEST,
                    ContactEmail::NOT_FOUND_ENRICHMENT,
                ],
            )
            .await
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count = |idx: i32| -> u64 { row.get::<i64>(idx).unwrap_or(0).max(0) as u64 };
                Ok(LeadStats {
                    total: count(0),
                    with_email: count(1),
                    pending: count(2),
                    not_found: count(3),
                    pitched: count(4),
                })
            }
            Ok(None) => Ok(LeadStats::default()),
            Err(e) => Err(LeadHarvestError::Storage(e.to_string())),
        }
    }

    async fn insert_service(
        &self,
        name: &str,
        description: &str,
        embedding: Vec<f32>,
    ) -> Result<Service> {
        self.check_writable()?;
        let service = Service {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            embedding,
        };
        let encoded = serde_json::to_string(&service.embedding)
            .map_err(|e| LeadHarvestError::Storage(format!("embedding encode failed: {e}")))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO services (id, name, description, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                service.id.as_str(),
                service.name.as_str(),
                service.description.as_str(),
                encoded,
                now.as_str(),
            ],
        )
        .await
        .map_err(|e| LeadHarvestError::Storage(e.to_string()))?;
        Ok(service)
    }
}

/// Convert a database row to a [`Lead`].
fn row_to_lead(row: &libsql::Row) -> Result<Lead> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| LeadHarvestError::Storage(e.to_string()))
    };
    let timestamp = |idx: i32| -> Result<DateTime<Utc>> {
        let s = text(idx)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| LeadHarvestError::Storage(format!("invalid date: {e}")))
    };

    let embedding: Vec<f32> = serde_json::from_str(&text(6)?)
        .map_err(|e| LeadHarvestError::Storage(format!("invalid embedding: {e}")))?;

    Ok(Lead {
        id: text(0)?,
        company_name: text(1)?,
        description: text(2)?,
        source_url: text(3)?,
        website: leadharvest_shared::normalize_website(row.get::<String>(4).ok().as_deref()),
        contact_email: ContactEmail::from_stored(&text(5)?),
        embedding,
        is_pitched: row.get::<i64>(7).unwrap_or(0) != 0,
        created_at: timestamp(8)?,
        updated_at: timestamp(9)?,
    })
}

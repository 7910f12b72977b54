//! Append-only CSV log of leads with a discovered email.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::info;

use leadharvest_shared::{LeadHarvestError, NO_WEBSITE, Result};

/// Longest bio written to the export, in characters.
pub const EXPORT_BIO_CHARS: usize = 300;

#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Company")]
    company: &'a str,
    #[serde(rename = "Email")]
    email: &'a str,
    #[serde(rename = "Website")]
    website: &'a str,
    #[serde(rename = "Bio")]
    bio: String,
}

/// CSV file shared by every unit of a run.
///
/// Rows are appended under a lock so concurrent units never interleave
/// partial lines; the header is written only when the file is new or empty.
#[derive(Debug)]
pub struct ExportLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ExportLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row.
    pub fn append(
        &self,
        company: &str,
        email: &str,
        website: Option<&str>,
        bio: &str,
    ) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LeadHarvestError::Export("export lock poisoned".into()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LeadHarvestError::io(parent, e))?;
            }
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| LeadHarvestError::io(&self.path, e))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(ExportRow {
                company,
                email,
                website: website.unwrap_or(NO_WEBSITE),
                bio: bio.chars().take(EXPORT_BIO_CHARS).collect(),
            })
            .map_err(|e| LeadHarvestError::Export(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| LeadHarvestError::io(&self.path, e))?;

        info!(company, email, "exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_csv() -> PathBuf {
        std::env::temp_dir()
            .join(format!("lh-export-{}", uuid::Uuid::now_v7()))
            .join("inventory.csv")
    }

    #[test]
    fn header_written_once() {
        let path = temp_csv();
        let log = ExportLog::new(&path);
        log.append("Beta Payments", "press@beta.io", Some("https://beta.io"), "Payments")
            .unwrap();
        log.append("Gamma", "sales@gamma.dev", None, "Dev tools, \"fast\"")
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Company,Email,Website,Bio");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "Beta Payments,press@beta.io,https://beta.io,Payments");
        assert_eq!(lines[2], "Gamma,sales@gamma.dev,None,\"Dev tools, \"\"fast\"\"\"");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn reopening_appends_without_header() {
        let path = temp_csv();
        ExportLog::new(&path)
            .append("A", "a@a.io", None, "")
            .unwrap();
        ExportLog::new(&path)
            .append("B", "b@b.io", None, "")
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Company,Email").count(), 1);
        assert_eq!(content.lines().count(), 3);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn bio_is_truncated() {
        let path = temp_csv();
        let long_bio = "é".repeat(400);
        ExportLog::new(&path)
            .append("A", "a@a.io", None, &long_bio)
            .unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.get(3).unwrap().chars().count(), EXPORT_BIO_CHARS);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}

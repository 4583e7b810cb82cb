use crate::analysis::AnalysisResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub source_uri: Option<String>,
    pub result: AnalysisResult,
    pub note: String,
}

/// Destination for saved scans. Failures never block the scan reset.
#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn save(&self, entry: &JournalEntry) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct MarkdownJournal {
    path: PathBuf,
}

impl MarkdownJournal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &JournalEntry) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create journal parent directory {}",
                    parent.display()
                )
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open journal {}", self.path.display()))?;

        let token = entry.result.presentation();
        let band = entry.result.band();
        writeln!(file, "## Scan at {}", entry.timestamp.to_rfc3339())?;
        writeln!(
            file,
            "- Stress: {}% ({})",
            entry.result.stress_level,
            band.label()
        )?;
        writeln!(
            file,
            "- Mood: {} {} ({})",
            token.emoji(),
            token.descriptor(),
            entry.result.emotion_label
        )?;
        writeln!(
            file,
            "- Explanation: {}",
            entry.result.explanation.replace('\n', " ")
        )?;
        if let Some(uri) = &entry.source_uri {
            writeln!(file, "- Image: {uri}")?;
        }
        if !entry.note.trim().is_empty() {
            writeln!(file, "- Note: {}", entry.note.trim().replace('\n', " "))?;
        }
        writeln!(file)?;
        Ok(())
    }
}

#[async_trait]
impl JournalStore for MarkdownJournal {
    async fn save(&self, entry: &JournalEntry) -> Result<()> {
        self.append(entry)
    }
}

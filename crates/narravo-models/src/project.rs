//! Project model - one uploaded source document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::id::{ProjectId, UserId};

/// Supported source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProjectFileType {
    Txt,
    Md,
    Docx,
    Epub,
}

impl ProjectFileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectFileType::Txt => "txt",
            ProjectFileType::Md => "md",
            ProjectFileType::Docx => "docx",
            ProjectFileType::Epub => "epub",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Some(ProjectFileType::Txt),
            "md" => Some(ProjectFileType::Md),
            "docx" => Some(ProjectFileType::Docx),
            "epub" => Some(ProjectFileType::Epub),
            _ => None,
        }
    }
}

/// Project processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Source file uploaded, waiting for parsing
    #[default]
    Uploaded,
    /// Parser is running
    Parsing,
    /// Text hierarchy persisted
    Parsed,
    /// Downstream generation in progress
    Generating,
    /// All chapters completed
    Completed,
    /// Parsing or generation failed
    Failed,
    /// Archived; no further work is accepted
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Uploaded => "uploaded",
            ProjectStatus::Parsing => "parsing",
            ProjectStatus::Parsed => "parsed",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Failed => "failed",
            ProjectStatus::Archived => "archived",
        }
    }

    /// Archived is the single irreversible terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Archived)
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One uploaded document and its parse/generation lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub file_name: String,
    pub file_size: u64,
    pub file_type: ProjectFileType,
    /// Object-store key of the uploaded source document.
    pub file_path: String,
    /// Content hash of the uploaded bytes (hex).
    pub file_hash: String,
    pub status: ProjectStatus,
    /// Parse progress, 0-100.
    pub processing_progress: u8,
    #[serde(default)]
    pub error_message: Option<String>,
    pub chapter_count: u32,
    pub paragraph_count: u32,
    pub sentence_count: u32,
    pub word_count: u32,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        owner_id: UserId,
        title: impl Into<String>,
        file_name: impl Into<String>,
        file_size: u64,
        file_type: ProjectFileType,
        file_path: impl Into<String>,
        file_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ProjectId::new(),
            owner_id,
            title: title.into(),
            description: None,
            file_name: file_name.into(),
            file_size,
            file_type,
            file_path: file_path.into(),
            file_hash: file_hash.into(),
            status: ProjectStatus::Uploaded,
            processing_progress: 0,
            error_message: None,
            chapter_count: 0,
            paragraph_count: 0,
            sentence_count: 0,
            word_count: 0,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status/progress update.
    pub fn set_status(&mut self, status: ProjectStatus, progress: u8) {
        self.status = status;
        self.processing_progress = progress.min(100);
        if status == ProjectStatus::Parsed {
            self.error_message = None;
            self.completed_at = Some(Utc::now());
        }
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ProjectStatus::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Reset a failed project so parsing can run again.
    pub fn reset_for_retry(&mut self) {
        self.status = ProjectStatus::Uploaded;
        self.processing_progress = 0;
        self.error_message = None;
        self.completed_at = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        Project::new(
            UserId::new(),
            "novel",
            "novel.txt",
            1024,
            ProjectFileType::Txt,
            "uploads/u/20260801/x.txt",
            "deadbeef",
        )
    }

    #[test]
    fn parsed_clears_error_and_stamps_completion() {
        let mut p = project();
        p.mark_failed("boom");
        p.set_status(ProjectStatus::Parsed, 100);
        assert_eq!(p.status, ProjectStatus::Parsed);
        assert!(p.error_message.is_none());
        assert!(p.completed_at.is_some());
    }

    #[test]
    fn retry_resets_to_uploaded() {
        let mut p = project();
        p.mark_failed("boom");
        p.reset_for_retry();
        assert_eq!(p.status, ProjectStatus::Uploaded);
        assert_eq!(p.processing_progress, 0);
        assert!(p.error_message.is_none());
    }

    #[test]
    fn file_type_from_extension() {
        assert_eq!(ProjectFileType::from_extension("TXT"), Some(ProjectFileType::Txt));
        assert_eq!(ProjectFileType::from_extension("epub"), Some(ProjectFileType::Epub));
        assert_eq!(ProjectFileType::from_extension("pdf"), None);
    }
}

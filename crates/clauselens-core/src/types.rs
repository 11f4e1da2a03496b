//! Data model for ClauseLens

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// MIME types accepted for upload: PDF, DOC and DOCX.
pub const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Returns true if the declared MIME type is accepted for upload.
pub fn mime_supported(mime: &str) -> bool {
    SUPPORTED_MIME_TYPES.contains(&mime)
}

/// MIME type for serving a stored file, from its extension. Unknown
/// extensions fall back to `application/octet-stream`.
pub fn mime_for_filename(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

/// Analysis pipeline status of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Extracting,
    Classifying,
    Analyzing,
    Complete,
    Error,
}

impl AnalysisStatus {
    /// Terminal statuses admit no further stage transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Complete | AnalysisStatus::Error)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "pending"),
            AnalysisStatus::Extracting => write!(f, "extracting"),
            AnalysisStatus::Classifying => write!(f, "classifying"),
            AnalysisStatus::Analyzing => write!(f, "analyzing"),
            AnalysisStatus::Complete => write!(f, "complete"),
            AnalysisStatus::Error => write!(f, "error"),
        }
    }
}

/// An uploaded contract and its analysis state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub analysis_status: AnalysisStatus,
    /// 0-100, non-decreasing over the document's lifetime
    pub analysis_progress: i32,
}

/// One detected contract clause and its risk assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseFinding {
    pub id: String,
    pub category: String,
    pub excerpt: String,
    /// 0-10
    pub risk_score: i32,
    pub explanation: String,
    pub suggestions: Vec<String>,
}

/// Completed analysis result, keyed by its document's id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub document_id: String,
    pub clauses: Vec<ClauseFinding>,
    pub summary: String,
    /// 0.0-10.0
    pub overall_risk_score: f64,
    pub missing_clauses: Vec<String>,
    /// 0-100
    pub compliance_score: i32,
    pub completed_at: DateTime<Utc>,
}

/// Per-user profile, keyed by the identity provider's user id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub documents_analyzed: i64,
    pub tier: String,
}

/// Partial profile update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub tier: Option<String>,
}

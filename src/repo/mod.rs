pub mod sqlite;

pub use sqlite::SqliteDocumentRepository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::{Result, BolError};
use crate::extract::ExtractedFields;

/// Document processing lifecycle. Status only moves forward:
/// PENDING -> PROCESSING -> SUCCEEDED | FAILED, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "PROCESSING")]
    Processing,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "PENDING",
            ProcessingStatus::Processing => "PROCESSING",
            ProcessingStatus::Succeeded => "SUCCEEDED",
            ProcessingStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(ProcessingStatus::Pending),
            "PROCESSING" => Ok(ProcessingStatus::Processing),
            "SUCCEEDED" => Ok(ProcessingStatus::Succeeded),
            "FAILED" => Ok(ProcessingStatus::Failed),
            other => Err(BolError::StatusTransition(format!(
                "unknown processing status: {}",
                other
            ))),
        }
    }

    /// Whether a transition from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        matches!(
            (self, next),
            (ProcessingStatus::Pending, ProcessingStatus::Processing)
                | (ProcessingStatus::Processing, ProcessingStatus::Succeeded)
                | (ProcessingStatus::Processing, ProcessingStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Succeeded | ProcessingStatus::Failed)
    }
}

/// A durable BOL document record
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BolDocument {
    pub id: String,
    pub tenant_id: String,
    pub uploader_user_id: String,
    pub original_file_name: String,
    pub storage_ref: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_sha256: String,
    pub processing_status: ProcessingStatus,
    pub raw_ocr_text: Option<String>,
    pub extracted_fields: Option<ExtractedFields>,
    pub failure_reason: Option<String>,
    pub processing_duration_seconds: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields captured at document creation; tenant and uploader are immutable after this
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub tenant_id: String,
    pub uploader_user_id: String,
    pub original_file_name: String,
    pub storage_ref: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub content_sha256: String,
}

/// Association between a BOL document and a scheduling appointment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentLink {
    pub id: String,
    pub document_id: String,
    pub appointment_id: String,
    pub created_at: String,
}

/// Scheduling appointment (read-only collaborator record)
#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: String,
    pub facility_id: String,
}

/// Facility (read-only collaborator record); resolves an appointment's tenant
#[derive(Debug, Clone)]
pub struct Facility {
    pub id: String,
    pub tenant_id: String,
}

/// Persistence seam for the ingestion pipeline.
///
/// Injected explicitly into the pipeline and linker; errors from this trait
/// are the only fatal class during document processing.
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a new PENDING document and return the stored record
    async fn create_document(&self, new: NewDocument) -> Result<BolDocument>;

    /// PENDING -> PROCESSING
    async fn mark_processing(&self, document_id: &str) -> Result<()>;

    /// PROCESSING -> SUCCEEDED with OCR text, extracted fields and duration
    async fn complete_document(
        &self,
        document_id: &str,
        raw_ocr_text: &str,
        fields: &ExtractedFields,
        duration_seconds: f64,
    ) -> Result<()>;

    /// PROCESSING -> FAILED with a failure reason and duration; fields stay empty
    async fn fail_document(
        &self,
        document_id: &str,
        reason: &str,
        duration_seconds: f64,
    ) -> Result<()>;

    async fn get_document(&self, document_id: &str) -> Result<Option<BolDocument>>;

    async fn create_link(
        &self,
        document_id: &str,
        appointment_id: &str,
    ) -> Result<AppointmentLink>;

    async fn find_link(
        &self,
        document_id: &str,
        appointment_id: &str,
    ) -> Result<Option<AppointmentLink>>;

    async fn documents_for_appointment(&self, appointment_id: &str) -> Result<Vec<BolDocument>>;

    async fn appointment_by_id(&self, appointment_id: &str) -> Result<Option<Appointment>>;

    async fn facility_by_id(&self, facility_id: &str) -> Result<Option<Facility>>;
}

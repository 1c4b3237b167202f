//! Upload-to-terminal-state orchestration for BOL documents.

use std::sync::Arc;

use uuid::Uuid;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::UploadsConfig;
use crate::error::{Result, BolError};
use crate::extract::{ExtractedFields, FieldExtractor};
use crate::link::{AppointmentLinker, RequesterRole};
use crate::ocr::{OcrCallOutcome, OcrInvoker};
use crate::repo::{BolDocument, DocumentRepository, NewDocument, ProcessingStatus};

/// One upload as received from the outer surface
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub tenant_id: String,
    pub user_id: String,
    /// When set, the document is linked to this appointment after processing
    pub appointment_id: Option<String>,
    pub requester_role: RequesterRole,
}

/// Result of one ingestion run. The document always exists and always sits
/// in a terminal state by the time this is returned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOutcome {
    pub document_id: String,
    pub status: ProcessingStatus,
    pub extracted_fields: Option<ExtractedFields>,
    pub failure_reason: Option<String>,
    pub processing_duration_seconds: f64,
    /// Present only when a link was requested and succeeded
    pub link_id: Option<String>,
}

struct ProcessingPhase {
    status: ProcessingStatus,
    extracted_fields: Option<ExtractedFields>,
    failure_reason: Option<String>,
    duration_seconds: f64,
}

/// The ingestion pipeline: validate, persist, recognize, extract, finalize.
///
/// OCR failure is part of the normal lifecycle and lands the document in
/// FAILED; only persistence errors propagate to the caller. The OCR and
/// finalize steps run in a spawned task so a caller that stops awaiting
/// cannot strand a document in PROCESSING.
pub struct IngestionPipeline {
    repo: Arc<dyn DocumentRepository>,
    invoker: Arc<OcrInvoker>,
    extractor: Arc<FieldExtractor>,
    linker: AppointmentLinker,
    limits: UploadsConfig,
}

impl IngestionPipeline {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        invoker: OcrInvoker,
        limits: UploadsConfig,
    ) -> Self {
        let linker = AppointmentLinker::new(repo.clone());
        Self {
            repo,
            invoker: Arc::new(invoker),
            extractor: Arc::new(FieldExtractor::new()),
            linker,
            limits,
        }
    }

    /// Reject bad uploads before any row is written
    fn validate(&self, request: &UploadRequest) -> Result<()> {
        if request.bytes.is_empty() {
            return Err(BolError::InvalidInput("uploaded file is empty".to_string()));
        }

        if request.bytes.len() > self.limits.max_size_bytes {
            return Err(BolError::InvalidInput(format!(
                "file size {} exceeds the {} byte limit",
                request.bytes.len(),
                self.limits.max_size_bytes
            )));
        }

        if !self
            .limits
            .allowed_mime_types
            .iter()
            .any(|m| m.eq_ignore_ascii_case(&request.mime_type))
        {
            return Err(BolError::InvalidInput(format!(
                "unsupported mime type: {}",
                request.mime_type
            )));
        }

        Ok(())
    }

    /// Ingest one upload end to end.
    ///
    /// Returns once the document has reached SUCCEEDED or FAILED and any
    /// requested appointment link has been attempted. Link failures are
    /// logged and reported as an absent `link_id`, never as an error: the
    /// processed document is the durable result either way.
    pub async fn process(&self, request: UploadRequest) -> Result<ProcessOutcome> {
        self.validate(&request)?;

        let content_sha256 = format!("{:x}", Sha256::digest(&request.bytes));
        let storage_ref = format!("uploads/{}/{}", Uuid::new_v4(), request.file_name);

        let document = self
            .repo
            .create_document(NewDocument {
                tenant_id: request.tenant_id.clone(),
                uploader_user_id: request.user_id.clone(),
                original_file_name: request.file_name.clone(),
                storage_ref,
                mime_type: request.mime_type.clone(),
                size_bytes: request.bytes.len() as i64,
                content_sha256,
            })
            .await?;

        log::info!(
            "document {} created for tenant {} ({} bytes)",
            document.id,
            document.tenant_id,
            document.size_bytes
        );

        // Spawned so the document cannot be stranded in PROCESSING if the
        // caller's future is dropped mid-flight
        let repo = self.repo.clone();
        let invoker = self.invoker.clone();
        let extractor = self.extractor.clone();
        let document_id = document.id.clone();
        let payload = request.bytes;

        let phase = tokio::spawn(async move {
            run_processing_phase(repo, invoker, extractor, &document_id, &payload).await
        })
        .await
        .map_err(|e| BolError::Ocr(format!("processing task aborted: {}", e)))??;

        let link_id = match &request.appointment_id {
            Some(appointment_id) => {
                match self
                    .linker
                    .link(
                        &document.id,
                        appointment_id,
                        &request.tenant_id,
                        request.requester_role,
                    )
                    .await
                {
                    Ok(link) => Some(link.id),
                    Err(e) => {
                        log::warn!(
                            "linking document {} to appointment {} failed: {}",
                            document.id,
                            appointment_id,
                            e
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(ProcessOutcome {
            document_id: document.id,
            status: phase.status,
            extracted_fields: phase.extracted_fields,
            failure_reason: phase.failure_reason,
            processing_duration_seconds: phase.duration_seconds,
            link_id,
        })
    }

    /// Link an existing document to an appointment
    pub async fn link(
        &self,
        document_id: &str,
        appointment_id: &str,
        requester_tenant_id: &str,
        requester_role: RequesterRole,
    ) -> Result<crate::repo::AppointmentLink> {
        self.linker
            .link(document_id, appointment_id, requester_tenant_id, requester_role)
            .await
    }

    /// All documents linked to an appointment, newest first
    pub async fn documents_for_appointment(
        &self,
        appointment_id: &str,
    ) -> Result<Vec<BolDocument>> {
        self.repo.documents_for_appointment(appointment_id).await
    }

    /// Probe the OCR backend
    pub async fn ocr_health(&self) -> Result<()> {
        self.invoker.health().await
    }
}

async fn run_processing_phase(
    repo: Arc<dyn DocumentRepository>,
    invoker: Arc<OcrInvoker>,
    extractor: Arc<FieldExtractor>,
    document_id: &str,
    payload: &[u8],
) -> Result<ProcessingPhase> {
    repo.mark_processing(document_id).await?;

    let report = invoker.recognize(payload).await;
    let duration_seconds = report.duration.as_secs_f64();

    match report.outcome {
        OcrCallOutcome::Success(output) => {
            let fields = extractor.extract(&output.text, &output.tables);
            repo.complete_document(document_id, &output.text, &fields, duration_seconds)
                .await?;
            log::info!(
                "document {} processed in {:.2}s",
                document_id,
                duration_seconds
            );
            Ok(ProcessingPhase {
                status: ProcessingStatus::Succeeded,
                extracted_fields: Some(fields),
                failure_reason: None,
                duration_seconds,
            })
        }
        OcrCallOutcome::Failure { reason } => {
            repo.fail_document(document_id, &reason, duration_seconds)
                .await?;
            log::warn!("document {} failed OCR: {}", document_id, reason);
            Ok(ProcessingPhase {
                status: ProcessingStatus::Failed,
                extracted_fields: None,
                failure_reason: Some(reason),
                duration_seconds,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::error::BolError;
    use crate::ocr::{OcrClient, OcrOutput, OcrTable, RetryPolicy};
    use crate::repo::SqliteDocumentRepository;
    use async_trait::async_trait;
    use rusqlite::params;
    use std::time::Duration;
    use tempfile::TempDir;

    struct FixedClient {
        text: Option<String>,
        tables: Vec<OcrTable>,
    }

    impl FixedClient {
        fn succeeding(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                tables: Vec::new(),
            }
        }

        fn failing() -> Self {
            Self {
                text: None,
                tables: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl OcrClient for FixedClient {
        async fn recognize(&self, _payload: &[u8]) -> crate::error::Result<OcrOutput> {
            match &self.text {
                Some(text) => Ok(OcrOutput {
                    text: text.clone(),
                    tables: self.tables.clone(),
                    ..OcrOutput::default()
                }),
                None => Err(BolError::Ocr("backend down".to_string())),
            }
        }

        async fn health(&self) -> crate::error::Result<()> {
            Ok(())
        }
    }

    async fn seed_appointment(
        repo: &SqliteDocumentRepository,
        appointment_id: &str,
        facility_id: &str,
        tenant_id: &str,
    ) {
        let appointment_id = appointment_id.to_string();
        let facility_id = facility_id.to_string();
        let tenant_id = tenant_id.to_string();
        repo.db()
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO facilities (id, tenant_id) VALUES (?1, ?2)",
                    params![facility_id, tenant_id],
                )?;
                conn.execute(
                    "INSERT INTO appointments (id, facility_id) VALUES (?1, ?2)",
                    params![appointment_id, facility_id],
                )?;
                Ok::<(), BolError>(())
            })
            .await
            .unwrap();
    }

    async fn pipeline_with(client: FixedClient) -> (IngestionPipeline, Arc<SqliteDocumentRepository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Arc::new(SqliteDocumentRepository::new(Db::new(
            temp_dir.path().join("test.db"),
        )));
        repo.migrate().await.unwrap();

        let invoker = OcrInvoker::with_budgets(
            Arc::new(client),
            Duration::from_secs(5),
            Duration::from_secs(30),
            256 * 1024,
            RetryPolicy {
                max_retries: 0,
                backoff: Duration::from_millis(1),
            },
        );

        let pipeline = IngestionPipeline::new(
            repo.clone() as Arc<dyn DocumentRepository>,
            invoker,
            UploadsConfig::default(),
        );
        (pipeline, repo, temp_dir)
    }

    fn upload(bytes: &[u8], mime: &str) -> UploadRequest {
        UploadRequest {
            bytes: bytes.to_vec(),
            file_name: "bol.pdf".to_string(),
            mime_type: mime.to_string(),
            tenant_id: "tenant-1".to_string(),
            user_id: "user-1".to_string(),
            appointment_id: None,
            requester_role: RequesterRole::Member,
        }
    }

    #[tokio::test]
    async fn test_successful_run_reaches_succeeded() {
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::succeeding(
            "BOL Number: BL-77821\nCarrier: Acme Freight",
        ))
        .await;

        let outcome = pipeline.process(upload(b"%PDF-1.4", "application/pdf")).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Succeeded);
        assert!(outcome.failure_reason.is_none());
        let fields = outcome.extracted_fields.unwrap();
        assert_eq!(fields.bol_number.as_deref(), Some("BL-77821"));
        assert_eq!(fields.carrier.as_deref(), Some("Acme Freight"));

        let stored = repo.get_document(&outcome.document_id).await.unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Succeeded);
        assert!(stored.raw_ocr_text.unwrap().contains("BL-77821"));
    }

    #[tokio::test]
    async fn test_ocr_failure_reaches_failed_not_error() {
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::failing()).await;

        let outcome = pipeline.process(upload(b"%PDF-1.4", "application/pdf")).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert!(outcome.extracted_fields.is_none());
        assert!(outcome.failure_reason.unwrap().contains("backend down"));
        assert!(outcome.processing_duration_seconds >= 0.0);

        let stored = repo.get_document(&outcome.document_id).await.unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Failed);
        assert!(stored.extracted_fields.is_none());
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_row() {
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::succeeding("irrelevant")).await;

        for request in [
            upload(b"", "application/pdf"),
            upload(b"data", "application/zip"),
            upload(&vec![0u8; 11 * 1024 * 1024], "application/pdf"),
        ] {
            let err = pipeline.process(request).await.unwrap_err();
            assert!(matches!(err, BolError::InvalidInput(_)));
        }

        // No document rows were created by the rejected uploads
        let count: i64 = repo
            .db()
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM bol_documents", [], |row| row.get(0))
                    .map_err(BolError::Database)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_content_hash_recorded() {
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::succeeding("text")).await;

        let outcome = pipeline.process(upload(b"same bytes", "image/png")).await.unwrap();
        let stored = repo.get_document(&outcome.document_id).await.unwrap().unwrap();
        // sha256 of the payload, hex-encoded
        assert_eq!(stored.content_sha256.len(), 64);

        // Identical content on a second upload carries the same hash but a
        // distinct document row
        let second = pipeline.process(upload(b"same bytes", "image/png")).await.unwrap();
        let stored_second = repo.get_document(&second.document_id).await.unwrap().unwrap();
        assert_eq!(stored.content_sha256, stored_second.content_sha256);
        assert_ne!(stored.id, stored_second.id);
    }

    #[tokio::test]
    async fn test_link_failure_is_absorbed() {
        let (pipeline, _repo, _tmp) = pipeline_with(FixedClient::succeeding("text")).await;

        let mut request = upload(b"data", "application/pdf");
        request.appointment_id = Some("no-such-appointment".to_string());

        let outcome = pipeline.process(request).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Succeeded);
        assert!(outcome.link_id.is_none());
    }

    #[tokio::test]
    async fn test_upload_with_link_lands_in_appointment_query() {
        let (pipeline, repo, _tmp) =
            pipeline_with(FixedClient::succeeding("BOL Number: BL-77821")).await;
        seed_appointment(&repo, "appt-1", "fac-1", "tenant-1").await;

        let mut request = upload(b"%PDF-1.4", "application/pdf");
        request.appointment_id = Some("appt-1".to_string());

        let outcome = pipeline.process(request).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Succeeded);
        assert!(outcome.link_id.is_some());

        let docs = pipeline.documents_for_appointment("appt-1").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, outcome.document_id);
    }

    #[tokio::test]
    async fn test_cross_tenant_link_absorbed_but_document_survives() {
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::succeeding("text")).await;
        seed_appointment(&repo, "appt-1", "fac-1", "tenant-other").await;

        let mut request = upload(b"data", "application/pdf");
        request.appointment_id = Some("appt-1".to_string());

        let outcome = pipeline.process(request).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Succeeded);
        assert!(outcome.link_id.is_none());

        // The processed document persists even though the link was denied
        let stored = repo.get_document(&outcome.document_id).await.unwrap().unwrap();
        assert_eq!(stored.processing_status, ProcessingStatus::Succeeded);
        assert!(pipeline.documents_for_appointment("appt-1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_failed_document_afterwards() {
        // A FAILED document can still be linked for manual review
        let (pipeline, repo, _tmp) = pipeline_with(FixedClient::failing()).await;
        seed_appointment(&repo, "appt-1", "fac-1", "tenant-1").await;

        let outcome = pipeline.process(upload(b"data", "application/pdf")).await.unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Failed);

        let link = pipeline
            .link(&outcome.document_id, "appt-1", "tenant-1", RequesterRole::Member)
            .await
            .unwrap();
        assert_eq!(link.document_id, outcome.document_id);
    }

    #[tokio::test]
    async fn test_table_fallback_through_pipeline() {
        let client = FixedClient {
            text: Some("totals attached below".to_string()),
            tables: vec![OcrTable {
                rows: vec![
                    vec!["Trailer".to_string(), "TR-9911".to_string()],
                    vec!["Carrier".to_string(), "Acme Freight".to_string()],
                ],
            }],
        };
        let (pipeline, _repo, _tmp) = pipeline_with(client).await;

        let outcome = pipeline.process(upload(b"data", "application/pdf")).await.unwrap();
        let fields = outcome.extracted_fields.unwrap();
        assert_eq!(fields.trailer_number.as_deref(), Some("TR-9911"));
        assert_eq!(fields.carrier.as_deref(), Some("Acme Freight"));
    }
}

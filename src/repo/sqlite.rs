use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{Result, BolError};
use crate::extract::ExtractedFields;
use super::{
    Appointment, AppointmentLink, BolDocument, DocumentRepository, Facility, NewDocument,
    ProcessingStatus,
};

const DOCUMENT_COLUMNS: &str = "id, tenant_id, uploader_user_id, original_file_name, \
     storage_ref, mime_type, size_bytes, content_sha256, processing_status, raw_ocr_text, \
     extracted_fields, failure_reason, processing_duration_seconds, created_at, updated_at";

/// SQLite-backed repository used by the pipeline and the CLI.
///
/// Tests and other transports may substitute their own [`DocumentRepository`]
/// implementation; the pipeline only sees the trait.
pub struct SqliteDocumentRepository {
    db: Db,
}

impl SqliteDocumentRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Run embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        self.db
            .with_connection(|conn| crate::db::migrate::run_migrations(conn))
            .await
    }

    /// Access the underlying database (test fixtures insert collaborator rows)
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Move a document's status forward, verifying the expected current state
    /// inside the UPDATE itself. A zero-row update means either the document
    /// is missing or a transition rule was violated; both are fatal.
    async fn transition(
        &self,
        document_id: &str,
        expected: ProcessingStatus,
        set_sql: &'static str,
        set_params: Vec<Box<dyn rusqlite::ToSql + Send>>,
    ) -> Result<()> {
        let id = document_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "UPDATE bol_documents SET {}, updated_at = ? WHERE id = ? AND processing_status = ?",
                    set_sql
                );
                let mut values: Vec<&dyn rusqlite::ToSql> =
                    set_params.iter().map(|p| p.as_ref() as &dyn rusqlite::ToSql).collect();
                values.push(&now);
                values.push(&id);
                let expected_str = expected.as_str();
                values.push(&expected_str);

                let changed = conn.execute(&sql, values.as_slice())?;
                if changed == 1 {
                    return Ok(());
                }

                // Distinguish a missing row from an illegal transition
                let current: Option<String> = conn
                    .query_row(
                        "SELECT processing_status FROM bol_documents WHERE id = ?1",
                        params![id],
                        |row| row.get(0),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                match current {
                    None => Err(BolError::NotFound(format!("document {}", id))),
                    Some(status) => Err(BolError::StatusTransition(format!(
                        "document {} is {}, expected {}",
                        id,
                        status,
                        expected.as_str()
                    ))),
                }
            })
            .await
    }
}

fn map_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BolDocument> {
    let status_str: String = row.get(8)?;
    let status = ProcessingStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let fields_json: Option<String> = row.get(10)?;
    let extracted_fields = match fields_json {
        Some(json) => Some(serde_json::from_str::<ExtractedFields>(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(10, rusqlite::types::Type::Text, Box::new(e))
        })?),
        None => None,
    };

    Ok(BolDocument {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        uploader_user_id: row.get(2)?,
        original_file_name: row.get(3)?,
        storage_ref: row.get(4)?,
        mime_type: row.get(5)?,
        size_bytes: row.get(6)?,
        content_sha256: row.get(7)?,
        processing_status: status,
        raw_ocr_text: row.get(9)?,
        extracted_fields,
        failure_reason: row.get(11)?,
        processing_duration_seconds: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

#[async_trait]
impl DocumentRepository for SqliteDocumentRepository {
    async fn create_document(&self, new: NewDocument) -> Result<BolDocument> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let document = BolDocument {
            id: id.clone(),
            tenant_id: new.tenant_id,
            uploader_user_id: new.uploader_user_id,
            original_file_name: new.original_file_name,
            storage_ref: new.storage_ref,
            mime_type: new.mime_type,
            size_bytes: new.size_bytes,
            content_sha256: new.content_sha256,
            processing_status: ProcessingStatus::Pending,
            raw_ocr_text: None,
            extracted_fields: None,
            failure_reason: None,
            processing_duration_seconds: 0.0,
            created_at: now.clone(),
            updated_at: now,
        };

        let row = document.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO bol_documents (
                        id, tenant_id, uploader_user_id, original_file_name, storage_ref,
                        mime_type, size_bytes, content_sha256, processing_status,
                        processing_duration_seconds, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        row.id,
                        row.tenant_id,
                        row.uploader_user_id,
                        row.original_file_name,
                        row.storage_ref,
                        row.mime_type,
                        row.size_bytes,
                        row.content_sha256,
                        row.processing_status.as_str(),
                        row.processing_duration_seconds,
                        row.created_at,
                        row.updated_at,
                    ],
                )?;
                Ok::<(), BolError>(())
            })
            .await?;

        Ok(document)
    }

    async fn mark_processing(&self, document_id: &str) -> Result<()> {
        self.transition(
            document_id,
            ProcessingStatus::Pending,
            "processing_status = 'PROCESSING'",
            Vec::new(),
        )
        .await
    }

    async fn complete_document(
        &self,
        document_id: &str,
        raw_ocr_text: &str,
        fields: &ExtractedFields,
        duration_seconds: f64,
    ) -> Result<()> {
        let fields_json = serde_json::to_string(fields)?;
        self.transition(
            document_id,
            ProcessingStatus::Processing,
            "processing_status = 'SUCCEEDED', raw_ocr_text = ?, extracted_fields = ?, \
             processing_duration_seconds = ?",
            vec![
                Box::new(raw_ocr_text.to_string()),
                Box::new(fields_json),
                Box::new(duration_seconds),
            ],
        )
        .await
    }

    async fn fail_document(
        &self,
        document_id: &str,
        reason: &str,
        duration_seconds: f64,
    ) -> Result<()> {
        self.transition(
            document_id,
            ProcessingStatus::Processing,
            "processing_status = 'FAILED', failure_reason = ?, processing_duration_seconds = ?",
            vec![Box::new(reason.to_string()), Box::new(duration_seconds)],
        )
        .await
    }

    async fn get_document(&self, document_id: &str) -> Result<Option<BolDocument>> {
        let id = document_id.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!("SELECT {} FROM bol_documents WHERE id = ?1", DOCUMENT_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query_map(params![id], map_document_row)?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn create_link(
        &self,
        document_id: &str,
        appointment_id: &str,
    ) -> Result<AppointmentLink> {
        let link = AppointmentLink {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            appointment_id: appointment_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
        };

        let row = link.clone();
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO appointment_links (id, document_id, appointment_id, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![row.id, row.document_id, row.appointment_id, row.created_at],
                )?;
                Ok::<(), BolError>(())
            })
            .await?;

        Ok(link)
    }

    async fn find_link(
        &self,
        document_id: &str,
        appointment_id: &str,
    ) -> Result<Option<AppointmentLink>> {
        let doc_id = document_id.to_string();
        let appt_id = appointment_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document_id, appointment_id, created_at
                     FROM appointment_links WHERE document_id = ?1 AND appointment_id = ?2",
                )?;
                let mut rows = stmt.query_map(params![doc_id, appt_id], |row| {
                    Ok(AppointmentLink {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        appointment_id: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn documents_for_appointment(&self, appointment_id: &str) -> Result<Vec<BolDocument>> {
        let appt_id = appointment_id.to_string();
        self.db
            .with_connection(move |conn| {
                let sql = format!(
                    "SELECT {} FROM bol_documents d
                     JOIN appointment_links l ON l.document_id = d.id
                     WHERE l.appointment_id = ?1
                     ORDER BY d.created_at DESC",
                    DOCUMENT_COLUMNS
                        .split(", ")
                        .map(|c| format!("d.{}", c))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![appt_id], map_document_row)?;
                let mut documents = Vec::new();
                for row in rows {
                    documents.push(row?);
                }
                Ok(documents)
            })
            .await
    }

    async fn appointment_by_id(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        let id = appointment_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, facility_id FROM appointments WHERE id = ?1")?;
                let mut rows = stmt.query_map(params![id], |row| {
                    Ok(Appointment {
                        id: row.get(0)?,
                        facility_id: row.get(1)?,
                    })
                })?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn facility_by_id(&self, facility_id: &str) -> Result<Option<Facility>> {
        let id = facility_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT id, tenant_id FROM facilities WHERE id = ?1")?;
                let mut rows = stmt.query_map(params![id], |row| {
                    Ok(Facility {
                        id: row.get(0)?,
                        tenant_id: row.get(1)?,
                    })
                })?;
                match rows.next() {
                    Some(row) => Ok(Some(row?)),
                    None => Ok(None),
                }
            })
            .await
    }
}

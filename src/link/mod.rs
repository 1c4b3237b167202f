//! Document ↔ appointment linking under tenant isolation.

use std::sync::Arc;

use crate::error::{Result, BolError};
use crate::repo::{AppointmentLink, DocumentRepository};

/// Capability of the requester performing a linking call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequesterRole {
    /// Ordinary tenant member; confined to their own tenant
    Member,
    /// Elevated capability: may link across tenants
    SuperAdmin,
}

/// Resolves an appointment's owning tenant and authorizes linking requests.
///
/// Resolution chain: appointment → facility → tenant. A missing appointment
/// or facility is `NotFound`; a tenant mismatch is `Forbidden` and logged as
/// a security event, never silently dropped.
pub struct TenantGuard {
    repo: Arc<dyn DocumentRepository>,
}

impl TenantGuard {
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        Self { repo }
    }

    /// Authorize a requester against the appointment's resolved tenant
    pub async fn authorize(
        &self,
        appointment_id: &str,
        requester_tenant_id: &str,
        requester_role: RequesterRole,
    ) -> Result<()> {
        let appointment = self
            .repo
            .appointment_by_id(appointment_id)
            .await?
            .ok_or_else(|| BolError::NotFound(format!("appointment {}", appointment_id)))?;

        let facility = self
            .repo
            .facility_by_id(&appointment.facility_id)
            .await?
            .ok_or_else(|| {
                BolError::NotFound(format!(
                    "facility {} for appointment {}",
                    appointment.facility_id, appointment_id
                ))
            })?;

        if requester_role == RequesterRole::SuperAdmin {
            return Ok(());
        }

        if facility.tenant_id != requester_tenant_id {
            log::warn!(
                "security: tenant {} denied link to appointment {} owned by tenant {}",
                requester_tenant_id,
                appointment_id,
                facility.tenant_id
            );
            return Err(BolError::Forbidden(format!(
                "appointment {} belongs to another tenant",
                appointment_id
            )));
        }

        Ok(())
    }
}

/// Idempotent creation of document↔appointment links, gated by [`TenantGuard`].
pub struct AppointmentLinker {
    repo: Arc<dyn DocumentRepository>,
    guard: TenantGuard,
}

impl AppointmentLinker {
    pub fn new(repo: Arc<dyn DocumentRepository>) -> Self {
        let guard = TenantGuard::new(repo.clone());
        Self { repo, guard }
    }

    /// Link a document to an appointment.
    ///
    /// Fails with `NotFound` if either side is missing and `Forbidden` on a
    /// tenant mismatch without the super-admin capability. Calling again for
    /// an already-linked pair returns the existing record.
    pub async fn link(
        &self,
        document_id: &str,
        appointment_id: &str,
        requester_tenant_id: &str,
        requester_role: RequesterRole,
    ) -> Result<AppointmentLink> {
        // Document existence first so a bad document id reads as NotFound,
        // not as an authorization problem
        self.repo
            .get_document(document_id)
            .await?
            .ok_or_else(|| BolError::NotFound(format!("document {}", document_id)))?;

        self.guard
            .authorize(appointment_id, requester_tenant_id, requester_role)
            .await?;

        if let Some(existing) = self.repo.find_link(document_id, appointment_id).await? {
            log::debug!(
                "link for document {} and appointment {} already exists",
                document_id,
                appointment_id
            );
            return Ok(existing);
        }

        let link = self.repo.create_link(document_id, appointment_id).await?;
        log::info!(
            "linked document {} to appointment {} ({})",
            document_id,
            appointment_id,
            link.id
        );
        Ok(link)
    }
}

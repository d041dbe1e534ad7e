//! Prescription flows — consultation link validation, per-patient numbering,
//! immutable creation timestamp.

use chrono::Local;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::{Prescription, PrescriptionFilter};
use crate::patients::{resolve_patient_ref, PatientRef};
use crate::sequence::{allocate, SequenceKind};
use crate::validation::{require_non_blank, FieldError, SaveError};

/// A prescription as submitted by a form; numero and creation timestamp are
/// system-assigned at first save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionDraft {
    pub patient: PatientRef,
    /// Optional link to one of the patient's consultations.
    pub consultation_id: Option<Uuid>,
    pub body: String,
}

/// Editable fields of an existing prescription. The patient, the numero and
/// the creation timestamp are fixed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionUpdate {
    pub consultation_id: Option<Uuid>,
    pub body: String,
}

/// The linked consultation must exist, belong to the same patient, and not
/// already carry another prescription.
fn check_consultation_link(
    conn: &Connection,
    errors: &mut Vec<FieldError>,
    patient_id: &Uuid,
    consultation_id: Option<&Uuid>,
    exclude_prescription: Option<&Uuid>,
) -> Result<(), DatabaseError> {
    let Some(consultation_id) = consultation_id else {
        return Ok(());
    };

    match repository::get_consultation(conn, consultation_id) {
        Ok(consultation) if consultation.patient_id != *patient_id => {
            errors.push(FieldError::new(
                "consultation",
                "The selected consultation belongs to another patient.",
            ));
            return Ok(());
        }
        Ok(_) => {}
        Err(DatabaseError::NotFound { .. }) => {
            errors.push(FieldError::new("consultation", "Unknown consultation."));
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    if let Some(existing) = repository::prescription_for_consultation(conn, consultation_id)? {
        if exclude_prescription != Some(&existing.id) {
            errors.push(FieldError::new(
                "consultation",
                "This consultation already has a prescription.",
            ));
        }
    }
    Ok(())
}

/// Create a prescription: resolve the patient, validate body and link, then
/// number the record inside the allocator's transaction.
pub fn create_prescription(
    conn: &mut Connection,
    draft: &PrescriptionDraft,
) -> Result<Prescription, SaveError> {
    let patient_id = resolve_patient_ref(conn, &draft.patient)?;

    let mut errors = Vec::new();
    require_non_blank(&mut errors, "body", &draft.body);
    check_consultation_link(
        conn,
        &mut errors,
        &patient_id,
        draft.consultation_id.as_ref(),
        None,
    )?;
    SaveError::from_errors(errors)?;

    let created_at = Local::now().naive_local();
    let prescription = allocate(conn, SequenceKind::Prescription, &patient_id, |tx, numero| {
        let rx = Prescription {
            id: Uuid::new_v4(),
            patient_id,
            consultation_id: draft.consultation_id,
            numero,
            body: draft.body.clone(),
            created_at,
        };
        repository::insert_prescription(tx, &rx)?;
        Ok(rx)
    })?;

    tracing::debug!(
        prescription = %prescription.id,
        numero = prescription.numero,
        "prescription created"
    );
    Ok(prescription)
}

/// Update body and consultation link of an existing prescription.
pub fn update_prescription(
    conn: &Connection,
    id: &Uuid,
    update: &PrescriptionUpdate,
) -> Result<Prescription, SaveError> {
    let existing = repository::get_prescription(conn, id)?;

    let mut errors = Vec::new();
    require_non_blank(&mut errors, "body", &update.body);
    check_consultation_link(
        conn,
        &mut errors,
        &existing.patient_id,
        update.consultation_id.as_ref(),
        Some(id),
    )?;
    SaveError::from_errors(errors)?;

    let prescription = Prescription {
        id: existing.id,
        patient_id: existing.patient_id,
        consultation_id: update.consultation_id,
        numero: existing.numero,
        body: update.body.clone(),
        created_at: existing.created_at,
    };
    repository::update_prescription(conn, &prescription)?;
    Ok(prescription)
}

pub fn delete_prescription(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    repository::delete_prescription(conn, id)?;
    tracing::info!(prescription = %id, "prescription deleted");
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Prescription, DatabaseError> {
    repository::get_prescription(conn, id)
}

pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    repository::list_prescriptions(conn, filter)
}

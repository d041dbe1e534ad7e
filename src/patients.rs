//! Patient flows — creation, edition, deletion, list filters, and the
//! inline "new patient from a consultation form" path.

use chrono::{Local, NaiveDate};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::Sex;
use crate::models::{Patient, PatientFilter};
use crate::validation::{check_email, require_non_blank, FieldError, SaveError};

/// Patient fields as submitted by a form; everything system-managed
/// (id, creation timestamp) is absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientDraft {
    pub surname: String,
    pub given_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub profession: Option<String>,
    pub notes: Option<String>,
}

/// How a consultation or prescription form designates its patient: an
/// existing record, or a minimal patient created inline from the typed name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientRef {
    Existing(Uuid),
    New {
        surname: String,
        given_name: Option<String>,
    },
}

fn validate_draft(draft: &PatientDraft) -> Result<(), SaveError> {
    let mut errors = Vec::new();
    require_non_blank(&mut errors, "surname", &draft.surname);
    check_email(&mut errors, "email", draft.email.as_deref());
    SaveError::from_errors(errors)
}

fn patient_from_draft(draft: &PatientDraft) -> Patient {
    Patient {
        id: Uuid::new_v4(),
        surname: draft.surname.trim().to_string(),
        given_name: draft.given_name.clone(),
        birth_date: draft.birth_date,
        sex: draft.sex,
        phone: draft.phone.clone(),
        email: draft.email.clone(),
        address: draft.address.clone(),
        profession: draft.profession.clone(),
        notes: draft.notes.clone(),
        created_at: Local::now().naive_local(),
    }
}

pub fn create_patient(conn: &Connection, draft: &PatientDraft) -> Result<Patient, SaveError> {
    validate_draft(draft)?;
    let patient = patient_from_draft(draft);
    repository::insert_patient(conn, &patient)?;
    tracing::debug!(patient = %patient.id, "patient created");
    Ok(patient)
}

/// Apply a draft to an existing patient. The creation timestamp survives.
pub fn update_patient(
    conn: &Connection,
    id: &Uuid,
    draft: &PatientDraft,
) -> Result<Patient, SaveError> {
    validate_draft(draft)?;
    let existing = repository::get_patient(conn, id)?;
    let patient = Patient {
        id: existing.id,
        created_at: existing.created_at,
        ..patient_from_draft(draft)
    };
    repository::update_patient(conn, &patient)?;
    Ok(patient)
}

/// Delete a patient together with all of their consultations and
/// prescriptions (schema-level cascade).
pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    repository::delete_patient(conn, id)?;
    tracing::info!(patient = %id, "patient deleted with consultations and prescriptions");
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    repository::get_patient(conn, id)
}

pub fn list_patients(
    conn: &Connection,
    filter: &PatientFilter,
) -> Result<Vec<Patient>, DatabaseError> {
    repository::list_patients(conn, filter, Local::now().date_naive())
}

/// Resolve a form's patient reference to a stored patient id, creating a
/// minimal record for the inline variant.
pub fn resolve_patient_ref(conn: &Connection, patient: &PatientRef) -> Result<Uuid, SaveError> {
    match patient {
        PatientRef::Existing(id) => match repository::get_patient(conn, id) {
            Ok(patient) => Ok(patient.id),
            Err(DatabaseError::NotFound { .. }) => Err(SaveError::Invalid(vec![FieldError::new(
                "patient",
                "Unknown patient.",
            )])),
            Err(e) => Err(e.into()),
        },
        PatientRef::New { surname, given_name } => {
            let draft = PatientDraft {
                surname: surname.clone(),
                given_name: given_name.clone(),
                ..Default::default()
            };
            let patient = create_patient(conn, &draft)?;
            tracing::info!(patient = %patient.id, "patient created inline from form");
            Ok(patient.id)
        }
    }
}

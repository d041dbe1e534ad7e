//! Consultation flows — slot validation, automatic pricing, per-patient
//! sequential numbering at first persistence.

use chrono::{Local, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{repository, DatabaseError};
use crate::models::enums::{ConsultationKind, ConsultationStatus};
use crate::models::{Consultation, ConsultationFilter};
use crate::patients::{resolve_patient_ref, PatientRef};
use crate::pricing::price_for;
use crate::sequence::{allocate, SequenceKind};
use crate::validation::{FieldError, SaveError};

/// A consultation as submitted by a form. No numero and no price: both are
/// computed at save time and never accepted from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationDraft {
    pub patient: PatientRef,
    pub kind: ConsultationKind,
    pub scheduled_at: NaiveDateTime,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub status: ConsultationStatus,
}

impl ConsultationDraft {
    pub fn new(patient: PatientRef, kind: ConsultationKind, scheduled_at: NaiveDateTime) -> Self {
        Self {
            patient,
            kind,
            scheduled_at,
            diagnosis: None,
            treatment: None,
            notes: None,
            status: ConsultationStatus::default(),
        }
    }
}

/// Editable fields of an existing consultation. The patient and the numero
/// are fixed at creation; moving a consultation to another patient would
/// detach it from the numbering it was allocated under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationUpdate {
    pub kind: ConsultationKind,
    pub scheduled_at: NaiveDateTime,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub status: ConsultationStatus,
}

fn check_slot(
    conn: &Connection,
    patient_id: &Uuid,
    scheduled_at: NaiveDateTime,
    exclude: Option<&Uuid>,
) -> Result<(), SaveError> {
    if repository::slot_taken(conn, patient_id, scheduled_at, exclude)? {
        return Err(SaveError::Invalid(vec![FieldError::new(
            "scheduled_at",
            "The patient already has a consultation at this date and time.",
        )]));
    }
    Ok(())
}

/// Create a consultation: resolve the patient, validate the time slot, then
/// price and number the record inside the allocator's transaction.
pub fn create_consultation(
    conn: &mut Connection,
    draft: &ConsultationDraft,
) -> Result<Consultation, SaveError> {
    let patient_id = resolve_patient_ref(conn, &draft.patient)?;
    check_slot(conn, &patient_id, draft.scheduled_at, None)?;

    let price = price_for(draft.kind);
    let consultation = allocate(conn, SequenceKind::Consultation, &patient_id, |tx, numero| {
        let c = Consultation {
            id: Uuid::new_v4(),
            patient_id,
            numero,
            kind: draft.kind,
            scheduled_at: draft.scheduled_at,
            diagnosis: draft.diagnosis.clone(),
            treatment: draft.treatment.clone(),
            notes: draft.notes.clone(),
            status: draft.status,
            price,
        };
        repository::insert_consultation(tx, &c)?;
        Ok(c)
    })?;

    tracing::debug!(
        consultation = %consultation.id,
        numero = consultation.numero,
        price,
        "consultation created"
    );
    Ok(consultation)
}

/// Update a consultation. The price is recomputed from the (possibly new)
/// kind on every save; the numero is never touched.
pub fn update_consultation(
    conn: &Connection,
    id: &Uuid,
    update: &ConsultationUpdate,
) -> Result<Consultation, SaveError> {
    let existing = repository::get_consultation(conn, id)?;
    check_slot(conn, &existing.patient_id, update.scheduled_at, Some(id))?;

    let consultation = Consultation {
        id: existing.id,
        patient_id: existing.patient_id,
        numero: existing.numero,
        kind: update.kind,
        scheduled_at: update.scheduled_at,
        diagnosis: update.diagnosis.clone(),
        treatment: update.treatment.clone(),
        notes: update.notes.clone(),
        status: update.status,
        price: price_for(update.kind),
    };
    repository::update_consultation(conn, &consultation)?;
    Ok(consultation)
}

pub fn delete_consultation(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    repository::delete_consultation(conn, id)?;
    tracing::info!(consultation = %id, "consultation deleted");
    Ok(())
}

pub fn get_consultation(conn: &Connection, id: &Uuid) -> Result<Consultation, DatabaseError> {
    repository::get_consultation(conn, id)
}

pub fn list_consultations(
    conn: &Connection,
    filter: &ConsultationFilter,
) -> Result<Vec<Consultation>, DatabaseError> {
    repository::list_consultations(conn, filter, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Period;
    use crate::patients::{create_patient, PatientDraft};

    fn seed_patient(conn: &Connection, surname: &str) -> Uuid {
        create_patient(
            conn,
            &PatientDraft {
                surname: surname.into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id
    }

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn creation_numbers_consultations_in_order() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");

        for (i, hour) in (9..12).enumerate() {
            let c = create_consultation(
                &mut conn,
                &ConsultationDraft::new(
                    PatientRef::Existing(patient_id),
                    ConsultationKind::Standard,
                    at(2026, 3, 2, hour, 0),
                ),
            )
            .unwrap();
            assert_eq!(c.numero, i as u32 + 1);
            assert_eq!(c.code(), format!("C{}", i + 1));
        }
    }

    #[test]
    fn price_follows_kind_on_create() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");

        for (hour, kind, expected) in [
            (9, ConsultationKind::Standard, 400),
            (10, ConsultationKind::FollowUp, 0),
            (11, ConsultationKind::Therapy, 700),
        ] {
            let c = create_consultation(
                &mut conn,
                &ConsultationDraft::new(
                    PatientRef::Existing(patient_id),
                    kind,
                    at(2026, 3, 2, hour, 0),
                ),
            )
            .unwrap();
            assert_eq!(c.price, expected, "{kind:?}");
        }
    }

    #[test]
    fn duplicate_slot_for_same_patient_rejected() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let slot = at(2026, 3, 2, 9, 0);

        create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Standard,
                slot,
            ),
        )
        .unwrap();

        let err = create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::FollowUp,
                slot,
            ),
        )
        .unwrap_err();
        assert!(matches!(err, SaveError::Invalid(errors) if errors[0].field == "scheduled_at"));
    }

    #[test]
    fn same_slot_for_different_patients_allowed() {
        let mut conn = open_memory_database().unwrap();
        let first = seed_patient(&conn, "Berrada");
        let second = seed_patient(&conn, "Fassi");
        let slot = at(2026, 3, 2, 9, 0);

        for patient in [first, second] {
            create_consultation(
                &mut conn,
                &ConsultationDraft::new(
                    PatientRef::Existing(patient),
                    ConsultationKind::Standard,
                    slot,
                ),
            )
            .unwrap();
        }
    }

    #[test]
    fn editing_kind_reprices_retroactively() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let c = create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Standard,
                at(2026, 3, 2, 9, 0),
            ),
        )
        .unwrap();
        assert_eq!(c.price, 400);

        let update = ConsultationUpdate {
            kind: ConsultationKind::Therapy,
            scheduled_at: c.scheduled_at,
            diagnosis: c.diagnosis.clone(),
            treatment: c.treatment.clone(),
            notes: c.notes.clone(),
            status: c.status,
        };
        let updated = update_consultation(&conn, &c.id, &update).unwrap();
        assert_eq!(updated.price, 700);
        assert_eq!(get_consultation(&conn, &c.id).unwrap().price, 700);
    }

    #[test]
    fn resaving_same_kind_keeps_price_and_numero() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let c = create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Standard,
                at(2026, 3, 2, 9, 0),
            ),
        )
        .unwrap();

        let update = ConsultationUpdate {
            kind: c.kind,
            scheduled_at: c.scheduled_at,
            diagnosis: Some("Seasonal flu".into()),
            treatment: c.treatment.clone(),
            notes: c.notes.clone(),
            status: ConsultationStatus::Done,
        };
        let updated = update_consultation(&conn, &c.id, &update).unwrap();
        assert_eq!(updated.price, 400);
        assert_eq!(updated.numero, c.numero);
        assert_eq!(updated.patient_id, c.patient_id);
    }

    #[test]
    fn editing_keeps_own_slot_without_conflict() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let c = create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Standard,
                at(2026, 3, 2, 9, 0),
            ),
        )
        .unwrap();

        // Same slot, same record: not a duplicate.
        let update = ConsultationUpdate {
            kind: c.kind,
            scheduled_at: c.scheduled_at,
            diagnosis: None,
            treatment: None,
            notes: None,
            status: c.status,
        };
        update_consultation(&conn, &c.id, &update).unwrap();
    }

    #[test]
    fn create_with_inline_patient() {
        let mut conn = open_memory_database().unwrap();
        let c = create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::New {
                    surname: "Ouazzani".into(),
                    given_name: None,
                },
                ConsultationKind::Therapy,
                at(2026, 3, 2, 9, 0),
            ),
        )
        .unwrap();

        assert_eq!(c.numero, 1);
        assert_eq!(c.price, 700);
        crate::patients::get_patient(&conn, &c.patient_id).unwrap();
    }

    #[test]
    fn list_filters_by_kind_and_period() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let today = Local::now().date_naive();

        create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Standard,
                today.and_hms_opt(9, 0, 0).unwrap(),
            ),
        )
        .unwrap();
        create_consultation(
            &mut conn,
            &ConsultationDraft::new(
                PatientRef::Existing(patient_id),
                ConsultationKind::Therapy,
                at(2020, 1, 6, 9, 0),
            ),
        )
        .unwrap();

        let todays = list_consultations(
            &conn,
            &ConsultationFilter {
                period: Some(Period::Today),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(todays.len(), 1);
        assert_eq!(todays[0].kind, ConsultationKind::Standard);

        let therapy = list_consultations(
            &conn,
            &ConsultationFilter {
                kind: Some(ConsultationKind::Therapy),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(therapy.len(), 1);
    }

    #[test]
    fn search_matches_patient_and_diagnosis() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn, "Berrada");
        let mut draft = ConsultationDraft::new(
            PatientRef::Existing(patient_id),
            ConsultationKind::Standard,
            at(2026, 3, 2, 9, 0),
        );
        draft.diagnosis = Some("Migraine with aura".into());
        create_consultation(&mut conn, &draft).unwrap();

        for term in ["berrada", "migraine"] {
            let found = list_consultations(
                &conn,
                &ConsultationFilter {
                    search: Some(term.into()),
                    ..Default::default()
                },
            )
            .unwrap();
            assert_eq!(found.len(), 1, "search {term:?}");
        }
    }
}

//! Per-patient sequential numbering for consultations and prescriptions.
//!
//! Every new record gets `max(numero) + 1` within its patient's history,
//! computed and inserted inside a single immediate transaction so that two
//! concurrent creations for the same patient can never observe the same
//! maximum. A `(patient_id, numero)` uniqueness violation — the residual
//! race — rolls the transaction back and the whole read-compute-insert
//! cycle is retried a bounded number of times, after which the operation
//! fails with [`DatabaseError::SequenceContention`] rather than risking a
//! duplicate numero.

use rusqlite::{params, Connection, ErrorCode, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::db::DatabaseError;

/// Read-compute-insert attempts before giving up.
pub const MAX_ATTEMPTS: usize = 3;

/// Which per-patient sequence a record draws from. Consultations and
/// prescriptions are numbered independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    Consultation,
    Prescription,
}

impl SequenceKind {
    fn table(self) -> &'static str {
        match self {
            Self::Consultation => "consultations",
            Self::Prescription => "prescriptions",
        }
    }
}

/// Next numero for this patient: highest existing one plus one, 1 when the
/// patient has no records of this kind. Numbers freed by deletion are never
/// reused since the maximum only looks at surviving rows below it.
pub fn next_numero(
    conn: &Connection,
    kind: SequenceKind,
    patient_id: &Uuid,
) -> Result<u32, DatabaseError> {
    let max: u32 = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(numero), 0) FROM {} WHERE patient_id = ?1",
            kind.table()
        ),
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(max + 1)
}

/// Whether an insert failed on the `(patient_id, numero)` uniqueness
/// constraint, i.e. another writer took the computed numero first.
pub fn is_numero_conflict(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.code == ErrorCode::ConstraintViolation && msg.contains("numero")
        }
        _ => false,
    }
}

/// Run `insert` with a freshly computed numero inside an immediate
/// transaction, retrying the full cycle on numero collision.
///
/// The immediate transaction takes SQLite's write lock before the maximum is
/// read, which serializes concurrent allocators; `insert` receives the open
/// transaction and the numero to persist.
pub fn allocate<T>(
    conn: &mut Connection,
    kind: SequenceKind,
    patient_id: &Uuid,
    mut insert: impl FnMut(&Transaction, u32) -> rusqlite::Result<T>,
) -> Result<T, DatabaseError> {
    for attempt in 1..=MAX_ATTEMPTS {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let numero = next_numero(&tx, kind, patient_id)?;
        match insert(&tx, numero) {
            Ok(value) => {
                tx.commit()?;
                return Ok(value);
            }
            Err(e) if is_numero_conflict(&e) => {
                tracing::warn!(
                    patient = %patient_id,
                    numero,
                    attempt,
                    "numero already taken, retrying allocation"
                );
                tx.rollback()?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(DatabaseError::SequenceContention {
        patient_id: patient_id.to_string(),
        attempts: MAX_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Local;

    use super::*;
    use crate::db::repository::{insert_consultation, insert_patient, insert_prescription};
    use crate::db::sqlite::{open_database, open_memory_database};
    use crate::models::enums::{ConsultationKind, ConsultationStatus};
    use crate::models::{Consultation, Patient, Prescription};

    fn seed_patient(conn: &Connection) -> Uuid {
        let patient = Patient {
            id: Uuid::new_v4(),
            surname: "Berrada".into(),
            given_name: None,
            birth_date: None,
            sex: None,
            phone: None,
            email: None,
            address: None,
            profession: None,
            notes: None,
            created_at: Local::now().naive_local(),
        };
        insert_patient(conn, &patient).unwrap();
        patient.id
    }

    fn create_consultation(conn: &mut Connection, patient_id: &Uuid) -> Consultation {
        let scheduled = Local::now().naive_local();
        allocate(conn, SequenceKind::Consultation, patient_id, |tx, numero| {
            let c = Consultation {
                id: Uuid::new_v4(),
                patient_id: *patient_id,
                numero,
                kind: ConsultationKind::Standard,
                scheduled_at: scheduled,
                diagnosis: None,
                treatment: None,
                notes: None,
                status: ConsultationStatus::Planned,
                price: 400,
            };
            insert_consultation(tx, &c)?;
            Ok(c)
        })
        .unwrap()
    }

    #[test]
    fn numbers_are_sequential_per_patient() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);

        for expected in 1..=4 {
            let c = create_consultation(&mut conn, &patient_id);
            assert_eq!(c.numero, expected);
        }
    }

    #[test]
    fn sequences_are_independent_across_patients() {
        let mut conn = open_memory_database().unwrap();
        let first = seed_patient(&conn);
        let second = seed_patient(&conn);

        create_consultation(&mut conn, &first);
        create_consultation(&mut conn, &first);
        let c = create_consultation(&mut conn, &second);
        assert_eq!(c.numero, 1);
    }

    #[test]
    fn sequences_are_independent_across_kinds() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);
        create_consultation(&mut conn, &patient_id);
        create_consultation(&mut conn, &patient_id);

        let rx = allocate(
            &mut conn,
            SequenceKind::Prescription,
            &patient_id,
            |tx, numero| {
                let rx = Prescription {
                    id: Uuid::new_v4(),
                    patient_id,
                    consultation_id: None,
                    numero,
                    body: "Paracetamol 1g".into(),
                    created_at: Local::now().naive_local(),
                };
                insert_prescription(tx, &rx)?;
                Ok(rx)
            },
        )
        .unwrap();
        assert_eq!(rx.numero, 1);
    }

    #[test]
    fn deleted_numero_is_not_reused() {
        let mut conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);

        let first = create_consultation(&mut conn, &patient_id);
        create_consultation(&mut conn, &patient_id);
        conn.execute(
            "DELETE FROM consultations WHERE id = ?1",
            params![first.id.to_string()],
        )
        .unwrap();

        // The freed 1 stays a gap; numbering continues above the surviving maximum.
        let third = create_consultation(&mut conn, &patient_id);
        assert_eq!(third.numero, 3);
    }

    #[test]
    fn collision_detection_matches_numero_constraint() {
        let conn = open_memory_database().unwrap();
        let patient_id = seed_patient(&conn);

        let make = |numero| Consultation {
            id: Uuid::new_v4(),
            patient_id,
            numero,
            kind: ConsultationKind::FollowUp,
            scheduled_at: Local::now().naive_local(),
            diagnosis: None,
            treatment: None,
            notes: None,
            status: ConsultationStatus::Planned,
            price: 0,
        };

        insert_consultation(&conn, &make(1)).unwrap();
        let err = insert_consultation(&conn, &make(1)).unwrap_err();
        assert!(is_numero_conflict(&err));

        // A different constraint failure is not mistaken for a collision.
        let orphan = Consultation {
            patient_id: Uuid::new_v4(),
            ..make(2)
        };
        let err = insert_consultation(&conn, &orphan).unwrap_err();
        assert!(!is_numero_conflict(&err));
    }

    #[test]
    fn concurrent_creations_get_distinct_dense_numeros() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("contention.db");
        let patient_id = {
            let conn = open_database(&path).unwrap();
            seed_patient(&conn)
        };

        const WRITERS: usize = 8;
        let handles: Vec<_> = (0..WRITERS)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut conn = open_database(&path).unwrap();
                    create_consultation(&mut conn, &patient_id).numero
                })
            })
            .collect();

        let mut numeros: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        numeros.sort_unstable();
        assert_eq!(numeros, (1..=WRITERS as u32).collect::<Vec<_>>());
    }
}

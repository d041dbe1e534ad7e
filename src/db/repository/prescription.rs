use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{Prescription, PrescriptionFilter};

const PRESCRIPTION_COLUMNS: &str =
    "r.id, r.patient_id, r.consultation_id, r.numero, r.body, r.created_at";

fn prescription_from_row(row: &Row) -> rusqlite::Result<Prescription> {
    Ok(Prescription {
        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
        patient_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap_or_default(),
        consultation_id: row
            .get::<_, Option<String>>(2)?
            .and_then(|id| Uuid::parse_str(&id).ok()),
        numero: row.get(3)?,
        body: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Insert a fully assembled prescription row (numero already set). Returns
/// the raw rusqlite error so the allocator can recognize a numero collision.
pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, consultation_id, numero, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rx.id.to_string(),
            rx.patient_id.to_string(),
            rx.consultation_id.map(|id| id.to_string()),
            rx.numero,
            rx.body,
            rx.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Prescription, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions r WHERE r.id = ?1"),
        params![id.to_string()],
        prescription_from_row,
    );

    match result {
        Ok(rx) => Ok(rx),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Update the free-text body and the consultation link. `patient_id`,
/// `numero` and `created_at` are fixed at creation.
pub fn update_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE prescriptions SET consultation_id = ?1, body = ?2 WHERE id = ?3",
        params![
            rx.consultation_id.map(|id| id.to_string()),
            rx.body,
            rx.id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: rx.id.to_string(),
        });
    }
    Ok(())
}

pub fn delete_prescription(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM prescriptions WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// The prescription linked to a consultation, if any (the relation is
/// one-to-one at the schema level).
pub fn prescription_for_consultation(
    conn: &Connection,
    consultation_id: &Uuid,
) -> Result<Option<Prescription>, DatabaseError> {
    let result = conn.query_row(
        &format!(
            "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions r WHERE r.consultation_id = ?1"
        ),
        params![consultation_id.to_string()],
        prescription_from_row,
    );

    match result {
        Ok(rx) => Ok(Some(rx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Lists prescriptions, newest creation first then highest numero
/// (ties happen when several are created within the same second).
pub fn list_prescriptions(
    conn: &Connection,
    filter: &PrescriptionFilter,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions r
         JOIN patients p ON r.patient_id = p.id
         WHERE 1=1"
    );
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND (LOWER(p.surname) LIKE LOWER(?) OR LOWER(COALESCE(p.given_name, '')) LIKE LOWER(?)
             OR LOWER(r.body) LIKE LOWER(?))",
        );
        let pattern = format!("%{search}%");
        for _ in 0..3 {
            binds.push(Box::new(pattern.clone()));
        }
    }

    if let Some(from) = filter.created_from {
        sql.push_str(" AND r.created_at >= ?");
        binds.push(Box::new(from));
    }

    sql.push_str(" ORDER BY r.created_at DESC, r.numero DESC");

    if filter.limit.is_some() || filter.offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Box::new(filter.limit.map(i64::from).unwrap_or(-1)));
        binds.push(Box::new(i64::from(filter.offset.unwrap_or(0))));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(binds.iter().map(|b| b.as_ref())),
        prescription_from_row,
    )?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// All prescriptions of one patient, oldest numero first.
pub fn list_prescriptions_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions r
         WHERE r.patient_id = ?1 ORDER BY r.numero ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], prescription_from_row)?;

    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

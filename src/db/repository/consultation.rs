use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{ConsultationKind, ConsultationStatus};
use crate::models::{Consultation, ConsultationFilter, Period};

const CONSULTATION_COLUMNS: &str =
    "c.id, c.patient_id, c.numero, c.kind, c.scheduled_at, c.diagnosis, c.treatment, c.notes, \
     c.status, c.price";

struct ConsultationRow {
    consultation: Consultation,
    kind_raw: String,
    status_raw: String,
}

fn consultation_from_row(row: &Row) -> rusqlite::Result<ConsultationRow> {
    Ok(ConsultationRow {
        consultation: Consultation {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
            patient_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap_or_default(),
            numero: row.get(2)?,
            kind: ConsultationKind::Standard,
            scheduled_at: row.get(4)?,
            diagnosis: row.get(5)?,
            treatment: row.get(6)?,
            notes: row.get(7)?,
            status: ConsultationStatus::Planned,
            price: row.get(9)?,
        },
        kind_raw: row.get(3)?,
        status_raw: row.get(8)?,
    })
}

fn finish_consultation(raw: ConsultationRow) -> Result<Consultation, DatabaseError> {
    let mut consultation = raw.consultation;
    consultation.kind = ConsultationKind::from_str(&raw.kind_raw)?;
    consultation.status = ConsultationStatus::from_str(&raw.status_raw)?;
    Ok(consultation)
}

/// Insert a fully assembled consultation row (numero and price already set).
/// Called inside the allocator's transaction; the raw rusqlite error is
/// returned so the allocator can recognize a numero collision.
pub fn insert_consultation(conn: &Connection, c: &Consultation) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO consultations (id, patient_id, numero, kind, scheduled_at, diagnosis,
         treatment, notes, status, price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            c.id.to_string(),
            c.patient_id.to_string(),
            c.numero,
            c.kind.as_str(),
            c.scheduled_at,
            c.diagnosis,
            c.treatment,
            c.notes,
            c.status.as_str(),
            c.price,
        ],
    )?;
    Ok(())
}

pub fn get_consultation(conn: &Connection, id: &Uuid) -> Result<Consultation, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {CONSULTATION_COLUMNS} FROM consultations c WHERE c.id = ?1"),
        params![id.to_string()],
        consultation_from_row,
    );

    match result {
        Ok(raw) => finish_consultation(raw),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "Consultation".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Update editable fields. `patient_id` and `numero` are fixed at creation
/// and deliberately absent from the SET list.
pub fn update_consultation(conn: &Connection, c: &Consultation) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE consultations SET kind = ?1, scheduled_at = ?2, diagnosis = ?3, treatment = ?4,
         notes = ?5, status = ?6, price = ?7
         WHERE id = ?8",
        params![
            c.kind.as_str(),
            c.scheduled_at,
            c.diagnosis,
            c.treatment,
            c.notes,
            c.status.as_str(),
            c.price,
            c.id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Consultation".into(),
            id: c.id.to_string(),
        });
    }
    Ok(())
}

/// Delete a consultation. A linked prescription survives with its
/// consultation reference cleared (FK SET NULL).
pub fn delete_consultation(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM consultations WHERE id = ?1",
        params![id.to_string()],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Consultation".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Whether the patient already has a consultation at this exact time slot,
/// excluding `exclude` when editing an existing record.
pub fn slot_taken(
    conn: &Connection,
    patient_id: &Uuid,
    scheduled_at: NaiveDateTime,
    exclude: Option<&Uuid>,
) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM consultations
         WHERE patient_id = ?1 AND scheduled_at = ?2 AND id != ?3",
        params![
            patient_id.to_string(),
            scheduled_at,
            exclude.map(|id| id.to_string()).unwrap_or_default(),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Lists consultations most recent first, with the filters the consultation
/// list screen offers. `today` anchors the period filter.
pub fn list_consultations(
    conn: &Connection,
    filter: &ConsultationFilter,
    today: NaiveDate,
) -> Result<Vec<Consultation>, DatabaseError> {
    let mut sql = format!(
        "SELECT {CONSULTATION_COLUMNS} FROM consultations c
         JOIN patients p ON c.patient_id = p.id
         WHERE 1=1"
    );
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND (LOWER(p.surname) LIKE LOWER(?) OR LOWER(COALESCE(p.given_name, '')) LIKE LOWER(?)
             OR LOWER(COALESCE(c.diagnosis, '')) LIKE LOWER(?)
             OR LOWER(COALESCE(c.notes, '')) LIKE LOWER(?))",
        );
        let pattern = format!("%{search}%");
        for _ in 0..4 {
            binds.push(Box::new(pattern.clone()));
        }
    }

    if let Some(kind) = filter.kind {
        sql.push_str(" AND c.kind = ?");
        binds.push(Box::new(kind.as_str()));
    }

    if let Some(status) = filter.status {
        sql.push_str(" AND c.status = ?");
        binds.push(Box::new(status.as_str()));
    }

    match filter.period {
        Some(Period::Today) => {
            sql.push_str(" AND date(c.scheduled_at) = ?");
            binds.push(Box::new(today.to_string()));
        }
        Some(Period::ThisWeek) => {
            let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            sql.push_str(" AND date(c.scheduled_at) >= ?");
            binds.push(Box::new(monday.to_string()));
        }
        Some(Period::ThisMonth) => {
            sql.push_str(" AND strftime('%Y-%m', c.scheduled_at) = ?");
            binds.push(Box::new(today.format("%Y-%m").to_string()));
        }
        None => {}
    }

    sql.push_str(" ORDER BY c.scheduled_at DESC");

    if filter.limit.is_some() || filter.offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Box::new(filter.limit.map(i64::from).unwrap_or(-1)));
        binds.push(Box::new(i64::from(filter.offset.unwrap_or(0))));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params_from_iter(binds.iter().map(|b| b.as_ref())),
        consultation_from_row,
    )?;

    let mut consultations = Vec::new();
    for row in rows {
        consultations.push(finish_consultation(row?)?);
    }
    Ok(consultations)
}

/// All consultations of one patient, oldest numero first.
pub fn list_consultations_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Consultation>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONSULTATION_COLUMNS} FROM consultations c
         WHERE c.patient_id = ?1 ORDER BY c.numero ASC"
    ))?;
    let rows = stmt.query_map(params![patient_id.to_string()], consultation_from_row)?;

    let mut consultations = Vec::new();
    for row in rows {
        consultations.push(finish_consultation(row?)?);
    }
    Ok(consultations)
}

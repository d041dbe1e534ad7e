use std::str::FromStr;

use chrono::{Months, NaiveDate};
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Sex;
use crate::models::{AgeBand, Patient, PatientFilter};

const PATIENT_COLUMNS: &str = "id, surname, given_name, birth_date, sex, phone, email, address, \
     profession, notes, created_at";

fn patient_from_row(row: &Row) -> rusqlite::Result<(Patient, Option<String>)> {
    let sex_raw: Option<String> = row.get(4)?;
    Ok((
        Patient {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap_or_default(),
            surname: row.get(1)?,
            given_name: row.get(2)?,
            birth_date: row.get(3)?,
            sex: None,
            phone: row.get(5)?,
            email: row.get(6)?,
            address: row.get(7)?,
            profession: row.get(8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
        },
        sex_raw,
    ))
}

fn finish_patient((mut patient, sex_raw): (Patient, Option<String>)) -> Result<Patient, DatabaseError> {
    patient.sex = sex_raw.as_deref().map(Sex::from_str).transpose()?;
    Ok(patient)
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, surname, given_name, birth_date, sex, phone, email, address,
         profession, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            patient.id.to_string(),
            patient.surname,
            patient.given_name,
            patient.birth_date,
            patient.sex.map(|s| s.as_str()),
            patient.phone,
            patient.email,
            patient.address,
            patient.profession,
            patient.notes,
            patient.created_at,
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
        params![id.to_string()],
        patient_from_row,
    );

    match result {
        Ok(raw) => finish_patient(raw),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Update all editable fields; `created_at` is left untouched.
pub fn update_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let changed = conn.execute(
        "UPDATE patients SET surname = ?1, given_name = ?2, birth_date = ?3, sex = ?4,
         phone = ?5, email = ?6, address = ?7, profession = ?8, notes = ?9
         WHERE id = ?10",
        params![
            patient.surname,
            patient.given_name,
            patient.birth_date,
            patient.sex.map(|s| s.as_str()),
            patient.phone,
            patient.email,
            patient.address,
            patient.profession,
            patient.notes,
            patient.id.to_string(),
        ],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: patient.id.to_string(),
        });
    }
    Ok(())
}

/// Delete a patient. Consultations and prescriptions go with it (FK CASCADE).
pub fn delete_patient(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let changed = conn.execute("DELETE FROM patients WHERE id = ?1", params![id.to_string()])?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Patient".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Lists patients newest-first, applying search/age-band filters and pagination.
///
/// `today` anchors the age-band cutoffs so callers (and tests) control the clock.
pub fn list_patients(
    conn: &Connection,
    filter: &PatientFilter,
    today: NaiveDate,
) -> Result<Vec<Patient>, DatabaseError> {
    let mut sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE 1=1");
    let mut binds: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        sql.push_str(
            " AND (LOWER(surname) LIKE LOWER(?) OR LOWER(COALESCE(given_name, '')) LIKE LOWER(?)
             OR COALESCE(phone, '') LIKE ? OR LOWER(COALESCE(email, '')) LIKE LOWER(?))",
        );
        let pattern = format!("%{search}%");
        for _ in 0..4 {
            binds.push(Box::new(pattern.clone()));
        }
    }

    if let Some(band) = filter.age_band {
        // birth_date is stored YYYY-MM-DD, so string comparison is chronological.
        let adult_cutoff = today.checked_sub_months(Months::new(12 * 18)).unwrap_or(today);
        let senior_cutoff = today.checked_sub_months(Months::new(12 * 65)).unwrap_or(today);
        match band {
            AgeBand::Child => {
                sql.push_str(" AND birth_date IS NOT NULL AND birth_date > ?");
                binds.push(Box::new(adult_cutoff.to_string()));
            }
            AgeBand::Adult => {
                sql.push_str(" AND birth_date IS NOT NULL AND birth_date <= ? AND birth_date > ?");
                binds.push(Box::new(adult_cutoff.to_string()));
                binds.push(Box::new(senior_cutoff.to_string()));
            }
            AgeBand::Senior => {
                sql.push_str(" AND birth_date IS NOT NULL AND birth_date <= ?");
                binds.push(Box::new(senior_cutoff.to_string()));
            }
        }
    }

    sql.push_str(" ORDER BY created_at DESC");

    if filter.limit.is_some() || filter.offset.is_some() {
        sql.push_str(" LIMIT ? OFFSET ?");
        binds.push(Box::new(filter.limit.map(i64::from).unwrap_or(-1)));
        binds.push(Box::new(i64::from(filter.offset.unwrap_or(0))));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(binds.iter().map(|b| b.as_ref())), patient_from_row)?;

    let mut patients = Vec::new();
    for row in rows {
        patients.push(finish_patient(row?)?);
    }
    Ok(patients)
}

/// Total patient count matching the search/age-band part of the filter
/// (pagination ignored), for list pagination headers.
pub fn count_patients(
    conn: &Connection,
    filter: &PatientFilter,
    today: NaiveDate,
) -> Result<i64, DatabaseError> {
    let unpaged = PatientFilter {
        search: filter.search.clone(),
        age_band: filter.age_band,
        limit: None,
        offset: None,
    };
    Ok(list_patients(conn, &unpaged, today)?.len() as i64)
}

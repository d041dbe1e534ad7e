use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Sex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub surname: String,
    pub given_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<Sex>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub profession: Option<String>,
    /// Private practitioner notes, never shown on rendered documents.
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Patient {
    /// Surname plus given name, trimmed when the given name is absent.
    pub fn full_name(&self) -> String {
        match &self.given_name {
            Some(given) if !given.is_empty() => format!("{} {}", self.surname, given),
            _ => self.surname.clone(),
        }
    }

    /// Age in completed years as of `today`; `None` when the birth date is unknown.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        use chrono::Datelike;
        let birth = self.birth_date?;
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

use chrono::NaiveDateTime;

use super::enums::{ConsultationKind, ConsultationStatus};

/// Age bands used by the patient list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBand {
    /// Under 18.
    Child,
    /// 18 to 64.
    Adult,
    /// 65 and over.
    Senior,
}

/// Relative period filter for consultation lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Today,
    /// From Monday of the current week.
    ThisWeek,
    ThisMonth,
}

#[derive(Debug, Default)]
pub struct PatientFilter {
    /// Matches surname, given name, phone or email (case-insensitive substring).
    pub search: Option<String>,
    pub age_band: Option<AgeBand>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default)]
pub struct ConsultationFilter {
    /// Matches patient surname/given name, diagnosis or notes.
    pub search: Option<String>,
    pub kind: Option<ConsultationKind>,
    pub status: Option<ConsultationStatus>,
    pub period: Option<Period>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Default)]
pub struct PrescriptionFilter {
    /// Matches patient surname/given name or prescription body.
    pub search: Option<String>,
    /// Restrict to prescriptions created at or after this instant.
    pub created_from: Option<NaiveDateTime>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

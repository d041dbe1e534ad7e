use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ConsultationKind, ConsultationStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultation {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// Per-patient sequence number. Assigned once at creation, immutable after.
    pub numero: u32,
    pub kind: ConsultationKind,
    pub scheduled_at: NaiveDateTime,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub notes: Option<String>,
    pub status: ConsultationStatus,
    /// Derived from `kind` on every save; never accepted from callers.
    pub price: i64,
}

impl Consultation {
    /// Short display code within the patient's history: "C1", "C2", ...
    pub fn code(&self) -> String {
        format!("C{}", self.numero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_uses_numero() {
        let c = Consultation {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            numero: 7,
            kind: ConsultationKind::Standard,
            scheduled_at: NaiveDateTime::parse_from_str(
                "2026-03-02 10:30:00",
                "%Y-%m-%d %H:%M:%S",
            )
            .unwrap(),
            diagnosis: None,
            treatment: None,
            notes: None,
            status: ConsultationStatus::Planned,
            price: 400,
        };
        assert_eq!(c.code(), "C7");
    }
}

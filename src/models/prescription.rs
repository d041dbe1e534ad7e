use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// At most one prescription per consultation; cleared (not cascaded)
    /// when the consultation is deleted.
    pub consultation_id: Option<Uuid>,
    /// Per-patient sequence number, same invariants as the consultation one.
    pub numero: u32,
    /// Free text: medications, dosages, durations, instructions.
    pub body: String,
    pub created_at: NaiveDateTime,
}

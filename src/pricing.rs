//! Fixed consultation pricing.
//!
//! The price is a function of the consultation kind and nothing else. It is
//! recomputed on every save, create or edit, overwriting whatever the record
//! held before — changing a consultation's kind retroactively changes its
//! price, which is the intended billing behavior.

use crate::models::enums::ConsultationKind;

/// Price in dirhams for a consultation of the given kind.
pub fn price_for(kind: ConsultationKind) -> i64 {
    match kind {
        ConsultationKind::Standard => 400,
        ConsultationKind::FollowUp => 0,
        ConsultationKind::Therapy => 700,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_table() {
        assert_eq!(price_for(ConsultationKind::Standard), 400);
        assert_eq!(price_for(ConsultationKind::FollowUp), 0);
        assert_eq!(price_for(ConsultationKind::Therapy), 700);
    }
}

use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Sex {
    Male => "M",
    Female => "F",
});

str_enum!(ConsultationKind {
    Standard => "standard",
    FollowUp => "follow_up",
    Therapy => "therapy",
});

str_enum!(ConsultationStatus {
    Planned => "planned",
    InProgress => "in_progress",
    Done => "done",
    Postponed => "postponed",
    Cancelled => "cancelled",
});

impl Default for ConsultationStatus {
    fn default() -> Self {
        Self::Planned
    }
}
